//! Locating, downloading, and unpacking the scanner executable.
//!
//! An executable already present in the working directory is never
//! downloaded again; only its permission bits are normalized.
use crate::archive::ArchiveKind;
use crate::error::{Result, StepError};
use crate::launcher::{launch_logged, BuildLog, ProcessLauncher};
use crate::platform::{classify_arch, Platform};
use crate::release::{AssetFetcher, ReleaseResolver, ReleaseVersion};
use crate::workspace::{BinaryHandle, WorkingDirectory};
use std::fs;
use std::path::Path;

pub struct BinaryProvisioner<'a> {
    project: String,
    resolver: &'a dyn ReleaseResolver,
    fetcher: &'a dyn AssetFetcher,
    launcher: &'a dyn ProcessLauncher,
    log: BuildLog,
    pinned_version: Option<ReleaseVersion>,
    raw_architecture: String,
}

impl<'a> BinaryProvisioner<'a> {
    pub fn new(
        project: impl Into<String>,
        resolver: &'a dyn ReleaseResolver,
        fetcher: &'a dyn AssetFetcher,
        launcher: &'a dyn ProcessLauncher,
        log: BuildLog,
    ) -> Self {
        Self {
            project: project.into(),
            resolver,
            fetcher,
            launcher,
            log,
            pinned_version: None,
            raw_architecture: std::env::consts::ARCH.to_string(),
        }
    }

    /// Download this release instead of the latest one.
    pub fn with_version(mut self, version: Option<ReleaseVersion>) -> Self {
        self.pinned_version = version;
        self
    }

    /// Override the architecture string reported by the runtime.
    pub fn with_raw_architecture(mut self, raw: impl Into<String>) -> Self {
        self.raw_architecture = raw.into();
        self
    }

    pub fn ensure_binary(
        &self,
        working_dir: &WorkingDirectory,
        platform: Platform,
    ) -> Result<BinaryHandle> {
        let path = working_dir.binary_path(&self.project, platform);
        if !path.exists() {
            self.download_and_unpack(working_dir, platform)?;
            if !path.exists() {
                return Err(StepError::BinaryNotInArchive(path));
            }
        }
        self.ensure_executable(&path);
        Ok(BinaryHandle { path })
    }

    fn download_and_unpack(&self, working_dir: &WorkingDirectory, platform: Platform) -> Result<()> {
        let architecture = classify_arch(&self.raw_architecture)?;
        self.log
            .line(&format!("Retrieved architecture: {architecture}"));

        let asset = match &self.pinned_version {
            Some(version) => {
                self.log
                    .line(&format!("Downloading version {version} of {}!", self.project));
                self.resolver
                    .resolve_asset_url(version, platform, architecture)?
            }
            None => {
                self.log
                    .line(&format!("Downloading latest version of {}!", self.project));
                self.resolver
                    .resolve_latest_asset_url(platform, architecture)?
            }
        };
        self.log
            .line(&format!("Extracted download URL: {}", asset.url));

        let kind = ArchiveKind::from_url(&asset.url)?;
        fs::create_dir_all(working_dir.root()).map_err(|err| {
            StepError::extraction(&format!("create {}", working_dir.root().display()), err)
        })?;
        let stream = self.fetcher.open(&asset.url)?;
        kind.extract(stream, working_dir.root())?;
        tracing::info!(
            version = %asset.version,
            platform = %asset.platform,
            architecture = %asset.architecture,
            ?kind,
            "release asset unpacked"
        );
        Ok(())
    }

    /// Best effort: the scan itself is what proves the binary is usable.
    fn ensure_executable(&self, path: &Path) {
        if let Err(reason) = set_owner_permissions(path) {
            tracing::debug!(path = %path.display(), %reason, "falling back to chmod");
            chmod_fallback(self.launcher, &self.log, path);
        }
    }
}

#[cfg(unix)]
fn set_owner_permissions(path: &Path) -> std::result::Result<(), String> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o700)).map_err(|err| err.to_string())?;
    let mode = fs::metadata(path)
        .map_err(|err| err.to_string())?
        .permissions()
        .mode();
    if mode & 0o100 == 0 {
        return Err(format!("execute bit still unset (mode {mode:o})"));
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_permissions(_path: &Path) -> std::result::Result<(), String> {
    Ok(())
}

fn chmod_fallback(launcher: &dyn ProcessLauncher, log: &BuildLog, path: &Path) {
    let chmod = match which::which("chmod") {
        Ok(chmod) => chmod.display().to_string(),
        Err(err) => {
            tracing::warn!(error = %err, "chmod not found, leaving permissions unchanged");
            return;
        }
    };
    let argv = vec![chmod, "+x".to_string(), path.display().to_string()];
    if let Some(status) = launch_logged(launcher, log, &argv) {
        if !status.success() {
            tracing::warn!(code = ?status.code, path = %path.display(), "chmod +x failed");
        }
    }
}

#[cfg(test)]
#[path = "provision_tests.rs"]
mod tests;
