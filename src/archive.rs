//! Unpacking of downloaded release archives.
//!
//! Entries are written in archive order: directories are created, regular
//! files are written (replacing existing files), everything else is skipped.
//! Every entry name must stay inside the destination directory.
use crate::error::{Result, StepError};
use flate2::read::GzDecoder;
use std::fs;
use std::io::{self, Read, Seek};
use std::path::{Component, Path, PathBuf};

/// Archive formats published for scanner releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
}

impl ArchiveKind {
    /// Pick the format from the path of a download URL.
    pub fn from_url(url: &str) -> Result<Self> {
        let path = url
            .split(['?', '#'])
            .next()
            .unwrap_or(url)
            .to_lowercase();
        if path.ends_with(".zip") {
            Ok(ArchiveKind::Zip)
        } else if path.ends_with(".tar.gz") {
            Ok(ArchiveKind::TarGz)
        } else {
            Err(StepError::UnsupportedArchiveFormat(path))
        }
    }

    /// Unpack `stream` into `dest` with the extractor matching this format.
    pub fn extract(self, stream: impl Read, dest: &Path) -> Result<()> {
        match self {
            ArchiveKind::Zip => extract_zip(stream, dest),
            ArchiveKind::TarGz => extract_tar_gz(stream, dest),
        }
    }
}

/// Unpack a zip stream into `dest`.
///
/// The central directory sits at the end of a zip file, so the stream is
/// spooled to an anonymous temp file before entries are read.
pub fn extract_zip(mut stream: impl Read, dest: &Path) -> Result<()> {
    let mut spool =
        tempfile::tempfile().map_err(|err| StepError::extraction("create spool file", err))?;
    io::copy(&mut stream, &mut spool)
        .map_err(|err| StepError::extraction("read zip stream", err))?;
    spool
        .rewind()
        .map_err(|err| StepError::extraction("rewind zip spool", err))?;

    let mut archive =
        zip::ZipArchive::new(spool).map_err(|err| StepError::extraction("open zip", err))?;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| StepError::extraction("read zip entry", err))?;
        let name = entry.name().to_string();
        let out_path = resolve_entry_path(dest, Path::new(&name))?;
        if entry.is_dir() {
            create_dir_entry(&out_path)?;
        } else if entry.is_file() {
            write_file_entry(&mut entry, &out_path)?;
        } else {
            tracing::debug!(entry = %name, "skipping non-regular zip entry");
        }
    }
    Ok(())
}

/// Unpack a gzip-compressed tar stream into `dest`.
pub fn extract_tar_gz(stream: impl Read, dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(GzDecoder::new(stream));
    let entries = archive
        .entries()
        .map_err(|err| StepError::extraction("read tar stream", err))?;
    for entry in entries {
        let mut entry = entry.map_err(|err| StepError::extraction("read tar entry", err))?;
        let name = entry
            .path()
            .map_err(|err| StepError::extraction("decode tar entry name", err))?
            .into_owned();
        let out_path = resolve_entry_path(dest, &name)?;
        let kind = entry.header().entry_type();
        if kind.is_dir() {
            create_dir_entry(&out_path)?;
        } else if kind.is_file() {
            write_file_entry(&mut entry, &out_path)?;
        } else {
            tracing::debug!(entry = %name.display(), "skipping non-regular tar entry");
        }
    }
    Ok(())
}

/// Join an entry name onto `dest`, rejecting names that would escape it.
fn resolve_entry_path(dest: &Path, name: &Path) -> Result<PathBuf> {
    let mut relative = PathBuf::new();
    for component in name.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(StepError::Extraction(format!(
                    "entry '{}' escapes the destination directory",
                    name.display()
                )));
            }
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(StepError::Extraction(format!(
            "entry '{}' has no usable name",
            name.display()
        )));
    }
    Ok(dest.join(relative))
}

fn create_dir_entry(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    fs::create_dir_all(path)
        .map_err(|err| StepError::extraction(&format!("create {}", path.display()), err))
}

fn write_file_entry(reader: &mut impl Read, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| StepError::extraction(&format!("create {}", parent.display()), err))?;
    }
    let mut file = fs::File::create(path)
        .map_err(|err| StepError::extraction(&format!("create {}", path.display()), err))?;
    io::copy(reader, &mut file)
        .map_err(|err| StepError::extraction(&format!("write {}", path.display()), err))?;
    tracing::debug!(path = %path.display(), "extracted file");
    Ok(())
}

#[cfg(test)]
#[path = "archive_tests.rs"]
mod tests;
