//! Release discovery for published scanner builds.
//!
//! `ReleaseResolver` is the seam used by provisioning. The shipped
//! implementation scrapes the HTML release page; a structured API can be
//! plugged in behind the same trait.
use crate::error::{Result, StepError};
use crate::platform::{Architecture, Platform};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

mod http;
mod page;

pub use http::{AssetFetcher, HttpAssetFetcher, HttpIndexSource, IndexSource};
pub use page::HtmlReleaseIndex;

/// Release page of the upstream scanner project.
pub const DEFAULT_RELEASE_INDEX_URL: &str = "https://github.com/projectdiscovery/nuclei/releases";
/// Project name used in asset and binary names.
pub const DEFAULT_PROJECT: &str = "nuclei";

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:(?:\d+\.)+\d+|\d+)$").unwrap());

/// Normalized release version: digits and dots, no leading `v`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseVersion(String);

impl ReleaseVersion {
    /// Parse `1.2.3` or `v1.2.3`.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);
        if VERSION_PATTERN.is_match(bare) {
            Ok(ReleaseVersion(bare.to_string()))
        } else {
            Err(StepError::UnrecognizedVersionFormat(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Download URL of one (version, platform, architecture) asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadAsset {
    pub version: ReleaseVersion,
    pub platform: Platform,
    pub architecture: Architecture,
    pub url: String,
}

pub trait ReleaseResolver {
    /// Known versions in index order, newest first.
    fn list_versions(&self) -> Result<Vec<ReleaseVersion>>;

    fn resolve_asset_url(
        &self,
        version: &ReleaseVersion,
        platform: Platform,
        architecture: Architecture,
    ) -> Result<DownloadAsset>;

    fn resolve_latest_asset_url(
        &self,
        platform: Platform,
        architecture: Architecture,
    ) -> Result<DownloadAsset>;

    /// Asset URL of every listed version; versions without a matching asset
    /// carry the resolution error instead.
    fn release_urls(
        &self,
        platform: Platform,
        architecture: Architecture,
    ) -> Result<Vec<(ReleaseVersion, Result<DownloadAsset>)>> {
        let versions = self.list_versions()?;
        Ok(versions
            .into_iter()
            .map(|version| {
                let asset = self.resolve_asset_url(&version, platform, architecture);
                (version, asset)
            })
            .collect())
    }
}
