//! Error types for provisioning and running the scanner.
//!
//! Configuration and resolution failures are fatal to a step; process-launch
//! failures are reported through the build log instead and never show up here.

use std::path::PathBuf;
use thiserror::Error;

/// Domain error for every stage of a scan step.
#[derive(Debug, Error)]
pub enum StepError {
    /// OS name could not be mapped to a supported build
    #[error("unsupported operating system '{0}'")]
    UnsupportedPlatform(String),

    /// Architecture could not be mapped to a supported build
    #[error("unsupported architecture '{0}'")]
    UnsupportedArchitecture(String),

    #[error("could not access the release index {url}: {message}")]
    IndexUnavailable { url: String, message: String },

    #[error("no release asset for version {version}, platform {platform}, architecture {architecture}")]
    AssetNotFound {
        version: String,
        platform: String,
        architecture: String,
    },

    #[error("the release index lists no published release (or its markup changed)")]
    NoReleasesPublished,

    #[error("'{0}' is not an accepted version string")]
    UnrecognizedVersionFormat(String),

    #[error("could not download {url}: {message}")]
    AssetDownload { url: String, message: String },

    #[error("unsupported archive type '{0}', expected .zip or .tar.gz")]
    UnsupportedArchiveFormat(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("archive did not contain the expected binary {}", .0.display())]
    BinaryNotInArchive(PathBuf),

    #[error("could not write reporting config {}: {source}", path.display())]
    ReportConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("work dispatched to worker '{target}' failed: {message}")]
    RemoteDispatch { target: String, message: String },

    #[error("no channel configured for worker '{0}'")]
    UnsupportedTarget(String),

    #[error("target URL must not be empty")]
    MissingTargetUrl,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StepError {
    pub(crate) fn extraction(context: &str, err: impl std::fmt::Display) -> Self {
        StepError::Extraction(format!("{context}: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, StepError>;
