use crate::error::{Result, StepError};
use std::io::Read;

/// Supplies the raw release-index document.
pub trait IndexSource {
    /// Location of the index, used to absolutize relative links.
    fn url(&self) -> &str;

    fn fetch(&self) -> Result<String>;
}

/// Opens the byte stream of a release asset.
pub trait AssetFetcher {
    fn open(&self, url: &str) -> Result<Box<dyn Read>>;
}

/// Fetches the index page over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpIndexSource {
    url: String,
}

impl HttpIndexSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl IndexSource for HttpIndexSource {
    fn url(&self) -> &str {
        &self.url
    }

    fn fetch(&self) -> Result<String> {
        let unavailable = |message: String| StepError::IndexUnavailable {
            url: self.url.clone(),
            message,
        };
        let mut response = ureq::get(&self.url)
            .call()
            .map_err(|err| unavailable(err.to_string()))?;
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|err| unavailable(err.to_string()))?;
        tracing::debug!(url = %self.url, bytes = body.len(), "fetched release index");
        Ok(body)
    }
}

/// Streams release assets over HTTP(S).
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpAssetFetcher;

impl AssetFetcher for HttpAssetFetcher {
    fn open(&self, url: &str) -> Result<Box<dyn Read>> {
        let response = ureq::get(url)
            .call()
            .map_err(|err| StepError::AssetDownload {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        tracing::info!(url, "downloading release asset");
        Ok(Box::new(response.into_body().into_reader()))
    }
}
