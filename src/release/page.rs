use super::{DownloadAsset, IndexSource, ReleaseResolver, ReleaseVersion};
use crate::error::{Result, StepError};
use crate::platform::{Architecture, Platform};
use regex::Regex;
use std::sync::LazyLock;

static ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a\s*>").unwrap());
static HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)(?:^|\s)href\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).unwrap()
});
static CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)(?:^|\s)class\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).unwrap()
});
static DIV_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<div\b([^>]*)>").unwrap());
static DIV_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<div\b[^>]*>|</div\s*>").unwrap());
static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:#[xX]([0-9a-fA-F]+)|#([0-9]+)|(quot|apos|lt|gt|amp));").unwrap()
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static RELEASE_TAG_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/releases/tag/v((?:\d+\.)+\d+|\d+)").unwrap());

const RELEASE_HEADER_CLASS: &str = "release-header";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Anchor {
    href: String,
    text: String,
}

/// Parsed release-index document.
#[derive(Debug, Clone)]
pub struct ReleasePage {
    base_url: String,
    header_links: Vec<Anchor>,
    anchors: Vec<Anchor>,
}

impl ReleasePage {
    pub fn parse(base_url: &str, html: &str) -> Self {
        let mut header_links = Vec::new();
        for open in DIV_OPEN.captures_iter(html) {
            let (Some(tag), Some(attrs)) = (open.get(0), open.get(1)) else {
                continue;
            };
            if !has_class(attrs.as_str(), RELEASE_HEADER_CLASS) {
                continue;
            }
            let body_end = matching_div_close(html, tag.end());
            header_links.extend(parse_anchors(&html[tag.end()..body_end]));
        }
        Self {
            base_url: base_url.to_string(),
            header_links,
            anchors: parse_anchors(html),
        }
    }

    /// Versions linked from release headers, in document order.
    pub fn versions(&self) -> Vec<ReleaseVersion> {
        self.header_links
            .iter()
            .filter_map(|anchor| RELEASE_TAG_LINK.captures(&anchor.href))
            .filter_map(|caps| caps.get(1))
            .filter_map(|version| ReleaseVersion::parse(version.as_str()).ok())
            .collect()
    }

    /// Version named by the first release header.
    pub fn latest_version(&self) -> Result<ReleaseVersion> {
        let first = self
            .header_links
            .first()
            .ok_or(StepError::NoReleasesPublished)?;
        first
            .text
            .strip_prefix('v')
            .and_then(|bare| ReleaseVersion::parse(bare).ok())
            .ok_or_else(|| StepError::UnrecognizedVersionFormat(first.text.clone()))
    }

    /// First asset link matching `<project>_<version>_<platform>_<arch>.`.
    pub fn asset_url(
        &self,
        project: &str,
        version: &ReleaseVersion,
        platform: Platform,
        architecture: Architecture,
    ) -> Result<DownloadAsset> {
        let needle = format!(
            "{project}_{version}_{}_{}.",
            platform.asset_name(),
            architecture.asset_name()
        );
        let anchor = self
            .anchors
            .iter()
            .find(|anchor| anchor.href.contains(&needle))
            .ok_or_else(|| StepError::AssetNotFound {
                version: version.to_string(),
                platform: platform.to_string(),
                architecture: architecture.to_string(),
            })?;
        Ok(DownloadAsset {
            version: version.clone(),
            platform,
            architecture,
            url: absolutize(&self.base_url, &anchor.href),
        })
    }
}

/// Release resolver backed by the HTML release page.
#[derive(Debug, Clone)]
pub struct HtmlReleaseIndex<S> {
    source: S,
    project: String,
}

impl<S: IndexSource> HtmlReleaseIndex<S> {
    pub fn new(source: S, project: impl Into<String>) -> Self {
        Self {
            source,
            project: project.into(),
        }
    }

    pub fn load(&self) -> Result<ReleasePage> {
        let html = self.source.fetch()?;
        Ok(ReleasePage::parse(self.source.url(), &html))
    }
}

impl<S: IndexSource> ReleaseResolver for HtmlReleaseIndex<S> {
    fn list_versions(&self) -> Result<Vec<ReleaseVersion>> {
        Ok(self.load()?.versions())
    }

    fn resolve_asset_url(
        &self,
        version: &ReleaseVersion,
        platform: Platform,
        architecture: Architecture,
    ) -> Result<DownloadAsset> {
        self.load()?
            .asset_url(&self.project, version, platform, architecture)
    }

    fn resolve_latest_asset_url(
        &self,
        platform: Platform,
        architecture: Architecture,
    ) -> Result<DownloadAsset> {
        let page = self.load()?;
        let latest = page.latest_version()?;
        tracing::info!(version = %latest, "latest published release");
        page.asset_url(&self.project, &latest, platform, architecture)
    }

    fn release_urls(
        &self,
        platform: Platform,
        architecture: Architecture,
    ) -> Result<Vec<(ReleaseVersion, Result<DownloadAsset>)>> {
        let page = self.load()?;
        Ok(page
            .versions()
            .into_iter()
            .map(|version| {
                let asset = page.asset_url(&self.project, &version, platform, architecture);
                (version, asset)
            })
            .collect())
    }
}

fn parse_anchors(html: &str) -> Vec<Anchor> {
    ANCHOR
        .captures_iter(html)
        .filter_map(|caps| {
            let attrs = caps.get(1)?.as_str();
            let href = attribute_value(&HREF, attrs)?;
            let inner = caps.get(2).map_or("", |inner| inner.as_str());
            let text = decode_entities(TAG.replace_all(inner, "").trim());
            Some(Anchor {
                href: decode_entities(&href),
                text,
            })
        })
        .collect()
}

fn attribute_value(pattern: &Regex, attrs: &str) -> Option<String> {
    let caps = pattern.captures(attrs)?;
    (1..=3)
        .find_map(|idx| caps.get(idx))
        .map(|value| value.as_str().to_string())
}

fn has_class(attrs: &str, class: &str) -> bool {
    attribute_value(&CLASS, attrs)
        .is_some_and(|value| value.split_whitespace().any(|token| token == class))
}

/// Byte offset where the div opened just before `start` ends, tracking nesting.
/// Unbalanced markup runs to the end of the document.
fn matching_div_close(html: &str, start: usize) -> usize {
    let mut depth = 1usize;
    for tag in DIV_TAG.find_iter(&html[start..]) {
        if tag.as_str().starts_with("</") {
            depth -= 1;
            if depth == 0 {
                return start + tag.start();
            }
        } else {
            depth += 1;
        }
    }
    html.len()
}

/// Named entities plus decimal and hex character references, in one pass so
/// a decoded `&` never starts another entity. Unknown or invalid references
/// are left as written.
fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let decoded = match (caps.get(1), caps.get(2), caps.get(3)) {
                (Some(hex), _, _) => u32::from_str_radix(hex.as_str(), 16)
                    .ok()
                    .and_then(char::from_u32),
                (None, Some(dec), _) => dec.as_str().parse::<u32>().ok().and_then(char::from_u32),
                (None, None, Some(name)) => match name.as_str() {
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "amp" => Some('&'),
                    _ => None,
                },
                (None, None, None) => None,
            };
            decoded.map_or_else(|| caps[0].to_string(), |ch| ch.to_string())
        })
        .into_owned()
}

/// Resolve `href` against the index URL.
fn absolutize(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    let (scheme, rest) = base.split_once("://").unwrap_or(("https", base));
    if let Some(stripped) = href.strip_prefix("//") {
        return format!("{scheme}://{stripped}");
    }
    let host = rest.split('/').next().unwrap_or(rest);
    if href.starts_with('/') {
        return format!("{scheme}://{host}{href}");
    }
    match rest.rfind('/') {
        Some(idx) => format!("{scheme}://{}/{href}", &rest[..idx]),
        None => format!("{scheme}://{host}/{href}"),
    }
}

#[cfg(test)]
#[path = "page_tests.rs"]
mod tests;
