//! Download links embedded in email bodies.
//!
//! Some senders email a link to a report instead of attaching it. The image
//! server behind those links answers "not found" with a 200 and an HTML page,
//! so rejection is decided by content, not status.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap, HeaderName};

use crate::error::PipelineError;

/// Report links served by the metering portal's image server.
pub const DOWNLOAD_LINK_PATTERN: &str =
    r"https://datavision\.imserv\.com/imgserver/InternalImage\.aspx\?[a-zA-Z0-9&%=]+";

/// Body text the image server returns in place of a missing report.
pub const NOT_FOUND_MARKER: &str = "Your image cannot be displayed at this time";

static DOWNLOAD_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DOWNLOAD_LINK_PATTERN).expect("download link pattern compiles"));

/// The parts of an HTTP response the pipeline looks at.
#[derive(Debug, Clone, Default)]
pub struct FetchedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs the GET for a download link.
#[async_trait]
pub trait LinkFetcher: Send + Sync {
    async fn get(&self, url: &str) -> Result<FetchedResponse, PipelineError>;
}

/// `reqwest`-backed fetcher.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LinkFetcher for HttpFetcher {
    async fn get(&self, url: &str) -> Result<FetchedResponse, PipelineError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::Transport(format!("GET {url} failed: {e}")))?;

        let status = resp.status().as_u16();
        let content_type = header_text(resp.headers(), CONTENT_TYPE);
        let content_disposition = header_text(resp.headers(), CONTENT_DISPOSITION);

        let body = resp
            .bytes()
            .await
            .map_err(|e| PipelineError::Transport(format!("reading {url} failed: {e}")))?;

        Ok(FetchedResponse {
            status,
            content_type,
            content_disposition,
            body: body.to_vec(),
        })
    }
}

fn header_text(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Find every download link in `text`, in order of appearance.
pub fn scan_links(text: &str) -> Vec<String> {
    DOWNLOAD_LINK
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Why a response does not hold the requested file, if it doesn't.
pub fn rejection_reason(resp: &FetchedResponse) -> Option<String> {
    if !resp.is_success() {
        return Some(format!("HTTP status {}", resp.status));
    }
    if resp
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.contains("text/html"))
    {
        return Some("HTML response".into());
    }
    let marker = NOT_FOUND_MARKER.as_bytes();
    if resp.body.windows(marker.len()).any(|w| w == marker) {
        return Some("image server placeholder page".into());
    }
    None
}

/// Filename for a download: the disposition's `filename=`, else the link
/// with `:`, `/` and `?` replaced by `_`.
pub fn download_filename(resp: &FetchedResponse, link: &str) -> String {
    resp.content_disposition
        .as_deref()
        .and_then(disposition_filename)
        .unwrap_or_else(|| link.replace([':', '/', '?'], "_"))
}

fn disposition_filename(disposition: &str) -> Option<String> {
    let (_, rest) = disposition.split_once("filename=")?;
    let name = match rest.strip_prefix('"') {
        Some(quoted) => match quoted.rfind('"') {
            Some(end) => &quoted[..end],
            None => rest,
        },
        None => rest,
    };
    (!name.is_empty()).then(|| name.to_string())
}
