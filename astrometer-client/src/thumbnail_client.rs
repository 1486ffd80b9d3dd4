//! HTTP client for the frame thumbnail service.
//!
//! `GET {base}/{frame_id}/?{options}` answers with `{"url": "..."}` pointing
//! at a rendered JPEG of the frame.

use astrometer::FrameInfo;
use serde::Deserialize;

/// Public thumbnail service.
pub const DEFAULT_THUMBNAIL_URL: &str = "https://thumbnails.lco.global";

/// Error type for thumbnail lookups.
#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(String),
    /// Failed to parse response
    #[error("Parse error: {0}")]
    Parse(String),
    /// Server returned an error status
    #[error("Server error (status {status}): {message}")]
    ServerError { status: u16, message: String },
}

#[cfg(target_arch = "wasm32")]
impl From<gloo_net::Error> for ThumbnailError {
    fn from(err: gloo_net::Error) -> Self {
        ThumbnailError::Http(err.to_string())
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl From<reqwest::Error> for ThumbnailError {
    fn from(err: reqwest::Error) -> Self {
        ThumbnailError::Http(err.to_string())
    }
}

/// Rendering options passed to the service as a query string.
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailOptions {
    pub width: u32,
    pub height: u32,
    /// Subtract the median background.
    pub median: bool,
    /// Upper percentile for the display stretch.
    pub percentile: Option<f64>,
}

impl Default for ThumbnailOptions {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1920,
            median: true,
            percentile: Some(98.0),
        }
    }
}

impl ThumbnailOptions {
    pub fn query(&self) -> String {
        let mut query = format!("width={}&height={}", self.width, self.height);
        if self.median {
            query.push_str("&median=true");
        }
        if let Some(p) = self.percentile {
            query.push_str(&format!("&percentile={p}"));
        }
        query
    }
}

#[derive(Debug, Deserialize)]
struct ThumbnailResponse {
    url: Option<String>,
}

/// Extract the image URL from a service response body.
pub fn parse_response(body: &str) -> Result<String, ThumbnailError> {
    let response: ThumbnailResponse =
        serde_json::from_str(body).map_err(|e| ThumbnailError::Parse(e.to_string()))?;
    match response.url {
        Some(url) if !url.is_empty() => Ok(url),
        _ => Err(ThumbnailError::Parse("response carries no url".to_string())),
    }
}

/// Client for the thumbnail service.
#[derive(Debug, Clone)]
pub struct ThumbnailClient {
    base_url: String,
    token: Option<String>,
}

impl Default for ThumbnailClient {
    fn default() -> Self {
        Self::new(DEFAULT_THUMBNAIL_URL)
    }
}

impl ThumbnailClient {
    /// Create a new client pointing to the given base URL.
    pub fn new(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            base_url,
            token: None,
        }
    }

    /// Send `Authorization: Token <token>` with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request URL for one frame.
    pub fn thumbnail_url(&self, frame_id: &str, options: &ThumbnailOptions) -> String {
        format!("{}/{}/?{}", self.base_url, frame_id, options.query())
    }

    fn authorization(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Token {t}"))
    }

    /// Ask the service for the image URL of `frame_id`.
    pub async fn fetch_url(
        &self,
        frame_id: &str,
        options: &ThumbnailOptions,
    ) -> Result<String, ThumbnailError> {
        let url = self.thumbnail_url(frame_id, options);
        let (status, body) = self.get_text(&url).await?;
        if !(200..300).contains(&status) {
            return Err(ThumbnailError::ServerError {
                status,
                message: body,
            });
        }
        parse_response(&body)
    }

    /// Fill in the URL of a frame that does not have one yet.
    pub async fn resolve(
        &self,
        info: &mut FrameInfo,
        options: &ThumbnailOptions,
    ) -> Result<(), ThumbnailError> {
        if info.url.is_some() {
            return Ok(());
        }
        let url = self.fetch_url(&info.frame_id, options).await?;
        log::debug!("frame {} -> {url}", info.frame_id);
        info.url = Some(url);
        Ok(())
    }

    /// Resolve every frame in turn. Failures are logged and returned with
    /// the frame index; the remaining frames are still attempted.
    pub async fn resolve_all(
        &self,
        frames: &mut [FrameInfo],
        options: &ThumbnailOptions,
    ) -> Vec<(usize, ThumbnailError)> {
        let mut failures = Vec::new();
        for (i, info) in frames.iter_mut().enumerate() {
            if let Err(e) = self.resolve(info, options).await {
                log::warn!("thumbnail for frame {} failed: {e}", info.frame_id);
                failures.push((i, e));
            }
        }
        failures
    }

    #[cfg(target_arch = "wasm32")]
    async fn get_text(&self, url: &str) -> Result<(u16, String), ThumbnailError> {
        let mut request = gloo_net::http::Request::get(url);
        if let Some(auth) = self.authorization() {
            request = request.header("Authorization", &auth);
        }
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }

    #[cfg(not(target_arch = "wasm32"))]
    async fn get_text(&self, url: &str) -> Result<(u16, String), ThumbnailError> {
        let mut request = reqwest::Client::new().get(url);
        if let Some(auth) = self.authorization() {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok((status, body))
    }
}
