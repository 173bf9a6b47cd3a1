//! Image request types

use std::time::Duration;

use url::Url;

use crate::utils::FetchError;

/// Parse `raw` and accept only http and https
pub fn parse_image_url(raw: &str) -> Result<Url, FetchError> {
    let url = Url::parse(raw).map_err(|e| FetchError::InvalidUrl(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetchError::UnsupportedScheme(other.to_string())),
    }
}

/// GET request for image bytes
#[derive(Debug, Clone)]
pub struct Request {
    url: Url,
    headers: Vec<(&'static str, String)>,
    max_stale: Option<Duration>,
}

impl Request {
    /// Create a GET request; the URL must be http or https
    pub fn get(url: Url) -> Result<Self, FetchError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::UnsupportedScheme(url.scheme().to_string()));
        }
        Ok(Self {
            url,
            headers: Vec::new(),
            max_stale: None,
        })
    }

    /// Add a header
    pub fn header(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((key, value.into()));
        self
    }

    /// Accept cached responses up to `max_stale` past their freshness
    pub fn max_stale(mut self, max_stale: Duration) -> Self {
        self.max_stale = Some(max_stale);
        self.header(
            "Cache-Control",
            format!("max-stale={}", max_stale.as_secs()),
        )
    }

    /// Get the URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Get headers
    pub fn headers(&self) -> &[(&'static str, String)] {
        &self.headers
    }

    /// Staleness this request tolerates
    pub fn accepted_staleness(&self) -> Duration {
        self.max_stale.unwrap_or(Duration::ZERO)
    }
}
