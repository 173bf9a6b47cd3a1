//! HTTP response types

use bytes::Bytes;

use super::cache::CacheControl;

/// Buffered HTTP response
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    content_type: Option<String>,
    cache_control: CacheControl,
    body: Bytes,
}

impl Response {
    /// Create a new response
    pub fn new(
        status: u16,
        content_type: Option<String>,
        cache_control: CacheControl,
        body: Bytes,
    ) -> Self {
        Self {
            status,
            content_type,
            cache_control,
            body,
        }
    }

    /// Get the status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Check if the response was successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Content type, if the server sent one
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// True when the content type is `image/*`
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("image/"))
    }

    /// Parsed Cache-Control header
    pub fn cache_control(&self) -> &CacheControl {
        &self.cache_control
    }

    /// Get the response body
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }
}
