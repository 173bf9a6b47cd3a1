//! Image request types

use crate::imaging::{Dimension, SharedBuffer};

/// One image to show in a slot
///
/// Fallbacks that are not set resolve to the placeholder, as a request that
/// only names a placeholder shows it for every failure.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    url: String,
    target: Option<Dimension>,
    placeholder: Option<SharedBuffer>,
    oom_fallback: Option<SharedBuffer>,
    error_fallback: Option<SharedBuffer>,
}

impl ImageRequest {
    /// Request `url` at its natural size with no placeholder
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            target: None,
            placeholder: None,
            oom_fallback: None,
            error_fallback: None,
        }
    }

    /// Fit the decoded image to `target`
    pub fn with_target(mut self, target: Dimension) -> Self {
        self.target = Some(target);
        self
    }

    /// Fit the decoded image to `width` x `height`
    pub fn with_size(self, width: i32, height: i32) -> Self {
        self.with_target(Dimension::new(width, height))
    }

    /// Shown while loading, and faded from when fade-in is on
    pub fn with_placeholder(mut self, placeholder: SharedBuffer) -> Self {
        self.placeholder = Some(placeholder);
        self
    }

    /// Shown when decoding runs out of memory
    pub fn with_oom_fallback(mut self, fallback: SharedBuffer) -> Self {
        self.oom_fallback = Some(fallback);
        self
    }

    /// Shown on fetch or decode failure
    pub fn with_error_fallback(mut self, fallback: SharedBuffer) -> Self {
        self.error_fallback = Some(fallback);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Requested target, if at least one side is set
    pub fn target(&self) -> Option<Dimension> {
        self.target.filter(Dimension::is_specified)
    }

    pub fn placeholder(&self) -> Option<&SharedBuffer> {
        self.placeholder.as_ref()
    }

    pub fn oom_fallback(&self) -> Option<&SharedBuffer> {
        self.oom_fallback.as_ref()
    }

    pub fn error_fallback(&self) -> Option<&SharedBuffer> {
        self.error_fallback.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::PixelBuffer;
    use std::sync::Arc;

    #[test]
    fn test_unset_target_is_none() {
        let request = ImageRequest::new("http://x/img.jpg").with_size(0, -1);
        assert_eq!(request.target(), None);

        let request = ImageRequest::new("http://x/img.jpg").with_size(100, 0);
        assert_eq!(request.target(), Some(Dimension::width_only(100)));
    }

    #[test]
    fn test_builders() {
        let placeholder = Arc::new(PixelBuffer::solid(1, 1, [0, 0, 0, 255]));
        let request = ImageRequest::new("http://x/img.jpg")
            .with_placeholder(placeholder.clone())
            .with_error_fallback(placeholder.clone());

        assert_eq!(request.url(), "http://x/img.jpg");
        assert_eq!(request.placeholder(), Some(&placeholder));
        assert_eq!(request.error_fallback(), Some(&placeholder));
        assert!(request.oom_fallback().is_none());
    }
}
