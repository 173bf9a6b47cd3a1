//! Cache keys

use std::fmt;

use crate::imaging::Dimension;

/// Identifies one decoded variant of a source image
///
/// The same URL decoded for two target sizes gives two distinct keys, so a
/// thumbnail and a full-size decode are cached independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// `url` alone without a target, `url:WxH` with one
    pub fn new(url: &str, target: Option<Dimension>) -> Self {
        match target {
            None => Self(url.to_string()),
            Some(dimension) => Self(format!("{url}:{dimension}")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}
