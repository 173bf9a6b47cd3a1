//! Network stack for image downloads
//!
//! Fetches image bytes over HTTP(S) through a reqwest client, with a small
//! response cache that honours the `max-stale` directive sent on every request.

mod cache;
mod client;
mod request;
mod response;

pub use cache::{CacheControl, CacheEntry, ResponseCache, ResponseCacheStats};
pub use client::HttpFetcher;
pub use request::{Request, parse_image_url};
pub use response::Response;

use bytes::Bytes;
use futures::future::BoxFuture;
use url::Url;

use crate::utils::FetchError;

/// Source of raw image bytes used by the dispatcher's workers
///
/// The returned future runs on the worker runtime. Dropping it must abandon
/// the transfer.
#[cfg_attr(test, mockall::automock)]
pub trait ImageFetcher: Send + Sync {
    /// Fetch the full body of `url`
    fn fetch(&self, url: Url) -> BoxFuture<'static, Result<Bytes, FetchError>>;
}

impl ImageFetcher for HttpFetcher {
    fn fetch(&self, url: Url) -> BoxFuture<'static, Result<Bytes, FetchError>> {
        let fetcher = self.clone();
        Box::pin(async move { fetcher.fetch_bytes(url).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoaderConfig;

    #[test]
    fn test_unsupported_scheme_fails_before_connecting() {
        let fetcher = HttpFetcher::new(&LoaderConfig::default()).unwrap();
        let url = Url::parse("ftp://example.com/a.png").unwrap();

        let result = tokio_test::block_on(fetcher.fetch(url));
        assert_eq!(result, Err(FetchError::UnsupportedScheme("ftp".into())));
    }

    #[test]
    fn test_mock_fetcher_future() {
        let mut fetcher = MockImageFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| Box::pin(futures::future::ready(Ok::<_, FetchError>(Bytes::from_static(b"img")))));

        let url = Url::parse("http://x/img.jpg").unwrap();
        let bytes = tokio_test::block_on(fetcher.fetch(url)).unwrap();
        assert_eq!(bytes, Bytes::from_static(b"img"));
    }
}
