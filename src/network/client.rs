//! HTTP client implementation

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, trace};

use super::cache::{CacheControl, ResponseCache, ResponseCacheStats};
use super::{Request, Response};
use crate::config::LoaderConfig;
use crate::utils::{FetchError, Result, ScoutError};

struct FetcherInner {
    client: reqwest::Client,
    cache: Option<ResponseCache>,
    max_stale: Duration,
    require_image: bool,
}

/// HTTP client for image bytes with a shared response cache
///
/// Cloning is cheap; clones share the connection pool and the cache.
#[derive(Clone)]
pub struct HttpFetcher {
    inner: Arc<FetcherInner>,
}

impl HttpFetcher {
    /// Create a new HTTP client from loader settings
    pub fn new(config: &LoaderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| ScoutError::Client(e.to_string()))?;

        let cache =
            (config.response_cache_bytes > 0).then(|| ResponseCache::new(config.response_cache_bytes));

        Ok(Self {
            inner: Arc::new(FetcherInner {
                client,
                cache,
                max_stale: config.max_stale,
                require_image: config.require_image_content_type,
            }),
        })
    }

    /// Staleness sent with every request
    pub fn max_stale(&self) -> Duration {
        self.inner.max_stale
    }

    /// Response cache statistics, if the cache is enabled
    pub fn cache_stats(&self) -> Option<ResponseCacheStats> {
        self.inner.cache.as_ref().map(ResponseCache::stats)
    }

    /// Execute an HTTP request, consulting the response cache first
    pub async fn execute(&self, request: &Request) -> std::result::Result<Response, FetchError> {
        let key = request.url().as_str();

        if let Some(cache) = &self.inner.cache {
            if let Some(entry) = cache.lookup(key, request.accepted_staleness()) {
                return Ok(Response::new(
                    200,
                    entry.content_type,
                    CacheControl::default(),
                    entry.body,
                ));
            }
        }

        let mut req = self.inner.client.get(request.url().clone());
        for (name, value) in request.headers() {
            req = req.header(*name, value.as_str());
        }

        let response = req.send().await?;
        let status = response.status().as_u16();
        let content_type = header_value(&response, reqwest::header::CONTENT_TYPE);
        let cache_control = header_value(&response, reqwest::header::CACHE_CONTROL)
            .map(|v| CacheControl::parse(&v))
            .unwrap_or_default();
        let body = response.bytes().await?;

        trace!("execute(): {key} -> {status} ({} bytes)", body.len());
        let response = Response::new(status, content_type, cache_control, body);

        if let Some(cache) = &self.inner.cache {
            cache.store(key, &response);
        }
        Ok(response)
    }

    /// Fetch the full body of `url`
    pub async fn fetch_bytes(&self, url: url::Url) -> std::result::Result<Bytes, FetchError> {
        let request = Request::get(url)?.max_stale(self.inner.max_stale);
        let response = self.execute(&request).await?;

        if !response.is_success() {
            debug!("fetch_bytes(): {} answered {}", request.url(), response.status());
            return Err(FetchError::Status(response.status()));
        }
        if self.inner.require_image && !response.is_image() {
            let content_type = response.content_type().unwrap_or("none").to_string();
            return Err(FetchError::UnexpectedContentType(content_type));
        }
        Ok(response.into_body())
    }
}

fn header_value(
    response: &reqwest::Response,
    name: reqwest::header::HeaderName,
) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
