//! Cache-aware HTTP fetching for the Linked Art graph.
//!
//! All outbound requests carry `Accept: application/ld+json` and the
//! configured timeout. Responses are cached by URI in a shared TTL+LRU
//! cache with per-class TTLs: object documents expire quickly (5 min by
//! default) while vocabulary terms and image-chain nodes are stable for an
//! hour. Failures are mapped into the error taxonomy; the core never
//! retries — that is the calling layer's decision.

use crate::cache::TtlCache;
use crate::config::Settings;
use crate::error::{RetrievalError, RetrievalResult};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Cache class of a fetched document, selecting its TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheClass {
    /// Object document: 5 minutes.
    Object,
    /// Vocabulary term document: 60 minutes.
    Term,
    /// Image chain node (visual item / digital object / info.json): 60 minutes.
    Image,
}

pub struct Fetcher {
    http: reqwest::Client,
    cache: TtlCache<Value>,
    object_ttl: Duration,
    term_ttl: Duration,
    image_ttl: Duration,
}

impl Fetcher {
    pub fn new(settings: &Settings) -> RetrievalResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/ld+json"));
        let http = reqwest::Client::builder()
            .timeout(settings.http_timeout())
            .pool_max_idle_per_host(settings.http.max_connections_per_host)
            .user_agent(settings.http.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|e| RetrievalError::Config {
                reason: format!("HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            cache: TtlCache::new(settings.cache.capacity),
            object_ttl: Duration::from_secs(settings.cache.object_ttl_secs),
            term_ttl: Duration::from_secs(settings.cache.term_ttl_secs),
            image_ttl: Duration::from_secs(settings.cache.image_ttl_secs),
        })
    }

    fn ttl(&self, class: CacheClass) -> Duration {
        match class {
            CacheClass::Object => self.object_ttl,
            CacheClass::Term => self.term_ttl,
            CacheClass::Image => self.image_ttl,
        }
    }

    /// Fetch a JSON document, serving cache hits without refetching. A hit
    /// returns the exact stored value (shared, never reformatted).
    pub async fn fetch_json(&self, url: &str, class: CacheClass) -> RetrievalResult<Arc<Value>> {
        if let Some(hit) = self.cache.get(url) {
            tracing::trace!(target: "linkedart", "cache hit: {url}");
            return Ok(hit);
        }
        tracing::debug!(target: "linkedart", "GET {url}");
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::external(
                url,
                Some(status.as_u16()),
                format!("upstream returned {status}"),
            ));
        }
        let body: Value = response.json().await.map_err(|e| {
            RetrievalError::external(url, Some(status.as_u16()), format!("invalid JSON: {e}"))
        })?;
        Ok(self.cache.insert(url, body, self.ttl(class)))
    }

    /// Issue a GET with query parameters, uncached (collection search pages
    /// are cursor-dependent and cheap relative to their churn).
    pub async fn fetch_json_query(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> RetrievalResult<Value> {
        tracing::debug!(target: "linkedart", "GET {url} {query:?}");
        let response = self.http.get(url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::external(
                url,
                Some(status.as_u16()),
                format!("upstream returned {status}"),
            ));
        }
        response.json().await.map_err(|e| {
            RetrievalError::external(url, Some(status.as_u16()), format!("invalid JSON: {e}"))
        })
    }

    /// Number of currently cached documents.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    #[cfg(test)]
    pub(crate) fn prime_cache(&self, url: &str, value: Value, class: CacheClass) {
        self.cache.insert(url, value, self.ttl(class));
    }
}
