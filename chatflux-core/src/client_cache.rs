//! Pooled HTTP client cache
//!
//! `reqwest::Client` owns a connection pool, so one client per distinct transport
//! setting is shared by every call. The cache is injected, never global.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::config::TransportSettings;
use crate::error::LlmError;
use crate::transport::{HttpTransport, ReqwestTransport};

const DEFAULT_CAPACITY: usize = 32;

/// Thread-safe LRU of `reqwest::Client` keyed by `TransportSettings`.
#[derive(Debug, Clone)]
pub struct HttpClientCache {
    inner: Arc<Mutex<LruCache<TransportSettings, reqwest::Client>>>,
}

impl Default for HttpClientCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl HttpClientCache {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Client for `settings`, built on first use.
    pub fn client(&self, settings: TransportSettings) -> Result<reqwest::Client, LlmError> {
        let mut cache = self
            .inner
            .lock()
            .map_err(|_| LlmError::InternalError("http client cache poisoned".to_string()))?;
        if let Some(client) = cache.get(&settings) {
            return Ok(client.clone());
        }
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .connect_timeout(settings.connect_timeout())
            .build()
            .map_err(|e| LlmError::ConfigurationError(format!("failed to build HTTP client: {e}")))?;
        tracing::debug!(?settings, "created pooled HTTP client");
        cache.put(settings, client.clone());
        Ok(client)
    }

    /// `HttpTransport` over the pooled client for `settings`.
    pub fn transport(&self, settings: TransportSettings) -> Result<Arc<dyn HttpTransport>, LlmError> {
        Ok(Arc::new(ReqwestTransport::new(self.client(settings)?)))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
