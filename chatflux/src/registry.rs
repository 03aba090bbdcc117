//! Provider registry
//!
//! Builds one adapter per distinct `ProviderConfig` and reuses it. Both caches are
//! owned by the registry and injected by the caller, so tests and multi-tenant hosts
//! can keep them apart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use chatflux_core::config::{ApiType, ProviderCacheKey, ProviderConfig};
use chatflux_core::error::LlmError;
use chatflux_core::streaming::ChatSegmentStream;
use chatflux_core::transport::HttpTransport;
use chatflux_core::types::ChatRequest;
use chatflux_core::{ChatAdapter, HttpClientCache, chat_entry};
use chatflux_protocol_anthropic::AnthropicMessagesAdapter;
use chatflux_protocol_openai::{OpenAiChatAdapter, OpenAiResponsesAdapter};

/// Adapter for `config` over `transport`.
pub fn build_adapter(
    config: ProviderConfig,
    transport: Arc<dyn HttpTransport>,
) -> Result<Arc<dyn ChatAdapter>, LlmError> {
    let adapter: Arc<dyn ChatAdapter> = match config.api_type {
        ApiType::ChatCompletions => Arc::new(OpenAiChatAdapter::new(config, transport)?),
        ApiType::Responses => Arc::new(OpenAiResponsesAdapter::new(config, transport)?),
        ApiType::AnthropicMessages => Arc::new(AnthropicMessagesAdapter::new(config, transport)?),
    };
    Ok(adapter)
}

/// Thread-safe map from provider identity to its adapter.
#[derive(Clone, Default)]
pub struct AdapterCache {
    inner: Arc<Mutex<HashMap<ProviderCacheKey, Arc<dyn ChatAdapter>>>>,
}

impl std::fmt::Debug for AdapterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterCache").field("len", &self.len()).finish()
    }
}

impl AdapterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached adapter for `config`, created with `build` on a miss.
    pub fn get_or_try_insert<F>(
        &self,
        config: &ProviderConfig,
        build: F,
    ) -> Result<Arc<dyn ChatAdapter>, LlmError>
    where
        F: FnOnce() -> Result<Arc<dyn ChatAdapter>, LlmError>,
    {
        let key = config.cache_key();
        let mut adapters = self
            .inner
            .lock()
            .map_err(|_| LlmError::InternalError("adapter cache poisoned".to_string()))?;
        if let Some(adapter) = adapters.get(&key) {
            return Ok(adapter.clone());
        }
        let adapter = build()?;
        tracing::debug!(provider = adapter.provider_id(), "created adapter");
        adapters.insert(key, adapter.clone());
        Ok(adapter)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut adapters) = self.inner.lock() {
            adapters.clear();
        }
    }
}

/// Entry point for callers that hold provider configs rather than adapters.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: AdapterCache,
    clients: HttpClientCache,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("adapters", &self.adapters)
            .field("clients", &self.clients.len())
            .field("fixed_transport", &self.transport.is_some())
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new(adapters: AdapterCache, clients: HttpClientCache) -> Self {
        Self {
            adapters,
            clients,
            transport: None,
        }
    }

    /// Route every provider through `transport` instead of pooled `reqwest` clients.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn adapters(&self) -> &AdapterCache {
        &self.adapters
    }

    /// Adapter for `config`, validated and cached.
    pub fn adapter(&self, config: &ProviderConfig) -> Result<Arc<dyn ChatAdapter>, LlmError> {
        config.validate()?;
        self.adapters.get_or_try_insert(config, || {
            let transport = match &self.transport {
                Some(transport) => transport.clone(),
                None => self.clients.transport(config.transport_settings())?,
            };
            build_adapter(config.clone(), transport)
        })
    }

    /// Run `request` against `config`. Configuration errors surface as the only item.
    pub fn chat(
        &self,
        config: &ProviderConfig,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> ChatSegmentStream {
        match self.adapter(config) {
            Ok(adapter) => chat_entry(adapter, request, cancel),
            Err(e) => {
                tracing::error!(error = %e, "cannot build adapter");
                Box::pin(futures::stream::once(async move { Err(e) }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatflux_core::config::Vendor;
    use chatflux_core::testing::{DumpTransport, HttpDump};
    use futures_util::StreamExt;

    const DUMP: &str = "POST https://api.example.com/v1/chat/completions HTTP/1.1\n\
\n\
{}\n\
HTTP/1.1 200 OK\n\
Content-Type: application/json\n\
\n\
{\"choices\":[{\"message\":{\"content\":\"ok\"},\"finish_reason\":\"stop\"}]}\n";

    fn registry() -> ProviderRegistry {
        let dump = HttpDump::parse(DUMP).unwrap();
        ProviderRegistry::default().with_transport(Arc::new(DumpTransport::new(&dump)))
    }

    #[test]
    fn same_config_reuses_adapter() {
        let registry = registry();
        let config = ProviderConfig::new(ApiType::ChatCompletions, "https://api.example.com/v1", "k1");
        let a = registry.adapter(&config).unwrap();
        let b = registry.adapter(&config.clone()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.adapters().len(), 1);
    }

    #[test]
    fn key_vendor_and_protocol_separate_entries() {
        let registry = registry();
        let base = ProviderConfig::new(ApiType::ChatCompletions, "https://api.example.com/v1", "k1");
        registry.adapter(&base).unwrap();
        registry
            .adapter(&ProviderConfig::new(ApiType::ChatCompletions, "https://api.example.com/v1", "k2"))
            .unwrap();
        let deepseek = registry.adapter(&base.clone().with_vendor(Vendor::DeepSeek)).unwrap();
        let anthropic = registry
            .adapter(&ProviderConfig::new(ApiType::AnthropicMessages, "https://api.example.com/v1", "k1"))
            .unwrap();
        assert_eq!(registry.adapters().len(), 4);
        assert_eq!(deepseek.provider_id(), "openai-chat:deepseek");
        assert_eq!(anthropic.api_type(), ApiType::AnthropicMessages);
    }

    #[tokio::test]
    async fn invalid_config_is_first_stream_item() {
        let registry = registry();
        let config = ProviderConfig::new(ApiType::ChatCompletions, "", "k");
        let request = ChatRequest::new(vec![], chatflux_core::types::ModelConfig::new("m"));
        let items: Vec<_> = registry.chat(&config, request, CancellationToken::new()).collect().await;
        assert!(matches!(items.as_slice(), [Err(LlmError::ConfigurationError(_))]));
        assert!(registry.adapters().is_empty());
    }

    #[tokio::test]
    async fn chat_runs_through_the_entry_pipeline() {
        let registry = registry();
        let config = ProviderConfig::new(ApiType::ChatCompletions, "https://api.example.com/v1", "k");
        let request = ChatRequest::new(
            vec![chatflux_core::types::NeutralMessage::user_text("hi")],
            chatflux_core::types::ModelConfig::new("gpt-4o-mini"),
        )
        .with_streamed(false);
        let stream = registry.chat(&config, request, CancellationToken::new());
        let response = chatflux_core::ChatAggregator::collect(stream).await.unwrap();
        assert_eq!(response.text, "ok");
    }
}
