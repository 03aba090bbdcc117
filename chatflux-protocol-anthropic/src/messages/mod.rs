//! Anthropic Messages API

mod request;
mod response;
mod stream;

pub use request::{DEFAULT_MAX_TOKENS, build_body, build_messages, to_vendor_message};
pub use response::{AnthropicUsage, parse_finish_reason, parse_response};
pub use stream::AnthropicEventConverter;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::{ApiType, ProviderConfig};
use crate::error::LlmError;
use crate::streaming::{ChatSegmentStream, ReplaceSseContent, SseRewrite, StreamFactory};
use crate::transport::{HttpTransport, HttpTransportRequest};
use crate::types::{ChatRequest, NeutralMessage};
use chatflux_core::ChatAdapter;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// `x-api-key` auth and the pinned API version. Configured extras come last, so an
/// `anthropic-beta` or a different `anthropic-version` can be set per provider.
pub fn build_headers(config: &ProviderConfig, streaming: bool) -> Result<HeaderMap, LlmError> {
    let mut headers = HeaderMap::new();
    let key = HeaderValue::from_str(config.api_key())
        .map_err(|_| LlmError::ConfigurationError("API key is not a valid header value".into()))?;
    headers.insert(HeaderName::from_static("x-api-key"), key);
    headers.insert(
        HeaderName::from_static("anthropic-version"),
        HeaderValue::from_static(ANTHROPIC_VERSION),
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if streaming {
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
    }
    for (name, value) in &config.extra_headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| LlmError::ConfigurationError(format!("invalid header name {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| LlmError::ConfigurationError(format!("invalid header value: {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

#[derive(Clone, Default)]
pub struct AnthropicOptions {
    /// Applied to every SSE payload before decoding.
    pub sse_rewrite: Option<SseRewrite>,
}

impl std::fmt::Debug for AnthropicOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicOptions")
            .field("sse_rewrite", &self.sse_rewrite.is_some())
            .finish()
    }
}

#[derive(Clone)]
pub struct AnthropicMessagesAdapter {
    config: Arc<ProviderConfig>,
    transport: Arc<dyn HttpTransport>,
    options: AnthropicOptions,
}

impl AnthropicMessagesAdapter {
    pub fn new(config: ProviderConfig, transport: Arc<dyn HttpTransport>) -> Result<Self, LlmError> {
        config.validate()?;
        if config.api_type != ApiType::AnthropicMessages {
            return Err(LlmError::ConfigurationError(format!(
                "anthropic adapter cannot serve {:?}",
                config.api_type
            )));
        }
        Ok(Self {
            config: Arc::new(config),
            transport,
            options: AnthropicOptions::default(),
        })
    }

    pub fn with_options(mut self, options: AnthropicOptions) -> Self {
        self.options = options;
        self
    }

    #[tracing::instrument(skip_all, fields(provider = "anthropic-messages", model = %request.config.model))]
    async fn open(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatSegmentStream, LlmError> {
        let streamed = request.streamed;
        let body = build_body(&request, streamed)?;
        let headers = build_headers(&self.config, streamed)?;
        let http = HttpTransportRequest::post_json(self.config.endpoint("/messages"), headers, body);

        if streamed {
            let mut bytes = StreamFactory::open(self.transport.as_ref(), http, &cancel).await?;
            if let Some(rewrite) = &self.options.sse_rewrite {
                bytes = ReplaceSseContent::wrap(bytes, rewrite.clone());
            }
            Ok(StreamFactory::sse_segments(bytes, AnthropicEventConverter::new(), cancel))
        } else {
            let json = StreamFactory::send_json(self.transport.as_ref(), http, &cancel).await?;
            let segments = parse_response(json)?;
            tracing::debug!(segments = segments.len(), "decoded buffered response");
            Ok(Box::pin(futures::stream::iter(
                segments.into_iter().map(Ok).collect::<Vec<_>>(),
            )))
        }
    }
}

#[async_trait]
impl ChatAdapter for AnthropicMessagesAdapter {
    fn provider_id(&self) -> &str {
        "anthropic-messages"
    }

    fn api_type(&self) -> ApiType {
        ApiType::AnthropicMessages
    }

    fn transport(&self) -> Option<Arc<dyn HttpTransport>> {
        Some(self.transport.clone())
    }

    fn build_request_body(&self, request: &ChatRequest, streamed: bool) -> Result<Value, LlmError> {
        build_body(request, streamed)
    }

    fn to_vendor_message(&self, message: &NeutralMessage) -> Result<Vec<Value>, LlmError> {
        to_vendor_message(message)
    }

    fn chat_streamed(&self, request: ChatRequest, cancel: CancellationToken) -> ChatSegmentStream {
        let this = self.clone();
        Box::pin(async_stream::stream! {
            match this.open(request, cancel).await {
                Ok(mut inner) => {
                    while let Some(item) = inner.next().await {
                        yield item;
                    }
                }
                Err(e) => yield Err(e),
            }
        })
    }
}
