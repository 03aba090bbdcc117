//! OpenAI Responses API
//!
//! Streamed requests decode the typed SSE events; buffered requests parse the final
//! response object. With [`ResponsesOptions::background`] a buffered request is stored
//! upstream and polled until it finishes.

mod background;
mod request;
mod response;
mod stream;

pub use request::{build_body, to_input_items};
pub use response::{parse_response, parse_usage};
pub use stream::ResponsesEventConverter;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::common::build_headers;
use crate::config::{ApiType, ProviderConfig};
use crate::error::LlmError;
use crate::streaming::{ChatSegmentStream, ReplaceSseContent, SseRewrite, StreamFactory};
use crate::transport::{HttpTransport, HttpTransportRequest};
use crate::types::{ChatRequest, NeutralMessage};
use chatflux_core::ChatAdapter;

#[derive(Clone)]
pub struct ResponsesOptions {
    /// Run buffered requests as background responses. Streamed requests ignore it.
    pub background: bool,
    /// Delay between status polls of a background response.
    pub poll_interval: Duration,
    /// Applied to every SSE payload before decoding.
    pub sse_rewrite: Option<SseRewrite>,
}

impl Default for ResponsesOptions {
    fn default() -> Self {
        Self {
            background: false,
            poll_interval: Duration::from_secs(2),
            sse_rewrite: None,
        }
    }
}

impl std::fmt::Debug for ResponsesOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponsesOptions")
            .field("background", &self.background)
            .field("poll_interval", &self.poll_interval)
            .field("sse_rewrite", &self.sse_rewrite.is_some())
            .finish()
    }
}

#[derive(Clone)]
pub struct OpenAiResponsesAdapter {
    config: Arc<ProviderConfig>,
    transport: Arc<dyn HttpTransport>,
    options: ResponsesOptions,
}

impl OpenAiResponsesAdapter {
    pub fn new(config: ProviderConfig, transport: Arc<dyn HttpTransport>) -> Result<Self, LlmError> {
        config.validate()?;
        if config.api_type != ApiType::Responses {
            return Err(LlmError::ConfigurationError(format!(
                "responses adapter cannot serve {:?}",
                config.api_type
            )));
        }
        Ok(Self {
            config: Arc::new(config),
            transport,
            options: ResponsesOptions::default(),
        })
    }

    pub fn with_options(mut self, options: ResponsesOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ResponsesOptions {
        &self.options
    }

    fn runs_in_background(&self, streamed: bool) -> bool {
        self.options.background && !streamed
    }

    #[tracing::instrument(skip_all, fields(provider = "openai-responses", model = %request.config.model))]
    async fn open(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatSegmentStream, LlmError> {
        let streamed = request.streamed;
        if self.runs_in_background(streamed) {
            let segments = self.run_background(&request, &cancel).await?;
            return Ok(Box::pin(futures::stream::iter(segments)));
        }

        let body = build_body(&request, streamed, false)?;
        let headers = build_headers(&self.config, streamed)?;
        let http = HttpTransportRequest::post_json(self.config.endpoint("/responses"), headers, body);
        if streamed {
            let mut bytes = StreamFactory::open(self.transport.as_ref(), http, &cancel).await?;
            if let Some(rewrite) = &self.options.sse_rewrite {
                bytes = ReplaceSseContent::wrap(bytes, rewrite.clone());
            }
            Ok(StreamFactory::sse_segments(bytes, ResponsesEventConverter::new(), cancel))
        } else {
            let json = StreamFactory::send_json(self.transport.as_ref(), http, &cancel).await?;
            let segments = parse_response(&json);
            tracing::debug!(segments = segments.len(), "decoded buffered response");
            Ok(Box::pin(futures::stream::iter(segments)))
        }
    }
}

#[async_trait]
impl ChatAdapter for OpenAiResponsesAdapter {
    fn provider_id(&self) -> &str {
        "openai-responses"
    }

    fn api_type(&self) -> ApiType {
        ApiType::Responses
    }

    fn transport(&self) -> Option<Arc<dyn HttpTransport>> {
        Some(self.transport.clone())
    }

    fn build_request_body(&self, request: &ChatRequest, streamed: bool) -> Result<Value, LlmError> {
        build_body(request, streamed, self.runs_in_background(streamed))
    }

    fn to_vendor_message(&self, message: &NeutralMessage) -> Result<Vec<Value>, LlmError> {
        to_input_items(message)
    }

    fn chat_streamed(&self, request: ChatRequest, cancel: CancellationToken) -> ChatSegmentStream {
        let this = self.clone();
        Box::pin(async_stream::stream! {
            match this.open(request, cancel).await {
                Ok(mut inner) => {
                    while let Some(item) = inner.next().await {
                        let failed = item.is_err();
                        yield item;
                        if failed {
                            break;
                        }
                    }
                }
                Err(e) => yield Err(e),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FinishReason, ModelConfig};
    use chatflux_core::aggregate::ChatAggregator;
    use chatflux_core::testing::{DumpTransport, HttpDump};

    const STREAM: &str = "POST https://api.openai.com/v1/responses HTTP/1.1\n\
Content-Type: application/json\n\
\n\
{\"model\":\"gpt-5-mini\",\"input\":[{\"type\":\"message\",\"role\":\"user\",\"content\":[{\"type\":\"input_text\",\"text\":\"hi\"}]}],\"stream\":true,\"store\":false}\n\
\n\
HTTP/1.1 200 OK\n\
Content-Type: text/event-stream\n\
\n\
event: response.created\n\
data: {\"type\":\"response.created\",\"response\":{\"status\":\"in_progress\"}}\n\
\n\
event: response.output_text.delta\n\
data: {\"type\":\"response.output_text.delta\",\"delta\":\"Hi \"}\n\
\n\
event: response.output_text.delta\n\
data: {\"type\":\"response.output_text.delta\",\"delta\":\"there\"}\n\
\n\
event: response.completed\n\
data: {\"type\":\"response.completed\",\"response\":{\"status\":\"completed\",\"usage\":{\"input_tokens\":4,\"output_tokens\":2}}}\n";

    const BUFFERED: &str = "POST https://api.openai.com/v1/responses HTTP/1.1\n\
Content-Type: application/json\n\
\n\
{\"model\":\"gpt-5-mini\",\"input\":[{\"type\":\"message\",\"role\":\"user\",\"content\":[{\"type\":\"input_text\",\"text\":\"hi\"}]}],\"stream\":false,\"store\":false}\n\
\n\
HTTP/1.1 200 OK\n\
Content-Type: application/json\n\
\n\
{\"id\":\"resp_1\",\"status\":\"completed\",\"output\":[{\"type\":\"message\",\"content\":[{\"type\":\"output_text\",\"text\":\"Hi there\"}]}],\"usage\":{\"input_tokens\":4,\"output_tokens\":2}}\n";

    fn adapter(dump: &str) -> OpenAiResponsesAdapter {
        let dump = HttpDump::parse(dump).unwrap();
        let transport = Arc::new(DumpTransport::validating_request(&dump));
        let config = ProviderConfig::new(ApiType::Responses, "https://api.openai.com/v1", "sk");
        OpenAiResponsesAdapter::new(config, transport).unwrap()
    }

    fn request(streamed: bool) -> ChatRequest {
        ChatRequest::new(vec![NeutralMessage::user_text("hi")], ModelConfig::new("gpt-5-mini"))
            .with_streamed(streamed)
    }

    #[tokio::test]
    async fn streamed_and_buffered_fold_to_the_same_response() {
        let streamed = adapter(STREAM)
            .chat(request(true), CancellationToken::new())
            .await
            .unwrap();
        let buffered = adapter(BUFFERED)
            .chat(request(false), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(streamed.text, "Hi there");
        assert_eq!(streamed.text, buffered.text);
        assert_eq!(streamed.finish_reason, Some(FinishReason::Stop));
        assert_eq!(streamed.finish_reason, buffered.finish_reason);
        assert_eq!(streamed.usage, buffered.usage);
    }

    #[tokio::test]
    async fn rewrite_applies_to_responses_stream() {
        let adapter = adapter(STREAM).with_options(ResponsesOptions {
            sse_rewrite: Some(ReplaceSseContent::search_replace("there", "everyone")),
            ..ResponsesOptions::default()
        });
        let stream = adapter.chat_streamed(request(true), CancellationToken::new());
        let response = ChatAggregator::collect(stream).await.unwrap();
        assert_eq!(response.text, "Hi everyone");
    }

    #[test]
    fn background_only_applies_to_buffered_bodies() {
        let adapter = adapter(BUFFERED).with_options(ResponsesOptions {
            background: true,
            ..ResponsesOptions::default()
        });
        let buffered = adapter.build_request_body(&request(false), false).unwrap();
        assert_eq!(buffered["background"], true);
        let streamed = adapter.build_request_body(&request(true), true).unwrap();
        assert_eq!(streamed["store"], false);
        assert!(streamed.get("background").is_none());
    }

    #[test]
    fn rejects_chat_completions_config() {
        let dump = HttpDump::parse(BUFFERED).unwrap();
        let config = ProviderConfig::new(ApiType::ChatCompletions, "https://x/v1", "k");
        assert!(OpenAiResponsesAdapter::new(config, Arc::new(DumpTransport::new(&dump))).is_err());
    }
}
