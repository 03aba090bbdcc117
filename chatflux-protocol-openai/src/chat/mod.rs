//! OpenAI Chat Completions
//!
//! One adapter serves every OpenAI-compatible vendor; the differences live in a
//! [`ChatCompletionsProfile`] chosen from `ProviderConfig::vendor`.

mod mimo;
mod profile;
mod request;
mod response;
mod stream;

pub use mimo::MimoToolCallTransformer;
pub use profile::*;
pub use request::{build_body, to_vendor_messages};
pub(crate) use request::parallel_tool_calls;
pub use response::{parse_response, parse_usage};
pub use stream::ChatCompletionsEventConverter;

use std::sync::Arc;

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

/// Per-adapter knobs that are not part of the provider identity.
#[derive(Clone, Default)]
pub struct ChatOptions {
    /// Applied to every SSE payload before decoding.
    pub sse_rewrite: Option<SseRewrite>,
}

impl std::fmt::Debug for ChatOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatOptions")
            .field("sse_rewrite", &self.sse_rewrite.is_some())
            .finish()
    }
}

#[derive(Clone)]
pub struct OpenAiChatAdapter {
    provider_id: String,
    config: Arc<ProviderConfig>,
    transport: Arc<dyn HttpTransport>,
    profile: ChatCompletionsProfile,
    options: ChatOptions,
}

impl OpenAiChatAdapter {
    pub fn new(config: ProviderConfig, transport: Arc<dyn HttpTransport>) -> Result<Self, LlmError> {
        config.validate()?;
        if config.api_type != ApiType::ChatCompletions {
            return Err(LlmError::ConfigurationError(format!(
                "chat completions adapter cannot serve {:?}",
                config.api_type
            )));
        }
        let profile = ChatCompletionsProfile::for_vendor(config.vendor);
        Ok(Self {
            provider_id: format!("openai-chat:{}", profile.name),
            config: Arc::new(config),
            transport,
            profile,
            options: ChatOptions::default(),
        })
    }

    pub fn with_profile(mut self, profile: ChatCompletionsProfile) -> Self {
        self.provider_id = format!("openai-chat:{}", profile.name);
        self.profile = profile;
        self
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    pub fn profile(&self) -> &ChatCompletionsProfile {
        &self.profile
    }

    /// Chat Completions URL, after the profile's base URL rewrite.
    pub fn chat_url(&self) -> String {
        match self.profile.base_url {
            Some(rewrite) => format!(
                "{}/chat/completions",
                rewrite(&self.config.base_url).trim_end_matches('/')
            ),
            None => self.config.endpoint("/chat/completions"),
        }
    }

    #[tracing::instrument(skip_all, fields(provider = %self.provider_id, model = %request.config.model))]
    async fn open(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatSegmentStream, LlmError> {
        let streamed = request.streamed;
        let body = build_body(&self.profile, &request, streamed)?;
        let mut headers = build_headers(&self.config, streamed)?;
        if let Some(hook) = self.profile.header_hook {
            hook(&self.config, &mut headers)?;
        }
        let http = HttpTransportRequest::post_json(self.chat_url(), headers, body);

        if streamed {
            let mut bytes = StreamFactory::open(self.transport.as_ref(), http, &cancel).await?;
            if let Some(make) = self.profile.sse_rewrite {
                bytes = ReplaceSseContent::wrap(bytes, make());
            }
            if let Some(rewrite) = &self.options.sse_rewrite {
                bytes = ReplaceSseContent::wrap(bytes, rewrite.clone());
            }
            let converter = ChatCompletionsEventConverter::new(self.profile);
            Ok(StreamFactory::sse_segments(bytes, converter, cancel))
        } else {
            let json = StreamFactory::send_json(self.transport.as_ref(), http, &cancel).await?;
            let segments = parse_response(&self.profile, &json)?;
            tracing::debug!(segments = segments.len(), "decoded buffered response");
            Ok(Box::pin(futures::stream::iter(
                segments.into_iter().map(Ok).collect::<Vec<_>>(),
            )))
        }
    }
}

/// Run every segment through `transformer`; the first failure ends the stream.
pub fn apply_transformer(
    mut stream: ChatSegmentStream,
    mut transformer: Box<dyn SegmentTransformer>,
) -> ChatSegmentStream {
    Box::pin(async_stream::stream! {
        while let Some(item) = stream.next().await {
            match item {
                Ok(segment) => match transformer.transform(segment) {
                    Ok(segments) => {
                        for segment in segments {
                            yield Ok(segment);
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                },
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }
    })
}

#[async_trait]
impl ChatAdapter for OpenAiChatAdapter {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn api_type(&self) -> ApiType {
        ApiType::ChatCompletions
    }

    fn transport(&self) -> Option<Arc<dyn HttpTransport>> {
        Some(self.transport.clone())
    }

    fn build_request_body(&self, request: &ChatRequest, streamed: bool) -> Result<Value, LlmError> {
        build_body(&self.profile, request, streamed)
    }

    fn to_vendor_message(&self, message: &NeutralMessage) -> Result<Vec<Value>, LlmError> {
        to_vendor_messages(&self.profile, message)
    }

    fn chat_streamed(&self, request: ChatRequest, cancel: CancellationToken) -> ChatSegmentStream {
        let this = self.clone();
        let stream: ChatSegmentStream = Box::pin(async_stream::stream! {
            match this.open(request, cancel).await {
                Ok(mut inner) => {
                    while let Some(item) = inner.next().await {
                        yield item;
                    }
                }
                Err(e) => yield Err(e),
            }
        });
        match self.profile.stream_transformer {
            Some(make) => apply_transformer(stream, make()),
            None => stream,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Vendor;
    use crate::types::{ChatSegment, FinishReason, ModelConfig};
    use chatflux_core::testing::{DumpTransport, HttpDump};

    const HELLO_STREAM: &str = "POST https://api.example.com/v1/chat/completions HTTP/1.1\n\
Content-Type: application/json\n\
\n\
{\"model\":\"gpt-4o-mini\",\"messages\":[{\"role\":\"user\",\"content\":\"hello\"}],\"stream\":true,\"stream_options\":{\"include_usage\":true}}\n\
\n\
HTTP/1.1 200 OK\n\
Content-Type: text/event-stream\n\
\n\
data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hello!\"},\"finish_reason\":null}]}\n\
\n\
data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\" How can I help you today?\"},\"finish_reason\":\"stop\"}]}\n\
\n\
data: {\"choices\":[],\"usage\":{\"prompt_tokens\":8,\"completion_tokens\":9}}\n\
\n\
data: [DONE]\n";

    fn adapter(dump: &HttpDump, vendor: Vendor) -> (OpenAiChatAdapter, DumpTransport) {
        let transport = DumpTransport::validating_request(dump);
        let config = ProviderConfig::new(ApiType::ChatCompletions, "https://api.example.com/v1", "sk-test")
            .with_vendor(vendor);
        let adapter = OpenAiChatAdapter::new(config, Arc::new(transport.clone())).unwrap();
        (adapter, transport)
    }

    fn hello_request() -> ChatRequest {
        ChatRequest::new(vec![NeutralMessage::user_text("hello")], ModelConfig::new("gpt-4o-mini"))
    }

    #[tokio::test]
    async fn streams_hello_fixture() {
        let dump = HttpDump::parse(HELLO_STREAM).unwrap();
        let (adapter, transport) = adapter(&dump, Vendor::OpenAI);
        let response = adapter.chat(hello_request(), CancellationToken::new()).await.unwrap();
        assert_eq!(response.text, "Hello! How can I help you today?");
        assert_eq!(response.finish_reason, Some(FinishReason::Stop));
        assert_eq!(response.usage.unwrap().output_tokens, 9);

        let sent = transport.last_request().unwrap();
        assert_eq!(sent.url, "https://api.example.com/v1/chat/completions");
        assert_eq!(sent.headers["authorization"], "Bearer sk-test");
    }

    #[tokio::test]
    async fn rewrite_hook_runs_before_decoding() {
        let dump = HttpDump::parse(HELLO_STREAM).unwrap();
        let (adapter, _) = adapter(&dump, Vendor::OpenAI);
        let adapter = adapter.with_options(ChatOptions {
            sse_rewrite: Some(ReplaceSseContent::search_replace("Hello!", "Hi!")),
        });
        let response = adapter.chat(hello_request(), CancellationToken::new()).await.unwrap();
        assert!(response.text.starts_with("Hi!"));
    }

    #[test]
    fn rejects_wrong_api_type() {
        let config = ProviderConfig::new(ApiType::Responses, "https://x/v1", "k");
        let dump = HttpDump::parse(HELLO_STREAM).unwrap();
        let transport = Arc::new(DumpTransport::new(&dump));
        assert!(matches!(
            OpenAiChatAdapter::new(config, transport),
            Err(LlmError::ConfigurationError(_))
        ));
    }

    #[tokio::test]
    async fn transformer_failure_ends_stream() {
        let input: ChatSegmentStream = Box::pin(futures::stream::iter(vec![
            Ok(ChatSegment::think("<tool_call><function=f></function></tool_call>")),
            Ok(ChatSegment::think("late")),
            Ok(ChatSegment::text("never")),
        ]));
        let out: Vec<_> = apply_transformer(input, Box::new(MimoToolCallTransformer::new()))
            .collect()
            .await;
        assert!(matches!(out.last(), Some(Err(LlmError::ParseError(_)))));
        assert!(!out.iter().any(|s| matches!(s, Ok(ChatSegment::Text { .. }))));
    }
}
