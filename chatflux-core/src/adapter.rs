//! Provider adapter trait and the chat entry pipeline
//!
//! An adapter owns one wire protocol: it turns a neutral `ChatRequest` into the vendor
//! body, performs the HTTP call through an injected `HttpTransport` and decodes the
//! vendor's events back into `ChatSegment`s.
//!
//! `chat_entry` is what callers use. It runs request pre-processing, calls the adapter
//! and layers the think-tag parser and cancellation on top.

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use tokio_util::sync::CancellationToken;

use crate::aggregate::ChatAggregator;
use crate::config::ApiType;
use crate::error::LlmError;
use crate::streaming::ChatSegmentStream;
use crate::think_tag::ThinkTagParser;
use crate::transport::{HttpTransport, HttpTransportRequest, HttpTransportResponse};
use crate::turn_filter::remove_non_current_turn_thinking;
use crate::types::{ChatRequest, ChatResponse, NeutralContent, NeutralMessage, UsageSource};
use crate::utils::make_cancellable;

/// One implementation per upstream wire protocol.
#[async_trait]
pub trait ChatAdapter: Send + Sync {
    /// Stable identifier used in logs, e.g. `openai-chat:deepseek`.
    fn provider_id(&self) -> &str;

    fn api_type(&self) -> ApiType;

    /// Vendor request body for `request`.
    fn build_request_body(
        &self,
        request: &ChatRequest,
        streamed: bool,
    ) -> Result<serde_json::Value, LlmError>;

    /// Vendor messages for one neutral message. One message can fan out into several.
    fn to_vendor_message(&self, message: &NeutralMessage)
    -> Result<Vec<serde_json::Value>, LlmError>;

    /// Lazy segment stream for `request`. Nothing is sent until the stream is polled.
    ///
    /// Non-streamed requests are executed as one buffered call whose response is
    /// replayed as the same segment sequence a stream would produce.
    fn chat_streamed(&self, request: ChatRequest, cancel: CancellationToken) -> ChatSegmentStream;

    /// Transport the adapter sends through, if it has one.
    fn transport(&self) -> Option<Arc<dyn HttpTransport>> {
        None
    }

    /// Run `request` to completion and fold the segments.
    async fn chat(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatResponse, LlmError> {
        ChatAggregator::collect(self.chat_streamed(request, cancel)).await
    }
}

/// Replace prompt placeholders. Dates and times are UTC.
pub fn render_system_template(template: &str, model: &str, now: DateTime<Utc>) -> String {
    template
        .replace("{{MODEL_NAME}}", model)
        .replace("{{CURRENT_DATE}}", &now.format("%Y/%m/%d").to_string())
        .replace("{{CURRENT_TIME}}", &now.format("%H:%M:%S").to_string())
}

/// Request pre-processing applied before any adapter sees the request.
///
/// `UsageSource::WebChat` requests get their prompt placeholders rendered, temperature
/// and reasoning effort clamped to what the model accepts, and stale reasoning from
/// earlier turns removed. For Anthropic with a thinking budget the temperature is
/// dropped because the API rejects it.
///
/// Every request has its vision links filtered: a model without vision sees the URL
/// as text. Downloading links for models that only take inline images needs the
/// network and is left to [`download_vision_links`].
pub fn preprocess(request: ChatRequest, api_type: ApiType, now: DateTime<Utc>) -> ChatRequest {
    let mut request = request;
    if request.source == UsageSource::WebChat {
        let model = request.config.model.clone();
        if let Some(system) = request.system.as_mut() {
            for block in &mut system.blocks {
                block.text = render_system_template(&block.text, &model, now);
            }
        } else if let Some(prompt) = request.config.system_prompt.as_mut() {
            *prompt = render_system_template(prompt, &model, now);
        }

        request.config.temperature = request.config.clamped_temperature();
        request.config.reasoning_effort = request.config.clamped_reasoning_effort();
        if api_type == ApiType::AnthropicMessages && request.config.thinking_budget.is_some() {
            request.config.temperature = None;
        }

        if let Cow::Owned(filtered) = remove_non_current_turn_thinking(&request.messages) {
            request.messages = filtered;
        }
    }

    if !request.config.allow_vision {
        for content in request.messages.iter_mut().flat_map(|m| m.contents.iter_mut()) {
            if let NeutralContent::FileUrl { url, cache_control } = content {
                *content = NeutralContent::Text {
                    content: std::mem::take(url),
                    cache_control: cache_control.take(),
                };
            }
        }
    }
    request
}

fn needs_vision_download(request: &ChatRequest) -> bool {
    request.config.allow_vision
        && !request.config.supports_vision_link
        && request
            .messages
            .iter()
            .flat_map(|m| &m.contents)
            .any(|c| matches!(c, NeutralContent::FileUrl { url, .. } if is_http_url(url)))
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Replace every http(s) `FileUrl` with the downloaded bytes.
///
/// The media type comes from the response `content-type`, falling back to
/// `application/octet-stream`. Other URL schemes, such as `data:`, are kept.
pub async fn download_vision_links(
    request: ChatRequest,
    transport: &dyn HttpTransport,
    cancel: &CancellationToken,
) -> Result<ChatRequest, LlmError> {
    let mut request = request;
    for content in request.messages.iter_mut().flat_map(|m| m.contents.iter_mut()) {
        let NeutralContent::FileUrl { url, cache_control } = content else {
            continue;
        };
        if !is_http_url(url) {
            continue;
        }
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            response = transport.execute_json(HttpTransportRequest::get(url.as_str(), HeaderMap::new())) => response,
        };
        let response = response
            .and_then(HttpTransportResponse::error_for_status)
            .map_err(|e| LlmError::upstream(None, format!("failed to download image from {url}: {e}")))?;
        let media_type = response
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or("application/octet-stream")
            .to_string();
        tracing::debug!(%url, %media_type, bytes = response.body.len(), "downloaded vision link");
        *content = NeutralContent::FileBlob {
            bytes: response.body,
            media_type,
            cache_control: cache_control.take(),
        };
    }
    Ok(request)
}

/// Entry point for one chat call.
///
/// Validation failures surface as the first stream item, so callers only handle one
/// error path. When the model cannot follow vision links, they are downloaded through
/// the adapter's transport before the adapter is called.
pub fn chat_entry(
    adapter: Arc<dyn ChatAdapter>,
    request: ChatRequest,
    cancel: CancellationToken,
) -> ChatSegmentStream {
    if let Err(e) = request.validate() {
        return Box::pin(futures::stream::once(async move { Err(e) }));
    }
    let request = preprocess(request, adapter.api_type(), Utc::now());
    tracing::debug!(
        provider = adapter.provider_id(),
        model = %request.config.model,
        streamed = request.streamed,
        "chat entry"
    );
    let parse_think_tags = request.config.think_tag_parser_enabled;
    let mut stream = if needs_vision_download(&request) {
        let token = cancel.clone();
        Box::pin(async_stream::stream! {
            let Some(transport) = adapter.transport() else {
                yield Err(LlmError::ConfigurationError(format!(
                    "{} cannot download vision links",
                    adapter.provider_id()
                )));
                return;
            };
            match download_vision_links(request, transport.as_ref(), &token).await {
                Ok(request) => {
                    let mut inner = adapter.chat_streamed(request, token);
                    while let Some(item) = inner.next().await {
                        yield item;
                    }
                }
                Err(e) => yield Err(e),
            }
        })
    } else {
        adapter.chat_streamed(request, cancel.clone())
    };
    if parse_think_tags {
        stream = ThinkTagParser::parse(stream);
    }
    make_cancellable(stream, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::HttpTransportStreamResponse;
    use crate::types::{
        ChatSegment, ModelConfig, NeutralContent, NeutralSystemMessage, ReasoningEffort,
    };
    use chrono::TimeZone;
    use futures_util::StreamExt;
    use reqwest::header::HeaderValue;
    use std::sync::Mutex;

    /// Replays fixed segments and records the request it was given.
    struct Scripted {
        segments: Vec<ChatSegment>,
        seen: Arc<Mutex<Option<ChatRequest>>>,
        transport: Option<Arc<dyn HttpTransport>>,
    }

    #[async_trait]
    impl ChatAdapter for Scripted {
        fn provider_id(&self) -> &str {
            "scripted"
        }

        fn api_type(&self) -> ApiType {
            ApiType::AnthropicMessages
        }

        fn build_request_body(
            &self,
            request: &ChatRequest,
            _streamed: bool,
        ) -> Result<serde_json::Value, LlmError> {
            Ok(serde_json::json!({ "model": request.config.model }))
        }

        fn to_vendor_message(
            &self,
            message: &NeutralMessage,
        ) -> Result<Vec<serde_json::Value>, LlmError> {
            Ok(vec![serde_json::json!({ "text": message.text() })])
        }

        fn chat_streamed(&self, request: ChatRequest, _cancel: CancellationToken) -> ChatSegmentStream {
            *self.seen.lock().unwrap() = Some(request);
            Box::pin(futures::stream::iter(
                self.segments.clone().into_iter().map(Ok).collect::<Vec<_>>(),
            ))
        }

        fn transport(&self) -> Option<Arc<dyn HttpTransport>> {
            self.transport.clone()
        }
    }

    /// Serves one image for every GET and remembers the URLs asked for.
    struct ImageHost {
        status: u16,
        fetched: Mutex<Vec<String>>,
    }

    impl ImageHost {
        fn new(status: u16) -> Arc<Self> {
            Arc::new(Self {
                status,
                fetched: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HttpTransport for ImageHost {
        async fn execute_json(
            &self,
            request: HttpTransportRequest,
        ) -> Result<HttpTransportResponse, LlmError> {
            self.fetched.lock().unwrap().push(request.url);
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/png; charset=binary"));
            Ok(HttpTransportResponse {
                status: self.status,
                headers,
                body: b"\x89PNG".to_vec(),
            })
        }

        async fn execute_stream(
            &self,
            _request: HttpTransportRequest,
        ) -> Result<HttpTransportStreamResponse, LlmError> {
            Err(LlmError::StreamError("image host does not stream".to_string()))
        }
    }

    fn picture_request(supports_vision_link: bool) -> ChatRequest {
        let mut config = ModelConfig::new("vision");
        config.supports_vision_link = supports_vision_link;
        ChatRequest::new(
            vec![NeutralMessage::user(vec![
                NeutralContent::text("what is this?"),
                NeutralContent::file_url("https://cdn.example.com/cat.png"),
                NeutralContent::file_url("data:image/png;base64,iVBORw0KGgo="),
            ])],
            config,
        )
    }

    fn scripted(segments: Vec<ChatSegment>) -> (Scripted, Arc<Mutex<Option<ChatRequest>>>) {
        let seen = Arc::new(Mutex::new(None));
        (
            Scripted {
                segments,
                seen: seen.clone(),
                transport: None,
            },
            seen,
        )
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 9, 7, 5, 1).unwrap()
    }

    #[test]
    fn renders_placeholders() {
        let out = render_system_template(
            "I am {{MODEL_NAME}}, today is {{CURRENT_DATE}} {{CURRENT_TIME}}",
            "claude",
            fixed_now(),
        );
        assert_eq!(out, "I am claude, today is 2025/03/09 07:05:01");
    }

    #[test]
    fn preprocess_renders_system_blocks_and_drops_temperature() {
        let mut config = ModelConfig::new("claude-sonnet");
        config.temperature = Some(0.3);
        config.thinking_budget = Some(2048);
        let request = ChatRequest::new(vec![NeutralMessage::user_text("hi")], config)
            .with_system(NeutralSystemMessage::from_text("You are {{MODEL_NAME}}"));

        let out = preprocess(request, ApiType::AnthropicMessages, fixed_now());
        assert_eq!(out.system.unwrap().blocks[0].text, "You are claude-sonnet");
        assert_eq!(out.config.temperature, None);
    }

    #[test]
    fn preprocess_clamps_temperature_and_effort_for_web_chat() {
        let mut config = ModelConfig::new("o4-mini");
        config.temperature = Some(1.8);
        config.max_temperature = Some(1.0);
        config.reasoning_effort = Some(ReasoningEffort::Minimal);
        config.allowed_reasoning_efforts = vec![ReasoningEffort::Low, ReasoningEffort::High];
        let request = ChatRequest::new(vec![NeutralMessage::user_text("hi")], config);

        let web = preprocess(request.clone(), ApiType::ChatCompletions, fixed_now());
        assert_eq!(web.config.temperature, Some(1.0));
        assert_eq!(web.config.reasoning_effort, Some(ReasoningEffort::Low));

        let api = preprocess(request.with_source(UsageSource::Api), ApiType::ChatCompletions, fixed_now());
        assert_eq!(api.config.temperature, Some(1.8));
        assert_eq!(api.config.reasoning_effort, Some(ReasoningEffort::Minimal));
    }

    #[test]
    fn preprocess_turns_links_into_text_when_vision_is_off() {
        let mut request = picture_request(true).with_source(UsageSource::Api);
        request.config.allow_vision = false;
        let blob = NeutralContent::file_blob(vec![1, 2], "image/png");
        request.messages[0].contents.push(blob.clone());

        let out = preprocess(request, ApiType::ChatCompletions, fixed_now());
        assert_eq!(
            out.messages[0].contents,
            vec![
                NeutralContent::text("what is this?"),
                NeutralContent::text("https://cdn.example.com/cat.png"),
                NeutralContent::text("data:image/png;base64,iVBORw0KGgo="),
                blob,
            ]
        );
    }

    #[test]
    fn preprocess_keeps_links_for_vision_models() {
        let request = picture_request(false);
        let out = preprocess(request.clone(), ApiType::ChatCompletions, fixed_now());
        assert_eq!(out.messages, request.messages);
        assert!(needs_vision_download(&out));
        assert!(!needs_vision_download(&picture_request(true)));
    }

    #[tokio::test]
    async fn downloads_only_http_links() {
        let host = ImageHost::new(200);
        let out = download_vision_links(picture_request(false), &*host, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            out.messages[0].contents[1],
            NeutralContent::file_blob(b"\x89PNG".to_vec(), "image/png")
        );
        assert_eq!(
            out.messages[0].contents[2],
            NeutralContent::file_url("data:image/png;base64,iVBORw0KGgo=")
        );
        assert_eq!(*host.fetched.lock().unwrap(), vec!["https://cdn.example.com/cat.png"]);
    }

    #[tokio::test]
    async fn failed_download_is_upstream_error() {
        let host = ImageHost::new(404);
        let err = download_vision_links(picture_request(false), &*host, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::UpstreamError { .. }));
        assert!(err.to_string().contains("https://cdn.example.com/cat.png"));
    }

    #[tokio::test]
    async fn cancelled_download_stops_before_fetching() {
        let host = ImageHost::new(200);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = download_vision_links(picture_request(false), &*host, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Cancelled));
    }

    #[tokio::test]
    async fn chat_entry_hands_downloaded_images_to_the_adapter() {
        let host = ImageHost::new(200);
        let (mut adapter, seen) = scripted(vec![ChatSegment::text("a cat")]);
        adapter.transport = Some(host.clone());

        let out: Vec<_> = chat_entry(Arc::new(adapter), picture_request(false), CancellationToken::new())
            .map(|s| s.unwrap())
            .collect()
            .await;
        assert_eq!(out, vec![ChatSegment::text("a cat")]);
        let sent = seen.lock().unwrap().take().unwrap();
        assert!(matches!(sent.messages[0].contents[1], NeutralContent::FileBlob { .. }));
        assert_eq!(host.fetched.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn chat_entry_without_transport_cannot_download() {
        let (adapter, seen) = scripted(vec![ChatSegment::text("never")]);
        let out: Vec<_> = chat_entry(Arc::new(adapter), picture_request(false), CancellationToken::new())
            .collect()
            .await;
        assert!(matches!(out.as_slice(), [Err(LlmError::ConfigurationError(_))]));
        assert!(seen.lock().unwrap().is_none());
    }

    #[test]
    fn preprocess_leaves_api_requests_alone() {
        let mut config = ModelConfig::new("m");
        config.system_prompt = Some("{{MODEL_NAME}}".into());
        config.temperature = Some(0.5);
        config.thinking_budget = Some(1);
        let messages = vec![
            NeutralMessage::user_text("a"),
            NeutralMessage::assistant(vec![NeutralContent::think("old", None)]),
            NeutralMessage::user_text("b"),
        ];
        let request = ChatRequest::new(messages.clone(), config).with_source(UsageSource::Api);
        let out = preprocess(request, ApiType::AnthropicMessages, fixed_now());
        assert_eq!(out.config.system_prompt.as_deref(), Some("{{MODEL_NAME}}"));
        assert_eq!(out.config.temperature, Some(0.5));
        assert_eq!(out.messages, messages);
    }

    #[test]
    fn preprocess_filters_stale_thinking_for_web_chat() {
        let messages = vec![
            NeutralMessage::user_text("a"),
            NeutralMessage::assistant(vec![
                NeutralContent::think("old", None),
                NeutralContent::text("x"),
            ]),
            NeutralMessage::user_text("b"),
        ];
        let request = ChatRequest::new(messages, ModelConfig::new("m"));
        let out = preprocess(request, ApiType::ChatCompletions, fixed_now());
        assert!(!out.messages[1].has_think());
    }

    #[tokio::test]
    async fn chat_entry_applies_think_tag_parser() {
        let (adapter, seen) = scripted(vec![
            ChatSegment::text("<think>plan</think>"),
            ChatSegment::text("answer"),
        ]);
        let mut config = ModelConfig::new("qwen");
        config.think_tag_parser_enabled = true;
        let request = ChatRequest::new(vec![NeutralMessage::user_text("q")], config);

        let out: Vec<_> = chat_entry(Arc::new(adapter), request, CancellationToken::new())
            .map(|s| s.unwrap())
            .collect()
            .await;
        assert_eq!(out, vec![ChatSegment::think("plan"), ChatSegment::text("answer")]);
        assert!(seen.lock().unwrap().is_some());
    }

    #[tokio::test]
    async fn chat_entry_rejects_empty_model_before_calling_adapter() {
        let (adapter, seen) = scripted(vec![ChatSegment::text("never")]);
        let request = ChatRequest::new(vec![NeutralMessage::user_text("q")], ModelConfig::new(""));
        let out: Vec<_> = chat_entry(Arc::new(adapter), request, CancellationToken::new())
            .collect()
            .await;
        assert!(matches!(out.as_slice(), [Err(LlmError::ConfigurationError(_))]));
        assert!(seen.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn default_chat_aggregates() {
        let (adapter, _) = scripted(vec![ChatSegment::text("a"), ChatSegment::text("b")]);
        let request = ChatRequest::new(vec![NeutralMessage::user_text("q")], ModelConfig::new("m"));
        let resp = adapter.chat(request, CancellationToken::new()).await.unwrap();
        assert_eq!(resp.text, "ab");
    }
}
