//! Vendor profiles for OpenAI-compatible Chat Completions
//!
//! Vendors that speak the Chat Completions wire format still differ in where they put
//! reasoning, which extra body fields they need and how they report cached tokens.
//! Some also need their stream patched, extra headers or a different endpoint path.
//! A profile is a plain value of functions, so every hook is directly callable.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::config::{ProviderConfig, Vendor};
use crate::error::LlmError;
use crate::streaming::{ReplaceSseContent, SseRewrite};
use crate::types::{ChatRequest, ChatSegment, NeutralMessage};

use super::mimo::MimoToolCallTransformer;
use crate::common::{str_at, u32_at};

/// Post-processes decoded segments of one call.
pub trait SegmentTransformer: Send {
    fn transform(&mut self, segment: ChatSegment) -> Result<Vec<ChatSegment>, LlmError>;
}

pub type ReasoningEncoder = fn(&NeutralMessage) -> Option<Value>;
pub type BodyHook = fn(&ChatRequest, &mut Map<String, Value>);
pub type MessageHook = fn(&NeutralMessage, &mut Map<String, Value>);
pub type CachedTokens = fn(&Value) -> u32;
pub type TransformerFactory = fn() -> Box<dyn SegmentTransformer>;
pub type RewriteFactory = fn() -> SseRewrite;
pub type HeaderHook = fn(&ProviderConfig, &mut HeaderMap) -> Result<(), LlmError>;
pub type BaseUrlHook = fn(&str) -> String;

#[derive(Debug, Clone, Copy)]
pub struct ChatCompletionsProfile {
    pub name: &'static str,
    pub vendor: Vendor,
    /// Delta and message field that carries reasoning.
    pub reasoning_key: &'static str,
    /// Keep structured reasoning payloads as the think signature.
    pub keep_structured_signature: bool,
    /// Reasoning sent back on assistant messages that carry tool calls.
    pub encode_reasoning: Option<ReasoningEncoder>,
    pub body_hook: Option<BodyHook>,
    pub message_hook: Option<MessageHook>,
    pub cached_tokens: CachedTokens,
    pub stream_transformer: Option<TransformerFactory>,
    /// Applied to every SSE payload before decoding, ahead of any caller rewrite.
    pub sse_rewrite: Option<RewriteFactory>,
    pub header_hook: Option<HeaderHook>,
    pub base_url: Option<BaseUrlHook>,
}

impl ChatCompletionsProfile {
    pub fn for_vendor(vendor: Vendor) -> Self {
        match vendor {
            Vendor::OpenAI => Self::openai(),
            Vendor::DeepSeek => Self::deepseek(),
            Vendor::MiniMax => Self::minimax(),
            Vendor::Mimo => Self::mimo(),
            Vendor::Moonshot => Self::moonshot(),
            Vendor::SiliconFlow => Self::siliconflow(),
            Vendor::QianFan => Self::qianfan(),
            Vendor::AzureAIFoundry => Self::azure_ai_foundry(),
            Vendor::Generic => Self::generic(),
        }
    }

    pub fn generic() -> Self {
        Self {
            name: "generic",
            vendor: Vendor::Generic,
            reasoning_key: "reasoning_content",
            keep_structured_signature: false,
            encode_reasoning: None,
            body_hook: None,
            message_hook: None,
            cached_tokens: nested_cached_tokens,
            stream_transformer: None,
            sse_rewrite: None,
            header_hook: None,
            base_url: None,
        }
    }

    pub fn openai() -> Self {
        Self {
            name: "openai",
            vendor: Vendor::OpenAI,
            ..Self::generic()
        }
    }

    pub fn deepseek() -> Self {
        Self {
            name: "deepseek",
            vendor: Vendor::DeepSeek,
            encode_reasoning: Some(joined_reasoning),
            ..Self::generic()
        }
    }

    pub fn minimax() -> Self {
        Self {
            name: "minimax",
            vendor: Vendor::MiniMax,
            reasoning_key: "reasoning_details",
            keep_structured_signature: true,
            encode_reasoning: Some(minimax_reasoning_details),
            body_hook: Some(minimax_body),
            message_hook: Some(minimax_message),
            ..Self::generic()
        }
    }

    pub fn mimo() -> Self {
        Self {
            name: "mimo",
            vendor: Vendor::Mimo,
            encode_reasoning: Some(joined_reasoning),
            body_hook: Some(mimo_body),
            stream_transformer: Some(mimo_transformer),
            ..Self::generic()
        }
    }

    pub fn moonshot() -> Self {
        Self {
            name: "moonshot",
            vendor: Vendor::Moonshot,
            cached_tokens: top_level_cached_tokens,
            ..Self::generic()
        }
    }

    pub fn siliconflow() -> Self {
        Self {
            name: "siliconflow",
            vendor: Vendor::SiliconFlow,
            body_hook: Some(siliconflow_body),
            sse_rewrite: Some(drop_empty_choices),
            ..Self::generic()
        }
    }

    pub fn qianfan() -> Self {
        Self {
            name: "qianfan",
            vendor: Vendor::QianFan,
            body_hook: Some(qianfan_body),
            sse_rewrite: Some(null_normal_finish_reason),
            header_hook: Some(qianfan_headers),
            ..Self::generic()
        }
    }

    pub fn azure_ai_foundry() -> Self {
        Self {
            name: "azure-ai-foundry",
            vendor: Vendor::AzureAIFoundry,
            base_url: Some(azure_ai_foundry_base_url),
            ..Self::generic()
        }
    }

    /// Think segment for the reasoning field of a delta or message, if any.
    pub fn decode_reasoning(&self, holder: &Value) -> Option<ChatSegment> {
        match holder.get(self.reasoning_key)? {
            Value::String(text) if !text.is_empty() => Some(ChatSegment::think(text.clone())),
            value @ (Value::Array(_) | Value::Object(_)) => {
                let text = reasoning_text(value);
                let signature = self
                    .keep_structured_signature
                    .then(|| value.to_string());
                if text.is_empty() && signature.is_none() {
                    return None;
                }
                Some(ChatSegment::Think {
                    content: text,
                    signature,
                })
            }
            _ => None,
        }
    }
}

fn reasoning_text(value: &Value) -> String {
    match value {
        Value::Array(items) => items.iter().filter_map(|i| str_at(i, "text")).collect(),
        Value::Object(_) => str_at(value, "text").unwrap_or_default().to_string(),
        _ => String::new(),
    }
}

fn minimax_body(_: &ChatRequest, body: &mut Map<String, Value>) {
    body.insert("reasoning_split".into(), Value::Bool(true));
}

/// MiniMax rejects assistant tool-call messages without `content`.
fn minimax_message(message: &NeutralMessage, vendor_message: &mut Map<String, Value>) {
    if message.has_tool_calls() && !vendor_message.contains_key("content") {
        vendor_message.insert("content".into(), Value::String(String::new()));
    }
}

fn mimo_body(request: &ChatRequest, body: &mut Map<String, Value>) {
    let kind = if request.config.thinking_budget.is_some() {
        "enabled"
    } else {
        "disabled"
    };
    body.insert("thinking".into(), json!({ "type": kind }));
}

/// SiliconFlow caps output at a small default unless a limit is sent, and toggles
/// thinking with `enable_thinking` instead of `reasoning_effort`.
fn siliconflow_body(request: &ChatRequest, body: &mut Map<String, Value>) {
    let config = &request.config;
    if !body.contains_key("max_tokens") && !body.contains_key("max_completion_tokens") {
        if let Some(max_tokens) = config.max_response_tokens {
            let key = if config.use_max_completion_tokens {
                "max_completion_tokens"
            } else {
                "max_tokens"
            };
            body.insert(key.into(), json!(max_tokens));
        }
    }
    body.remove("reasoning_effort");
    if config.reasoning_effort.is_some_and(|e| e.is_low_or_minimal()) {
        body.insert("enable_thinking".into(), Value::Bool(false));
    }
}

/// SiliconFlow sends `"choices":[]` on some chunks; the key is removed.
fn drop_empty_choices() -> SseRewrite {
    ReplaceSseContent::bytes(|data| {
        let Ok(Value::Object(mut chunk)) = serde_json::from_slice::<Value>(data) else {
            return data.to_vec();
        };
        if !chunk
            .get("choices")
            .and_then(Value::as_array)
            .is_some_and(Vec::is_empty)
        {
            return data.to_vec();
        }
        chunk.remove("choices");
        serde_json::to_vec(&chunk).unwrap_or_else(|_| data.to_vec())
    })
}

fn qianfan_body(request: &ChatRequest, body: &mut Map<String, Value>) {
    if request.config.web_search_enabled {
        body.insert(
            "web_search".into(),
            json!({ "enable": true, "enable_citation": false, "enable_trace": false }),
        );
    }
}

/// Qianfan marks every non-final chunk with `"finish_reason":"normal"`.
fn null_normal_finish_reason() -> SseRewrite {
    ReplaceSseContent::search_replace("\"finish_reason\":\"normal\"", "\"finish_reason\":null")
}

#[derive(Deserialize)]
struct QianFanCredentials {
    #[serde(alias = "AppId", alias = "appid")]
    app_id: String,
    #[serde(alias = "ApiKey", alias = "apikey")]
    api_key: String,
}

/// A Qianfan key is either a plain bearer key or `{"app_id", "api_key"}` JSON.
/// The JSON form adds the `appid` header.
fn qianfan_headers(config: &ProviderConfig, headers: &mut HeaderMap) -> Result<(), LlmError> {
    let secret = config.api_key().trim();
    if !secret.starts_with('{') {
        return Ok(());
    }
    let credentials: QianFanCredentials = serde_json::from_str(secret).map_err(|e| {
        LlmError::ConfigurationError(format!("invalid qianfan credentials: {e}"))
    })?;
    let invalid = |_| LlmError::ConfigurationError("qianfan credentials are not valid header values".into());
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", credentials.api_key)).map_err(invalid)?,
    );
    headers.insert(
        HeaderName::from_static("appid"),
        HeaderValue::from_str(&credentials.app_id).map_err(invalid)?,
    );
    Ok(())
}

/// Azure AI Foundry serves the OpenAI-compatible API under `/openai/v1/`.
pub fn azure_ai_foundry_base_url(base_url: &str) -> String {
    if base_url.ends_with("/openai/v1") || base_url.ends_with("/openai/v1/") {
        return base_url.to_string();
    }
    format!("{}/openai/v1/", base_url.trim_end_matches('/'))
}

fn mimo_transformer() -> Box<dyn SegmentTransformer> {
    Box::new(MimoToolCallTransformer::new())
}

/// OpenAI nests cached tokens under `prompt_tokens_details`.
pub fn nested_cached_tokens(usage: &Value) -> u32 {
    u32_at(usage, "/prompt_tokens_details/cached_tokens")
}

/// Moonshot reports `cached_tokens` next to `prompt_tokens`.
pub fn top_level_cached_tokens(usage: &Value) -> u32 {
    match usage.get("cached_tokens").and_then(Value::as_u64) {
        Some(n) => u32::try_from(n).unwrap_or(u32::MAX),
        None => nested_cached_tokens(usage),
    }
}

/// All think content of the message joined, for `reasoning_content`.
pub fn joined_reasoning(message: &NeutralMessage) -> Option<Value> {
    let text: String = message.thinks().map(|t| t.content).collect();
    (!text.is_empty()).then_some(Value::String(text))
}

/// `reasoning_details` for MiniMax.
///
/// A preserved payload is only reused when it still describes the reasoning text;
/// streamed fragments concatenate into a signature that no longer does.
pub fn minimax_reasoning_details(message: &NeutralMessage) -> Option<Value> {
    let text: String = message.thinks().map(|t| t.content).collect();
    for signature in message.thinks().filter_map(|t| t.signature) {
        let items = match serde_json::from_str::<Value>(signature) {
            Ok(Value::Array(items)) => items,
            Ok(object @ Value::Object(_)) => vec![object],
            _ => continue,
        };
        let joined: String = items.iter().filter_map(|i| str_at(i, "text")).collect();
        if joined == text {
            return Some(Value::Array(items));
        }
    }
    if text.is_empty() {
        return None;
    }
    Some(json!([{
        "type": "reasoning.text",
        "text": text,
        "index": 0,
        "format": "MiniMax-response-v1",
    }]))
}
