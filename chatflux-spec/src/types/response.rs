//! Aggregated chat response

use serde::{Deserialize, Serialize};

use super::content::{NeutralContent, NeutralMessage};
use super::segment::{FinishReason, Usage};

/// Reasoning folded from all `Think` segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningBlock {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// A completed tool call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub index: u32,
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    /// Arguments parsed as JSON; an empty string is treated as `{}`.
    pub fn arguments_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        if self.arguments.trim().is_empty() {
            return Ok(serde_json::json!({}));
        }
        serde_json::from_str(&self.arguments)
    }
}

/// Upstream failure captured from an `Error` segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

/// One logical response, as handed to persistence and billing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningBlock>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl ChatResponse {
    /// Caller-facing finish reason: `stop`, `length`, `tool_calls`, `content_filter` or `error`.
    /// A recorded error wins; a missing reason defaults to `stop`.
    pub fn finish_reason_str(&self) -> &'static str {
        if self.error.is_some() {
            return FinishReason::Error.as_openai_str();
        }
        self.finish_reason
            .unwrap_or(FinishReason::Stop)
            .as_openai_str()
    }

    /// Assistant message for the caller's history: reasoning, then text, then tool calls.
    pub fn to_neutral_message(&self) -> NeutralMessage {
        let mut contents = Vec::new();
        if let Some(reasoning) = &self.reasoning {
            contents.push(NeutralContent::think(
                reasoning.content.clone(),
                reasoning.signature.clone(),
            ));
        }
        if !self.text.is_empty() {
            contents.push(NeutralContent::text(self.text.clone()));
        }
        for call in &self.tool_calls {
            contents.push(NeutralContent::tool_call(
                call.id.clone(),
                call.name.clone(),
                call.arguments.clone(),
            ));
        }
        if let Some(err) = &self.error {
            contents.push(NeutralContent::error(err.message.clone()));
        }
        NeutralMessage::assistant(contents)
    }

    /// Final `chat.completion.chunk` carrying only finish and usage metadata.
    pub fn to_final_chunk(&self, id: &str, model: &str, created: i64) -> serde_json::Value {
        let mut chunk = serde_json::json!({
            "id": id,
            "object": "chat.completion.chunk",
            "created": created,
            "model": model,
            "choices": [{
                "index": 0,
                "delta": {},
                "finish_reason": self.finish_reason_str(),
            }],
        });
        if let Some(usage) = &self.usage {
            chunk["usage"] = openai_usage_json(usage);
        }
        chunk
    }
}

/// Map a `Usage` to the OpenAI usage object.
pub fn openai_usage_json(usage: &Usage) -> serde_json::Value {
    let mut value = serde_json::json!({
        "prompt_tokens": usage.input_tokens,
        "completion_tokens": usage.output_tokens,
        "total_tokens": usage.total_tokens(),
        "completion_tokens_details": {
            "reasoning_tokens": usage.reasoning_tokens,
        },
    });
    if usage.cache_tokens > 0 {
        value["prompt_tokens_details"] = serde_json::json!({
            "cached_tokens": usage.cache_tokens,
        });
    }
    value
}
