//! Message objects, usage and stop reasons

use serde::Deserialize;
use serde_json::Value;

use crate::error::LlmError;
use crate::types::{ChatSegment, FinishReason, Usage};

/// Token counts as Anthropic reports them. Every field may be absent.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: Option<u32>,
    #[serde(default)]
    pub output_tokens: Option<u32>,
    #[serde(default)]
    pub cache_read_input_tokens: Option<u32>,
    #[serde(default)]
    pub cache_creation_input_tokens: Option<u32>,
}

impl AnthropicUsage {
    /// Fields present in `later` win.
    pub fn merge(&mut self, later: AnthropicUsage) {
        self.input_tokens = later.input_tokens.or(self.input_tokens);
        self.output_tokens = later.output_tokens.or(self.output_tokens);
        self.cache_read_input_tokens = later.cache_read_input_tokens.or(self.cache_read_input_tokens);
        self.cache_creation_input_tokens = later
            .cache_creation_input_tokens
            .or(self.cache_creation_input_tokens);
    }

    pub fn to_usage(self) -> Usage {
        let cache = self
            .cache_read_input_tokens
            .unwrap_or(0)
            .saturating_add(self.cache_creation_input_tokens.unwrap_or(0));
        Usage::new(self.input_tokens.unwrap_or(0), self.output_tokens.unwrap_or(0)).with_cache_tokens(cache)
    }
}

/// A content block of a buffered message, or the `content_block` of a stream start event.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
        #[serde(default)]
        signature: Option<String>,
    },
    RedactedThinking {
        data: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: AnthropicUsage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicError {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl AnthropicError {
    pub(crate) fn into_segments(self) -> Vec<Result<ChatSegment, LlmError>> {
        vec![
            Ok(ChatSegment::error(self.kind.clone(), self.message.clone())),
            Err(LlmError::upstream(self.kind, self.message)),
        ]
    }
}

pub fn parse_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("end_turn") | Some("stop_sequence") | Some("pause_turn") | None => FinishReason::Stop,
        Some("max_tokens") | Some("model_context_window_exceeded") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        Some("refusal") => FinishReason::ContentFilter,
        Some(other) => {
            tracing::warn!(stop_reason = other, "unknown stop reason");
            FinishReason::Stop
        }
    }
}

/// Tool input as the JSON text the neutral model carries.
pub(crate) fn input_text(input: &Value) -> String {
    match input {
        Value::Null => "{}".to_string(),
        other => other.to_string(),
    }
}

/// Decode a buffered Messages response.
pub fn parse_response(json: Value) -> Result<Vec<ChatSegment>, LlmError> {
    if json.get("type").and_then(Value::as_str) == Some("error") {
        let error: AnthropicError = json
            .get("error")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or(AnthropicError {
                kind: None,
                message: json.to_string(),
            });
        return Err(LlmError::upstream(error.kind, error.message));
    }
    let message: AnthropicMessage = serde_json::from_value(json)?;

    let mut out = Vec::new();
    let mut tool_index = 0u32;
    for block in message.content {
        match block {
            ContentBlock::Text { text } if !text.is_empty() => out.push(ChatSegment::text(text)),
            ContentBlock::Thinking { thinking, signature } => match signature {
                Some(signature) if !signature.is_empty() => {
                    out.push(ChatSegment::think_signed(thinking, signature));
                }
                _ if !thinking.is_empty() => out.push(ChatSegment::think(thinking)),
                _ => {}
            },
            ContentBlock::RedactedThinking { data } => out.push(ChatSegment::think_signed("", data)),
            ContentBlock::ToolUse { id, name, input } => {
                out.push(ChatSegment::tool_call(tool_index, Some(id), Some(name), input_text(&input)));
                tool_index += 1;
            }
            _ => {}
        }
    }
    out.push(ChatSegment::Usage(message.usage.to_usage()));
    out.push(ChatSegment::finish(parse_finish_reason(message.stop_reason.as_deref())));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn buffered_message_with_thinking_and_tools() {
        let json = json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "thinking", "thinking": "check weather", "signature": "EqQBCk"},
                {"type": "text", "text": "Let me look."},
                {"type": "tool_use", "id": "toolu_1", "name": "weather", "input": {"city": "Paris"}},
                {"type": "server_tool_use", "id": "srv_1"},
            ],
            "stop_reason": "tool_use",
            "usage": {
                "input_tokens": 50,
                "output_tokens": 30,
                "cache_read_input_tokens": 100,
                "cache_creation_input_tokens": 20,
            },
        });
        assert_eq!(
            parse_response(json).unwrap(),
            vec![
                ChatSegment::think_signed("check weather", "EqQBCk"),
                ChatSegment::text("Let me look."),
                ChatSegment::tool_call(0, Some("toolu_1".into()), Some("weather".into()), "{\"city\":\"Paris\"}"),
                ChatSegment::Usage(Usage::new(50, 30).with_cache_tokens(120)),
                ChatSegment::finish(FinishReason::ToolCalls),
            ]
        );
    }

    #[test]
    fn error_body_is_upstream_error() {
        let json = json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}});
        assert_eq!(
            parse_response(json),
            Err(LlmError::upstream(Some("overloaded_error".into()), "Overloaded"))
        );
    }

    #[test]
    fn stop_reasons() {
        assert_eq!(parse_finish_reason(Some("end_turn")), FinishReason::Stop);
        assert_eq!(parse_finish_reason(Some("stop_sequence")), FinishReason::Stop);
        assert_eq!(parse_finish_reason(Some("max_tokens")), FinishReason::Length);
        assert_eq!(parse_finish_reason(Some("tool_use")), FinishReason::ToolCalls);
        assert_eq!(parse_finish_reason(Some("refusal")), FinishReason::ContentFilter);
    }

    #[test]
    fn later_usage_fields_win() {
        let mut usage = AnthropicUsage {
            input_tokens: Some(10),
            output_tokens: Some(1),
            cache_read_input_tokens: Some(5),
            cache_creation_input_tokens: None,
        };
        usage.merge(AnthropicUsage {
            output_tokens: Some(42),
            ..AnthropicUsage::default()
        });
        assert_eq!(usage.to_usage(), Usage::new(10, 42).with_cache_tokens(5));
    }
}
