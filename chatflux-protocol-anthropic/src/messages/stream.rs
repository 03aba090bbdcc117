//! Messages SSE decoding
//!
//! Anthropic streams a fixed named-event sequence. Content blocks are addressed by
//! their position in the message; tool calls get their own dense index so that
//! segments of one call share it regardless of interleaved text or thinking blocks.

use std::collections::HashMap;

use eventsource_stream::Event;
use serde::Deserialize;

use super::response::{
    AnthropicError, AnthropicUsage, ContentBlock, input_text, parse_finish_reason,
};
use crate::error::LlmError;
use crate::streaming::SseEventConverter;
use crate::types::ChatSegment;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart {
        message: MessageStart,
    },
    ContentBlockStart {
        index: u32,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: BlockDelta,
    },
    ContentBlockStop,
    MessageDelta {
        delta: MessageDelta,
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: AnthropicError,
    },
}

#[derive(Debug, Deserialize)]
struct MessageStart {
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta {
        text: String,
    },
    ThinkingDelta {
        thinking: String,
    },
    SignatureDelta {
        signature: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct MessageDelta {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Default)]
pub struct AnthropicEventConverter {
    usage: AnthropicUsage,
    next_tool_index: u32,
    tool_index_by_block: HashMap<u32, u32>,
}

impl AnthropicEventConverter {
    pub fn new() -> Self {
        Self::default()
    }

    fn convert(&mut self, event: StreamEvent) -> Vec<Result<ChatSegment, LlmError>> {
        match event {
            StreamEvent::MessageStart { message } => {
                self.usage = message.usage;
                Vec::new()
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => self.block_start(index, content_block).map(Ok).into_iter().collect(),
            StreamEvent::ContentBlockDelta { index, delta } => {
                self.block_delta(index, delta).map(Ok).into_iter().collect()
            }
            StreamEvent::MessageDelta { delta, usage } => {
                if let Some(usage) = usage {
                    self.usage.merge(usage);
                }
                vec![
                    Ok(ChatSegment::Usage(self.usage.to_usage())),
                    Ok(ChatSegment::finish(parse_finish_reason(delta.stop_reason.as_deref()))),
                ]
            }
            StreamEvent::ContentBlockStop | StreamEvent::MessageStop | StreamEvent::Ping => {
                Vec::new()
            }
            StreamEvent::Error { error } => error.into_segments(),
        }
    }

    fn block_start(&mut self, index: u32, block: ContentBlock) -> Option<ChatSegment> {
        match block {
            ContentBlock::Text { text } => (!text.is_empty()).then(|| ChatSegment::text(text)),
            ContentBlock::Thinking { thinking, signature } => match signature {
                Some(signature) if !signature.is_empty() => {
                    Some(ChatSegment::think_signed(thinking, signature))
                }
                _ => (!thinking.is_empty()).then(|| ChatSegment::think(thinking)),
            },
            ContentBlock::RedactedThinking { data } => Some(ChatSegment::think_signed("", data)),
            ContentBlock::ToolUse { id, name, input } => {
                let tool_index = self.next_tool_index;
                self.next_tool_index += 1;
                self.tool_index_by_block.insert(index, tool_index);
                // Start events carry `{}`; the arguments follow as input_json deltas.
                let arguments = match &input {
                    serde_json::Value::Object(map) if map.is_empty() => String::new(),
                    serde_json::Value::Null => String::new(),
                    other => input_text(other),
                };
                Some(ChatSegment::tool_call(tool_index, Some(id), Some(name), arguments))
            }
            ContentBlock::Unknown => {
                tracing::debug!(index, "ignoring unsupported content block");
                None
            }
        }
    }

    fn block_delta(&mut self, index: u32, delta: BlockDelta) -> Option<ChatSegment> {
        match delta {
            BlockDelta::TextDelta { text } => (!text.is_empty()).then(|| ChatSegment::text(text)),
            BlockDelta::ThinkingDelta { thinking } => {
                (!thinking.is_empty()).then(|| ChatSegment::think(thinking))
            }
            BlockDelta::SignatureDelta { signature } => {
                (!signature.is_empty()).then(|| ChatSegment::think_signed("", signature))
            }
            BlockDelta::InputJsonDelta { partial_json } => {
                let Some(tool_index) = self.tool_index_by_block.get(&index).copied() else {
                    tracing::warn!(index, "input_json_delta for a block that is not a tool call");
                    return None;
                };
                (!partial_json.is_empty())
                    .then(|| ChatSegment::tool_call(tool_index, None, None, partial_json))
            }
            BlockDelta::Unknown => None,
        }
    }
}

impl SseEventConverter for AnthropicEventConverter {
    fn convert_event(&mut self, event: Event) -> Vec<Result<ChatSegment, LlmError>> {
        match serde_json::from_str::<StreamEvent>(&event.data) {
            Ok(parsed) => self.convert(parsed),
            Err(e) => {
                tracing::warn!(error = %e, event = %event.event, "skipping unknown or malformed event");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FinishReason, Usage};
    use serde_json::{Value, json};

    fn run(events: Vec<Value>) -> Vec<Result<ChatSegment, LlmError>> {
        let mut converter = AnthropicEventConverter::new();
        events
            .into_iter()
            .flat_map(|data| {
                converter.convert_event(Event {
                    event: data["type"].as_str().unwrap_or_default().to_string(),
                    data: data.to_string(),
                    id: String::new(),
                    retry: None,
                })
            })
            .collect()
    }

    #[test]
    fn thinking_text_and_tool_use() {
        let out = run(vec![
            json!({"type": "message_start", "message": {"id": "msg_1", "usage": {"input_tokens": 12, "cache_read_input_tokens": 4, "output_tokens": 1}}}),
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "thinking", "thinking": ""}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "thinking_delta", "thinking": "hmm"}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "signature_delta", "signature": "EqQB"}}),
            json!({"type": "content_block_stop", "index": 0}),
            json!({"type": "ping"}),
            json!({"type": "content_block_start", "index": 1, "content_block": {"type": "text", "text": ""}}),
            json!({"type": "content_block_delta", "index": 1, "delta": {"type": "text_delta", "text": "Checking."}}),
            json!({"type": "content_block_start", "index": 2, "content_block": {"type": "tool_use", "id": "toolu_1", "name": "weather", "input": {}}}),
            json!({"type": "content_block_delta", "index": 2, "delta": {"type": "input_json_delta", "partial_json": "{\"city\":"}}),
            json!({"type": "content_block_delta", "index": 2, "delta": {"type": "input_json_delta", "partial_json": "\"Paris\"}"}}),
            json!({"type": "content_block_stop", "index": 2}),
            json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 40}}),
            json!({"type": "message_stop"}),
        ]);
        let out: Vec<_> = out.into_iter().map(|s| s.unwrap()).collect();
        assert_eq!(
            out,
            vec![
                ChatSegment::think("hmm"),
                ChatSegment::think_signed("", "EqQB"),
                ChatSegment::text("Checking."),
                ChatSegment::tool_call(0, Some("toolu_1".into()), Some("weather".into()), ""),
                ChatSegment::tool_call(0, None, None, "{\"city\":"),
                ChatSegment::tool_call(0, None, None, "\"Paris\"}"),
                ChatSegment::Usage(Usage::new(12, 40).with_cache_tokens(4)),
                ChatSegment::finish(FinishReason::ToolCalls),
            ]
        );
    }

    #[test]
    fn block_stop_ignores_its_index() {
        let event: StreamEvent =
            serde_json::from_value(json!({"type": "content_block_stop", "index": 7})).unwrap();
        assert!(matches!(event, StreamEvent::ContentBlockStop));
    }

    #[test]
    fn second_tool_gets_next_index() {
        let out = run(vec![
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "tool_use", "id": "a", "name": "f", "input": {}}}),
            json!({"type": "content_block_start", "index": 1, "content_block": {"type": "text", "text": ""}}),
            json!({"type": "content_block_start", "index": 2, "content_block": {"type": "tool_use", "id": "b", "name": "g", "input": {}}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "input_json_delta", "partial_json": "{}"}}),
            json!({"type": "content_block_delta", "index": 2, "delta": {"type": "input_json_delta", "partial_json": "{}"}}),
        ]);
        assert_eq!(out[1], Ok(ChatSegment::tool_call(1, Some("b".into()), Some("g".into()), "")));
        assert_eq!(out[2], Ok(ChatSegment::tool_call(0, None, None, "{}")));
        assert_eq!(out[3], Ok(ChatSegment::tool_call(1, None, None, "{}")));
    }

    #[test]
    fn error_event_yields_segment_then_error() {
        let out = run(vec![json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}})]);
        assert_eq!(
            out,
            vec![
                Ok(ChatSegment::error(Some("overloaded_error".into()), "Overloaded")),
                Err(LlmError::upstream(Some("overloaded_error".into()), "Overloaded")),
            ]
        );
    }

    #[test]
    fn redacted_thinking_carries_data_as_signature() {
        let out = run(vec![
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "redacted_thinking", "data": "opaque"}}),
        ]);
        assert_eq!(out, vec![Ok(ChatSegment::think_signed("", "opaque"))]);
    }

    #[tracing_test::traced_test]
    #[test]
    fn unknown_events_are_skipped_with_warning() {
        let out = run(vec![json!({"type": "message_banner", "text": "?"})]);
        assert!(out.is_empty());
        assert!(logs_contain("skipping unknown or malformed event"));
    }
}
