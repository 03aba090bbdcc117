//! Responses SSE decoding
//!
//! Events are typed by their `type` field. Function calls are numbered in the order
//! their items complete.

use eventsource_stream::Event;
use serde_json::Value;

use super::response::terminal_segments;
use crate::common::{error_fields, str_at};
use crate::error::LlmError;
use crate::streaming::SseEventConverter;
use crate::types::ChatSegment;

#[derive(Debug, Default)]
pub struct ResponsesEventConverter {
    tool_index: u32,
    saw_tool_calls: bool,
}

impl ResponsesEventConverter {
    pub fn new() -> Self {
        Self::default()
    }

    fn convert_json(&mut self, kind: &str, json: &Value) -> Vec<Result<ChatSegment, LlmError>> {
        let delta = || str_at(json, "delta").filter(|d| !d.is_empty());
        let item = json.get("item").unwrap_or(&Value::Null);
        match kind {
            "response.output_text.delta" => delta().map(|d| Ok(ChatSegment::text(d))).into_iter().collect(),
            "response.output_item.added" if str_at(item, "type") == Some("function_call") => {
                self.saw_tool_calls = true;
                vec![Ok(ChatSegment::tool_call(
                    self.tool_index,
                    str_at(item, "call_id").map(str::to_string),
                    str_at(item, "name").map(str::to_string),
                    "",
                ))]
            }
            "response.function_call_arguments.delta" => vec![Ok(ChatSegment::tool_call(
                self.tool_index,
                None,
                None,
                str_at(json, "delta").unwrap_or_default(),
            ))],
            "response.output_item.done" => match str_at(item, "type") {
                Some("function_call") => {
                    self.tool_index += 1;
                    Vec::new()
                }
                Some("reasoning") => str_at(item, "encrypted_content")
                    .filter(|e| !e.is_empty())
                    .map(|e| Ok(ChatSegment::think_signed("", e)))
                    .into_iter()
                    .collect(),
                _ => Vec::new(),
            },
            "response.reasoning_summary_text.delta" => {
                delta().map(|d| Ok(ChatSegment::think(d))).into_iter().collect()
            }
            "response.reasoning_summary_text.done" => vec![Ok(ChatSegment::think("\n\n"))],
            "response.completed" | "response.incomplete" | "response.failed" => {
                let response = json.get("response").unwrap_or(&Value::Null);
                terminal_segments(response, self.saw_tool_calls)
            }
            "error" => {
                let (code, message) = error_fields(json);
                vec![
                    Ok(ChatSegment::error(code.clone(), message.clone())),
                    Err(LlmError::upstream(code, message)),
                ]
            }
            _ => Vec::new(),
        }
    }
}

impl SseEventConverter for ResponsesEventConverter {
    fn convert_event(&mut self, event: Event) -> Vec<Result<ChatSegment, LlmError>> {
        let json = match serde_json::from_str::<Value>(&event.data) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, event = %event.event, "skipping unparseable event");
                return Vec::new();
            }
        };
        let kind = str_at(&json, "type").unwrap_or(event.event.as_str()).to_string();
        self.convert_json(&kind, &json)
    }
}
