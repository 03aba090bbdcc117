//! Chat Completions SSE decoding

use eventsource_stream::Event;
use serde_json::Value;

use super::profile::ChatCompletionsProfile;
use super::response::parse_usage;
use crate::common::{error_fields, str_at};
use crate::error::LlmError;
use crate::streaming::SseEventConverter;
use crate::types::{ChatSegment, FinishReason};

pub struct ChatCompletionsEventConverter {
    profile: ChatCompletionsProfile,
}

impl ChatCompletionsEventConverter {
    pub fn new(profile: ChatCompletionsProfile) -> Self {
        Self { profile }
    }

    fn convert_chunk(&self, chunk: &Value) -> Vec<Result<ChatSegment, LlmError>> {
        if chunk.get("error").is_some_and(|e| !e.is_null()) {
            let (code, message) = error_fields(chunk);
            return vec![
                Ok(ChatSegment::error(code.clone(), message.clone())),
                Err(LlmError::upstream(code, message)),
            ];
        }

        let usage = chunk
            .get("usage")
            .filter(|u| u.is_object())
            .map(|u| ChatSegment::Usage(parse_usage(&self.profile, u)));
        let Some(choice) = chunk
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
        else {
            return usage.into_iter().map(Ok).collect();
        };

        let mut out = Vec::new();
        let delta = choice.get("delta").unwrap_or(&Value::Null);
        if let Some(text) = str_at(delta, "content").filter(|t| !t.is_empty()) {
            out.push(ChatSegment::text(text));
        }
        if let Some(think) = self.profile.decode_reasoning(delta) {
            out.push(think);
        }
        if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for call in calls {
                let function = call.get("function").unwrap_or(&Value::Null);
                let index = call.get("index").and_then(Value::as_u64).unwrap_or(0);
                out.push(ChatSegment::tool_call(
                    u32::try_from(index).unwrap_or(u32::MAX),
                    str_at(call, "id").map(str::to_string),
                    str_at(function, "name").map(str::to_string),
                    str_at(function, "arguments").unwrap_or_default(),
                ));
            }
        }
        out.extend(usage);
        if let Some(reason) = str_at(choice, "finish_reason") {
            let finish = FinishReason::from_openai(reason).unwrap_or_else(|| {
                tracing::warn!(finish_reason = reason, "unknown finish reason, treating as stop");
                FinishReason::Stop
            });
            out.push(ChatSegment::finish(finish));
        }
        out.into_iter().map(Ok).collect()
    }
}

impl SseEventConverter for ChatCompletionsEventConverter {
    fn convert_event(&mut self, event: Event) -> Vec<Result<ChatSegment, LlmError>> {
        match serde_json::from_str::<Value>(&event.data) {
            Ok(chunk) => self.convert_chunk(&chunk),
            Err(e) => {
                tracing::warn!(error = %e, data = %event.data, "skipping unparseable chunk");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Usage;
    use serde_json::json;

    fn event(data: &str) -> Event {
        Event {
            event: "message".into(),
            data: data.into(),
            id: String::new(),
            retry: None,
        }
    }

    fn convert(profile: ChatCompletionsProfile, data: Value) -> Vec<ChatSegment> {
        ChatCompletionsEventConverter::new(profile)
            .convert_event(event(&data.to_string()))
            .into_iter()
            .map(|s| s.unwrap())
            .collect()
    }

    #[test]
    fn delta_order_is_content_reasoning_tools_usage_finish() {
        let out = convert(
            ChatCompletionsProfile::deepseek(),
            json!({
                "choices": [{
                    "delta": {
                        "content": "a",
                        "reasoning_content": "r",
                        "tool_calls": [{"function": {"name": "f"}}],
                    },
                    "finish_reason": "tool_calls",
                }],
                "usage": {"prompt_tokens": 1, "completion_tokens": 2},
            }),
        );
        assert_eq!(
            out,
            vec![
                ChatSegment::text("a"),
                ChatSegment::think("r"),
                ChatSegment::tool_call(0, None, Some("f".into()), ""),
                ChatSegment::Usage(Usage::new(1, 2)),
                ChatSegment::finish(FinishReason::ToolCalls),
            ]
        );
    }

    #[test]
    fn usage_only_chunk() {
        let out = convert(
            ChatCompletionsProfile::moonshot(),
            json!({"choices": [], "usage": {"prompt_tokens": 3000, "completion_tokens": 9, "cached_tokens": 2304}}),
        );
        assert_eq!(out, vec![ChatSegment::Usage(Usage::new(3000, 9).with_cache_tokens(2304))]);
    }

    #[test]
    fn null_fields_are_ignored() {
        let out = convert(
            ChatCompletionsProfile::openai(),
            json!({"choices": [{"delta": {"content": null, "tool_calls": null}, "finish_reason": null}], "usage": null}),
        );
        assert!(out.is_empty());
    }

    #[test]
    fn error_chunk_yields_segment_then_error() {
        let mut converter = ChatCompletionsEventConverter::new(ChatCompletionsProfile::generic());
        let out = converter.convert_event(event(
            r#"{"error":{"code":"server_error","message":"overloaded"}}"#,
        ));
        assert_eq!(
            out,
            vec![
                Ok(ChatSegment::error(Some("server_error".into()), "overloaded")),
                Err(LlmError::upstream(Some("server_error".into()), "overloaded")),
            ]
        );
    }

    #[tracing_test::traced_test]
    #[test]
    fn unparseable_chunk_is_skipped_with_warning() {
        let mut converter = ChatCompletionsEventConverter::new(ChatCompletionsProfile::generic());
        assert!(converter.convert_event(event("{not json")).is_empty());
        assert!(logs_contain("skipping unparseable chunk"));
    }

    #[tracing_test::traced_test]
    #[test]
    fn unknown_finish_reason_is_stop_with_warning() {
        let out = convert(
            ChatCompletionsProfile::generic(),
            json!({"choices": [{"delta": {"content": "x"}, "finish_reason": "insufficient_system_resource"}]}),
        );
        assert_eq!(out, vec![ChatSegment::text("x"), ChatSegment::finish(FinishReason::Stop)]);
        assert!(logs_contain("unknown finish reason"));
    }
}
