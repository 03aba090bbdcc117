//! Response objects: buffered `output[]` and terminal statuses

use serde_json::Value;

use crate::common::{error_fields, str_at, u32_at};
use crate::error::LlmError;
use crate::types::{ChatSegment, FinishReason, Usage};

pub fn parse_usage(usage: &Value) -> Usage {
    Usage::new(u32_at(usage, "/input_tokens"), u32_at(usage, "/output_tokens"))
        .with_cache_tokens(u32_at(usage, "/input_tokens_details/cached_tokens"))
        .with_reasoning_tokens(u32_at(usage, "/output_tokens_details/reasoning_tokens"))
}

fn usage_segment(response: &Value) -> Option<ChatSegment> {
    response
        .get("usage")
        .filter(|u| u.is_object())
        .map(|u| ChatSegment::Usage(parse_usage(u)))
}

/// Usage and finish for a finished response object, plus the error for `failed`.
pub(crate) fn terminal_segments(
    response: &Value,
    saw_tool_calls: bool,
) -> Vec<Result<ChatSegment, LlmError>> {
    let mut out: Vec<Result<ChatSegment, LlmError>> =
        usage_segment(response).into_iter().map(Ok).collect();
    match str_at(response, "status") {
        Some("incomplete") => out.push(Ok(ChatSegment::finish(FinishReason::Length))),
        Some("failed") => {
            out.push(Ok(ChatSegment::finish(FinishReason::ContentFilter)));
            if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
                let (code, message) = error_fields(error);
                out.push(Ok(ChatSegment::error(code.clone(), message.clone())));
                out.push(Err(LlmError::upstream(code, message)));
            }
        }
        _ => {
            let reason = if saw_tool_calls {
                FinishReason::ToolCalls
            } else {
                FinishReason::Stop
            };
            out.push(Ok(ChatSegment::finish(reason)));
        }
    }
    out
}

/// Decode a response object that is no longer running.
pub fn parse_response(response: &Value) -> Vec<Result<ChatSegment, LlmError>> {
    match str_at(response, "status") {
        Some("completed") | Some("incomplete") | None => {}
        Some("failed") => return terminal_segments(response, false),
        Some("cancelled") => {
            let mut out: Vec<_> = usage_segment(response).into_iter().map(Ok).collect();
            out.push(Err(LlmError::Cancelled));
            return out;
        }
        Some(other) => {
            return vec![Err(LlmError::upstream(
                None,
                format!("unsupported response status: {other}"),
            ))];
        }
    }

    let mut out = Vec::new();
    let mut tool_index = 0u32;
    let items = response.get("output").and_then(Value::as_array);
    for item in items.into_iter().flatten() {
        match str_at(item, "type") {
            Some("reasoning") => {
                let summary: Vec<&str> = item
                    .get("summary")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter(|part| str_at(part, "type") == Some("summary_text"))
                    .filter_map(|part| str_at(part, "text"))
                    .filter(|text| !text.is_empty())
                    .collect();
                if !summary.is_empty() {
                    out.push(Ok(ChatSegment::think(summary.join("\n\n"))));
                }
                if let Some(encrypted) = str_at(item, "encrypted_content").filter(|e| !e.is_empty()) {
                    out.push(Ok(ChatSegment::think_signed("", encrypted)));
                }
            }
            Some("function_call") => {
                out.push(Ok(ChatSegment::tool_call(
                    tool_index,
                    str_at(item, "call_id").map(str::to_string),
                    str_at(item, "name").map(str::to_string),
                    str_at(item, "arguments").unwrap_or_default(),
                )));
                tool_index += 1;
            }
            Some("message") => {
                let parts = item.get("content").and_then(Value::as_array);
                for part in parts.into_iter().flatten() {
                    match str_at(part, "type") {
                        Some("output_text") => {
                            if let Some(text) = str_at(part, "text").filter(|t| !t.is_empty()) {
                                out.push(Ok(ChatSegment::text(text)));
                            }
                        }
                        Some("refusal") => {
                            let refusal = str_at(part, "refusal").unwrap_or("refusal");
                            out.extend(usage_segment(response).map(Ok));
                            out.push(Ok(ChatSegment::finish(FinishReason::ContentFilter)));
                            out.push(Ok(ChatSegment::error(
                                Some("content_filter".into()),
                                refusal,
                            )));
                            out.push(Err(LlmError::upstream(
                                Some("content_filter".into()),
                                refusal,
                            )));
                            return out;
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    out.extend(terminal_segments(response, tool_index > 0));
    out
}
