//! Non-streamed Chat Completions responses

use serde_json::Value;

use super::profile::ChatCompletionsProfile;
use crate::common::{error_fields, str_at, u32_at};
use crate::error::LlmError;
use crate::types::{ChatSegment, FinishReason, Usage};

/// Flat usage from a Chat Completions `usage` object.
pub fn parse_usage(profile: &ChatCompletionsProfile, usage: &Value) -> Usage {
    Usage::new(u32_at(usage, "/prompt_tokens"), u32_at(usage, "/completion_tokens"))
        .with_cache_tokens((profile.cached_tokens)(usage))
        .with_reasoning_tokens(u32_at(usage, "/completion_tokens_details/reasoning_tokens"))
}

/// Decode a buffered response into the segment order a stream would produce.
pub fn parse_response(
    profile: &ChatCompletionsProfile,
    json: &Value,
) -> Result<Vec<ChatSegment>, LlmError> {
    if json.get("error").is_some_and(|e| !e.is_null()) {
        let (code, message) = error_fields(json);
        return Err(LlmError::upstream(code, message));
    }
    let choice = json
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .ok_or_else(|| LlmError::ParseError("response has no choices".into()))?;
    let message = choice.get("message").unwrap_or(&Value::Null);

    let mut out = Vec::new();
    if let Some(text) = str_at(message, "content").filter(|t| !t.is_empty()) {
        out.push(ChatSegment::text(text));
    }
    if let Some(think) = profile.decode_reasoning(message) {
        out.push(think);
    }
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for (position, call) in calls.iter().enumerate() {
            let function = call.get("function").unwrap_or(&Value::Null);
            let index = call
                .get("index")
                .and_then(Value::as_u64)
                .unwrap_or(position as u64);
            let index = u32::try_from(index).map_err(|_| {
                LlmError::ParseError(format!("tool call index {index} is out of range"))
            })?;
            out.push(ChatSegment::tool_call(
                index,
                str_at(call, "id").map(str::to_string),
                str_at(function, "name").map(str::to_string),
                str_at(function, "arguments").unwrap_or_default(),
            ));
        }
    }
    if let Some(usage) = json.get("usage").filter(|u| u.is_object()) {
        out.push(ChatSegment::Usage(parse_usage(profile, usage)));
    }
    let reason = str_at(choice, "finish_reason")
        .and_then(FinishReason::from_openai)
        .unwrap_or(FinishReason::Stop);
    out.push(ChatSegment::finish(reason));
    Ok(out)
}
