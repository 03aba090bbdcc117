//! Chat Completions request body

use serde_json::{Map, Value, json};

use super::profile::ChatCompletionsProfile;
use crate::common::{data_uri, unresolved_file};
use crate::error::LlmError;
use crate::types::{ChatRequest, ChatRole, NeutralContent, NeutralMessage, ResponseFormat, UsageSource};
use crate::utils::json_f32;

pub fn build_body(
    profile: &ChatCompletionsProfile,
    request: &ChatRequest,
    streamed: bool,
) -> Result<Value, LlmError> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = request.effective_system_prompt() {
        messages.push(json!({ "role": "system", "content": system }));
    }
    for message in &request.messages {
        messages.extend(to_vendor_messages(profile, message)?);
    }

    let config = &request.config;
    let mut body = Map::new();
    body.insert("model".into(), Value::String(config.model.clone()));
    body.insert("messages".into(), Value::Array(messages));
    body.insert("stream".into(), Value::Bool(streamed));
    if streamed {
        body.insert("stream_options".into(), json!({ "include_usage": true }));
    }
    if let Some(temperature) = config.temperature {
        body.insert("temperature".into(), json_f32(temperature));
    }
    if let Some(max_tokens) = config.max_output_tokens {
        let key = if config.use_max_completion_tokens {
            "max_completion_tokens"
        } else {
            "max_tokens"
        };
        body.insert(key.into(), json!(max_tokens));
    }
    if let Some(user) = &request.end_user_id {
        body.insert("user".into(), Value::String(user.clone()));
    }
    if let Some(top_p) = request.top_p {
        body.insert("top_p".into(), json_f32(top_p));
    }
    if let Some(seed) = request.seed {
        body.insert("seed".into(), json!(seed));
    }
    if let Some(parallel) = parallel_tool_calls(request) {
        body.insert("parallel_tool_calls".into(), Value::Bool(parallel));
    }
    match &request.text_format {
        None | Some(ResponseFormat::Text) => {}
        Some(ResponseFormat::JsonObject) => {
            body.insert("response_format".into(), json!({ "type": "json_object" }));
        }
        Some(ResponseFormat::JsonSchema { name, schema, strict }) => {
            body.insert(
                "response_format".into(),
                json!({
                    "type": "json_schema",
                    "json_schema": { "name": name, "schema": schema, "strict": strict },
                }),
            );
        }
    }
    if !request.tools.is_empty() {
        let tools = request
            .tools
            .iter()
            .map(|tool| {
                let mut function = Map::new();
                function.insert("name".into(), Value::String(tool.name.clone()));
                if let Some(description) = &tool.description {
                    function.insert("description".into(), Value::String(description.clone()));
                }
                function.insert("parameters".into(), tool.parameters.clone());
                if let Some(strict) = tool.strict {
                    function.insert("strict".into(), Value::Bool(strict));
                }
                json!({ "type": "function", "function": function })
            })
            .collect();
        body.insert("tools".into(), Value::Array(tools));
    }
    if let Some(effort) = config.reasoning_effort {
        body.insert("reasoning_effort".into(), Value::String(effort.as_str().into()));
    }
    if let Some(hook) = profile.body_hook {
        hook(request, &mut body);
    }
    Ok(Value::Object(body))
}

/// Web chat always lets the model call tools in parallel.
pub(crate) fn parallel_tool_calls(request: &ChatRequest) -> Option<bool> {
    if request.tools.is_empty() {
        return None;
    }
    if request.source == UsageSource::WebChat {
        return Some(true);
    }
    request.allow_parallel_tool_calls
}

pub fn to_vendor_messages(
    profile: &ChatCompletionsProfile,
    message: &NeutralMessage,
) -> Result<Vec<Value>, LlmError> {
    match message.role {
        ChatRole::User => {
            let parts = content_parts(&message.contents)?;
            Ok(vec![json!({ "role": "user", "content": content_value(parts) })])
        }
        ChatRole::Assistant => Ok(vec![assistant_message(profile, message)?]),
        ChatRole::Tool => {
            let responses: Vec<Value> = message
                .contents
                .iter()
                .filter_map(|c| match c {
                    NeutralContent::ToolCallResponse {
                        tool_call_id,
                        response,
                        ..
                    } => Some(json!({
                        "role": "tool",
                        "tool_call_id": tool_call_id,
                        "content": response,
                    })),
                    _ => None,
                })
                .collect();
            if responses.is_empty() {
                return Err(LlmError::InvalidParameter(
                    "tool message carries no tool call response".into(),
                ));
            }
            Ok(responses)
        }
    }
}

fn assistant_message(
    profile: &ChatCompletionsProfile,
    message: &NeutralMessage,
) -> Result<Value, LlmError> {
    let mut out = Map::new();
    out.insert("role".into(), Value::String("assistant".into()));

    let parts = content_parts(&message.contents)?;
    if !parts.is_empty() {
        out.insert("content".into(), content_value(parts));
    } else if !message.has_tool_calls() {
        out.insert("content".into(), Value::String(String::new()));
    }

    if message.has_tool_calls() {
        let calls: Vec<Value> = message
            .tool_calls()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": { "name": call.name, "arguments": call.arguments },
                })
            })
            .collect();
        out.insert("tool_calls".into(), Value::Array(calls));

        if message.has_think()
            && let Some(encode) = profile.encode_reasoning
            && let Some(reasoning) = encode(message)
        {
            out.insert(profile.reasoning_key.into(), reasoning);
        }
    }

    if let Some(hook) = profile.message_hook {
        hook(message, &mut out);
    }
    Ok(Value::Object(out))
}

/// Text, error and file blocks as content parts; other kinds are carried elsewhere.
fn content_parts(contents: &[NeutralContent]) -> Result<Vec<Value>, LlmError> {
    let mut parts = Vec::new();
    for content in contents {
        match content {
            NeutralContent::Text { content, .. } | NeutralContent::Error { content, .. } => {
                parts.push(json!({ "type": "text", "text": content }));
            }
            NeutralContent::FileUrl { url, .. } => {
                parts.push(json!({ "type": "image_url", "image_url": { "url": url } }));
            }
            NeutralContent::FileBlob {
                bytes, media_type, ..
            } => {
                parts.push(json!({
                    "type": "image_url",
                    "image_url": { "url": data_uri(bytes, media_type) },
                }));
            }
            NeutralContent::FileRef { file_id, .. } => return Err(unresolved_file(file_id)),
            NeutralContent::Think { .. }
            | NeutralContent::ToolCall { .. }
            | NeutralContent::ToolCallResponse { .. } => {}
        }
    }
    Ok(parts)
}

/// A lone text part collapses to a plain string.
fn content_value(mut parts: Vec<Value>) -> Value {
    if parts.len() == 1 && parts[0]["type"] == "text" {
        return parts.swap_remove(0)["text"].take();
    }
    Value::Array(parts)
}
