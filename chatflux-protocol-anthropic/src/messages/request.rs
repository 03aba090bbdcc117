//! Messages request body
//!
//! Anthropic takes the system prompt as a top-level field and requires strictly
//! alternating roles, so tool results travel as user messages and consecutive
//! messages of the same role are merged into one.

use base64::Engine;
use serde_json::{Map, Value, json};

use crate::error::LlmError;
use crate::types::{CacheControl, ChatRequest, ChatRole, NeutralContent, NeutralMessage};
use crate::utils::json_f32;

pub const DEFAULT_MAX_TOKENS: u32 = 4096;

pub fn build_body(request: &ChatRequest, streamed: bool) -> Result<Value, LlmError> {
    let config = &request.config;
    let mut body = Map::new();
    body.insert("model".into(), Value::String(config.model.clone()));

    let budget = config.thinking_budget.filter(|b| *b > 0);
    let mut max_tokens = config.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
    if let Some(budget) = budget {
        // The API rejects a budget that does not leave room for the answer.
        if budget >= max_tokens {
            max_tokens = budget.saturating_add(DEFAULT_MAX_TOKENS);
        }
    }
    body.insert("max_tokens".into(), json!(max_tokens));

    let system = system_blocks(request);
    if !system.is_empty() {
        body.insert("system".into(), Value::Array(system));
    }
    body.insert("messages".into(), Value::Array(build_messages(&request.messages)?));
    body.insert("stream".into(), Value::Bool(streamed));

    if let Some(temperature) = config.temperature {
        body.insert("temperature".into(), json_f32(temperature));
    }
    if let Some(top_p) = request.top_p {
        body.insert("top_p".into(), json_f32(top_p));
    }
    if let Some(budget) = budget {
        body.insert(
            "thinking".into(),
            json!({ "type": "enabled", "budget_tokens": budget }),
        );
    }
    if !request.tools.is_empty() {
        let tools = request
            .tools
            .iter()
            .map(|tool| {
                let mut out = Map::new();
                out.insert("name".into(), Value::String(tool.name.clone()));
                if let Some(description) = &tool.description {
                    out.insert("description".into(), Value::String(description.clone()));
                }
                out.insert("input_schema".into(), tool.parameters.clone());
                Value::Object(out)
            })
            .collect();
        body.insert("tools".into(), Value::Array(tools));
        if request.allow_parallel_tool_calls == Some(false) {
            body.insert(
                "tool_choice".into(),
                json!({ "type": "auto", "disable_parallel_tool_use": true }),
            );
        }
    }
    if let Some(user) = &request.end_user_id {
        body.insert("metadata".into(), json!({ "user_id": user }));
    }
    Ok(Value::Object(body))
}

fn system_blocks(request: &ChatRequest) -> Vec<Value> {
    match &request.system {
        Some(system) => system
            .blocks
            .iter()
            .filter(|block| !block.text.is_empty())
            .map(|block| text_block(&block.text, block.cache_control.as_ref()))
            .collect(),
        None => request
            .config
            .system_prompt
            .iter()
            .filter(|prompt| !prompt.is_empty())
            .map(|prompt| text_block(prompt, None))
            .collect(),
    }
}

/// Vendor messages for the whole conversation, with same-role neighbours merged.
pub fn build_messages(messages: &[NeutralMessage]) -> Result<Vec<Value>, LlmError> {
    let mut merged: Vec<(&'static str, Vec<Value>)> = Vec::new();
    for message in messages {
        let role = role_of(message.role);
        let blocks = content_blocks(message)?;
        if blocks.is_empty() {
            continue;
        }
        match merged.last_mut() {
            Some((last_role, last_blocks)) if *last_role == role => last_blocks.extend(blocks),
            _ => merged.push((role, blocks)),
        }
    }
    Ok(merged
        .into_iter()
        .map(|(role, content)| json!({ "role": role, "content": content }))
        .collect())
}

/// One neutral message as a vendor message, without merging.
pub fn to_vendor_message(message: &NeutralMessage) -> Result<Vec<Value>, LlmError> {
    let blocks = content_blocks(message)?;
    if blocks.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![json!({ "role": role_of(message.role), "content": blocks })])
}

fn role_of(role: ChatRole) -> &'static str {
    match role {
        ChatRole::Assistant => "assistant",
        ChatRole::User | ChatRole::Tool => "user",
    }
}

fn content_blocks(message: &NeutralMessage) -> Result<Vec<Value>, LlmError> {
    let keep_thinking = message.role == ChatRole::Assistant && message.has_tool_calls();
    let mut blocks = Vec::new();
    for content in &message.contents {
        let block = match content {
            NeutralContent::Text { content, .. } | NeutralContent::Error { content, .. } => {
                if content.is_empty() {
                    continue;
                }
                json!({ "type": "text", "text": content })
            }
            NeutralContent::FileUrl { url, .. } => json!({
                "type": "image",
                "source": { "type": "url", "url": url },
            }),
            NeutralContent::FileBlob {
                bytes, media_type, ..
            } => json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": media_type,
                    "data": base64::engine::general_purpose::STANDARD.encode(bytes),
                },
            }),
            NeutralContent::FileRef { file_id, .. } => {
                return Err(LlmError::ConfigurationError(format!(
                    "file {file_id} must be resolved to a URL or blob before it is sent upstream"
                )));
            }
            NeutralContent::Think {
                content,
                signature: Some(signature),
                ..
            } if keep_thinking && !signature.is_empty() => {
                if content.is_empty() {
                    json!({ "type": "redacted_thinking", "data": signature })
                } else {
                    json!({ "type": "thinking", "thinking": content, "signature": signature })
                }
            }
            // Unsigned thinking cannot be replayed.
            NeutralContent::Think { .. } => continue,
            NeutralContent::ToolCall {
                id,
                name,
                arguments,
                ..
            } => json!({
                "type": "tool_use",
                "id": id,
                "name": name,
                "input": tool_input(name, arguments)?,
            }),
            NeutralContent::ToolCallResponse {
                tool_call_id,
                response,
                success,
                ..
            } => {
                let mut block = json!({
                    "type": "tool_result",
                    "tool_use_id": tool_call_id,
                    "content": response,
                });
                if !success {
                    block["is_error"] = Value::Bool(true);
                }
                block
            }
        };
        blocks.push(with_cache_control(block, content.cache_control()));
    }
    Ok(blocks)
}

fn tool_input(name: &str, arguments: &str) -> Result<Value, LlmError> {
    if arguments.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(arguments).map_err(|e| {
        LlmError::InvalidParameter(format!("arguments of tool call {name} are not JSON: {e}"))
    })
}

fn text_block(text: &str, cache_control: Option<&CacheControl>) -> Value {
    with_cache_control(json!({ "type": "text", "text": text }), cache_control)
}

fn with_cache_control(mut block: Value, cache_control: Option<&CacheControl>) -> Value {
    if let (Some(cache_control), Some(object)) = (cache_control, block.as_object_mut()) {
        object.insert("cache_control".into(), json!(cache_control));
    }
    block
}
