//! Responses request body and input items

use serde_json::{Map, Value, json};

use crate::chat::parallel_tool_calls;
use crate::common::{data_uri, unresolved_file};
use crate::error::LlmError;
use crate::types::{ChatRequest, ChatRole, NeutralContent, NeutralMessage, ResponseFormat};
use crate::utils::json_f32;

pub fn build_body(request: &ChatRequest, streamed: bool, background: bool) -> Result<Value, LlmError> {
    let mut input = Vec::new();
    if let Some(system) = request.effective_system_prompt() {
        input.push(json!({
            "type": "message",
            "role": "system",
            "content": [{ "type": "input_text", "text": system }],
        }));
    }
    for message in &request.messages {
        input.extend(to_input_items(message)?);
    }

    let config = &request.config;
    let mut body = Map::new();
    body.insert("model".into(), Value::String(config.model.clone()));
    body.insert("input".into(), Value::Array(input));
    body.insert("stream".into(), Value::Bool(streamed));
    if let Some(temperature) = config.temperature {
        body.insert("temperature".into(), json_f32(temperature));
    }
    if let Some(top_p) = request.top_p {
        body.insert("top_p".into(), json_f32(top_p));
    }
    if let Some(user) = &request.end_user_id {
        body.insert("user".into(), Value::String(user.clone()));
    }
    if let Some(max_tokens) = config.max_output_tokens {
        body.insert("max_output_tokens".into(), json!(max_tokens));
    }
    if let Some(effort) = config.reasoning_effort {
        body.insert(
            "reasoning".into(),
            json!({ "effort": effort.as_str(), "summary": "detailed" }),
        );
        body.insert("include".into(), json!(["reasoning.encrypted_content"]));
    }
    if let Some(format) = &request.text_format {
        let format = match format {
            ResponseFormat::Text => json!({ "type": "text" }),
            ResponseFormat::JsonObject => json!({ "type": "json_object" }),
            ResponseFormat::JsonSchema { name, schema, strict } => json!({
                "type": "json_schema",
                "name": name,
                "schema": schema,
                "strict": strict,
            }),
        };
        body.insert("text".into(), json!({ "format": format }));
    }
    if !request.tools.is_empty() {
        let tools = request
            .tools
            .iter()
            .map(|tool| {
                let mut out = Map::new();
                out.insert("type".into(), Value::String("function".into()));
                out.insert("name".into(), Value::String(tool.name.clone()));
                if let Some(description) = &tool.description {
                    out.insert("description".into(), Value::String(description.clone()));
                }
                out.insert("parameters".into(), tool.parameters.clone());
                if let Some(strict) = tool.strict {
                    out.insert("strict".into(), Value::Bool(strict));
                }
                Value::Object(out)
            })
            .collect();
        body.insert("tools".into(), Value::Array(tools));
    }
    if let Some(parallel) = parallel_tool_calls(request) {
        body.insert("parallel_tool_calls".into(), Value::Bool(parallel));
    }
    if background {
        body.insert("background".into(), Value::Bool(true));
    } else {
        body.insert("store".into(), Value::Bool(false));
    }
    Ok(Value::Object(body))
}

/// Input items for one message, in content order.
///
/// Signed thinking becomes a `reasoning` item carrying the encrypted payload, but only
/// on messages that also call tools. Adjacent text blocks share one `message` item.
pub fn to_input_items(message: &NeutralMessage) -> Result<Vec<Value>, LlmError> {
    match message.role {
        ChatRole::User => Ok(vec![json!({
            "type": "message",
            "role": "user",
            "content": input_parts(&message.contents)?,
        })]),
        ChatRole::Assistant => Ok(assistant_items(message)),
        ChatRole::Tool => {
            let outputs: Vec<Value> = message
                .contents
                .iter()
                .filter_map(|c| match c {
                    NeutralContent::ToolCallResponse {
                        tool_call_id,
                        response,
                        ..
                    } => Some(json!({
                        "type": "function_call_output",
                        "call_id": tool_call_id,
                        "output": response,
                    })),
                    _ => None,
                })
                .collect();
            if outputs.is_empty() {
                return Err(LlmError::InvalidParameter(
                    "tool message carries no tool call response".into(),
                ));
            }
            Ok(outputs)
        }
    }
}

fn assistant_items(message: &NeutralMessage) -> Vec<Value> {
    let mut items = Vec::new();
    let mut text_parts = Vec::new();
    let keep_reasoning = message.has_tool_calls();
    let flush = |items: &mut Vec<Value>, parts: &mut Vec<Value>| {
        if !parts.is_empty() {
            items.push(json!({
                "type": "message",
                "role": "assistant",
                "content": std::mem::take(parts),
            }));
        }
    };

    for content in &message.contents {
        match content {
            NeutralContent::Text { content, .. } | NeutralContent::Error { content, .. } => {
                text_parts.push(json!({ "type": "output_text", "text": content }));
            }
            NeutralContent::Think {
                signature: Some(signature),
                ..
            } if keep_reasoning && !signature.trim().is_empty() => {
                flush(&mut items, &mut text_parts);
                items.push(json!({
                    "type": "reasoning",
                    "encrypted_content": signature,
                    "summary": [],
                }));
            }
            NeutralContent::ToolCall {
                id,
                name,
                arguments,
                ..
            } => {
                flush(&mut items, &mut text_parts);
                items.push(json!({
                    "type": "function_call",
                    "call_id": id,
                    "name": name,
                    "arguments": arguments,
                }));
            }
            _ => {}
        }
    }
    flush(&mut items, &mut text_parts);
    items
}

fn input_parts(contents: &[NeutralContent]) -> Result<Vec<Value>, LlmError> {
    let mut parts = Vec::new();
    for content in contents {
        match content {
            NeutralContent::Text { content, .. } | NeutralContent::Error { content, .. } => {
                parts.push(json!({ "type": "input_text", "text": content }));
            }
            NeutralContent::FileUrl { url, .. } => {
                parts.push(json!({ "type": "input_image", "image_url": url }));
            }
            NeutralContent::FileBlob {
                bytes, media_type, ..
            } => {
                parts.push(json!({ "type": "input_image", "image_url": data_uri(bytes, media_type) }));
            }
            NeutralContent::FileRef { file_id, .. } => return Err(unresolved_file(file_id)),
            _ => {}
        }
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatTool, ModelConfig, ReasoningEffort};

    #[test]
    fn reasoning_request_asks_for_encrypted_content() {
        let mut config = ModelConfig::new("o4-mini");
        config.reasoning_effort = Some(ReasoningEffort::Medium);
        config.max_output_tokens = Some(1000);
        let mut request = ChatRequest::new(vec![NeutralMessage::user_text("hi")], config)
            .with_tools(vec![ChatTool::function("f", "d", json!({"type": "object"}))]);
        request.text_format = Some(ResponseFormat::JsonObject);

        let body = build_body(&request, true, false).unwrap();
        assert_eq!(body["reasoning"], json!({"effort": "medium", "summary": "detailed"}));
        assert_eq!(body["include"], json!(["reasoning.encrypted_content"]));
        assert_eq!(body["max_output_tokens"], 1000);
        assert_eq!(body["text"]["format"]["type"], "json_object");
        assert_eq!(body["tools"][0]["name"], "f");
        assert_eq!(body["store"], false);
        assert_eq!(
            body["input"][0],
            json!({"type": "message", "role": "user", "content": [{"type": "input_text", "text": "hi"}]})
        );

        let background = build_body(&request, false, true).unwrap();
        assert_eq!(background["background"], true);
        assert!(background.get("store").is_none());
    }

    #[test]
    fn signed_thinking_becomes_reasoning_item() {
        let message = NeutralMessage::assistant(vec![
            NeutralContent::think("summary", Some("gAAAA-enc".into())),
            NeutralContent::think("unsigned", None),
            NeutralContent::tool_call("call_1", "lookup", "{\"q\":1}"),
        ]);
        let items = to_input_items(&message).unwrap();
        assert_eq!(
            items,
            vec![
                json!({"type": "reasoning", "encrypted_content": "gAAAA-enc", "summary": []}),
                json!({"type": "function_call", "call_id": "call_1", "name": "lookup", "arguments": "{\"q\":1}"}),
            ]
        );
    }

    #[test]
    fn reasoning_dropped_from_final_answers() {
        let message = NeutralMessage::assistant(vec![
            NeutralContent::think("summary", Some("gAAAA-enc".into())),
            NeutralContent::text("answer"),
        ]);
        let items = to_input_items(&message).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["type"], "message");
    }

    #[test]
    fn assistant_text_groups_adjacent_blocks() {
        let message = NeutralMessage::assistant(vec![
            NeutralContent::text("a"),
            NeutralContent::text("b"),
            NeutralContent::tool_call("c", "f", "{}"),
        ]);
        let items = to_input_items(&message).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["content"].as_array().unwrap().len(), 2);
        assert_eq!(items[1]["type"], "function_call");
    }

    #[test]
    fn tool_outputs_fan_out() {
        let message = NeutralMessage::tool(vec![
            NeutralContent::tool_call_response("a", "x", true, 1),
            NeutralContent::tool_call_response("b", "y", true, 1),
        ]);
        let items = to_input_items(&message).unwrap();
        assert_eq!(items[1], json!({"type": "function_call_output", "call_id": "b", "output": "y"}));
    }
}
