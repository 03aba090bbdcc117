//! Mimo interleaved tool calls
//!
//! When thinking is enabled, Mimo sometimes streams the tool call as markup inside
//! `reasoning_content` instead of `tool_calls`:
//!
//! ```text
//! <tool_call>
//! <function=NAME>
//! <parameter=P>VALUE</parameter>
//! </function>
//! </tool_call>
//! ```
//!
//! The transformer rebuilds regular `ToolCall` segments from that markup. Only a
//! reasoning stream that starts with `<tool_call>` is treated this way.

use serde_json::Value;

use crate::error::LlmError;
use crate::types::{ChatSegment, FinishReason};

use super::profile::SegmentTransformer;

const TOOL_CALL_START: &str = "<tool_call>";
const TOOL_CALL_END: &str = "</tool_call>";
const FUNCTION_START: &str = "<function=";
const FUNCTION_END: &str = "</function>";
const PARAMETER_START: &str = "<parameter=";
const PARAMETER_END: &str = "</parameter>";

#[derive(Debug, Default)]
pub struct MimoToolCallTransformer {
    started: bool,
    in_tool_call: bool,
    finished: bool,
    buffer: String,
    function: Option<String>,
    parameter: Option<String>,
    call_id: Option<String>,
    first_parameter: bool,
    index: u32,
}

impl MimoToolCallTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    fn fragment(&self, name: Option<String>, arguments: impl Into<String>) -> ChatSegment {
        ChatSegment::tool_call(self.index, self.call_id.clone(), name, arguments)
    }

    fn drain_buffer(&mut self, out: &mut Vec<ChatSegment>) {
        while !self.buffer.is_empty() {
            if self.parameter.is_none() {
                let skipped = self.buffer.len() - self.buffer.trim_start().len();
                self.buffer.drain(..skipped);
                if self.buffer.is_empty() {
                    break;
                }
            }

            if self.function.is_none() {
                let Some(start) = self.buffer.find(FUNCTION_START) else {
                    break;
                };
                let Some(end) = self.buffer[start..].find('>').map(|e| start + e) else {
                    break;
                };
                let name = self.buffer[start + FUNCTION_START.len()..end].trim().to_string();
                self.call_id = Some(new_call_id());
                out.push(self.fragment(Some(name.clone()), "{"));
                self.function = Some(name);
                self.first_parameter = true;
                self.buffer.drain(..=end);
            } else if self.parameter.is_none() {
                let parameter = self.buffer.find(PARAMETER_START);
                let function_end = self.buffer.find(FUNCTION_END);
                match (parameter, function_end) {
                    (Some(start), end) if end.is_none_or(|end| start < end) => {
                        let Some(close) = self.buffer[start..].find('>').map(|e| start + e) else {
                            break;
                        };
                        let name = self.buffer[start + PARAMETER_START.len()..close].trim().to_string();
                        let separator = if self.first_parameter { "" } else { ", " };
                        self.first_parameter = false;
                        let key = Value::String(name.clone()).to_string();
                        out.push(self.fragment(None, format!("{separator}{key}: ")));
                        self.parameter = Some(name);
                        self.buffer.drain(..=close);
                    }
                    (_, Some(end)) => {
                        out.push(self.fragment(None, "}"));
                        self.function = None;
                        self.call_id = None;
                        self.index += 1;
                        self.buffer.drain(..end + FUNCTION_END.len());
                    }
                    _ => break,
                }
            } else {
                let Some(end) = self.buffer.find(PARAMETER_END) else {
                    break;
                };
                let value = parameter_json(&self.buffer[..end]);
                out.push(self.fragment(None, value));
                self.parameter = None;
                self.buffer.drain(..end + PARAMETER_END.len());
            }
        }
    }
}

impl SegmentTransformer for MimoToolCallTransformer {
    fn transform(&mut self, segment: ChatSegment) -> Result<Vec<ChatSegment>, LlmError> {
        let (mut content, signature) = match segment {
            ChatSegment::Think { content, signature } => (content, signature),
            ChatSegment::FinishReason { .. } if self.finished || self.index > 0 => {
                return Ok(vec![ChatSegment::finish(FinishReason::ToolCalls)]);
            }
            other => return Ok(vec![other]),
        };

        if !self.started {
            if let Some(rest) = content.strip_prefix(TOOL_CALL_START) {
                self.in_tool_call = true;
                content = rest.to_string();
            }
            self.started = true;
        }
        if self.finished {
            return Err(LlmError::ParseError(
                "unexpected reasoning after the tool call finished".into(),
            ));
        }
        if !self.in_tool_call {
            return Ok(vec![ChatSegment::Think { content, signature }]);
        }

        self.buffer.push_str(&content);
        let mut out = Vec::new();
        self.drain_buffer(&mut out);

        if let Some(end) = self.buffer.find(TOOL_CALL_END) {
            let remaining = self.buffer[end + TOOL_CALL_END.len()..].trim();
            if !remaining.is_empty() {
                return Err(LlmError::ParseError(format!(
                    "unexpected content after {TOOL_CALL_END}: {remaining}"
                )));
            }
            self.in_tool_call = false;
            self.finished = true;
            self.buffer.clear();
        }
        Ok(out)
    }
}

/// Numbers and booleans are emitted raw, everything else as a JSON string.
fn parameter_json(raw: &str) -> String {
    let trimmed = raw.trim();
    if serde_json::from_str::<serde_json::Number>(trimmed).is_ok() {
        return trimmed.to_string();
    }
    if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
        return trimmed.to_ascii_lowercase();
    }
    Value::String(raw.to_string()).to_string()
}

fn new_call_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("call_{}", &hex[..24])
}
