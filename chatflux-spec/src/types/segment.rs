//! Decoded stream segments
//!
//! Adapters turn every vendor event into zero or more `ChatSegment`s; a non-streamed
//! response is decoded into the same sequence.

use serde::{Deserialize, Serialize};

/// Flat token usage, normalized across vendors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Prompt tokens served from the vendor's prompt cache.
    pub cache_tokens: u32,
    /// Output tokens spent on reasoning (already included in `output_tokens`).
    pub reasoning_tokens: u32,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            ..Default::default()
        }
    }

    pub fn with_cache_tokens(mut self, cache_tokens: u32) -> Self {
        self.cache_tokens = cache_tokens;
        self
    }

    pub fn with_reasoning_tokens(mut self, reasoning_tokens: u32) -> Self {
        self.reasoning_tokens = reasoning_tokens;
        self
    }

    pub fn total_tokens(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural completion or stop sequence.
    Stop,
    /// Output token limit reached.
    Length,
    /// The model requested tool calls.
    ToolCalls,
    /// Output was filtered or refused.
    ContentFilter,
    /// The upstream failed mid-response.
    Error,
    /// The caller cancelled the request.
    Cancelled,
}

impl FinishReason {
    /// Parse an OpenAI Chat Completions `finish_reason`.
    pub fn from_openai(value: &str) -> Option<Self> {
        match value {
            "stop" => Some(Self::Stop),
            "length" => Some(Self::Length),
            "tool_calls" | "function_call" => Some(Self::ToolCalls),
            "content_filter" => Some(Self::ContentFilter),
            _ => None,
        }
    }

    /// Caller-facing OpenAI-compatible string.
    pub fn as_openai_str(&self) -> &'static str {
        match self {
            Self::Stop | Self::Cancelled => "stop",
            Self::Length => "length",
            Self::ToolCalls => "tool_calls",
            Self::ContentFilter => "content_filter",
            Self::Error => "error",
        }
    }
}

/// A fragment of a tool call. Fragments of the same call share `index`;
/// `arguments` fragments concatenate, in emission order, to the full JSON text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallSegment {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub arguments: String,
}

/// One unit of a decoded response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatSegment {
    Text {
        text: String,
    },
    Think {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    ToolCall(ToolCallSegment),
    Usage(Usage),
    FinishReason {
        reason: FinishReason,
    },
    /// Terminal marker appended when the upstream fails after output was streamed.
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        message: String,
    },
}

impl ChatSegment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn think(content: impl Into<String>) -> Self {
        Self::Think {
            content: content.into(),
            signature: None,
        }
    }

    pub fn think_signed(content: impl Into<String>, signature: impl Into<String>) -> Self {
        Self::Think {
            content: content.into(),
            signature: Some(signature.into()),
        }
    }

    pub fn tool_call(
        index: u32,
        id: Option<String>,
        name: Option<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self::ToolCall(ToolCallSegment {
            index,
            id,
            name,
            arguments: arguments.into(),
        })
    }

    pub fn finish(reason: FinishReason) -> Self {
        Self::FinishReason { reason }
    }

    pub fn error(code: Option<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reason_openai_mapping() {
        assert_eq!(
            FinishReason::from_openai("tool_calls"),
            Some(FinishReason::ToolCalls)
        );
        assert_eq!(FinishReason::from_openai("weird"), None);
        assert_eq!(FinishReason::Cancelled.as_openai_str(), "stop");
        assert_eq!(FinishReason::Error.as_openai_str(), "error");
    }

    #[test]
    fn usage_total() {
        let u = Usage::new(10, 5).with_cache_tokens(3);
        assert_eq!(u.total_tokens(), 15);
        assert_eq!(u.cache_tokens, 3);
    }
}
