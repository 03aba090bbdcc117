//! Neutral message and content types
//!
//! The internal lingua franca between callers and protocol adapters. Nothing here knows
//! about a vendor wire format.

use serde::{Deserialize, Serialize};

/// Message role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    Tool,
}

/// Prompt-cache hint attached to a content block (Anthropic-style).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CacheControl {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
}

impl CacheControl {
    pub fn ephemeral() -> Self {
        Self {
            kind: "ephemeral".to_string(),
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: impl Into<String>) -> Self {
        self.ttl = Some(ttl.into());
        self
    }
}

/// One content block of a neutral message.
///
/// `FileUrl`, `FileBlob` and `FileRef` are three representations of the same concept.
/// `FileRef` is an opaque handle that must be resolved to one of the other two by
/// the file collaborator before the request reaches an adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NeutralContent {
    Text {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    FileUrl {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    FileBlob {
        #[serde(with = "base64_bytes")]
        bytes: Vec<u8>,
        media_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    FileRef {
        file_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    /// Reasoning output. `signature` is an opaque vendor token that must be sent back
    /// verbatim within the same tool-call loop.
    Think {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    ToolCall {
        id: String,
        name: String,
        /// JSON text of the call arguments.
        arguments: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    ToolCallResponse {
        tool_call_id: String,
        response: String,
        success: bool,
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    Error {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
}

impl NeutralContent {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
            cache_control: None,
        }
    }

    pub fn file_url(url: impl Into<String>) -> Self {
        Self::FileUrl {
            url: url.into(),
            cache_control: None,
        }
    }

    pub fn file_blob(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self::FileBlob {
            bytes,
            media_type: media_type.into(),
            cache_control: None,
        }
    }

    pub fn file_ref(file_id: impl Into<String>) -> Self {
        Self::FileRef {
            file_id: file_id.into(),
            cache_control: None,
        }
    }

    pub fn think(content: impl Into<String>, signature: Option<String>) -> Self {
        Self::Think {
            content: content.into(),
            signature,
            cache_control: None,
        }
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self::ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
            cache_control: None,
        }
    }

    pub fn tool_call_response(
        tool_call_id: impl Into<String>,
        response: impl Into<String>,
        success: bool,
        duration_ms: u64,
    ) -> Self {
        Self::ToolCallResponse {
            tool_call_id: tool_call_id.into(),
            response: response.into(),
            success,
            duration_ms,
            cache_control: None,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::Error {
            content: content.into(),
            cache_control: None,
        }
    }

    pub fn cache_control(&self) -> Option<&CacheControl> {
        match self {
            Self::Text { cache_control, .. }
            | Self::FileUrl { cache_control, .. }
            | Self::FileBlob { cache_control, .. }
            | Self::FileRef { cache_control, .. }
            | Self::Think { cache_control, .. }
            | Self::ToolCall { cache_control, .. }
            | Self::ToolCallResponse { cache_control, .. }
            | Self::Error { cache_control, .. } => cache_control.as_ref(),
        }
    }

    pub fn with_cache_control(mut self, value: CacheControl) -> Self {
        match &mut self {
            Self::Text { cache_control, .. }
            | Self::FileUrl { cache_control, .. }
            | Self::FileBlob { cache_control, .. }
            | Self::FileRef { cache_control, .. }
            | Self::Think { cache_control, .. }
            | Self::ToolCall { cache_control, .. }
            | Self::ToolCallResponse { cache_control, .. }
            | Self::Error { cache_control, .. } => *cache_control = Some(value),
        }
        self
    }

    /// True for the three file representations.
    pub fn is_file(&self) -> bool {
        matches!(
            self,
            Self::FileUrl { .. } | Self::FileBlob { .. } | Self::FileRef { .. }
        )
    }

    pub fn is_think(&self) -> bool {
        matches!(self, Self::Think { .. })
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self, Self::ToolCall { .. })
    }
}

/// A borrowed view of a `ToolCall` content block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolCallRef<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub arguments: &'a str,
}

/// A borrowed view of a `Think` content block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkRef<'a> {
    pub content: &'a str,
    pub signature: Option<&'a str>,
}

/// A vendor-independent chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NeutralMessage {
    pub role: ChatRole,
    pub contents: Vec<NeutralContent>,
}

impl NeutralMessage {
    pub fn new(role: ChatRole, contents: Vec<NeutralContent>) -> Self {
        Self { role, contents }
    }

    pub fn user(contents: Vec<NeutralContent>) -> Self {
        Self::new(ChatRole::User, contents)
    }

    pub fn assistant(contents: Vec<NeutralContent>) -> Self {
        Self::new(ChatRole::Assistant, contents)
    }

    pub fn tool(contents: Vec<NeutralContent>) -> Self {
        Self::new(ChatRole::Tool, contents)
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::user(vec![NeutralContent::text(text)])
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::assistant(vec![NeutralContent::text(text)])
    }

    /// Tool message carrying a single successful response.
    pub fn tool_response(tool_call_id: impl Into<String>, response: impl Into<String>) -> Self {
        Self::tool(vec![NeutralContent::tool_call_response(
            tool_call_id,
            response,
            true,
            0,
        )])
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = ToolCallRef<'_>> {
        self.contents.iter().filter_map(|c| match c {
            NeutralContent::ToolCall {
                id,
                name,
                arguments,
                ..
            } => Some(ToolCallRef {
                id,
                name,
                arguments,
            }),
            _ => None,
        })
    }

    pub fn has_tool_calls(&self) -> bool {
        self.contents.iter().any(NeutralContent::is_tool_call)
    }

    pub fn thinks(&self) -> impl Iterator<Item = ThinkRef<'_>> {
        self.contents.iter().filter_map(|c| match c {
            NeutralContent::Think {
                content, signature, ..
            } => Some(ThinkRef {
                content,
                signature: signature.as_deref(),
            }),
            _ => None,
        })
    }

    pub fn has_think(&self) -> bool {
        self.contents.iter().any(NeutralContent::is_think)
    }

    /// Concatenated text of all `Text` blocks.
    pub fn text(&self) -> String {
        self.contents
            .iter()
            .filter_map(|c| match c {
                NeutralContent::Text { content, .. } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// System prompt as a list of text blocks, each optionally cache-controlled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NeutralSystemMessage {
    pub blocks: Vec<SystemBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemBlock {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

impl NeutralSystemMessage {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            blocks: vec![SystemBlock {
                text: text.into(),
                cache_control: None,
            }],
        }
    }

    /// Blocks joined with a blank line.
    pub fn combined_text(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
