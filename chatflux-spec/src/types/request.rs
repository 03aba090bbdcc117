//! Chat request types

use serde::{Deserialize, Serialize};

use super::content::{NeutralMessage, NeutralSystemMessage};
use crate::error::LlmError;

/// Where the request came from. Web chat requests get extra pre-processing
/// (prompt templating, stale reasoning removal).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum UsageSource {
    #[default]
    WebChat,
    Api,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Minimal => 0,
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }

    pub fn is_low_or_minimal(self) -> bool {
        matches!(self, Self::Minimal | Self::Low)
    }
}

/// Model-level settings for one call.
///
/// The `min_temperature`/`max_temperature`, `allowed_reasoning_efforts` and vision
/// fields describe what the model accepts. Web chat requests are clamped to them
/// during pre-processing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// Deployment name sent upstream.
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Output capacity of the model. Vendors that need an explicit limit fall back to it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_response_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<u32>,
    /// Extract `<think>` markup from plain text output.
    #[serde(default)]
    pub think_tag_parser_enabled: bool,
    /// Send `max_completion_tokens` instead of `max_tokens` (Chat Completions).
    #[serde(default)]
    pub use_max_completion_tokens: bool,
    #[serde(default)]
    pub web_search_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_temperature: Option<f32>,
    /// Empty means every level is accepted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_reasoning_efforts: Vec<ReasoningEffort>,
    /// When false, image URLs are sent as plain text.
    #[serde(default = "default_true")]
    pub allow_vision: bool,
    /// When false, image URLs are downloaded and sent inline.
    #[serde(default = "default_true")]
    pub supports_vision_link: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            system_prompt: None,
            temperature: None,
            max_output_tokens: None,
            max_response_tokens: None,
            reasoning_effort: None,
            thinking_budget: None,
            think_tag_parser_enabled: false,
            use_max_completion_tokens: false,
            web_search_enabled: false,
            min_temperature: None,
            max_temperature: None,
            allowed_reasoning_efforts: Vec::new(),
            allow_vision: true,
            supports_vision_link: true,
        }
    }
}

impl ModelConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// `temperature` limited to `[min_temperature, max_temperature]`.
    pub fn clamped_temperature(&self) -> Option<f32> {
        let mut temperature = self.temperature?;
        if let Some(max) = self.max_temperature {
            temperature = temperature.min(max);
        }
        if let Some(min) = self.min_temperature {
            temperature = temperature.max(min);
        }
        Some(temperature)
    }

    /// `reasoning_effort` moved to the closest allowed level; ties go to the lower one.
    pub fn clamped_reasoning_effort(&self) -> Option<ReasoningEffort> {
        let effort = self.reasoning_effort?;
        if self.allowed_reasoning_efforts.is_empty()
            || self.allowed_reasoning_efforts.contains(&effort)
        {
            return Some(effort);
        }
        self.allowed_reasoning_efforts
            .iter()
            .copied()
            .min_by_key(|allowed| (allowed.rank().abs_diff(effort.rank()), allowed.rank()))
    }
}

/// A function tool the model may call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema of the arguments.
    pub parameters: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

impl ChatTool {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            parameters,
            strict: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonObject,
    JsonSchema {
        name: String,
        schema: serde_json::Value,
        #[serde(default)]
        strict: bool,
    },
}

/// One inbound chat call. Built once, consumed by exactly one adapter invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<NeutralMessage>,
    /// Takes precedence over `config.system_prompt` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<NeutralSystemMessage>,
    pub config: ModelConfig,
    #[serde(default)]
    pub tools: Vec<ChatTool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_format: Option<ResponseFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_parallel_tool_calls: Option<bool>,
    #[serde(default = "default_streamed")]
    pub streamed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default)]
    pub source: UsageSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_user_id: Option<String>,
}

fn default_streamed() -> bool {
    true
}

impl ChatRequest {
    pub fn new(messages: Vec<NeutralMessage>, config: ModelConfig) -> Self {
        Self {
            messages,
            system: None,
            config,
            tools: Vec::new(),
            text_format: None,
            allow_parallel_tool_calls: None,
            streamed: true,
            top_p: None,
            seed: None,
            source: UsageSource::default(),
            end_user_id: None,
        }
    }

    pub fn with_streamed(mut self, streamed: bool) -> Self {
        self.streamed = streamed;
        self
    }

    pub fn with_source(mut self, source: UsageSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ChatTool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_system(mut self, system: NeutralSystemMessage) -> Self {
        self.system = Some(system);
        self
    }

    pub fn with_end_user(mut self, end_user_id: impl Into<String>) -> Self {
        self.end_user_id = Some(end_user_id.into());
        self
    }

    /// `system` wins over `config.system_prompt`.
    pub fn effective_system_prompt(&self) -> Option<String> {
        self.system
            .as_ref()
            .map(NeutralSystemMessage::combined_text)
            .or_else(|| self.config.system_prompt.clone())
    }

    /// Checks that must pass before any network call.
    pub fn validate(&self) -> Result<(), LlmError> {
        if self.config.model.trim().is_empty() {
            return Err(LlmError::ConfigurationError(
                "model name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
