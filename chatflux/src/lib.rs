//! # chatflux
//!
//! Vendor-neutral chat for LLM providers. One request model, one segment stream, three
//! wire protocols:
//!
//! - OpenAI Chat Completions, plus the compatible vendors (DeepSeek, MiniMax, Xiaomi
//!   Mimo, Moonshot, SiliconFlow, QianFan, Azure AI Foundry)
//! - OpenAI Responses, including background mode
//! - Anthropic Messages
//!
//! Streamed and buffered calls produce the same `ChatSegment` sequence, so callers
//! fold both with `ChatAggregator`.
//!
//! ```rust,ignore
//! use chatflux::prelude::*;
//!
//! let registry = ProviderRegistry::default();
//! let config = ProviderConfig::new(ApiType::ChatCompletions, "https://api.openai.com/v1", key);
//! let request = ChatRequest::new(vec![NeutralMessage::user_text("Hello")], ModelConfig::new("gpt-4o-mini"));
//! let response = ChatAggregator::collect(registry.chat(&config, request, CancellationToken::new())).await?;
//! println!("{}", response.text);
//! ```
#![deny(unsafe_code)]

pub mod observability;
pub mod registry;

pub use chatflux_core::{
    ApiType, ChatAdapter, ChatAggregator, ChatSegmentStream, HttpClientCache, HttpTransport,
    LlmError, ProviderCacheKey, ProviderConfig, ReqwestTransport, TransportSettings, Vendor,
    chat_entry, download_vision_links, preprocess,
};
pub use chatflux_core::{
    aggregate, config, error, streaming, testing, think_tag, transport, turn_filter, types,
};

/// Protocol adapters and their wire-level helpers.
pub mod protocol {
    pub use chatflux_protocol_anthropic::messages as anthropic;
    pub use chatflux_protocol_openai::{chat as openai_chat, responses as openai_responses};
}

pub use chatflux_protocol_anthropic::{AnthropicMessagesAdapter, AnthropicOptions};
pub use chatflux_protocol_openai::{
    ChatCompletionsProfile, ChatOptions, OpenAiChatAdapter, OpenAiResponsesAdapter,
    ResponsesOptions,
};
pub use registry::{AdapterCache, ProviderRegistry, build_adapter};

pub mod prelude {
    pub use crate::registry::{AdapterCache, ProviderRegistry};
    pub use chatflux_core::{
        ApiType, ChatAdapter, ChatAggregator, ChatSegmentStream, LlmError, ProviderConfig, Vendor,
    };
    pub use chatflux_core::types::{
        CacheControl, ChatRequest, ChatResponse, ChatRole, ChatSegment, ChatTool, FinishReason,
        ModelConfig, NeutralContent, NeutralMessage, NeutralSystemMessage, ReasoningEffort,
        UsageSource, Usage,
    };
    pub use tokio_util::sync::CancellationToken;
}
