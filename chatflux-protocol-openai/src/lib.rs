//! chatflux-protocol-openai
//!
//! OpenAI protocol family mapping for chatflux:
//! - Chat Completions, including the OpenAI-compatible vendors (DeepSeek, MiniMax,
//!   Xiaomi Mimo, Moonshot, SiliconFlow, QianFan, Azure AI Foundry) expressed as
//!   `ChatCompletionsProfile` values
//! - Responses API, streamed, buffered, or in background mode
#![deny(unsafe_code)]

// Re-export the core modules so protocol code reads `crate::types::*` like the core does.
pub use chatflux_core::{LlmError, config, error, streaming, transport, types, utils};

pub mod chat;
mod common;
pub mod responses;

pub use chat::{ChatCompletionsProfile, ChatOptions, OpenAiChatAdapter};
pub use responses::{OpenAiResponsesAdapter, ResponsesOptions};
