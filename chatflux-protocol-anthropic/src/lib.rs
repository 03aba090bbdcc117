//! chatflux-protocol-anthropic
//!
//! Anthropic Messages protocol mapping for chatflux: request encoding with system
//! cache hints and thinking budgets, the named-event SSE decoder, and buffered
//! response parsing.
#![deny(unsafe_code)]

// Re-export the core modules so protocol code reads `crate::types::*` like the core does.
pub use chatflux_core::{LlmError, config, error, streaming, transport, types, utils};

pub mod messages;

pub use messages::{AnthropicMessagesAdapter, AnthropicOptions};
