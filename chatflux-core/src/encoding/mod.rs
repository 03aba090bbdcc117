//! Outbound wire-format encoders.
//!
//! Used when a neutral segment stream is forwarded to a client that speaks a
//! vendor protocol, e.g. an OpenAI-compatible gateway endpoint.

pub mod openai;

pub use openai::*;
