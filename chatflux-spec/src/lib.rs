//! chatflux-spec
//!
//! Vendor-neutral chat content model and error types for chatflux.
//!
//! This crate intentionally contains only value types: neutral messages and contents,
//! decoded stream segments, requests, aggregated responses and `LlmError`.
//! HTTP, SSE decoding and protocol adapters live in `chatflux-core` and the
//! `chatflux-protocol-*` crates.
#![deny(unsafe_code)]

pub mod error;
pub mod types;

pub use error::LlmError;
