//! Streaming Module
//!
//! - SSE decoding and encoding over arbitrary read boundaries
//! - In-place payload rewriting of SSE bodies
//! - Converters from vendor events to `ChatSegment`
//! - The factory that wires transport, decoding and cancellation together

mod converters;
mod factory;
mod rewrite;
mod sse;
mod types;

pub use converters::*;
pub use factory::*;
pub use rewrite::*;
pub use sse::*;
pub use types::*;
