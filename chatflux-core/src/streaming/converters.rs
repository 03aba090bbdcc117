//! Stream Event Converters
//!
//! Trait for converting vendor SSE events to neutral `ChatSegment`s.

use eventsource_stream::Event;

use crate::error::LlmError;
use crate::types::ChatSegment;

/// Converts vendor SSE events into segments.
///
/// A converter is owned by exactly one stream, so it keeps decoding state (open tool
/// call index, accumulated usage) in plain fields. One event may produce zero or more
/// segments. Returning an `Err` ends the stream after that item.
pub trait SseEventConverter: Send {
    fn convert_event(&mut self, event: Event) -> Vec<Result<ChatSegment, LlmError>>;

    /// Called once when upstream closes the stream normally.
    fn handle_stream_end(&mut self) -> Vec<Result<ChatSegment, LlmError>> {
        Vec::new()
    }
}
