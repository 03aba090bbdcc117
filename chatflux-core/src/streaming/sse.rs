//! SSE framing
//!
//! Decoding delegates to `eventsource-stream`, which buffers across reads, so an event
//! split over several network chunks (or several events in one chunk) decode the same.

use std::pin::Pin;

use bytes::Bytes;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::Stream;
use futures_util::StreamExt;

use crate::error::LlmError;

/// Decoded SSE events.
pub type SseStream = Pin<Box<dyn Stream<Item = Result<Event, LlmError>> + Send>>;

/// Extension for turning a byte stream into SSE events.
pub trait SseStreamExt: Stream<Item = Result<Bytes, LlmError>> + Sized + Send + 'static {
    fn into_sse_stream(self) -> SseStream {
        Box::pin(self.eventsource().map(|item| item.map_err(map_sse_error)))
    }
}

impl<S> SseStreamExt for S where S: Stream<Item = Result<Bytes, LlmError>> + Sized + Send + 'static {}

fn map_sse_error(err: EventStreamError<LlmError>) -> LlmError {
    match err {
        EventStreamError::Transport(e) => e,
        EventStreamError::Utf8(e) => LlmError::StreamError(format!("SSE utf-8 error: {e}")),
        EventStreamError::Parser(e) => LlmError::StreamError(format!("SSE parsing error: {e}")),
    }
}

/// Serialize an event in standard SSE wire format.
///
/// `event:` is omitted for the default `message` type; multi-line data becomes one
/// `data:` line per line.
pub fn encode_sse_event(event: &Event) -> Bytes {
    let mut out = String::with_capacity(event.data.len() + 32);
    if !event.id.is_empty() {
        out.push_str("id: ");
        out.push_str(&event.id);
        out.push('\n');
    }
    if !event.event.is_empty() && event.event != "message" {
        out.push_str("event: ");
        out.push_str(&event.event);
        out.push('\n');
    }
    for line in event.data.split('\n') {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    if let Some(retry) = event.retry {
        out.push_str("retry: ");
        out.push_str(&retry.as_millis().to_string());
        out.push('\n');
    }
    out.push('\n');
    Bytes::from(out)
}

/// `data: <payload>\n\n`
pub fn encode_sse_data(data: &str) -> Bytes {
    encode_sse_event(&Event {
        event: String::new(),
        data: data.to_string(),
        id: String::new(),
        retry: None,
    })
}
