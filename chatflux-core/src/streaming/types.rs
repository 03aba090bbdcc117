//! Core Streaming Types

use futures::Stream;
use std::pin::Pin;

use crate::error::LlmError;
use crate::types::ChatSegment;

/// Lazy, single-pass sequence of decoded segments.
///
/// Nothing is sent upstream until the stream is first polled. Dropping it releases the
/// underlying connection.
pub type ChatSegmentStream = Pin<Box<dyn Stream<Item = Result<ChatSegment, LlmError>> + Send>>;

static_assertions::assert_impl_all!(ChatSegmentStream: Send, Unpin);
