//! In-place SSE payload rewriting
//!
//! Wraps a response body, rewrites each event's `data` with a caller function and
//! re-serializes it, so the result can be fed to any SSE consumer unchanged.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;

use super::sse::{SseStream, SseStreamExt, encode_sse_event};
use crate::error::LlmError;
use crate::transport::ByteStream;

/// Payload rewrite function applied to the `data` of every event.
pub type SseRewrite = Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

/// Byte stream that yields re-serialized, rewritten SSE events.
///
/// Pull-based: the pending queue is drained before the next upstream event is
/// parsed, so at most one event's bytes are buffered. Ends once upstream is
/// exhausted and the queue is empty.
pub struct SseRewriteStream {
    events: SseStream,
    rewrite: SseRewrite,
    queue: VecDeque<Bytes>,
    finished: bool,
}

impl SseRewriteStream {
    pub fn new(body: ByteStream, rewrite: SseRewrite) -> Self {
        Self {
            events: body.into_sse_stream(),
            rewrite,
            queue: VecDeque::new(),
            finished: false,
        }
    }

    pub fn into_byte_stream(self) -> ByteStream {
        Box::pin(self)
    }
}

impl Stream for SseRewriteStream {
    type Item = Result<Bytes, LlmError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(bytes) = this.queue.pop_front() {
            return Poll::Ready(Some(Ok(bytes)));
        }
        if this.finished {
            return Poll::Ready(None);
        }
        match this.events.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(mut event))) => {
                let rewritten = (this.rewrite)(event.data.as_bytes());
                event.data = String::from_utf8_lossy(&rewritten).into_owned();
                this.queue.push_back(encode_sse_event(&event));
                Poll::Ready(this.queue.pop_front().map(Ok))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Ready-made rewrite policies.
pub struct ReplaceSseContent;

impl ReplaceSseContent {
    /// Byte-to-byte rewrite.
    pub fn bytes<F>(f: F) -> SseRewrite
    where
        F: Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    {
        Arc::new(f)
    }

    /// Text-to-text rewrite. Payloads that are not valid UTF-8 pass through untouched.
    pub fn text<F>(f: F) -> SseRewrite
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Arc::new(move |data: &[u8]| match std::str::from_utf8(data) {
            Ok(text) => f(text).into_bytes(),
            Err(_) => data.to_vec(),
        })
    }

    /// Replace every occurrence of `from` with `to`.
    pub fn search_replace(from: impl Into<String>, to: impl Into<String>) -> SseRewrite {
        let from = from.into();
        let to = to.into();
        Self::text(move |text| text.replace(&from, &to))
    }

    /// Apply `rewrite` to `body`.
    pub fn wrap(body: ByteStream, rewrite: SseRewrite) -> ByteStream {
        SseRewriteStream::new(body, rewrite).into_byte_stream()
    }
}
