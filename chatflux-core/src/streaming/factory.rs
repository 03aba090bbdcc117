//! Stream Factory
//!
//! Issues requests through an `HttpTransport` and turns response bodies into segment
//! streams. Every await point races the caller's cancellation token.

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use super::converters::SseEventConverter;
use super::sse::SseStreamExt;
use super::types::ChatSegmentStream;
use crate::error::LlmError;
use crate::transport::{ByteStream, HttpTransport, HttpTransportRequest};

pub struct StreamFactory;

impl StreamFactory {
    /// Send a streaming request and return its body once headers arrived.
    ///
    /// Non-2xx responses are drained and surfaced as `LlmError::ApiError`.
    pub async fn open(
        transport: &dyn HttpTransport,
        request: HttpTransportRequest,
        cancel: &CancellationToken,
    ) -> Result<ByteStream, LlmError> {
        tracing::debug!(url = %request.url, "opening stream");
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            response = transport.execute_stream(request) => response?,
        };
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            response = response.error_for_status() => response,
        };
        match response {
            Ok(response) => Ok(response.body),
            Err(e) => {
                tracing::error!(error = %e, "upstream rejected streaming request");
                Err(e)
            }
        }
    }

    /// Send a request and parse the buffered JSON body.
    pub async fn send_json(
        transport: &dyn HttpTransport,
        request: HttpTransportRequest,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, LlmError> {
        tracing::debug!(url = %request.url, method = %request.method, "sending request");
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            response = transport.execute_json(request) => response?,
        };
        let response = response.error_for_status().inspect_err(|e| {
            tracing::error!(error = %e, "upstream rejected request");
        })?;
        response.json()
    }

    /// Decode an SSE body through `converter`.
    ///
    /// Empty payloads and `[DONE]` are skipped. The stream stops after the first error
    /// item; on cancellation it yields `LlmError::Cancelled` and drops the body.
    pub fn sse_segments<C>(
        body: ByteStream,
        mut converter: C,
        cancel: CancellationToken,
    ) -> ChatSegmentStream
    where
        C: SseEventConverter + 'static,
    {
        let stream = async_stream::stream! {
            let mut events = body.into_sse_stream();
            let mut failed = false;
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    item = events.next() => Some(item),
                };
                let Some(item) = next else {
                    yield Err(LlmError::Cancelled);
                    failed = true;
                    break;
                };
                let Some(item) = item else { break };
                match item {
                    Ok(event) => {
                        let data = event.data.trim();
                        if data.is_empty() || data == "[DONE]" {
                            continue;
                        }
                        for segment in converter.convert_event(event) {
                            failed = segment.is_err();
                            yield segment;
                            if failed {
                                break;
                            }
                        }
                        if failed {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "stream read failed");
                        yield Err(e);
                        failed = true;
                        break;
                    }
                }
            }
            if !failed {
                for segment in converter.handle_stream_end() {
                    yield segment;
                }
            }
        };
        Box::pin(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatSegment;
    use bytes::Bytes;
    use eventsource_stream::Event;

    struct Echo;

    impl SseEventConverter for Echo {
        fn convert_event(&mut self, event: Event) -> Vec<Result<ChatSegment, LlmError>> {
            if event.data == "boom" {
                return vec![Err(LlmError::upstream(None, "boom"))];
            }
            vec![Ok(ChatSegment::text(event.data))]
        }

        fn handle_stream_end(&mut self) -> Vec<Result<ChatSegment, LlmError>> {
            vec![Ok(ChatSegment::text("end"))]
        }
    }

    fn body(parts: Vec<&'static str>) -> ByteStream {
        Box::pin(futures::stream::iter(
            parts
                .into_iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        ))
    }

    #[tokio::test]
    async fn skips_done_and_calls_stream_end() {
        let stream = StreamFactory::sse_segments(
            body(vec!["data: a\n\ndata: \n\ndata: [DONE]\n\n"]),
            Echo,
            CancellationToken::new(),
        );
        let out: Vec<_> = stream.map(|s| s.unwrap()).collect().await;
        assert_eq!(out, vec![ChatSegment::text("a"), ChatSegment::text("end")]);
    }

    #[tokio::test]
    async fn stops_after_error_without_stream_end() {
        let stream = StreamFactory::sse_segments(
            body(vec!["data: a\n\ndata: boom\n\ndata: b\n\n"]),
            Echo,
            CancellationToken::new(),
        );
        let out: Vec<_> = stream.collect().await;
        assert_eq!(out.len(), 2);
        assert!(out[1].is_err());
    }

    #[tokio::test]
    async fn cancelled_token_ends_stream_with_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pending: ByteStream = Box::pin(futures::stream::pending());
        let out: Vec<_> = StreamFactory::sse_segments(pending, Echo, cancel)
            .collect()
            .await;
        assert_eq!(out, vec![Err(LlmError::Cancelled)]);
    }
}
