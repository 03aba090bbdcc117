//! Cancellation utilities
//!
//! Every call takes a caller-owned `CancellationToken`. These helpers race it against
//! stream reads and one-shot futures. Dropping the wrapped stream drops the response
//! body, which releases the HTTP connection so the vendor stops generating.

use std::future::Future;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;
use crate::streaming::ChatSegmentStream;

/// Wrap a segment stream so that cancellation ends it promptly.
///
/// On cancellation a single `Err(LlmError::Cancelled)` is yielded and the inner stream
/// is dropped. The stream also ends after the first error it forwards.
pub fn make_cancellable(stream: ChatSegmentStream, token: CancellationToken) -> ChatSegmentStream {
    let mut inner = stream;
    Box::pin(async_stream::stream! {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    yield Err(LlmError::Cancelled);
                    break;
                }
                item = inner.next() => {
                    let Some(item) = item else { break };
                    let failed = item.is_err();
                    yield item;
                    if failed {
                        break;
                    }
                }
            }
        }
    })
}

/// Run `future` unless `token` fires first.
pub async fn run_cancellable<F, T>(token: &CancellationToken, future: F) -> Result<T, LlmError>
where
    F: Future<Output = Result<T, LlmError>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(LlmError::Cancelled),
        out = future => out,
    }
}

/// Sleep for `duration` unless `token` fires first.
pub async fn sleep_cancellable(token: &CancellationToken, duration: std::time::Duration) -> Result<(), LlmError> {
    run_cancellable(token, async {
        tokio::time::sleep(duration).await;
        Ok(())
    })
    .await
}
