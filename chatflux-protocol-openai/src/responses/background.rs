//! Background responses
//!
//! The request is stored upstream with `background: true` and polled until it leaves
//! `queued`/`in_progress`. Cancelling the caller's token also cancels the upstream
//! response.

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::OpenAiResponsesAdapter;
use super::request::build_body;
use super::response::parse_response;
use crate::common::{build_headers, str_at};
use crate::error::LlmError;
use crate::streaming::StreamFactory;
use crate::transport::HttpTransportRequest;
use crate::types::{ChatRequest, ChatSegment};
use crate::utils::sleep_cancellable;

fn is_running(status: Option<&str>) -> bool {
    matches!(status, Some("queued") | Some("in_progress"))
}

impl OpenAiResponsesAdapter {
    pub(super) async fn run_background(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<Result<ChatSegment, LlmError>>, LlmError> {
        let body = build_body(request, false, true)?;
        let headers = build_headers(&self.config, false)?;
        let created = StreamFactory::send_json(
            self.transport.as_ref(),
            HttpTransportRequest::post_json(self.config.endpoint("/responses"), headers.clone(), body),
            cancel,
        )
        .await?;
        let id = str_at(&created, "id")
            .ok_or_else(|| LlmError::upstream(None, "background response has no id"))?
            .to_string();
        let path = format!("/responses/{}", urlencoding::encode(&id));

        let mut response = created;
        let started = std::time::Instant::now();
        while is_running(str_at(&response, "status")) {
            tracing::debug!(
                response_id = %id,
                status = str_at(&response, "status").unwrap_or_default(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "background response still running"
            );
            let polled = match sleep_cancellable(cancel, self.options.poll_interval).await {
                Ok(()) => {
                    StreamFactory::send_json(
                        self.transport.as_ref(),
                        HttpTransportRequest::get(
                            self.config.endpoint(&path),
                            headers.clone(),
                        ),
                        cancel,
                    )
                    .await
                }
                Err(e) => Err(e),
            };
            response = match polled {
                Ok(json) => json,
                Err(e) if e.is_cancellation() => {
                    self.cancel_upstream(&id, &path).await;
                    return Err(e);
                }
                Err(e) => return Err(e),
            };
        }
        tracing::info!(
            response_id = %id,
            status = str_at(&response, "status").unwrap_or_default(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "background response finished"
        );
        Ok(parse_response(&response))
    }

    /// Best effort; the caller already gave up on this response.
    async fn cancel_upstream(&self, id: &str, path: &str) {
        let headers = match build_headers(&self.config, false) {
            Ok(headers) => headers,
            Err(_) => return,
        };
        let request = HttpTransportRequest::post_empty(
            self.config.endpoint(&format!("{path}/cancel")),
            headers,
        );
        match self.transport.execute_json(request).await {
            Ok(response) if response.is_success() => {
                tracing::info!(response_id = %id, "cancelled background response");
            }
            Ok(response) => {
                tracing::warn!(response_id = %id, status = response.status, "cancel request rejected");
            }
            Err(e) => tracing::warn!(response_id = %id, error = %e, "cancel request failed"),
        }
    }
}
