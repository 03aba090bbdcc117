//! HTTP transport abstraction
//!
//! Adapters never talk to `reqwest` directly. They hand a fully built request to an
//! injectable `HttpTransport`, which lets tests replay recorded captures
//! (`crate::testing::DumpTransport`) through exactly the same code path.

mod reqwest_transport;

pub use reqwest_transport::ReqwestTransport;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use futures_util::StreamExt;
use reqwest::Method;
use reqwest::header::HeaderMap;

use crate::error::LlmError;

/// Response body as a sequence of network reads. Read boundaries carry no meaning.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send>>;

/// Transport-level request data.
#[derive(Debug, Clone)]
pub struct HttpTransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl HttpTransportRequest {
    pub fn post_json(url: impl Into<String>, headers: HeaderMap, body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers,
            body: Some(body),
        }
    }

    pub fn post_empty(url: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers,
            body: None,
        }
    }

    pub fn get(url: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers,
            body: None,
        }
    }
}

/// Buffered response.
#[derive(Debug, Clone)]
pub struct HttpTransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpTransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into `LlmError::ApiError`.
    pub fn error_for_status(self) -> Result<Self, LlmError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(LlmError::api_error(
            self.status,
            String::from_utf8_lossy(&self.body).into_owned(),
        ))
    }

    pub fn json(&self) -> Result<serde_json::Value, LlmError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Streaming response; the body is read lazily.
pub struct HttpTransportStreamResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl std::fmt::Debug for HttpTransportStreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransportStreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl HttpTransportStreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// On a non-2xx status, drain the body and turn it into `LlmError::ApiError`.
    pub async fn error_for_status(self) -> Result<Self, LlmError> {
        if self.is_success() {
            return Ok(self);
        }
        let status = self.status;
        let mut body = self.body;
        let mut buf = Vec::new();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => buf.extend_from_slice(&bytes),
                Err(_) => break,
            }
        }
        Err(LlmError::api_error(
            status,
            String::from_utf8_lossy(&buf).into_owned(),
        ))
    }
}

/// Pluggable HTTP transport.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a request and buffer the whole response body.
    async fn execute_json(
        &self,
        request: HttpTransportRequest,
    ) -> Result<HttpTransportResponse, LlmError>;

    /// Send a request and return once headers are available.
    async fn execute_stream(
        &self,
        request: HttpTransportRequest,
    ) -> Result<HttpTransportStreamResponse, LlmError>;
}
