//! Recorded HTTP exchanges for offline tests
//!
//! A dump is a captured request/response pair in plain HTTP/1.1 text:
//!
//! ```text
//! POST https://api.example.com/v1/chat/completions HTTP/1.1
//! Content-Type: application/json
//!
//! {"model":"m","messages":[...]}
//! HTTP/1.1 200 OK
//! Content-Type: text/event-stream
//!
//! data: {...}
//!
//! data: [DONE]
//! ```
//!
//! `DumpTransport` replays the response through the `HttpTransport` seam, one line per
//! body read, so SSE events reach the decoder split across reads the way they do on a
//! real socket.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::LlmError;
use crate::transport::{
    HttpTransport, HttpTransportRequest, HttpTransportResponse, HttpTransportStreamResponse,
};

mod json_diff;

pub use json_diff::{assert_same_json, json_diffs};

/// Request half of a dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpRequest {
    pub method: String,
    pub url: String,
    pub http_version: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// Response half of a dump. `chunks` are the raw body lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpResponse {
    pub status: u16,
    pub status_text: String,
    pub http_version: String,
    pub headers: BTreeMap<String, String>,
    pub chunks: Vec<String>,
}

impl DumpResponse {
    /// Body lines joined as captured, chunk-size lines included.
    pub fn raw_body(&self) -> String {
        self.chunks.join("\n")
    }

    /// Body with transfer-encoding chunk-size lines removed.
    pub fn dechunked_body(&self) -> String {
        self.chunks
            .iter()
            .filter(|line| !is_chunk_size_line(line))
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpDump {
    pub request: DumpRequest,
    pub response: DumpResponse,
}

impl HttpDump {
    pub fn parse(content: &str) -> Result<Self, LlmError> {
        let lines: Vec<&str> = content
            .split('\n')
            .map(|l| l.trim_end_matches('\r'))
            .collect();
        let response_start = lines
            .iter()
            .position(|l| l.starts_with("HTTP/"))
            .ok_or_else(|| LlmError::ParseError("dump has no HTTP response line".into()))?;

        let (request_lines, response_lines) = lines.split_at(response_start);
        Ok(Self {
            request: parse_request(request_lines)?,
            response: parse_response(response_lines)?,
        })
    }

    pub fn parse_file(path: impl AsRef<Path>) -> Result<Self, LlmError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LlmError::ConfigurationError(format!("cannot read dump {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    /// Captured request body as JSON, if it is JSON.
    pub fn request_json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.request.body).ok()
    }
}

fn parse_request(lines: &[&str]) -> Result<DumpRequest, LlmError> {
    let first = lines
        .first()
        .ok_or_else(|| LlmError::ParseError("dump has no request line".into()))?;
    let mut parts = first.splitn(3, ' ');
    let (Some(method), Some(url), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(LlmError::ParseError(format!("bad request line: {first}")));
    };
    let (headers, body_start) = parse_headers(&lines[1..]);
    let body = lines
        .get(1 + body_start..)
        .map(|rest| rest.concat())
        .unwrap_or_default();
    Ok(DumpRequest {
        method: method.to_string(),
        url: url.to_string(),
        http_version: version.to_string(),
        headers,
        body,
    })
}

fn parse_response(lines: &[&str]) -> Result<DumpResponse, LlmError> {
    let first = lines
        .first()
        .ok_or_else(|| LlmError::ParseError("dump has no status line".into()))?;
    let mut parts = first.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    let status = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| LlmError::ParseError(format!("bad status line: {first}")))?;
    let status_text = parts.next().unwrap_or_default();
    let (headers, body_start) = parse_headers(&lines[1..]);
    let chunks = lines
        .get(1 + body_start..)
        .map(|rest| rest.iter().map(|l| l.to_string()).collect())
        .unwrap_or_default();
    Ok(DumpResponse {
        status,
        status_text: status_text.to_string(),
        http_version: version.to_string(),
        headers,
        chunks,
    })
}

/// Headers up to the first blank line; returns them with the body offset.
fn parse_headers(lines: &[&str]) -> (BTreeMap<String, String>, usize) {
    let mut headers = BTreeMap::new();
    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            return (headers, i + 1);
        }
        if let Some((name, value)) = line.split_once(':')
            && !name.is_empty()
        {
            headers.insert(name.to_string(), value.trim_start().to_string());
        }
    }
    (headers, lines.len())
}

fn is_chunk_size_line(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && trimmed.len() <= 8 && trimmed.chars().all(|c| c.is_ascii_hexdigit())
}

/// `HttpTransport` that answers every request with a recorded response.
#[derive(Clone)]
pub struct DumpTransport {
    response: Arc<DumpResponse>,
    expected_body: Option<Arc<serde_json::Value>>,
    requests: Arc<Mutex<Vec<HttpTransportRequest>>>,
}

impl DumpTransport {
    pub fn new(dump: &HttpDump) -> Self {
        Self {
            response: Arc::new(dump.response.clone()),
            expected_body: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Also check every outgoing body against the captured request body.
    ///
    /// Panics when the captured body is not JSON.
    pub fn validating_request(dump: &HttpDump) -> Self {
        let expected = serde_json::from_str(&dump.request.body)
            .unwrap_or_else(|e| panic!("captured request body is not JSON: {e}"));
        Self::new(dump).with_expected_body(expected)
    }

    pub fn with_expected_body(mut self, body: serde_json::Value) -> Self {
        self.expected_body = Some(Arc::new(body));
        self
    }

    /// Requests seen so far, in order.
    pub fn requests(&self) -> Vec<HttpTransportRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn last_request(&self) -> Option<HttpTransportRequest> {
        self.requests().pop()
    }

    fn record(&self, request: HttpTransportRequest) {
        if let (Some(expected), Some(actual)) = (&self.expected_body, &request.body) {
            assert_same_json(expected, actual);
        }
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.response.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }
        headers
    }
}

#[async_trait]
impl HttpTransport for DumpTransport {
    async fn execute_json(
        &self,
        request: HttpTransportRequest,
    ) -> Result<HttpTransportResponse, LlmError> {
        self.record(request);
        Ok(HttpTransportResponse {
            status: self.response.status,
            headers: self.headers(),
            body: self.response.dechunked_body().into_bytes(),
        })
    }

    async fn execute_stream(
        &self,
        request: HttpTransportRequest,
    ) -> Result<HttpTransportStreamResponse, LlmError> {
        self.record(request);
        let reads: Vec<Result<Bytes, LlmError>> = self
            .response
            .chunks
            .iter()
            .map(|line| Ok(Bytes::from(format!("{line}\n"))))
            .collect();
        Ok(HttpTransportStreamResponse {
            status: self.response.status,
            headers: self.headers(),
            body: Box::pin(futures::stream::iter(reads)),
        })
    }
}
