//! Core error types

use thiserror::Error;

/// Errors produced while building requests, talking to upstream vendors
/// or decoding their responses.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// Transport-level HTTP failure (request could not complete).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Connection could not be established.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Request timed out.
    #[error("Timeout error: {0}")]
    TimeoutError(String),

    /// Upstream answered with a non-success status.
    #[error("API error {code}: {message}")]
    ApiError {
        code: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Upstream reported an error inside an otherwise successful response,
    /// e.g. an `error` SSE event or a failed background response.
    #[error("Upstream error{}: {message}", code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default())]
    UpstreamError {
        code: Option<String>,
        message: String,
    },

    /// Payload could not be interpreted.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    JsonError(String),

    /// Failure while reading or decoding a response stream.
    #[error("Stream error: {0}")]
    StreamError(String),

    /// The caller cancelled the request.
    #[error("Request cancelled")]
    Cancelled,

    /// Missing or invalid configuration, detected before any network call.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// A request parameter is invalid for the selected vendor.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The adapter does not support the requested operation.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Internal invariant violated.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// User-facing error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InsufficientBalance,
    InvalidModel,
    BadParameter,
    UpstreamError,
    InternalConfigIssue,
    Cancelled,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InsufficientBalance => "insufficient_balance",
            ErrorCode::InvalidModel => "invalid_model",
            ErrorCode::BadParameter => "bad_parameter",
            ErrorCode::UpstreamError => "upstream_error",
            ErrorCode::InternalConfigIssue => "internal_config_issue",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl LlmError {
    /// Build an `ApiError` from a status code and raw body text.
    ///
    /// When the body is JSON, `error.message` (or `message`) is used as the message
    /// and the full document is kept as details.
    pub fn api_error(code: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let details = serde_json::from_str::<serde_json::Value>(&body).ok();
        let message = details
            .as_ref()
            .and_then(|v| {
                v.get("error")
                    .and_then(|e| e.get("message").or(Some(e)))
                    .or_else(|| v.get("message"))
            })
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or(body);
        Self::ApiError {
            code,
            message,
            details,
        }
    }

    pub fn upstream(code: Option<String>, message: impl Into<String>) -> Self {
        Self::UpstreamError {
            code,
            message: message.into(),
        }
    }

    /// HTTP status code when the error came from an upstream response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ApiError { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Map to the code surfaced to end users.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::ApiError {
                code,
                message,
                details,
            } => {
                let vendor_code = details
                    .as_ref()
                    .and_then(|d| d.get("error"))
                    .and_then(|e| e.get("code").or_else(|| e.get("type")))
                    .and_then(|c| c.as_str())
                    .unwrap_or_default();
                if *code == 402 || vendor_code == "insufficient_quota" {
                    ErrorCode::InsufficientBalance
                } else if *code == 404
                    || vendor_code == "model_not_found"
                    || message.to_ascii_lowercase().contains("model not found")
                {
                    ErrorCode::InvalidModel
                } else if *code == 400 || *code == 422 {
                    ErrorCode::BadParameter
                } else {
                    ErrorCode::UpstreamError
                }
            }
            Self::UpstreamError { .. }
            | Self::HttpError(_)
            | Self::ConnectionError(_)
            | Self::TimeoutError(_)
            | Self::ParseError(_)
            | Self::JsonError(_)
            | Self::StreamError(_) => ErrorCode::UpstreamError,
            Self::InvalidParameter(_) => ErrorCode::BadParameter,
            Self::ConfigurationError(_) | Self::UnsupportedOperation(_) => {
                ErrorCode::InternalConfigIssue
            }
            Self::Cancelled => ErrorCode::Cancelled,
            Self::InternalError(_) => ErrorCode::Unknown,
        }
    }

    /// Whether a caller-side retry policy may reasonably retry this error.
    /// The engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ApiError { code, .. } => *code == 429 || *code >= 500,
            Self::ConnectionError(_) | Self::TimeoutError(_) => true,
            _ => false,
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
