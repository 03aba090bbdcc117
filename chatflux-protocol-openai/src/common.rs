//! Helpers shared by Chat Completions and Responses.

use base64::Engine;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::error::LlmError;

/// Bearer auth, JSON content type, SSE accept when streaming, then configured extras.
pub(crate) fn build_headers(config: &ProviderConfig, streaming: bool) -> Result<HeaderMap, LlmError> {
    let mut headers = HeaderMap::new();
    let auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key()))
        .map_err(|_| LlmError::ConfigurationError("API key is not a valid header value".into()))?;
    headers.insert(AUTHORIZATION, auth);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if streaming {
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
    }
    for (name, value) in &config.extra_headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| LlmError::ConfigurationError(format!("invalid header name {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| LlmError::ConfigurationError(format!("invalid header value: {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

pub(crate) fn data_uri(bytes: &[u8], media_type: &str) -> String {
    format!(
        "data:{media_type};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

pub(crate) fn u32_at(value: &Value, pointer: &str) -> u32 {
    value
        .pointer(pointer)
        .and_then(Value::as_u64)
        .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

pub(crate) fn str_at<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

pub(crate) fn unresolved_file(file_id: &str) -> LlmError {
    LlmError::ConfigurationError(format!(
        "file {file_id} must be resolved to a URL or blob before it is sent upstream"
    ))
}

/// `code` and `message` of an upstream error payload, from either the flat
/// `{code, message}` form or the `{error: {...}}` envelope.
pub(crate) fn error_fields(json: &Value) -> (Option<String>, String) {
    let envelope = json.get("error").unwrap_or(json);
    let code = envelope
        .get("code")
        .or_else(|| json.get("code"))
        .and_then(|c| match c {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
    let message = str_at(envelope, "message")
        .or_else(|| str_at(json, "message"))
        .map(str::to_string)
        .or_else(|| envelope.as_str().map(str::to_string))
        .unwrap_or_else(|| envelope.to_string());
    (code, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiType;
    use serde_json::json;

    #[test]
    fn headers_carry_bearer_and_extras() {
        let config = ProviderConfig::new(ApiType::ChatCompletions, "https://x/v1", "sk-1")
            .with_header("x-trace", "abc");
        let headers = build_headers(&config, true).unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer sk-1");
        assert_eq!(headers[ACCEPT], "text/event-stream");
        assert_eq!(headers["x-trace"], "abc");
    }

    #[test]
    fn error_fields_accept_both_shapes() {
        let flat = json!({"type": "error", "code": "rate_limited", "message": "slow down"});
        assert_eq!(error_fields(&flat), (Some("rate_limited".into()), "slow down".into()));
        let nested = json!({"error": {"code": 500, "message": "boom"}});
        assert_eq!(error_fields(&nested), (Some("500".into()), "boom".into()));
    }

    #[test]
    fn data_uri_encodes_blob() {
        assert_eq!(data_uri(b"hi", "image/png"), "data:image/png;base64,aGk=");
    }
}
