//! Provider configuration
//!
//! Immutable per-vendor settings. A `ProviderConfig` is validated before any network
//! call and doubles as the key for the adapter and HTTP client caches.

use std::collections::BTreeMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::LlmError;

/// Upstream wire protocol.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ApiType {
    ChatCompletions,
    Responses,
    AnthropicMessages,
}

/// Vendor quirks profile on top of the wire protocol.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    #[serde(rename = "openai")]
    OpenAI,
    DeepSeek,
    MiniMax,
    Mimo,
    Moonshot,
    SiliconFlow,
    /// Baidu Wenxin Qianfan.
    QianFan,
    #[serde(rename = "azure_ai_foundry")]
    AzureAIFoundry,
    #[default]
    Generic,
}

/// Transport-level settings that determine which pooled HTTP client is used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TransportSettings {
    pub timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
}

impl TransportSettings {
    /// Read timeout; defaults to 24h because reasoning streams can stay open for a long time.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(24 * 60 * 60))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.unwrap_or(30))
    }
}

/// Settings for one upstream provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub api_type: ApiType,
    #[serde(default)]
    pub vendor: Vendor,
    pub base_url: String,
    pub api_key: SecretString,
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
}

/// Hashable identity of a `ProviderConfig`. The API key only contributes a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderCacheKey {
    api_type: ApiType,
    vendor: Vendor,
    base_url: String,
    key_fingerprint: u64,
    extra_headers: BTreeMap<String, String>,
    transport: TransportSettings,
}

impl ProviderConfig {
    pub fn new(api_type: ApiType, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_type,
            vendor: Vendor::default(),
            base_url: base_url.into(),
            api_key: SecretString::from(api_key.into()),
            extra_headers: BTreeMap::new(),
            timeout_secs: None,
            connect_timeout_secs: None,
        }
    }

    pub fn with_vendor(mut self, vendor: Vendor) -> Self {
        self.vendor = vendor;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn validate(&self) -> Result<(), LlmError> {
        let url = self.base_url.trim();
        if url.is_empty() {
            return Err(LlmError::ConfigurationError(
                "base_url must not be empty".to_string(),
            ));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(LlmError::ConfigurationError(format!(
                "base_url must be an http(s) URL, got `{url}`"
            )));
        }
        Ok(())
    }

    /// `base_url` joined with `path`, tolerating slashes on either side.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            timeout_secs: self.timeout_secs,
            connect_timeout_secs: self.connect_timeout_secs,
        }
    }

    pub fn cache_key(&self) -> ProviderCacheKey {
        let mut hasher = DefaultHasher::new();
        self.api_key.expose_secret().hash(&mut hasher);
        ProviderCacheKey {
            api_type: self.api_type,
            vendor: self.vendor,
            base_url: self.base_url.clone(),
            key_fingerprint: hasher.finish(),
            extra_headers: self.extra_headers.clone(),
            transport: self.transport_settings(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_key() {
        let cfg = ProviderConfig::new(ApiType::ChatCompletions, "https://api.x.com/v1", "sk-secret");
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("sk-secret"));
        assert_eq!(cfg.api_key(), "sk-secret");
    }

    #[test]
    fn endpoint_joins_slashes() {
        let cfg = ProviderConfig::new(ApiType::ChatCompletions, "https://api.x.com/v1/", "k");
        assert_eq!(
            cfg.endpoint("/chat/completions"),
            "https://api.x.com/v1/chat/completions"
        );
    }

    #[test]
    fn validate_rejects_empty_and_non_http_urls() {
        assert!(ProviderConfig::new(ApiType::Responses, "", "k").validate().is_err());
        assert!(
            ProviderConfig::new(ApiType::Responses, "ftp://x", "k")
                .validate()
                .is_err()
        );
        assert!(
            ProviderConfig::new(ApiType::Responses, "http://localhost:8080", "k")
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn cache_key_distinguishes_api_keys() {
        let a = ProviderConfig::new(ApiType::ChatCompletions, "https://x", "k1");
        let b = ProviderConfig::new(ApiType::ChatCompletions, "https://x", "k2");
        assert_ne!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), a.clone().cache_key());
    }

    #[test]
    fn deserializes_from_json() {
        let cfg: ProviderConfig = serde_json::from_str(
            r#"{"api_type":"chat_completions","vendor":"minimax","base_url":"https://api.minimax.io/v1","api_key":"k"}"#,
        )
        .unwrap();
        assert_eq!(cfg.vendor, Vendor::MiniMax);
        assert_eq!(cfg.api_type, ApiType::ChatCompletions);
    }

    #[test]
    fn vendor_names() {
        let names = [
            ("\"siliconflow\"", Vendor::SiliconFlow),
            ("\"qianfan\"", Vendor::QianFan),
            ("\"azure_ai_foundry\"", Vendor::AzureAIFoundry),
            ("\"openai\"", Vendor::OpenAI),
        ];
        for (json, vendor) in names {
            assert_eq!(serde_json::from_str::<Vendor>(json).unwrap(), vendor);
        }
    }
}
