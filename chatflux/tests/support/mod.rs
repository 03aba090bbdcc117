//! Shared helpers for the integration tests
//!
//! - Load recorded dumps from `tests/fixtures/<protocol>/`
//! - Build adapters that replay a dump instead of touching the network

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use chatflux::testing::{DumpTransport, HttpDump};
use chatflux::{ApiType, ChatAdapter, ProviderConfig, Vendor, build_adapter};

pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

pub fn load_dump(relative: &str) -> HttpDump {
    let path = fixtures_dir().join(relative);
    HttpDump::parse_file(&path).unwrap_or_else(|e| panic!("load {}: {e}", path.display()))
}

/// Config pointing at the captured request's base URL (everything before the API path).
pub fn config_for(dump: &HttpDump, api_type: ApiType, vendor: Vendor) -> ProviderConfig {
    let suffix = match api_type {
        ApiType::ChatCompletions => "/chat/completions",
        ApiType::Responses => "/responses",
        ApiType::AnthropicMessages => "/messages",
    };
    let base_url = dump
        .request
        .url
        .strip_suffix(suffix)
        .unwrap_or(&dump.request.url)
        .to_string();
    ProviderConfig::new(api_type, base_url, "sk-test").with_vendor(vendor)
}

/// Adapter replaying `relative`, plus the transport for request inspection.
pub fn replay(
    relative: &str,
    api_type: ApiType,
    vendor: Vendor,
) -> (Arc<dyn ChatAdapter>, DumpTransport) {
    let dump = load_dump(relative);
    let transport = DumpTransport::new(&dump);
    let adapter = build_adapter(config_for(&dump, api_type, vendor), Arc::new(transport.clone()))
        .expect("adapter for fixture");
    (adapter, transport)
}

/// Same as [`replay`], but every outgoing body must match the captured one.
pub fn replay_validating(
    relative: &str,
    api_type: ApiType,
    vendor: Vendor,
) -> (Arc<dyn ChatAdapter>, DumpTransport) {
    let dump = load_dump(relative);
    let transport = DumpTransport::validating_request(&dump);
    let adapter = build_adapter(config_for(&dump, api_type, vendor), Arc::new(transport.clone()))
        .expect("adapter for fixture");
    (adapter, transport)
}
