//! chatflux-core
//!
//! Vendor-agnostic runtime shared by the protocol crates: HTTP transport, SSE decoding
//! and rewriting, the think-tag parser, the turn-boundary filter, segment aggregation,
//! the adapter trait and the chat entry pipeline.
#![deny(unsafe_code)]

pub mod adapter;
pub mod aggregate;
pub mod client_cache;
pub mod config;
pub mod encoding;
pub mod streaming;
pub mod testing;
pub mod think_tag;
pub mod transport;
pub mod turn_filter;
pub mod utils;

pub use chatflux_spec::{error, types};

pub use adapter::{ChatAdapter, chat_entry, download_vision_links, preprocess};
pub use aggregate::ChatAggregator;
pub use client_cache::HttpClientCache;
pub use config::{ApiType, ProviderCacheKey, ProviderConfig, TransportSettings, Vendor};
pub use error::LlmError;
pub use streaming::ChatSegmentStream;
pub use transport::{HttpTransport, ReqwestTransport};
