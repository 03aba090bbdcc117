//! Core Data Type Definitions
//!
//! ## Module Organization
//!
//! - **`content`** - Neutral messages and content blocks
//! - **`segment`** - Decoded stream segments, usage and finish reasons
//! - **`request`** - Chat requests and model configuration
//! - **`response`** - Aggregated responses and the OpenAI final-chunk mapping
//!
//! Everything is re-exported at this module root.

pub mod content;
pub mod request;
pub mod response;
pub mod segment;

pub use content::*;
pub use request::*;
pub use response::*;
pub use segment::*;
