//! Utility helpers

pub mod cancel;
pub mod json;

pub use cancel::*;
pub use json::json_f32;
