//! Utility types shared by every layer.
//!
//! - [`PlainOldDataType`] - On-disk element type codes
//! - [`Element`] - Numeric types usable as dataset payloads
//! - [`Error`] / [`Result`] - Error handling

mod pod;
mod error;

pub use pod::*;
pub use error::*;
