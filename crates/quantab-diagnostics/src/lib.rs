//! Diagnostics and error handling for the quantab expression engine
//!
//! This crate provides the error infrastructure shared by the parser, the
//! variable compiler and the evaluation engine: error codes, source spans
//! and the `EngineError` taxonomy.

mod error;
mod error_code;
mod span;

pub use error::*;
pub use error_code::*;
pub use span::*;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
