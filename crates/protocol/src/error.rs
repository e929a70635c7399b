//! Protocol error types

use thiserror::Error;

/// Errors raised while interpreting monitor text or device identifiers
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A `Class` continuation line appeared before any `Bus` line
    #[error("Continuation line without a preceding device line: {line:?}")]
    OrphanContinuation { line: String },

    /// Identifier cannot be split into vendor and product ids
    #[error("Invalid device identifier '{0}', expected vendor:product")]
    InvalidIdentifier(String),

    /// Unknown command dialect name
    #[error("Unknown command dialect '{0}'")]
    UnknownDialect(String),
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;
