//! Error types for CRDT operations.

use crate::b_counter::BoundMode;
use thiserror::Error;

/// Result type for CRDT operations.
pub type CrdtResult<T> = Result<T, CrdtError>;

/// Errors that can occur in CRDT operations.
///
/// Every failing operation leaves the receiver exactly as it was.
#[derive(Debug, Error)]
pub enum CrdtError {
    /// A merge or decode was handed a different concrete variant.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    /// A bounded counter would start outside its bound.
    #[error("value {value} violates bound {mode} {bound}")]
    BoundViolation {
        value: i64,
        bound: i64,
        mode: BoundMode,
    },

    /// A rights-consuming operation asked for more than the replica holds.
    #[error("insufficient rights: requested {requested}, available {available}")]
    InsufficientRights { requested: u64, available: u64 },

    /// Counter or rights accumulation would leave the representable range.
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    /// A JSON form is missing required fields or has the wrong shape.
    #[error("malformed input: {0}")]
    Malformed(String),

    /// The factory does not know the requested type name.
    #[error("unknown CRDT type: {0}")]
    UnknownType(String),

    /// A logical sequence index past the end.
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// The environment could not mint a timestamp.
    #[error("clock error: {0}")]
    Clock(#[from] replikit_types::Error),

    /// Encoding a state to JSON failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
