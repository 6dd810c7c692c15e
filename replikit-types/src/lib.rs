//! Causal-context primitives for replikit.
//!
//! This crate defines the leaf types every replicated data type builds on:
//! - Replica identifiers (UUID v7)
//! - Logical timestamps, totally ordered by counter then replica
//! - Version vectors summarizing which timestamps a state has absorbed
//! - The [`Environment`] that mints timestamps for one replica
//!
//! The data types themselves live in `replikit-crdt`.

mod environment;
mod ids;
mod timestamp;
mod version_vector;

pub use environment::{Environment, ReplicaEnvironment};
pub use ids::ReplicaId;
pub use timestamp::Timestamp;
pub use version_vector::{CausalOrder, VersionVector};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The environment cannot mint a counter past `u64::MAX`.
    #[error("timestamp counter overflow for replica {replica} (last counter {counter})")]
    Overflow { replica: ReplicaId, counter: u64 },

    #[error("invalid replica id: {0}")]
    InvalidReplicaId(#[from] uuid::Error),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
