//! Logical timestamps.
//!
//! A timestamp pairs the replica that minted it with a counter. Counters are
//! Lamport-style: an environment always mints one more than the largest
//! counter it has seen from anyone, so a timestamp created after observing
//! another is strictly greater than it.

use crate::ReplicaId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A logical timestamp: `(replica, counter)`.
///
/// Totally ordered by `counter`, with ties broken by `replica`. Two distinct
/// writes never share a timestamp, because a replica never mints the same
/// counter twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Replica that minted this timestamp.
    replica: ReplicaId,
    /// Logical counter, starting at 1 for the first minted timestamp.
    counter: u64,
}

impl Timestamp {
    /// Creates a timestamp from components.
    ///
    /// Live code obtains timestamps from an [`Environment`](crate::Environment);
    /// this constructor exists for replay, decoding and tests.
    #[must_use]
    pub const fn new(replica: ReplicaId, counter: u64) -> Self {
        Self { replica, counter }
    }

    /// Returns the replica that minted this timestamp.
    #[must_use]
    pub const fn replica(&self) -> ReplicaId {
        self.replica
    }

    /// Returns the logical counter.
    #[must_use]
    pub const fn counter(&self) -> u64 {
        self.counter
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.counter.cmp(&other.counter) {
            Ordering::Equal => self.replica.cmp(&other.replica),
            other => other,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.counter, self.replica)
    }
}

impl FromStr for Timestamp {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (counter, replica) = s
            .split_once('@')
            .ok_or_else(|| crate::Error::InvalidTimestamp(s.to_string()))?;
        let counter = counter
            .parse()
            .map_err(|_| crate::Error::InvalidTimestamp(s.to_string()))?;
        Ok(Self::new(ReplicaId::parse(replica)?, counter))
    }
}
