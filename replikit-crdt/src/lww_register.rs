//! Last-Writer-Wins Register (LWW-Register).
//!
//! A CRDT that stores a single value. Concurrent writes are resolved by
//! comparing timestamps: the write with the greatest timestamp wins, and the
//! replica id inside the timestamp breaks counter ties.
//!
//! Use cases:
//! - Single-value properties (a title, a status flag)
//! - Any field where "last write wins" semantics are acceptable

use crate::json::{JsonCodec, expect_type};
use crate::{CrdtError, CrdtResult, DeltaCrdt};
use replikit_types::{Timestamp, VersionVector};
use serde::{Deserialize, Serialize};

/// A Last-Writer-Wins Register.
///
/// Holds at most one value together with the timestamp that assigned it.
/// A write replaces the stored value only if its timestamp is strictly
/// greater; an equal timestamp is the same write and never overwrites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LWWRegister<T> {
    value: Option<T>,
    timestamp: Option<Timestamp>,
}

impl<T> Default for LWWRegister<T> {
    fn default() -> Self {
        Self {
            value: None,
            timestamp: None,
        }
    }
}

impl<T> LWWRegister<T> {
    /// Creates an empty register.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a register holding `value`, assigned at `timestamp`.
    #[must_use]
    pub fn with_value(value: T, timestamp: Timestamp) -> Self {
        Self {
            value: Some(value),
            timestamp: Some(timestamp),
        }
    }

    /// Returns a reference to the current value.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Returns the timestamp of the winning write.
    #[must_use]
    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp
    }

    /// Returns true if nothing was ever assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timestamp.is_none()
    }

    /// Assigns `value` at `timestamp`.
    ///
    /// Returns true if the write won, false if a newer or identical write
    /// was already stored.
    pub fn assign(&mut self, value: T, timestamp: Timestamp) -> bool {
        if self.wins(timestamp) {
            self.value = Some(value);
            self.timestamp = Some(timestamp);
            true
        } else {
            false
        }
    }

    /// Determines if an incoming write should replace the current value.
    fn wins(&self, timestamp: Timestamp) -> bool {
        self.timestamp.is_none_or(|current| timestamp > current)
    }
}

impl<T: Clone> DeltaCrdt for LWWRegister<T> {
    const TYPE_NAME: &'static str = "LWWRegister";

    fn generate_delta(&self, since: &VersionVector) -> Self {
        match self.timestamp {
            Some(ts) if !since.contains(&ts) => self.clone(),
            _ => Self::default(),
        }
    }

    /// The value with the greater timestamp wins.
    fn merge(&mut self, delta: &Self) {
        if let (Some(value), Some(ts)) = (&delta.value, delta.timestamp) {
            if self.wins(ts) {
                self.value = Some(value.clone());
                self.timestamp = Some(ts);
            }
        }
    }

    fn causal_context(&self) -> VersionVector {
        self.timestamp.iter().collect()
    }
}

/// JSON form: `{"_type":"LWWRegister","_metadata":<Timestamp>,"value":<V>}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct LWWRegisterWire<T> {
    #[serde(rename = "_type")]
    kind: String,
    #[serde(rename = "_metadata")]
    metadata: Option<Timestamp>,
    value: Option<T>,
}

impl<T> JsonCodec for LWWRegister<T>
where
    T: Clone + Serialize + serde::de::DeserializeOwned,
{
    type Wire = LWWRegisterWire<T>;
    const WIRE_TYPE: Option<&'static str> = Some(Self::TYPE_NAME);

    fn to_wire(&self) -> Self::Wire {
        LWWRegisterWire {
            kind: Self::TYPE_NAME.to_string(),
            metadata: self.timestamp,
            value: self.value.clone(),
        }
    }

    fn from_wire(wire: Self::Wire) -> CrdtResult<Self> {
        expect_type(&wire.kind, Self::TYPE_NAME)?;
        match (wire.value, wire.metadata) {
            (Some(value), Some(ts)) => Ok(Self::with_value(value, ts)),
            (None, None) => Ok(Self::default()),
            (Some(_), None) => Err(CrdtError::Malformed(
                "LWWRegister value without _metadata timestamp".to_string(),
            )),
            // A value that itself encodes as null.
            (None, Some(ts)) => serde_json::from_value(serde_json::Value::Null)
                .map(|value| Self::with_value(value, ts))
                .map_err(|_| {
                    CrdtError::Malformed("LWWRegister timestamp without value".to_string())
                }),
        }
    }
}
