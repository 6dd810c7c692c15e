//! Ratchet: a register that only moves upward.
//!
//! Merge keeps the greater value, so the register converges to the maximum
//! ever assigned on any replica. Useful for high-water marks and
//! monotonically advancing versions.

use crate::json::{JsonCodec, expect_type};
use crate::{CrdtError, CrdtResult, DeltaCrdt};
use replikit_types::{Timestamp, VersionVector};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A monotonic register ordered by `T: Ord`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ratchet<T> {
    value: Option<T>,
    timestamp: Option<Timestamp>,
}

impl<T> Default for Ratchet<T> {
    fn default() -> Self {
        Self {
            value: None,
            timestamp: None,
        }
    }
}

impl<T: Ord> Ratchet<T> {
    /// Creates an empty ratchet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current (maximum) value.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Returns the timestamp of the write that set the current value.
    #[must_use]
    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp
    }

    /// Assigns `value` if it is strictly greater than the current one.
    pub fn assign(&mut self, value: T, timestamp: Timestamp) -> bool {
        let accept = match &self.value {
            None => true,
            Some(current) => value > *current,
        };
        if accept {
            self.value = Some(value);
            self.timestamp = Some(timestamp);
        }
        accept
    }
}

impl<T: Ord + Clone> DeltaCrdt for Ratchet<T> {
    const TYPE_NAME: &'static str = "Ratchet";

    fn generate_delta(&self, since: &VersionVector) -> Self {
        match self.timestamp {
            Some(ts) if !since.contains(&ts) => self.clone(),
            _ => Self::default(),
        }
    }

    /// Keeps the greater value; equal values keep the greater timestamp.
    fn merge(&mut self, delta: &Self) {
        let (Some(value), Some(ts)) = (&delta.value, delta.timestamp) else {
            return;
        };
        let take = match &self.value {
            None => true,
            Some(current) => match value.cmp(current) {
                Ordering::Greater => true,
                Ordering::Less => false,
                Ordering::Equal => self.timestamp.is_none_or(|mine| ts > mine),
            },
        };
        if take {
            self.value = Some(value.clone());
            self.timestamp = Some(ts);
        }
    }

    fn causal_context(&self) -> VersionVector {
        self.timestamp.iter().collect()
    }
}

/// JSON form: `{"_type":"Ratchet","_metadata":<Timestamp>,"value":<V>}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RatchetWire<T> {
    #[serde(rename = "_type")]
    kind: String,
    #[serde(rename = "_metadata")]
    metadata: Option<Timestamp>,
    value: Option<T>,
}

impl<T> JsonCodec for Ratchet<T>
where
    T: Ord + Clone + Serialize + serde::de::DeserializeOwned,
{
    type Wire = RatchetWire<T>;
    const WIRE_TYPE: Option<&'static str> = Some(Self::TYPE_NAME);

    fn to_wire(&self) -> Self::Wire {
        RatchetWire {
            kind: Self::TYPE_NAME.to_string(),
            metadata: self.timestamp,
            value: self.value.clone(),
        }
    }

    fn from_wire(wire: Self::Wire) -> CrdtResult<Self> {
        expect_type(&wire.kind, Self::TYPE_NAME)?;
        match (wire.value, wire.metadata) {
            (Some(value), Some(ts)) => Ok(Self {
                value: Some(value),
                timestamp: Some(ts),
            }),
            (None, None) => Ok(Self::default()),
            _ => Err(CrdtError::Malformed(
                "Ratchet value and _metadata must be present together".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replikit_types::ReplicaId;

    fn ts(n: u8, counter: u64) -> Timestamp {
        Timestamp::new(
            ReplicaId::from_uuid(uuid::Uuid::from_bytes([n; 16])),
            counter,
        )
    }

    #[test]
    fn assign_only_moves_up() {
        let mut r = Ratchet::new();
        assert!(r.assign(5, ts(1, 1)));
        assert!(!r.assign(3, ts(1, 2)));
        assert!(r.assign(9, ts(1, 3)));
        assert_eq!(r.value(), Some(&9));
    }

    #[test]
    fn merge_keeps_maximum_regardless_of_timestamp() {
        let mut a = Ratchet::new();
        a.assign(10, ts(1, 1));
        let mut b = Ratchet::new();
        b.assign(4, ts(2, 8));

        assert_eq!(a.merged(&b).value(), Some(&10));
        assert_eq!(b.merged(&a).value(), Some(&10));
    }

    #[test]
    fn equal_values_converge_on_timestamp() {
        let mut a = Ratchet::new();
        a.assign(7, ts(1, 2));
        let mut b = Ratchet::new();
        b.assign(7, ts(2, 2));

        assert_eq!(a.merged(&b), b.merged(&a));
        assert_eq!(a.merged(&b).timestamp(), Some(ts(2, 2)));
    }
}
