//! Last-Writer-Wins Map.
//!
//! A map of independent LWW registers addressed by `(key, ValueKind)`. The
//! same key name may carry one boolean, one double, one integer and one
//! string register side by side.
//!
//! Deleting a key writes a tombstone (an absent value with a timestamp)
//! rather than dropping the entry, so a late-arriving older write cannot
//! resurrect it.

use crate::json::{JsonCodec, expect_type};
use crate::scalar::{decode_key, encode_key};
use crate::{CrdtError, CrdtResult, DeltaCrdt, Scalar, ValueKind};
use replikit_types::{Timestamp, VersionVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One register slot: the winning value (None = deleted) and its timestamp.
#[derive(Debug, Clone, PartialEq)]
struct Entry {
    value: Option<Scalar>,
    timestamp: Timestamp,
}

/// A map of last-writer-wins registers, one per key and declared type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LWWMap {
    entries: BTreeMap<String, BTreeMap<ValueKind, Entry>>,
}

impl LWWMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns `value` under `key` at `timestamp`; the value's type picks the slot.
    ///
    /// Returns true if the write won.
    pub fn assign(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Scalar>,
        timestamp: Timestamp,
    ) -> bool {
        let value = value.into();
        let kind = value.kind();
        self.write(key.into(), kind, Some(value), timestamp)
    }

    /// Deletes the `kind` slot of `key` at `timestamp` by writing a tombstone.
    ///
    /// Returns true if the tombstone won.
    pub fn remove(&mut self, key: impl Into<String>, kind: ValueKind, timestamp: Timestamp) -> bool {
        self.write(key.into(), kind, None, timestamp)
    }

    fn write(
        &mut self,
        key: String,
        kind: ValueKind,
        value: Option<Scalar>,
        timestamp: Timestamp,
    ) -> bool {
        let slots = self.entries.entry(key).or_default();
        if slots
            .get(&kind)
            .is_some_and(|current| timestamp <= current.timestamp)
        {
            return false;
        }
        slots.insert(kind, Entry { value, timestamp });
        true
    }

    /// Returns the live value in the `kind` slot of `key`.
    #[must_use]
    pub fn get(&self, key: &str, kind: ValueKind) -> Option<&Scalar> {
        self.entry(key, kind).and_then(|e| e.value.as_ref())
    }

    #[must_use]
    pub fn get_boolean(&self, key: &str) -> Option<bool> {
        self.get(key, ValueKind::Boolean).and_then(Scalar::as_bool)
    }

    #[must_use]
    pub fn get_double(&self, key: &str) -> Option<f64> {
        self.get(key, ValueKind::Double).and_then(Scalar::as_f64)
    }

    #[must_use]
    pub fn get_integer(&self, key: &str) -> Option<i64> {
        self.get(key, ValueKind::Integer).and_then(Scalar::as_i64)
    }

    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key, ValueKind::String).and_then(Scalar::as_str)
    }

    /// Returns the timestamp of the winning write (or tombstone) in a slot.
    #[must_use]
    pub fn timestamp(&self, key: &str, kind: ValueKind) -> Option<Timestamp> {
        self.entry(key, kind).map(|e| e.timestamp)
    }

    /// Returns true if the slot holds a live value.
    #[must_use]
    pub fn contains(&self, key: &str, kind: ValueKind) -> bool {
        self.get(key, kind).is_some()
    }

    /// Iterates over live `(key, kind, value)` triples in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ValueKind, &Scalar)> {
        self.entries.iter().flat_map(|(key, slots)| {
            slots
                .iter()
                .filter_map(move |(kind, e)| e.value.as_ref().map(|v| (key.as_str(), *kind, v)))
        })
    }

    /// Iterates over live `(key, kind)` pairs.
    pub fn keys(&self) -> impl Iterator<Item = (&str, ValueKind)> {
        self.iter().map(|(key, kind, _)| (key, kind))
    }

    /// Returns the number of live slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns true if no slot holds a live value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, key: &str, kind: ValueKind) -> Option<&Entry> {
        self.entries.get(key).and_then(|slots| slots.get(&kind))
    }

    fn slots(&self) -> impl Iterator<Item = (&String, ValueKind, &Entry)> {
        self.entries
            .iter()
            .flat_map(|(key, slots)| slots.iter().map(move |(kind, e)| (key, *kind, e)))
    }
}

impl DeltaCrdt for LWWMap {
    const TYPE_NAME: &'static str = "LWWMap";

    fn generate_delta(&self, since: &VersionVector) -> Self {
        let mut delta = Self::new();
        for (key, kind, e) in self.slots() {
            if !since.contains(&e.timestamp) {
                delta
                    .entries
                    .entry(key.clone())
                    .or_default()
                    .insert(kind, e.clone());
            }
        }
        delta
    }

    /// Per slot, the greater timestamp wins; tombstones compete like values.
    fn merge(&mut self, delta: &Self) {
        for (key, kind, e) in delta.slots() {
            self.write(key.clone(), kind, e.value.clone(), e.timestamp);
        }
    }

    fn causal_context(&self) -> VersionVector {
        self.slots().map(|(_, _, e)| e.timestamp).collect()
    }
}

/// JSON form: `{"_type":"LWWMap","_metadata":{"k%TYPE":<Timestamp>},"value":{"k%TYPE":<scalar|null>}}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct LWWMapWire {
    #[serde(rename = "_type")]
    kind: String,
    #[serde(rename = "_metadata")]
    metadata: BTreeMap<String, Timestamp>,
    value: BTreeMap<String, serde_json::Value>,
}

impl JsonCodec for LWWMap {
    type Wire = LWWMapWire;
    const WIRE_TYPE: Option<&'static str> = Some(Self::TYPE_NAME);

    fn to_wire(&self) -> Self::Wire {
        let mut metadata = BTreeMap::new();
        let mut value = BTreeMap::new();
        for (key, kind, e) in self.slots() {
            let encoded = encode_key(key, kind);
            metadata.insert(encoded.clone(), e.timestamp);
            value.insert(
                encoded,
                e.value
                    .as_ref()
                    .map_or(serde_json::Value::Null, Scalar::to_json_value),
            );
        }
        LWWMapWire {
            kind: Self::TYPE_NAME.to_string(),
            metadata,
            value,
        }
    }

    fn from_wire(wire: Self::Wire) -> CrdtResult<Self> {
        expect_type(&wire.kind, Self::TYPE_NAME)?;
        if let Some(orphan) = wire.value.keys().find(|k| !wire.metadata.contains_key(*k)) {
            return Err(CrdtError::Malformed(format!("value {orphan} has no _metadata")));
        }
        let mut map = Self::new();
        for (encoded, timestamp) in wire.metadata {
            let (key, kind) = decode_key(&encoded)?;
            let value = match wire.value.get(&encoded) {
                None | Some(serde_json::Value::Null) => None,
                Some(raw) => Some(Scalar::from_json_value(kind, raw)?),
            };
            map.write(key, kind, value, timestamp);
        }
        Ok(map)
    }
}
