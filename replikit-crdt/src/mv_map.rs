//! Multi-Value Map.
//!
//! A map of independent multi-value registers addressed by
//! `(key, ValueKind)`. Concurrent writes to one slot are all kept; a write
//! that has observed them replaces the whole set.

use crate::json::{JsonCodec, expect_type};
use crate::mv_register::MVMetadata;
use crate::scalar::{decode_key, encode_key};
use crate::{CrdtError, CrdtResult, DeltaCrdt, MVRegister, Scalar, ValueKind};
use replikit_types::{Timestamp, VersionVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Register holding `None` for a removal, so removals compete with writes.
type Slot = MVRegister<Option<Scalar>>;

/// A map of multi-value registers, one per key and declared type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MVMap {
    entries: BTreeMap<String, BTreeMap<ValueKind, Slot>>,
}

impl MVMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns `value` under `key` at `timestamp`; the value's type picks the slot.
    pub fn assign(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Scalar>,
        timestamp: Timestamp,
    ) -> bool {
        let value = value.into();
        let kind = value.kind();
        self.slot_mut(key.into(), kind).assign(Some(value), timestamp)
    }

    /// Removes every value seen so far in the `kind` slot of `key`.
    ///
    /// A concurrent, unseen write survives the removal.
    pub fn remove(&mut self, key: impl Into<String>, kind: ValueKind, timestamp: Timestamp) -> bool {
        self.slot_mut(key.into(), kind).assign(None, timestamp)
    }

    fn slot_mut(&mut self, key: String, kind: ValueKind) -> &mut Slot {
        self.entries.entry(key).or_default().entry(kind).or_default()
    }

    fn slot(&self, key: &str, kind: ValueKind) -> Option<&Slot> {
        self.entries.get(key).and_then(|slots| slots.get(&kind))
    }

    /// Returns the live concurrent values of a slot, oldest first.
    #[must_use]
    pub fn get(&self, key: &str, kind: ValueKind) -> Vec<&Scalar> {
        self.slot(key, kind)
            .map(|slot| slot.values().into_iter().flatten().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn get_boolean(&self, key: &str) -> Vec<bool> {
        self.get(key, ValueKind::Boolean)
            .into_iter()
            .filter_map(Scalar::as_bool)
            .collect()
    }

    #[must_use]
    pub fn get_double(&self, key: &str) -> Vec<f64> {
        self.get(key, ValueKind::Double)
            .into_iter()
            .filter_map(Scalar::as_f64)
            .collect()
    }

    #[must_use]
    pub fn get_integer(&self, key: &str) -> Vec<i64> {
        self.get(key, ValueKind::Integer)
            .into_iter()
            .filter_map(Scalar::as_i64)
            .collect()
    }

    #[must_use]
    pub fn get_string(&self, key: &str) -> Vec<&str> {
        self.get(key, ValueKind::String)
            .into_iter()
            .filter_map(Scalar::as_str)
            .collect()
    }

    /// Returns true if a slot holds more than one concurrent entry.
    #[must_use]
    pub fn is_conflicted(&self, key: &str, kind: ValueKind) -> bool {
        self.slot(key, kind).is_some_and(MVRegister::is_conflicted)
    }

    /// Iterates over slots holding at least one live value.
    pub fn keys(&self) -> impl Iterator<Item = (&str, ValueKind)> {
        self.slots()
            .filter(|(_, _, slot)| slot.values().iter().any(|v| v.is_some()))
            .map(|(key, kind, _)| (key.as_str(), kind))
    }

    /// Returns the number of slots holding a live value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slots(&self) -> impl Iterator<Item = (&String, ValueKind, &Slot)> {
        self.entries
            .iter()
            .flat_map(|(key, slots)| slots.iter().map(move |(kind, slot)| (key, *kind, slot)))
    }
}

impl DeltaCrdt for MVMap {
    const TYPE_NAME: &'static str = "MVMap";

    fn generate_delta(&self, since: &VersionVector) -> Self {
        let mut delta = Self::new();
        for (key, kind, slot) in self.slots() {
            let part = slot.generate_delta(since);
            if !part.is_empty() || !part.context().is_empty() {
                delta
                    .entries
                    .entry(key.clone())
                    .or_default()
                    .insert(kind, part);
            }
        }
        delta
    }

    fn merge(&mut self, delta: &Self) {
        for (key, kind, slot) in delta.slots() {
            self.slot_mut(key.clone(), kind).merge(slot);
        }
    }

    fn causal_context(&self) -> VersionVector {
        let mut vv = VersionVector::new();
        for (_, _, slot) in self.slots() {
            vv.merge(slot.context());
        }
        vv
    }
}

/// JSON form: `{"_type":"MVMap","_metadata":{"k%TYPE":{"context":..,"entries":[..]}},"value":{"k%TYPE":[..]}}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MVMapWire {
    #[serde(rename = "_type")]
    kind: String,
    #[serde(rename = "_metadata")]
    metadata: BTreeMap<String, MVMetadata>,
    value: BTreeMap<String, Vec<serde_json::Value>>,
}

impl JsonCodec for MVMap {
    type Wire = MVMapWire;
    const WIRE_TYPE: Option<&'static str> = Some(Self::TYPE_NAME);

    fn to_wire(&self) -> Self::Wire {
        let mut metadata = BTreeMap::new();
        let mut value = BTreeMap::new();
        for (key, kind, slot) in self.slots() {
            let encoded = encode_key(key, kind);
            let (meta, values) = slot.split();
            metadata.insert(encoded.clone(), meta);
            value.insert(
                encoded,
                values
                    .iter()
                    .map(|v| v.as_ref().map_or(serde_json::Value::Null, Scalar::to_json_value))
                    .collect(),
            );
        }
        MVMapWire {
            kind: Self::TYPE_NAME.to_string(),
            metadata,
            value,
        }
    }

    fn from_wire(mut wire: Self::Wire) -> CrdtResult<Self> {
        expect_type(&wire.kind, Self::TYPE_NAME)?;
        let mut map = Self::new();
        for (encoded, meta) in wire.metadata {
            let (key, kind) = decode_key(&encoded)?;
            let raw = wire.value.remove(&encoded).unwrap_or_default();
            let values = raw
                .iter()
                .map(|v| match v {
                    serde_json::Value::Null => Ok(None),
                    other => Scalar::from_json_value(kind, other).map(Some),
                })
                .collect::<CrdtResult<Vec<_>>>()?;
            map.entries
                .entry(key)
                .or_default()
                .insert(kind, Slot::join(meta, values)?);
        }
        if let Some(orphan) = wire.value.keys().next() {
            return Err(CrdtError::Malformed(format!("value {orphan} has no _metadata")));
        }
        Ok(map)
    }
}
