//! Multi-Value Register (MV-Register).
//!
//! Unlike the LWW-Register, concurrent writes are all preserved until a
//! later write that has observed them supersedes the whole set. Readers see
//! every concurrently written value and can resolve the conflict themselves.

use crate::json::{JsonCodec, expect_type};
use crate::{CrdtError, CrdtResult, DeltaCrdt};
use replikit_types::{Timestamp, VersionVector};
use serde::{Deserialize, Serialize};

/// A Multi-Value Register.
///
/// Holds a set of `(value, timestamp)` pairs plus a causal context: the
/// version vector of every assignment the register has absorbed, including
/// the ones it has since discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MVRegister<T> {
    /// Live entries, sorted by timestamp.
    entries: Vec<(T, Timestamp)>,
    context: VersionVector,
}

impl<T> Default for MVRegister<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            context: VersionVector::new(),
        }
    }
}

impl<T> MVRegister<T> {
    /// Creates an empty register.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns `value` at `timestamp`, superseding every value seen so far.
    ///
    /// Returns false (and changes nothing) if `timestamp` is already in the
    /// causal context.
    pub fn assign(&mut self, value: T, timestamp: Timestamp) -> bool {
        if self.context.contains(&timestamp) {
            return false;
        }
        self.entries.clear();
        self.entries.push((value, timestamp));
        self.context.update(&timestamp);
        true
    }

    /// Returns all current values, oldest timestamp first.
    ///
    /// A single value during normal operation; several after concurrent
    /// writes were merged without a later write.
    #[must_use]
    pub fn values(&self) -> Vec<&T> {
        self.entries.iter().map(|(v, _)| v).collect()
    }

    /// Iterates over `(value, timestamp)` pairs, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = (&T, Timestamp)> {
        self.entries.iter().map(|(v, ts)| (v, *ts))
    }

    /// Returns `true` if there are concurrent (conflicting) values.
    #[must_use]
    pub fn is_conflicted(&self) -> bool {
        self.entries.len() > 1
    }

    /// Returns true if the register holds no value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the causal context.
    #[must_use]
    pub fn context(&self) -> &VersionVector {
        &self.context
    }

    fn holds(&self, timestamp: &Timestamp) -> bool {
        self.entries.iter().any(|(_, ts)| ts == timestamp)
    }
}

impl<T: Clone> DeltaCrdt for MVRegister<T> {
    const TYPE_NAME: &'static str = "MVRegister";

    /// The live set is shipped whole whenever anything is unseen, since a
    /// receiver drops any of its entries the delta's context covers but the
    /// delta does not carry.
    fn generate_delta(&self, since: &VersionVector) -> Self {
        let unseen = self.entries.iter().any(|(_, ts)| !since.contains(ts))
            || !self.context.is_smaller_or_equal(since);
        if unseen {
            self.clone()
        } else {
            Self::default()
        }
    }

    /// An entry survives if the other side has not seen its timestamp, or
    /// still holds it.
    fn merge(&mut self, delta: &Self) {
        let mut entries: Vec<(T, Timestamp)> = self
            .entries
            .iter()
            .filter(|(_, ts)| !delta.context.contains(ts) || delta.holds(ts))
            .cloned()
            .collect();

        for (value, ts) in &delta.entries {
            let survives = !self.context.contains(ts) || self.holds(ts);
            if survives && !entries.iter().any(|(_, mine)| mine == ts) {
                entries.push((value.clone(), *ts));
            }
        }

        entries.sort_by_key(|(_, ts)| *ts);
        self.entries = entries;
        self.context.merge(&delta.context);
    }

    fn causal_context(&self) -> VersionVector {
        self.context.clone()
    }
}

/// JSON form: `{"_type":"MVRegister","_metadata":{"context":<VV>,"entries":[<Timestamp>]},"value":[<V>]}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MVRegisterWire<T> {
    #[serde(rename = "_type")]
    kind: String,
    #[serde(rename = "_metadata")]
    metadata: MVMetadata,
    value: Vec<T>,
}

/// Reconciliation metadata of one multi-value register.
#[derive(Debug, Serialize, Deserialize)]
pub struct MVMetadata {
    pub(crate) context: VersionVector,
    pub(crate) entries: Vec<Timestamp>,
}

impl<T: Clone> MVRegister<T> {
    /// Splits the register into its metadata and its values, in entry order.
    pub(crate) fn split(&self) -> (MVMetadata, Vec<T>) {
        let metadata = MVMetadata {
            context: self.context.clone(),
            entries: self.entries.iter().map(|(_, ts)| *ts).collect(),
        };
        (metadata, self.entries.iter().map(|(v, _)| v.clone()).collect())
    }

    /// Reassembles a register from [`split`](Self::split) output.
    pub(crate) fn join(metadata: MVMetadata, values: Vec<T>) -> CrdtResult<Self> {
        if metadata.entries.len() != values.len() {
            return Err(CrdtError::Malformed(format!(
                "{} entry timestamps for {} values",
                metadata.entries.len(),
                values.len()
            )));
        }
        if let Some(ts) = metadata.entries.iter().find(|ts| !metadata.context.contains(ts)) {
            return Err(CrdtError::Malformed(format!(
                "entry {ts} outside its causal context"
            )));
        }
        let mut entries: Vec<(T, Timestamp)> = values.into_iter().zip(metadata.entries).collect();
        entries.sort_by_key(|(_, ts)| *ts);
        entries.dedup_by_key(|(_, ts)| *ts);
        Ok(Self {
            entries,
            context: metadata.context,
        })
    }
}

impl<T> JsonCodec for MVRegister<T>
where
    T: Clone + Serialize + serde::de::DeserializeOwned,
{
    type Wire = MVRegisterWire<T>;
    const WIRE_TYPE: Option<&'static str> = Some(Self::TYPE_NAME);

    fn to_wire(&self) -> Self::Wire {
        let (metadata, value) = self.split();
        MVRegisterWire {
            kind: Self::TYPE_NAME.to_string(),
            metadata,
            value,
        }
    }

    fn from_wire(wire: Self::Wire) -> CrdtResult<Self> {
        expect_type(&wire.kind, Self::TYPE_NAME)?;
        Self::join(wire.metadata, wire.value)
    }
}
