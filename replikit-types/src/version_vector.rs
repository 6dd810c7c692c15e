//! Version vectors for causal-context tracking.
//!
//! A version vector records, per replica, the highest timestamp counter a
//! state has absorbed. Replicas use it to decide which information is new
//! (`contains`) and to compare how far two states have progressed.
//!
//! Use cases:
//! - Asking a replica for a delta of everything not yet seen
//! - Deciding whether a multi-value entry was superseded
//! - Keeping an environment's clock ahead of everything it merged

use crate::{ReplicaId, Timestamp};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Causality relationship between two version vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CausalOrder {
    /// First vector is strictly behind the second.
    Before,
    /// First vector is strictly ahead of the second.
    After,
    /// Neither vector dominates the other.
    Concurrent,
    /// Vectors are identical.
    Equal,
}

/// A mapping `replica -> highest counter seen`.
///
/// Absent replicas read as counter `0`, the sentinel minimum. Entries only
/// ever grow under [`update`](Self::update) and [`merge`](Self::merge).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionVector {
    entries: BTreeMap<ReplicaId, u64>,
}

impl VersionVector {
    /// Creates a new empty version vector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Returns the counter recorded for a replica (0 if not present).
    #[must_use]
    pub fn get(&self, replica: &ReplicaId) -> u64 {
        self.entries.get(replica).copied().unwrap_or(0)
    }

    /// Returns true if `ts` has already been absorbed.
    #[must_use]
    pub fn contains(&self, ts: &Timestamp) -> bool {
        self.get(&ts.replica()) >= ts.counter()
    }

    /// Folds a single timestamp into the vector.
    pub fn update(&mut self, ts: &Timestamp) {
        if ts.counter() > self.get(&ts.replica()) {
            self.entries.insert(ts.replica(), ts.counter());
        }
    }

    /// Merges another vector into this one, taking the pointwise maximum.
    ///
    /// This operation is commutative, associative, and idempotent.
    pub fn merge(&mut self, other: &Self) {
        for (&replica, &counter) in &other.entries {
            let entry = self.entries.entry(replica).or_insert(0);
            if counter > *entry {
                *entry = counter;
            }
        }
    }

    /// Alias of [`merge`](Self::merge), mirroring [`update`](Self::update).
    pub fn update_vv(&mut self, other: &Self) {
        self.merge(other);
    }

    /// Creates a new vector that is the merge of this and another.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    /// Returns the largest counter over all entries, or 0 if empty.
    #[must_use]
    pub fn max(&self) -> u64 {
        self.entries.values().copied().max().unwrap_or(0)
    }

    /// Returns all replicas and their counters, in replica order.
    pub fn iter(&self) -> impl Iterator<Item = (&ReplicaId, &u64)> {
        self.entries.iter()
    }

    /// Returns the number of replicas in the vector.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the vector has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compares this vector with another to determine causal ordering.
    #[must_use]
    pub fn compare(&self, other: &Self) -> CausalOrder {
        let mut self_ge = true;
        let mut other_ge = true;

        let replicas: BTreeSet<_> = self.entries.keys().chain(other.entries.keys()).collect();
        for replica in replicas {
            let mine = self.get(replica);
            let theirs = other.get(replica);
            if mine < theirs {
                self_ge = false;
            }
            if theirs < mine {
                other_ge = false;
            }
        }

        match (self_ge, other_ge) {
            (true, true) => CausalOrder::Equal,
            (true, false) => CausalOrder::After,
            (false, true) => CausalOrder::Before,
            (false, false) => CausalOrder::Concurrent,
        }
    }

    /// Returns true if this vector is strictly behind the other.
    #[must_use]
    pub fn is_smaller(&self, other: &Self) -> bool {
        self.compare(other) == CausalOrder::Before
    }

    /// Returns true if every entry is at most the other's.
    #[must_use]
    pub fn is_smaller_or_equal(&self, other: &Self) -> bool {
        matches!(self.compare(other), CausalOrder::Before | CausalOrder::Equal)
    }

    /// Returns true if this vector is strictly ahead of the other.
    #[must_use]
    pub fn is_greater(&self, other: &Self) -> bool {
        self.compare(other) == CausalOrder::After
    }

    /// Returns true if every entry is at least the other's.
    #[must_use]
    pub fn is_greater_or_equal(&self, other: &Self) -> bool {
        matches!(self.compare(other), CausalOrder::After | CausalOrder::Equal)
    }

    /// Returns true if neither vector dominates the other.
    #[must_use]
    pub fn is_not_comparable(&self, other: &Self) -> bool {
        self.compare(other) == CausalOrder::Concurrent
    }
}

impl PartialEq for VersionVector {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == CausalOrder::Equal
    }
}

impl Eq for VersionVector {}

impl PartialOrd for VersionVector {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.compare(other) {
            CausalOrder::Before => Some(Ordering::Less),
            CausalOrder::After => Some(Ordering::Greater),
            CausalOrder::Equal => Some(Ordering::Equal),
            CausalOrder::Concurrent => None,
        }
    }
}

impl FromIterator<Timestamp> for VersionVector {
    fn from_iter<I: IntoIterator<Item = Timestamp>>(iter: I) -> Self {
        let mut vv = Self::new();
        for ts in iter {
            vv.update(&ts);
        }
        vv
    }
}

impl<'a> FromIterator<&'a Timestamp> for VersionVector {
    fn from_iter<I: IntoIterator<Item = &'a Timestamp>>(iter: I) -> Self {
        iter.into_iter().copied().collect()
    }
}
