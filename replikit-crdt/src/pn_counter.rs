//! Positive-Negative Counter CRDT.
//!
//! A PN-Counter supports both increment and decrement operations across
//! distributed replicas. Each replica owns two monotonic accumulators (total
//! incremented, total decremented), each tagged with the timestamp of its
//! last update. The value is `sum(increments) - sum(decrements)`.
//!
//! Use cases:
//! - Like/vote tallies
//! - Inventory levels adjusted from several devices

use crate::json::JsonCodec;
use crate::{CrdtError, CrdtResult, DeltaCrdt};
use replikit_types::{ReplicaId, Timestamp, VersionVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One replica's running total and the timestamp of its last change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Accumulator {
    total: u64,
    timestamp: Timestamp,
}

impl Accumulator {
    /// Larger total wins; the timestamp breaks ties so merge is deterministic.
    fn dominates(&self, other: &Self) -> bool {
        (self.total, self.timestamp) > (other.total, other.timestamp)
    }
}

/// A Positive-Negative Counter CRDT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PNCounter {
    increments: BTreeMap<ReplicaId, Accumulator>,
    decrements: BTreeMap<ReplicaId, Accumulator>,
}

impl PNCounter {
    /// Creates a new counter with value 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `amount` on behalf of `timestamp`'s replica.
    ///
    /// A negative amount decrements. Fails with [`CrdtError::Overflow`],
    /// leaving the counter unchanged, if the replica's total or the counter
    /// value would leave the representable range.
    pub fn increment(&mut self, amount: i64, timestamp: Timestamp) -> CrdtResult<()> {
        if amount < 0 {
            self.apply(false, amount.unsigned_abs(), timestamp)
        } else {
            self.apply(true, amount.unsigned_abs(), timestamp)
        }
    }

    /// Subtracts `amount` on behalf of `timestamp`'s replica.
    ///
    /// A negative amount increments.
    pub fn decrement(&mut self, amount: i64, timestamp: Timestamp) -> CrdtResult<()> {
        if amount < 0 {
            self.apply(true, amount.unsigned_abs(), timestamp)
        } else {
            self.apply(false, amount.unsigned_abs(), timestamp)
        }
    }

    fn apply(&mut self, positive: bool, amount: u64, timestamp: Timestamp) -> CrdtResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let replica = timestamp.replica();
        let side = if positive {
            &self.increments
        } else {
            &self.decrements
        };
        let current = side.get(&replica).map_or(0, |acc| acc.total);
        let total = current
            .checked_add(amount)
            .ok_or(CrdtError::Overflow("PNCounter replica total"))?;

        let delta = i128::from(amount);
        let next = if positive {
            self.wide_value() + delta
        } else {
            self.wide_value() - delta
        };
        if i64::try_from(next).is_err() {
            return Err(CrdtError::Overflow("PNCounter value"));
        }

        let side = if positive {
            &mut self.increments
        } else {
            &mut self.decrements
        };
        let timestamp = side
            .get(&replica)
            .map_or(timestamp, |acc| acc.timestamp.max(timestamp));
        side.insert(replica, Accumulator { total, timestamp });
        Ok(())
    }

    fn wide_value(&self) -> i128 {
        let pos: i128 = self.increments.values().map(|a| i128::from(a.total)).sum();
        let neg: i128 = self.decrements.values().map(|a| i128::from(a.total)).sum();
        pos - neg
    }

    /// Returns the current counter value (may be negative).
    ///
    /// Saturates at the `i64` range if merged totals exceed it.
    ///
    /// The JSON `value` carries the same saturated number; decoding
    /// recomputes it from the metadata.
    #[must_use]
    pub fn value(&self) -> i64 {
        let wide = self.wide_value();
        i64::try_from(wide).unwrap_or(if wide < 0 { i64::MIN } else { i64::MAX })
    }

    /// Returns the current value, or [`CrdtError::Overflow`] if merged
    /// totals have left the `i64` range.
    pub fn try_value(&self) -> CrdtResult<i64> {
        i64::try_from(self.wide_value()).map_err(|_| CrdtError::Overflow("PNCounter value"))
    }

    /// Returns the total incremented by one replica.
    #[must_use]
    pub fn increments_of(&self, replica: &ReplicaId) -> u64 {
        self.increments.get(replica).map_or(0, |a| a.total)
    }

    /// Returns the total decremented by one replica.
    #[must_use]
    pub fn decrements_of(&self, replica: &ReplicaId) -> u64 {
        self.decrements.get(replica).map_or(0, |a| a.total)
    }

    fn merge_side(
        mine: &mut BTreeMap<ReplicaId, Accumulator>,
        theirs: &BTreeMap<ReplicaId, Accumulator>,
    ) {
        for (replica, incoming) in theirs {
            match mine.get(replica) {
                Some(current) if !incoming.dominates(current) => {}
                _ => {
                    mine.insert(*replica, *incoming);
                }
            }
        }
    }

    fn unseen(
        side: &BTreeMap<ReplicaId, Accumulator>,
        since: &VersionVector,
    ) -> BTreeMap<ReplicaId, Accumulator> {
        side.iter()
            .filter(|(_, acc)| !since.contains(&acc.timestamp))
            .map(|(r, acc)| (*r, *acc))
            .collect()
    }
}

impl DeltaCrdt for PNCounter {
    const TYPE_NAME: &'static str = "PNCounter";

    fn generate_delta(&self, since: &VersionVector) -> Self {
        Self {
            increments: Self::unseen(&self.increments, since),
            decrements: Self::unseen(&self.decrements, since),
        }
    }

    /// Per replica and per accumulator, the larger total wins.
    fn merge(&mut self, delta: &Self) {
        Self::merge_side(&mut self.increments, &delta.increments);
        Self::merge_side(&mut self.decrements, &delta.decrements);
    }

    fn causal_context(&self) -> VersionVector {
        self.increments
            .values()
            .chain(self.decrements.values())
            .map(|acc| acc.timestamp)
            .collect()
    }
}

/// JSON form: `{"_metadata":{"increment":[..],"decrement":[..]},"value":<int>}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PNCounterWire {
    #[serde(rename = "_metadata")]
    metadata: PNCounterMetadata,
    value: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PNCounterMetadata {
    increment: Vec<AccumulatorWire>,
    decrement: Vec<AccumulatorWire>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AccumulatorWire {
    replica: ReplicaId,
    total: u64,
    timestamp: Timestamp,
}

fn side_to_wire(side: &BTreeMap<ReplicaId, Accumulator>) -> Vec<AccumulatorWire> {
    side.iter()
        .map(|(replica, acc)| AccumulatorWire {
            replica: *replica,
            total: acc.total,
            timestamp: acc.timestamp,
        })
        .collect()
}

fn side_from_wire(entries: Vec<AccumulatorWire>) -> CrdtResult<BTreeMap<ReplicaId, Accumulator>> {
    let mut side = BTreeMap::new();
    for entry in entries {
        if entry.timestamp.replica() != entry.replica {
            return Err(CrdtError::Malformed(format!(
                "accumulator of {} stamped by {}",
                entry.replica, entry.timestamp
            )));
        }
        let acc = Accumulator {
            total: entry.total,
            timestamp: entry.timestamp,
        };
        if side.insert(entry.replica, acc).is_some() {
            return Err(CrdtError::Malformed(format!(
                "duplicate accumulator for {}",
                entry.replica
            )));
        }
    }
    Ok(side)
}

impl JsonCodec for PNCounter {
    type Wire = PNCounterWire;
    const WIRE_TYPE: Option<&'static str> = Some(Self::TYPE_NAME);

    fn to_wire(&self) -> Self::Wire {
        PNCounterWire {
            metadata: PNCounterMetadata {
                increment: side_to_wire(&self.increments),
                decrement: side_to_wire(&self.decrements),
            },
            value: self.value(),
        }
    }

    /// The `value` field is recomputed from the accumulators.
    fn from_wire(wire: Self::Wire) -> CrdtResult<Self> {
        Ok(Self {
            increments: side_from_wire(wire.metadata.increment)?,
            decrements: side_from_wire(wire.metadata.decrement)?,
        })
    }
}
