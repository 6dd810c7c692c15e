//! Bounded Counter CRDT.
//!
//! A counter that keeps `value >= bound` (or `value <= bound`) on every
//! replica at all times without coordination. The distance between the
//! value and the bound is modelled as a pool of transferable rights: a
//! replica may only move the value toward the bound by spending rights it
//! provably holds locally, so no interleaving of merges can cross the bound.
//!
//! Ledger, for replicas `i` and `j`:
//! - `R[i][i]`: rights `i` minted by moving the value away from the bound
//! - `R[i][j]`: rights `i` transferred to `j`
//! - `C[i]`: rights `i` consumed by moving the value toward the bound
//!
//! Every ledger cell is written only by its source replica, so merge is a
//! per-cell maximum.
//!
//! Use cases:
//! - Stock that must never go below zero
//! - Quotas that must never exceed a ceiling

use crate::json::{JsonCodec, expect_type};
use crate::{CrdtError, CrdtResult, DeltaCrdt};
use replikit_types::{ReplicaId, Timestamp, VersionVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Which side of the bound the value must stay on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundMode {
    /// `value >= bound`.
    #[default]
    #[serde(rename = "GEQ")]
    GreaterOrEqual,
    /// `value <= bound`.
    #[serde(rename = "LEQ")]
    LessOrEqual,
}

impl BoundMode {
    /// Returns true if `value` is on the allowed side of `bound`.
    #[must_use]
    pub fn admits(self, value: i64, bound: i64) -> bool {
        match self {
            Self::GreaterOrEqual => value >= bound,
            Self::LessOrEqual => value <= bound,
        }
    }
}

impl fmt::Display for BoundMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GreaterOrEqual => write!(f, ">="),
            Self::LessOrEqual => write!(f, "<="),
        }
    }
}

/// One `R[from][to]` cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cell {
    from: ReplicaId,
    to: ReplicaId,
    amount: u64,
    timestamp: Timestamp,
}

/// One `C[replica]` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Consumed {
    amount: u64,
    timestamp: Timestamp,
}

/// Larger amount wins, then the later timestamp.
fn supersedes(amount: u64, ts: Timestamp, current_amount: u64, current_ts: Timestamp) -> bool {
    (amount, ts) > (current_amount, current_ts)
}

/// Sparse `R` matrix: cells in an arena, addressed by `(from, to)`.
#[derive(Debug, Clone, Default)]
struct RightsLedger {
    cells: Vec<Cell>,
    index: BTreeMap<(ReplicaId, ReplicaId), usize>,
}

impl RightsLedger {
    fn get(&self, from: ReplicaId, to: ReplicaId) -> Option<&Cell> {
        self.index.get(&(from, to)).map(|&i| &self.cells[i])
    }

    fn amount(&self, from: ReplicaId, to: ReplicaId) -> u64 {
        self.get(from, to).map_or(0, |c| c.amount)
    }

    /// Writes `cell` if it supersedes what is stored.
    fn absorb(&mut self, cell: Cell) {
        match self.index.get(&(cell.from, cell.to)) {
            Some(&i) => {
                let current = &mut self.cells[i];
                if supersedes(cell.amount, cell.timestamp, current.amount, current.timestamp) {
                    *current = cell;
                }
            }
            None => {
                self.index.insert((cell.from, cell.to), self.cells.len());
                self.cells.push(cell);
            }
        }
    }

    /// Cells in `(from, to)` order.
    fn iter(&self) -> impl Iterator<Item = &Cell> {
        self.index.values().map(|&i| &self.cells[i])
    }

    fn received(&self, replica: ReplicaId) -> i128 {
        self.cells
            .iter()
            .filter(|c| c.to == replica)
            .map(|c| i128::from(c.amount))
            .sum()
    }

    fn given(&self, replica: ReplicaId) -> i128 {
        self.cells
            .iter()
            .filter(|c| c.from == replica && c.to != replica)
            .map(|c| i128::from(c.amount))
            .sum()
    }

    fn minted(&self) -> i128 {
        self.cells
            .iter()
            .filter(|c| c.from == c.to)
            .map(|c| i128::from(c.amount))
            .sum()
    }
}

impl PartialEq for RightsLedger {
    fn eq(&self, other: &Self) -> bool {
        self.index.len() == other.index.len()
            && self.iter().all(|c| other.get(c.from, c.to) == Some(c))
    }
}

impl Eq for RightsLedger {}

/// A Bounded Counter CRDT.
///
/// The `(identifier, origin)` pair names a configuration epoch. States of
/// different epochs never reconcile element-wise: the greater epoch replaces
/// the lesser wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BCounter {
    identifier: u64,
    mode: BoundMode,
    bound: i64,
    initial: i64,
    origin: Option<Timestamp>,
    rights: RightsLedger,
    consumed: BTreeMap<ReplicaId, Consumed>,
}

impl BCounter {
    /// Creates a counter starting at `initial`, owned by `timestamp`'s replica.
    ///
    /// The owner starts with every right between `initial` and `bound`.
    /// Fails with [`CrdtError::BoundViolation`] if `initial` is already past
    /// the bound.
    pub fn new(
        mode: BoundMode,
        bound: i64,
        initial: i64,
        identifier: u64,
        timestamp: Timestamp,
    ) -> CrdtResult<Self> {
        if !mode.admits(initial, bound) {
            return Err(CrdtError::BoundViolation {
                value: initial,
                bound,
                mode,
            });
        }
        Ok(Self {
            identifier,
            mode,
            bound,
            initial,
            origin: Some(timestamp),
            rights: RightsLedger::default(),
            consumed: BTreeMap::new(),
        })
    }

    #[must_use]
    pub fn identifier(&self) -> u64 {
        self.identifier
    }

    #[must_use]
    pub fn mode(&self) -> BoundMode {
        self.mode
    }

    #[must_use]
    pub fn bound(&self) -> i64 {
        self.bound
    }

    #[must_use]
    pub fn initial(&self) -> i64 {
        self.initial
    }

    /// Returns the timestamp that created this epoch.
    #[must_use]
    pub fn origin(&self) -> Option<Timestamp> {
        self.origin
    }

    fn epoch(&self) -> (u64, Option<Timestamp>) {
        (self.identifier, self.origin)
    }

    fn wide_value(&self) -> i128 {
        let net = self.rights.minted() - self.consumed_total();
        match self.mode {
            BoundMode::GreaterOrEqual => i128::from(self.initial) + net,
            BoundMode::LessOrEqual => i128::from(self.initial) - net,
        }
    }

    fn consumed_total(&self) -> i128 {
        self.consumed.values().map(|c| i128::from(c.amount)).sum()
    }

    /// Returns the current value.
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
        i64::try_from(self.wide_value()).map_err(|_| CrdtError::Overflow("BCounter value"))
    }

    /// Rights the owner started with: the distance from `initial` to `bound`.
    fn allotment(&self, replica: ReplicaId) -> i128 {
        if self.origin.map(|o| o.replica()) != Some(replica) {
            return 0;
        }
        let gap = i128::from(self.initial) - i128::from(self.bound);
        match self.mode {
            BoundMode::GreaterOrEqual => gap,
            BoundMode::LessOrEqual => -gap,
        }
    }

    /// Returns the rights `replica` may spend without coordination.
    #[must_use]
    pub fn local_rights(&self, replica: &ReplicaId) -> u64 {
        let replica = *replica;
        let consumed = self
            .consumed
            .get(&replica)
            .map_or(0, |c| i128::from(c.amount));
        let rights = self.allotment(replica) + self.rights.received(replica)
            - self.rights.given(replica)
            - consumed;
        u64::try_from(rights.max(0)).unwrap_or(u64::MAX)
    }

    /// Moves the value up by `amount` on behalf of `timestamp`'s replica.
    ///
    /// In `>=` mode this mints rights; in `<=` mode it spends them and fails
    /// with [`CrdtError::InsufficientRights`] if the replica holds too few.
    pub fn increment(&mut self, amount: u64, timestamp: Timestamp) -> CrdtResult<()> {
        match self.mode {
            BoundMode::GreaterOrEqual => self.mint(amount, timestamp),
            BoundMode::LessOrEqual => self.consume(amount, timestamp),
        }
    }

    /// Moves the value down by `amount` on behalf of `timestamp`'s replica.
    ///
    /// In `>=` mode this spends rights; in `<=` mode it mints them.
    pub fn decrement(&mut self, amount: u64, timestamp: Timestamp) -> CrdtResult<()> {
        match self.mode {
            BoundMode::GreaterOrEqual => self.consume(amount, timestamp),
            BoundMode::LessOrEqual => self.mint(amount, timestamp),
        }
    }

    /// Hands `amount` of the caller's rights to `to`. The value is unchanged.
    pub fn transfer(&mut self, amount: u64, to: ReplicaId, timestamp: Timestamp) -> CrdtResult<()> {
        let from = timestamp.replica();
        if amount == 0 || from == to {
            return Ok(());
        }
        self.ensure_rights(from, amount)?;
        self.bump_cell(from, to, amount, timestamp, "BCounter transfer")
    }

    fn mint(&mut self, amount: u64, timestamp: Timestamp) -> CrdtResult<()> {
        if amount == 0 {
            return Ok(());
        }
        if i64::try_from(self.wide_value() + self.signed(amount)).is_err() {
            return Err(CrdtError::Overflow("BCounter value"));
        }
        let replica = timestamp.replica();
        self.bump_cell(replica, replica, amount, timestamp, "BCounter rights")
    }

    fn consume(&mut self, amount: u64, timestamp: Timestamp) -> CrdtResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let replica = timestamp.replica();
        self.ensure_rights(replica, amount)?;
        let current = self.consumed.get(&replica).copied();
        let total = current
            .map_or(0, |c| c.amount)
            .checked_add(amount)
            .ok_or(CrdtError::Overflow("BCounter consumed"))?;
        let timestamp = current.map_or(timestamp, |c| c.timestamp.max(timestamp));
        self.consumed.insert(replica, Consumed {
            amount: total,
            timestamp,
        });
        Ok(())
    }

    /// `amount` as a signed change of the value when minted.
    fn signed(&self, amount: u64) -> i128 {
        match self.mode {
            BoundMode::GreaterOrEqual => i128::from(amount),
            BoundMode::LessOrEqual => -i128::from(amount),
        }
    }

    fn ensure_rights(&self, replica: ReplicaId, requested: u64) -> CrdtResult<()> {
        let available = self.local_rights(&replica);
        if requested > available {
            debug!(%replica, requested, available, "rejected operation on bounded counter");
            return Err(CrdtError::InsufficientRights {
                requested,
                available,
            });
        }
        Ok(())
    }

    fn bump_cell(
        &mut self,
        from: ReplicaId,
        to: ReplicaId,
        amount: u64,
        timestamp: Timestamp,
        what: &'static str,
    ) -> CrdtResult<()> {
        let current = self.rights.get(from, to).copied();
        let total = current
            .map_or(0, |c| c.amount)
            .checked_add(amount)
            .ok_or(CrdtError::Overflow(what))?;
        let timestamp = current.map_or(timestamp, |c| c.timestamp.max(timestamp));
        self.rights.absorb(Cell {
            from,
            to,
            amount: total,
            timestamp,
        });
        Ok(())
    }

    /// Returns the rights `from` has minted (`from == to`) or handed to `to`.
    #[must_use]
    pub fn rights_between(&self, from: &ReplicaId, to: &ReplicaId) -> u64 {
        self.rights.amount(*from, *to)
    }

    fn absorb_ledger(&mut self, other: &Self) {
        for cell in other.rights.iter() {
            self.rights.absorb(*cell);
        }
        for (replica, incoming) in &other.consumed {
            match self.consumed.get(replica) {
                Some(c) if !supersedes(incoming.amount, incoming.timestamp, c.amount, c.timestamp) => {}
                _ => {
                    self.consumed.insert(*replica, *incoming);
                }
            }
        }
    }

    fn config_only(&self) -> Self {
        Self {
            identifier: self.identifier,
            mode: self.mode,
            bound: self.bound,
            initial: self.initial,
            origin: self.origin,
            rights: RightsLedger::default(),
            consumed: BTreeMap::new(),
        }
    }
}

impl DeltaCrdt for BCounter {
    const TYPE_NAME: &'static str = "BCounter";

    /// A receiver that has not seen the epoch's origin gets the whole state.
    fn generate_delta(&self, since: &VersionVector) -> Self {
        match self.origin {
            Some(origin) if since.contains(&origin) => {
                let mut delta = self.config_only();
                for cell in self.rights.iter().filter(|c| !since.contains(&c.timestamp)) {
                    delta.rights.absorb(*cell);
                }
                delta.consumed = self
                    .consumed
                    .iter()
                    .filter(|(_, c)| !since.contains(&c.timestamp))
                    .map(|(r, c)| (*r, *c))
                    .collect();
                delta
            }
            _ => self.clone(),
        }
    }

    fn merge(&mut self, delta: &Self) {
        match delta.epoch().cmp(&self.epoch()) {
            std::cmp::Ordering::Greater => {
                debug!(
                    from = self.identifier,
                    to = delta.identifier,
                    "bounded counter replaced by newer epoch"
                );
                *self = delta.clone();
            }
            std::cmp::Ordering::Less => {}
            std::cmp::Ordering::Equal => self.absorb_ledger(delta),
        }
    }

    fn causal_context(&self) -> VersionVector {
        self.origin
            .into_iter()
            .chain(self.rights.iter().map(|c| c.timestamp))
            .chain(self.consumed.values().map(|c| c.timestamp))
            .collect()
    }
}

/// JSON form: `{"_type":"BCounter","_metadata":{..},"value":<int>}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BCounterWire {
    #[serde(rename = "_type")]
    kind: String,
    #[serde(rename = "_metadata")]
    metadata: BCounterMetadata,
    value: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct BCounterMetadata {
    identifier: u64,
    mode: BoundMode,
    bound: i64,
    initial: i64,
    origin: Option<Timestamp>,
    rights: Vec<CellWire>,
    consumed: Vec<ConsumedWire>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CellWire {
    from: ReplicaId,
    to: ReplicaId,
    amount: u64,
    timestamp: Timestamp,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConsumedWire {
    replica: ReplicaId,
    amount: u64,
    timestamp: Timestamp,
}

impl JsonCodec for BCounter {
    type Wire = BCounterWire;
    const WIRE_TYPE: Option<&'static str> = Some(Self::TYPE_NAME);

    fn to_wire(&self) -> Self::Wire {
        BCounterWire {
            kind: Self::TYPE_NAME.to_string(),
            metadata: BCounterMetadata {
                identifier: self.identifier,
                mode: self.mode,
                bound: self.bound,
                initial: self.initial,
                origin: self.origin,
                rights: self
                    .rights
                    .iter()
                    .map(|c| CellWire {
                        from: c.from,
                        to: c.to,
                        amount: c.amount,
                        timestamp: c.timestamp,
                    })
                    .collect(),
                consumed: self
                    .consumed
                    .iter()
                    .map(|(replica, c)| ConsumedWire {
                        replica: *replica,
                        amount: c.amount,
                        timestamp: c.timestamp,
                    })
                    .collect(),
            },
            value: self.value(),
        }
    }

    /// Rebuilds the ledger and rejects states that break the bound.
    fn from_wire(wire: Self::Wire) -> CrdtResult<Self> {
        expect_type(&wire.kind, Self::TYPE_NAME)?;
        let meta = wire.metadata;
        let mut counter = Self {
            identifier: meta.identifier,
            mode: meta.mode,
            bound: meta.bound,
            initial: meta.initial,
            origin: meta.origin,
            rights: RightsLedger::default(),
            consumed: BTreeMap::new(),
        };
        for cell in meta.rights {
            if cell.timestamp.replica() != cell.from {
                return Err(CrdtError::Malformed(format!(
                    "rights cell of {} stamped by {}",
                    cell.from, cell.timestamp
                )));
            }
            if counter.rights.get(cell.from, cell.to).is_some() {
                return Err(CrdtError::Malformed(format!(
                    "duplicate rights cell {} -> {}",
                    cell.from, cell.to
                )));
            }
            counter.rights.absorb(Cell {
                from: cell.from,
                to: cell.to,
                amount: cell.amount,
                timestamp: cell.timestamp,
            });
        }
        for entry in meta.consumed {
            if entry.timestamp.replica() != entry.replica {
                return Err(CrdtError::Malformed(format!(
                    "consumed entry of {} stamped by {}",
                    entry.replica, entry.timestamp
                )));
            }
            let consumed = Consumed {
                amount: entry.amount,
                timestamp: entry.timestamp,
            };
            if counter.consumed.insert(entry.replica, consumed).is_some() {
                return Err(CrdtError::Malformed(format!(
                    "duplicate consumed entry for {}",
                    entry.replica
                )));
            }
        }
        let admitted = i64::try_from(counter.wide_value())
            .is_ok_and(|value| counter.mode.admits(value, counter.bound));
        if !counter.mode.admits(counter.initial, counter.bound) || !admitted {
            return Err(CrdtError::Malformed(
                "BCounter state lies outside its bound".to_string(),
            ));
        }
        Ok(counter)
    }
}
