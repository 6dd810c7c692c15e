//! Composite map.
//!
//! One key namespace split by conflict-resolution policy: last-writer-wins
//! registers, multi-value registers and named PN-counters. The three parts
//! are independent; a key written as a register never affects a counter of
//! the same name.
//!
//! Every write mints its timestamp through a proxy environment, which
//! stages the issued timestamps so the map can fold them into its causal
//! context once the write has succeeded.

use crate::json::{JsonCodec, expect_type};
use crate::lww_map::LWWMapWire;
use crate::mv_map::MVMapWire;
use crate::pn_counter::PNCounterWire;
use crate::scalar::encode_key;
use crate::{CrdtResult, DeltaCrdt, LWWMap, MVMap, PNCounter, Scalar, ValueKind};
use replikit_types::{Environment, ReplicaId, Timestamp, VersionVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::trace;

/// Forwards to the caller's environment and records what it issues.
struct ProxyEnvironment<'a, E: ?Sized> {
    inner: &'a mut E,
    issued: VersionVector,
    op: &'static str,
}

impl<'a, E: Environment + ?Sized> ProxyEnvironment<'a, E> {
    fn new(inner: &'a mut E, op: &'static str) -> Self {
        Self {
            inner,
            issued: VersionVector::new(),
            op,
        }
    }
}

impl<E: Environment + ?Sized> Environment for ProxyEnvironment<'_, E> {
    fn replica_id(&self) -> ReplicaId {
        self.inner.replica_id()
    }

    fn new_timestamp(&mut self) -> replikit_types::Result<Timestamp> {
        let ts = self.inner.new_timestamp()?;
        trace!(op = self.op, %ts, "map write");
        self.issued.update(&ts);
        Ok(ts)
    }

    fn current_state(&self) -> VersionVector {
        self.inner.current_state()
    }

    fn update_state_ts(&mut self, ts: &Timestamp) {
        self.inner.update_state_ts(ts);
    }

    fn update_state_vv(&mut self, vv: &VersionVector) {
        self.inner.update_state_vv(vv);
    }
}

/// A map combining LWW registers, MV registers and counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Map {
    registers: LWWMap,
    multi: MVMap,
    counters: BTreeMap<String, PNCounter>,
    /// Every timestamp issued for a successful write, local or merged.
    context: VersionVector,
}

impl Map {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn commit<E: ?Sized>(&mut self, proxy: ProxyEnvironment<'_, E>) {
        self.context.merge(&proxy.issued);
    }

    /// Writes a last-writer-wins value under `key`.
    pub fn set<E: Environment + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Scalar>,
        env: &mut E,
    ) -> CrdtResult<Timestamp> {
        let mut proxy = ProxyEnvironment::new(env, "set");
        let ts = proxy.new_timestamp()?;
        self.registers.assign(key, value, ts);
        self.commit(proxy);
        Ok(ts)
    }

    /// Deletes the last-writer-wins value in the `kind` slot of `key`.
    pub fn remove<E: Environment + ?Sized>(
        &mut self,
        key: impl Into<String>,
        kind: ValueKind,
        env: &mut E,
    ) -> CrdtResult<Timestamp> {
        let mut proxy = ProxyEnvironment::new(env, "remove");
        let ts = proxy.new_timestamp()?;
        self.registers.remove(key, kind, ts);
        self.commit(proxy);
        Ok(ts)
    }

    /// Writes a multi-value entry under `key`.
    pub fn set_concurrent<E: Environment + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Scalar>,
        env: &mut E,
    ) -> CrdtResult<Timestamp> {
        let mut proxy = ProxyEnvironment::new(env, "set_concurrent");
        let ts = proxy.new_timestamp()?;
        self.multi.assign(key, value, ts);
        self.commit(proxy);
        Ok(ts)
    }

    /// Removes every multi-value entry seen so far in the `kind` slot of `key`.
    pub fn remove_concurrent<E: Environment + ?Sized>(
        &mut self,
        key: impl Into<String>,
        kind: ValueKind,
        env: &mut E,
    ) -> CrdtResult<Timestamp> {
        let mut proxy = ProxyEnvironment::new(env, "remove_concurrent");
        let ts = proxy.new_timestamp()?;
        self.multi.remove(key, kind, ts);
        self.commit(proxy);
        Ok(ts)
    }

    /// Adds `amount` to the counter `name`, creating it at zero if needed.
    pub fn increment<E: Environment + ?Sized>(
        &mut self,
        name: &str,
        amount: i64,
        env: &mut E,
    ) -> CrdtResult<()> {
        let mut proxy = ProxyEnvironment::new(env, "increment");
        let ts = proxy.new_timestamp()?;
        let mut counter = self.counters.get(name).cloned().unwrap_or_default();
        counter.increment(amount, ts)?;
        if counter != PNCounter::default() {
            self.counters.insert(name.to_string(), counter);
        }
        self.commit(proxy);
        Ok(())
    }

    /// Subtracts `amount` from the counter `name`, creating it at zero if needed.
    pub fn decrement<E: Environment + ?Sized>(
        &mut self,
        name: &str,
        amount: i64,
        env: &mut E,
    ) -> CrdtResult<()> {
        let mut proxy = ProxyEnvironment::new(env, "decrement");
        let ts = proxy.new_timestamp()?;
        let mut counter = self.counters.get(name).cloned().unwrap_or_default();
        counter.decrement(amount, ts)?;
        if counter != PNCounter::default() {
            self.counters.insert(name.to_string(), counter);
        }
        self.commit(proxy);
        Ok(())
    }

    /// Returns the last-writer-wins value in the `kind` slot of `key`.
    #[must_use]
    pub fn get(&self, key: &str, kind: ValueKind) -> Option<&Scalar> {
        self.registers.get(key, kind)
    }

    #[must_use]
    pub fn get_boolean(&self, key: &str) -> Option<bool> {
        self.registers.get_boolean(key)
    }

    #[must_use]
    pub fn get_double(&self, key: &str) -> Option<f64> {
        self.registers.get_double(key)
    }

    #[must_use]
    pub fn get_integer(&self, key: &str) -> Option<i64> {
        self.registers.get_integer(key)
    }

    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.registers.get_string(key)
    }

    /// Returns the concurrent multi-value entries in the `kind` slot of `key`.
    #[must_use]
    pub fn get_concurrent(&self, key: &str, kind: ValueKind) -> Vec<&Scalar> {
        self.multi.get(key, kind)
    }

    /// Returns the value of counter `name`, zero if it was never touched.
    #[must_use]
    pub fn counter_value(&self, name: &str) -> i64 {
        self.counters.get(name).map_or(0, PNCounter::value)
    }

    /// Iterates over the names of every counter.
    pub fn counter_names(&self) -> impl Iterator<Item = &str> {
        self.counters.keys().map(String::as_str)
    }

    #[must_use]
    pub fn registers(&self) -> &LWWMap {
        &self.registers
    }

    #[must_use]
    pub fn multi(&self) -> &MVMap {
        &self.multi
    }
}

impl DeltaCrdt for Map {
    const TYPE_NAME: &'static str = "Map";

    /// Fans out to the parts. The map's own context is shipped whole.
    fn generate_delta(&self, since: &VersionVector) -> Self {
        let counters = self
            .counters
            .iter()
            .map(|(name, c)| (name.clone(), c.generate_delta(since)))
            .filter(|(_, delta)| *delta != PNCounter::default())
            .collect();
        Self {
            registers: self.registers.generate_delta(since),
            multi: self.multi.generate_delta(since),
            counters,
            context: self.context.clone(),
        }
    }

    fn merge(&mut self, delta: &Self) {
        self.registers.merge(&delta.registers);
        self.multi.merge(&delta.multi);
        for (name, counter) in &delta.counters {
            self.counters.entry(name.clone()).or_default().merge(counter);
        }
        self.context.merge(&delta.context);
    }

    fn causal_context(&self) -> VersionVector {
        let mut vv = self.context.clone();
        vv.merge(&self.registers.causal_context());
        vv.merge(&self.multi.causal_context());
        for counter in self.counters.values() {
            vv.merge(&counter.causal_context());
        }
        vv
    }
}

/// JSON form: `{"_type":"Map","_metadata":{..},"value":{..}}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MapWire {
    #[serde(rename = "_type")]
    kind: String,
    #[serde(rename = "_metadata")]
    metadata: MapMetadata,
    value: MapValue,
}

#[derive(Debug, Serialize, Deserialize)]
struct MapMetadata {
    context: VersionVector,
    registers: LWWMapWire,
    multi: MVMapWire,
    counters: BTreeMap<String, PNCounterWire>,
}

/// Plain view of the live contents; derived, ignored on decode.
#[derive(Debug, Serialize, Deserialize)]
struct MapValue {
    registers: BTreeMap<String, serde_json::Value>,
    multi: BTreeMap<String, Vec<serde_json::Value>>,
    counters: BTreeMap<String, i64>,
}

impl JsonCodec for Map {
    type Wire = MapWire;
    const WIRE_TYPE: Option<&'static str> = Some(Self::TYPE_NAME);

    fn to_wire(&self) -> Self::Wire {
        let value = MapValue {
            registers: self
                .registers
                .iter()
                .map(|(key, kind, v)| (encode_key(key, kind), v.to_json_value()))
                .collect(),
            multi: self
                .multi
                .keys()
                .map(|(key, kind)| {
                    let values = self
                        .multi
                        .get(key, kind)
                        .into_iter()
                        .map(Scalar::to_json_value)
                        .collect();
                    (encode_key(key, kind), values)
                })
                .collect(),
            counters: self
                .counters
                .iter()
                .map(|(name, c)| (name.clone(), c.value()))
                .collect(),
        };
        MapWire {
            kind: Self::TYPE_NAME.to_string(),
            metadata: MapMetadata {
                context: self.context.clone(),
                registers: self.registers.to_wire(),
                multi: self.multi.to_wire(),
                counters: self
                    .counters
                    .iter()
                    .map(|(name, c)| (name.clone(), c.to_wire()))
                    .collect(),
            },
            value,
        }
    }

    fn from_wire(wire: Self::Wire) -> CrdtResult<Self> {
        expect_type(&wire.kind, Self::TYPE_NAME)?;
        let meta = wire.metadata;
        let counters = meta
            .counters
            .into_iter()
            .map(|(name, c)| PNCounter::from_wire(c).map(|c| (name, c)))
            .collect::<CrdtResult<_>>()?;
        Ok(Self {
            registers: LWWMap::from_wire(meta.registers)?,
            multi: MVMap::from_wire(meta.multi)?,
            counters,
            context: meta.context,
        })
    }
}
