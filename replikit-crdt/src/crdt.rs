//! The closed set of CRDT variants as one sum type.
//!
//! [`Crdt`] lets callers hold, merge and serialize a replicated value whose
//! concrete type is only known at runtime (for example from a type name on
//! the wire). Merging two different variants is the one cross-type error
//! that remains a runtime condition.

use crate::b_counter::BCounterWire;
use crate::json::JsonCodec;
use crate::lww_map::LWWMapWire;
use crate::lww_register::LWWRegisterWire;
use crate::map::MapWire;
use crate::mv_map::MVMapWire;
use crate::mv_register::MVRegisterWire;
use crate::pn_counter::PNCounterWire;
use crate::ratchet::RatchetWire;
use crate::rga::RGAWire;
use crate::{
    BCounter, CrdtError, CrdtResult, DeltaCrdt, LWWMap, LWWRegister, MVMap, MVRegister, Map,
    PNCounter, RGA, Ratchet,
};
use replikit_types::{Environment, VersionVector};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Names every variant the factory can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrdtKind {
    PNCounter,
    BCounter,
    LWWRegister,
    MVRegister,
    Ratchet,
    RGA,
    LWWMap,
    MVMap,
    Map,
}

impl CrdtKind {
    pub const ALL: [CrdtKind; 9] = [
        CrdtKind::PNCounter,
        CrdtKind::BCounter,
        CrdtKind::LWWRegister,
        CrdtKind::MVRegister,
        CrdtKind::Ratchet,
        CrdtKind::RGA,
        CrdtKind::LWWMap,
        CrdtKind::MVMap,
        CrdtKind::Map,
    ];

    /// Returns the type name used by the factory and in JSON forms.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            CrdtKind::PNCounter => PNCounter::TYPE_NAME,
            CrdtKind::BCounter => BCounter::TYPE_NAME,
            CrdtKind::LWWRegister => LWWRegister::<Value>::TYPE_NAME,
            CrdtKind::MVRegister => MVRegister::<Value>::TYPE_NAME,
            CrdtKind::Ratchet => Ratchet::<i64>::TYPE_NAME,
            CrdtKind::RGA => RGA::<Value>::TYPE_NAME,
            CrdtKind::LWWMap => LWWMap::TYPE_NAME,
            CrdtKind::MVMap => MVMap::TYPE_NAME,
            CrdtKind::Map => Map::TYPE_NAME,
        }
    }
}

impl fmt::Display for CrdtKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CrdtKind {
    type Err = CrdtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| CrdtError::UnknownType(s.to_string()))
    }
}

/// A replicated value of any variant.
///
/// Registers and sequences hold arbitrary JSON values; the ratchet holds
/// integers.
#[derive(Debug, Clone, PartialEq)]
pub enum Crdt {
    PNCounter(PNCounter),
    BCounter(BCounter),
    LWWRegister(LWWRegister<Value>),
    MVRegister(MVRegister<Value>),
    Ratchet(Ratchet<i64>),
    RGA(RGA<Value>),
    LWWMap(LWWMap),
    MVMap(MVMap),
    Map(Map),
}

/// Applies the same expression to whichever variant `$crdt` holds.
macro_rules! each_variant {
    ($crdt:expr, $inner:ident => $body:expr) => {
        match $crdt {
            Crdt::PNCounter($inner) => $body,
            Crdt::BCounter($inner) => $body,
            Crdt::LWWRegister($inner) => $body,
            Crdt::MVRegister($inner) => $body,
            Crdt::Ratchet($inner) => $body,
            Crdt::RGA($inner) => $body,
            Crdt::LWWMap($inner) => $body,
            Crdt::MVMap($inner) => $body,
            Crdt::Map($inner) => $body,
        }
    };
}

impl Crdt {
    /// Creates an empty instance of `kind`.
    #[must_use]
    pub fn new(kind: CrdtKind) -> Self {
        match kind {
            CrdtKind::PNCounter => Crdt::PNCounter(PNCounter::new()),
            CrdtKind::BCounter => Crdt::BCounter(BCounter::default()),
            CrdtKind::LWWRegister => Crdt::LWWRegister(LWWRegister::new()),
            CrdtKind::MVRegister => Crdt::MVRegister(MVRegister::new()),
            CrdtKind::Ratchet => Crdt::Ratchet(Ratchet::new()),
            CrdtKind::RGA => Crdt::RGA(RGA::new()),
            CrdtKind::LWWMap => Crdt::LWWMap(LWWMap::new()),
            CrdtKind::MVMap => Crdt::MVMap(MVMap::new()),
            CrdtKind::Map => Crdt::Map(Map::new()),
        }
    }

    /// Creates an empty instance from a type name such as `"PNCounter"`.
    pub fn from_type_name(name: &str) -> CrdtResult<Self> {
        name.parse().map(Self::new)
    }

    /// Returns which variant this is.
    #[must_use]
    pub fn kind(&self) -> CrdtKind {
        match self {
            Crdt::PNCounter(_) => CrdtKind::PNCounter,
            Crdt::BCounter(_) => CrdtKind::BCounter,
            Crdt::LWWRegister(_) => CrdtKind::LWWRegister,
            Crdt::MVRegister(_) => CrdtKind::MVRegister,
            Crdt::Ratchet(_) => CrdtKind::Ratchet,
            Crdt::RGA(_) => CrdtKind::RGA,
            Crdt::LWWMap(_) => CrdtKind::LWWMap,
            Crdt::MVMap(_) => CrdtKind::MVMap,
            Crdt::Map(_) => CrdtKind::Map,
        }
    }

    /// Produces the delta of this value relative to `since`.
    #[must_use]
    pub fn generate_delta(&self, since: &VersionVector) -> Self {
        match self {
            Crdt::PNCounter(c) => Crdt::PNCounter(c.generate_delta(since)),
            Crdt::BCounter(c) => Crdt::BCounter(c.generate_delta(since)),
            Crdt::LWWRegister(c) => Crdt::LWWRegister(c.generate_delta(since)),
            Crdt::MVRegister(c) => Crdt::MVRegister(c.generate_delta(since)),
            Crdt::Ratchet(c) => Crdt::Ratchet(c.generate_delta(since)),
            Crdt::RGA(c) => Crdt::RGA(c.generate_delta(since)),
            Crdt::LWWMap(c) => Crdt::LWWMap(c.generate_delta(since)),
            Crdt::MVMap(c) => Crdt::MVMap(c.generate_delta(since)),
            Crdt::Map(c) => Crdt::Map(c.generate_delta(since)),
        }
    }

    /// Absorbs a delta or full state of the same variant.
    ///
    /// Fails with [`CrdtError::TypeMismatch`], leaving `self` unchanged, if
    /// `delta` is another variant.
    pub fn merge(&mut self, delta: &Crdt) -> CrdtResult<()> {
        match (&mut *self, delta) {
            (Crdt::PNCounter(a), Crdt::PNCounter(b)) => a.merge(b),
            (Crdt::BCounter(a), Crdt::BCounter(b)) => a.merge(b),
            (Crdt::LWWRegister(a), Crdt::LWWRegister(b)) => a.merge(b),
            (Crdt::MVRegister(a), Crdt::MVRegister(b)) => a.merge(b),
            (Crdt::Ratchet(a), Crdt::Ratchet(b)) => a.merge(b),
            (Crdt::RGA(a), Crdt::RGA(b)) => a.merge(b),
            (Crdt::LWWMap(a), Crdt::LWWMap(b)) => a.merge(b),
            (Crdt::MVMap(a), Crdt::MVMap(b)) => a.merge(b),
            (Crdt::Map(a), Crdt::Map(b)) => a.merge(b),
            _ => {
                warn!(
                    expected = self.kind().name(),
                    found = delta.kind().name(),
                    "rejected merge across variants"
                );
                return Err(CrdtError::TypeMismatch {
                    expected: self.kind().name(),
                    found: delta.kind().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Merges, then folds what was absorbed into the replica's environment.
    pub fn merge_observed<E: Environment + ?Sized>(
        &mut self,
        delta: &Crdt,
        env: &mut E,
    ) -> CrdtResult<()> {
        self.merge(delta)?;
        env.update_state_vv(&each_variant!(delta, c => c.observed_context()));
        Ok(())
    }

    /// Returns a version vector covering every timestamp this value carries.
    #[must_use]
    pub fn causal_context(&self) -> VersionVector {
        each_variant!(self, c => c.causal_context())
    }

    /// Decodes a JSON form that must be of variant `kind`.
    pub fn decode(kind: CrdtKind, json: &str) -> CrdtResult<Self> {
        let crdt = <Self as JsonCodec>::from_json(json)?;
        if crdt.kind() != kind {
            return Err(CrdtError::TypeMismatch {
                expected: kind.name(),
                found: crdt.kind().to_string(),
            });
        }
        Ok(crdt)
    }

    #[must_use]
    pub fn as_pn_counter(&self) -> Option<&PNCounter> {
        match self {
            Crdt::PNCounter(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_pn_counter_mut(&mut self) -> Option<&mut PNCounter> {
        match self {
            Crdt::PNCounter(c) => Some(c),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_b_counter(&self) -> Option<&BCounter> {
        match self {
            Crdt::BCounter(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_b_counter_mut(&mut self) -> Option<&mut BCounter> {
        match self {
            Crdt::BCounter(c) => Some(c),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_lww_register(&self) -> Option<&LWWRegister<Value>> {
        match self {
            Crdt::LWWRegister(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_lww_register_mut(&mut self) -> Option<&mut LWWRegister<Value>> {
        match self {
            Crdt::LWWRegister(c) => Some(c),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_mv_register(&self) -> Option<&MVRegister<Value>> {
        match self {
            Crdt::MVRegister(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_mv_register_mut(&mut self) -> Option<&mut MVRegister<Value>> {
        match self {
            Crdt::MVRegister(c) => Some(c),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_ratchet(&self) -> Option<&Ratchet<i64>> {
        match self {
            Crdt::Ratchet(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_ratchet_mut(&mut self) -> Option<&mut Ratchet<i64>> {
        match self {
            Crdt::Ratchet(c) => Some(c),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_rga(&self) -> Option<&RGA<Value>> {
        match self {
            Crdt::RGA(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_rga_mut(&mut self) -> Option<&mut RGA<Value>> {
        match self {
            Crdt::RGA(c) => Some(c),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_lww_map(&self) -> Option<&LWWMap> {
        match self {
            Crdt::LWWMap(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_lww_map_mut(&mut self) -> Option<&mut LWWMap> {
        match self {
            Crdt::LWWMap(c) => Some(c),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_mv_map(&self) -> Option<&MVMap> {
        match self {
            Crdt::MVMap(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_mv_map_mut(&mut self) -> Option<&mut MVMap> {
        match self {
            Crdt::MVMap(c) => Some(c),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Crdt::Map(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut Map> {
        match self {
            Crdt::Map(c) => Some(c),
            _ => None,
        }
    }
}

impl From<PNCounter> for Crdt {
    fn from(c: PNCounter) -> Self {
        Crdt::PNCounter(c)
    }
}

impl From<BCounter> for Crdt {
    fn from(c: BCounter) -> Self {
        Crdt::BCounter(c)
    }
}

impl From<LWWRegister<Value>> for Crdt {
    fn from(c: LWWRegister<Value>) -> Self {
        Crdt::LWWRegister(c)
    }
}

impl From<MVRegister<Value>> for Crdt {
    fn from(c: MVRegister<Value>) -> Self {
        Crdt::MVRegister(c)
    }
}

impl From<Ratchet<i64>> for Crdt {
    fn from(c: Ratchet<i64>) -> Self {
        Crdt::Ratchet(c)
    }
}

impl From<RGA<Value>> for Crdt {
    fn from(c: RGA<Value>) -> Self {
        Crdt::RGA(c)
    }
}

impl From<LWWMap> for Crdt {
    fn from(c: LWWMap) -> Self {
        Crdt::LWWMap(c)
    }
}

impl From<MVMap> for Crdt {
    fn from(c: MVMap) -> Self {
        Crdt::MVMap(c)
    }
}

impl From<Map> for Crdt {
    fn from(c: Map) -> Self {
        Crdt::Map(c)
    }
}

/// JSON form of any variant, recognized by its shape.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CrdtWire {
    PNCounter(PNCounterWire),
    BCounter(BCounterWire),
    LWWRegister(LWWRegisterWire<Value>),
    MVRegister(MVRegisterWire<Value>),
    Ratchet(RatchetWire<i64>),
    RGA(RGAWire<Value>),
    LWWMap(LWWMapWire),
    MVMap(MVMapWire),
    Map(MapWire),
}

/// Detects the variant of a JSON form: the `_type` field when present,
/// otherwise the untyped shapes of the counter and the sequence.
fn detect_kind(value: &Value) -> Result<CrdtKind, String> {
    if let Some(name) = value.get("_type") {
        let name = name.as_str().ok_or("_type is not a string")?;
        return name.parse().map_err(|_| format!("unknown CRDT type: {name}"));
    }
    if value.get("metadata").is_some() {
        return Ok(CrdtKind::RGA);
    }
    if value
        .get("_metadata")
        .is_some_and(|m| m.get("increment").is_some())
    {
        return Ok(CrdtKind::PNCounter);
    }
    Err("unrecognized CRDT JSON form".to_string())
}

impl<'de> Deserialize<'de> for CrdtWire {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let kind = detect_kind(&value).map_err(D::Error::custom)?;
        let wire = match kind {
            CrdtKind::PNCounter => serde_json::from_value(value).map(CrdtWire::PNCounter),
            CrdtKind::BCounter => serde_json::from_value(value).map(CrdtWire::BCounter),
            CrdtKind::LWWRegister => serde_json::from_value(value).map(CrdtWire::LWWRegister),
            CrdtKind::MVRegister => serde_json::from_value(value).map(CrdtWire::MVRegister),
            CrdtKind::Ratchet => serde_json::from_value(value).map(CrdtWire::Ratchet),
            CrdtKind::RGA => serde_json::from_value(value).map(CrdtWire::RGA),
            CrdtKind::LWWMap => serde_json::from_value(value).map(CrdtWire::LWWMap),
            CrdtKind::MVMap => serde_json::from_value(value).map(CrdtWire::MVMap),
            CrdtKind::Map => serde_json::from_value(value).map(CrdtWire::Map),
        };
        wire.map_err(D::Error::custom)
    }
}

impl JsonCodec for Crdt {
    type Wire = CrdtWire;
    const WIRE_TYPE: Option<&'static str> = None;

    fn to_wire(&self) -> Self::Wire {
        match self {
            Crdt::PNCounter(c) => CrdtWire::PNCounter(c.to_wire()),
            Crdt::BCounter(c) => CrdtWire::BCounter(c.to_wire()),
            Crdt::LWWRegister(c) => CrdtWire::LWWRegister(c.to_wire()),
            Crdt::MVRegister(c) => CrdtWire::MVRegister(c.to_wire()),
            Crdt::Ratchet(c) => CrdtWire::Ratchet(c.to_wire()),
            Crdt::RGA(c) => CrdtWire::RGA(c.to_wire()),
            Crdt::LWWMap(c) => CrdtWire::LWWMap(c.to_wire()),
            Crdt::MVMap(c) => CrdtWire::MVMap(c.to_wire()),
            Crdt::Map(c) => CrdtWire::Map(c.to_wire()),
        }
    }

    fn from_wire(wire: Self::Wire) -> CrdtResult<Self> {
        Ok(match wire {
            CrdtWire::PNCounter(w) => Crdt::PNCounter(PNCounter::from_wire(w)?),
            CrdtWire::BCounter(w) => Crdt::BCounter(BCounter::from_wire(w)?),
            CrdtWire::LWWRegister(w) => Crdt::LWWRegister(LWWRegister::from_wire(w)?),
            CrdtWire::MVRegister(w) => Crdt::MVRegister(MVRegister::from_wire(w)?),
            CrdtWire::Ratchet(w) => Crdt::Ratchet(Ratchet::from_wire(w)?),
            CrdtWire::RGA(w) => Crdt::RGA(RGA::from_wire(w)?),
            CrdtWire::LWWMap(w) => Crdt::LWWMap(LWWMap::from_wire(w)?),
            CrdtWire::MVMap(w) => Crdt::MVMap(MVMap::from_wire(w)?),
            CrdtWire::Map(w) => Crdt::Map(Map::from_wire(w)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_name_parses_back() {
        for kind in CrdtKind::ALL {
            assert_eq!(kind.name().parse::<CrdtKind>().unwrap(), kind);
            assert_eq!(Crdt::new(kind).kind(), kind);
        }
    }

    #[test]
    fn untyped_forms_are_detected_by_shape() {
        let counter = serde_json::json!({"_metadata": {"increment": [], "decrement": []}, "value": 0});
        let sequence = serde_json::json!({"metadata": [], "value": []});
        assert_eq!(detect_kind(&counter), Ok(CrdtKind::PNCounter));
        assert_eq!(detect_kind(&sequence), Ok(CrdtKind::RGA));
        assert!(detect_kind(&serde_json::json!({"value": 1})).is_err());
    }
}
