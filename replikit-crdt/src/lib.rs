//! Delta-state CRDT implementations for replikit.
//!
//! This crate provides Conflict-free Replicated Data Types:
//!
//! - [`LWWRegister<T>`] / [`LWWMap`] — last-writer-wins values
//! - [`MVRegister<T>`] / [`MVMap`] — multi-value registers that keep concurrent writes
//! - [`PNCounter`] — increment/decrement counter
//! - [`BCounter`] — counter that never crosses a bound
//! - [`Ratchet<T>`] — register that only moves upward
//! - [`RGA<T>`] — Replicated Growable Array for sequences/text
//! - [`Map`] — registers, multi-value registers and counters under one key space
//! - [`Crdt`] — any of the above, chosen at runtime by [`CrdtKind`]
//!
//! Every type implements [`DeltaCrdt`]: `generate_delta` extracts what a
//! replica at a given version vector has not seen, and `merge` absorbs a
//! delta or a full state with the same algorithm. Merges are:
//! - **Commutative**: merge(a, b) == merge(b, a)
//! - **Associative**: merge(merge(a, b), c) == merge(a, merge(b, c))
//! - **Idempotent**: merge(a, a) == a
//!
//! These properties ensure that replicas will converge to the same state
//! regardless of the order in which deltas are received.

mod b_counter;
mod crdt;
mod delta;
mod error;
mod json;
mod lww_map;
mod lww_register;
mod map;
mod mv_map;
mod mv_register;
mod pn_counter;
mod ratchet;
mod rga;
mod scalar;

pub use b_counter::{BCounter, BCounterWire, BoundMode};
pub use crdt::{Crdt, CrdtKind, CrdtWire};
pub use delta::DeltaCrdt;
pub use error::{CrdtError, CrdtResult};
pub use json::JsonCodec;
pub use lww_map::{LWWMap, LWWMapWire};
pub use lww_register::{LWWRegister, LWWRegisterWire};
pub use map::{Map, MapWire};
pub use mv_map::{MVMap, MVMapWire};
pub use mv_register::{MVMetadata, MVRegister, MVRegisterWire};
pub use pn_counter::{PNCounter, PNCounterWire};
pub use ratchet::{Ratchet, RatchetWire};
pub use rga::{RGA, RGAWire};
pub use scalar::{Scalar, ValueKind};

pub use replikit_types;
