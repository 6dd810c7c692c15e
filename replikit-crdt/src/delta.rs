//! The delta-state contract shared by every variant.

use replikit_types::{Environment, VersionVector};

/// A delta-state CRDT.
///
/// A delta is a value of the same type as the full state, holding only what
/// a replica at a given version vector has not seen. Because of that duality
/// [`merge`](Self::merge) has a single algorithm for both deltas and full
/// states.
///
/// Implementations must satisfy, for every reachable `a`, `b`, `c`:
/// - **Commutative**: merge(a, b) == merge(b, a)
/// - **Associative**: merge(merge(a, b), c) == merge(a, merge(b, c))
/// - **Idempotent**: merge(a, a) == a
/// - **Delta-equivalent**: merging `s.generate_delta(vv)` into a replica whose
///   causal context is `vv` gives the same state as merging `s`.
pub trait DeltaCrdt: Clone {
    /// The type name used by the factory and the JSON `_type` field.
    const TYPE_NAME: &'static str;

    /// Produces the part of this state not dominated by `since`.
    #[must_use]
    fn generate_delta(&self, since: &VersionVector) -> Self;

    /// Absorbs a delta or a full replica state. Only `self` is mutated.
    fn merge(&mut self, delta: &Self);

    /// Returns a version vector covering every timestamp this state carries.
    #[must_use]
    fn causal_context(&self) -> VersionVector;

    /// Returns every timestamp this state carries, including ones that
    /// [`causal_context`](Self::causal_context) holds back.
    #[must_use]
    fn observed_context(&self) -> VersionVector {
        self.causal_context()
    }

    /// Creates a new state that is the merge of this and another.
    #[must_use]
    fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    /// Merges, then folds what was absorbed into the replica's environment.
    ///
    /// Timestamps minted afterwards are then greater than everything merged,
    /// so a local write made after a merge wins over every merged write.
    fn merge_observed<E: Environment + ?Sized>(&mut self, delta: &Self, env: &mut E) {
        self.merge(delta);
        env.update_state_vv(&delta.observed_context());
    }
}
