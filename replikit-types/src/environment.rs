//! Timestamp environments.
//!
//! An environment is the single source of timestamps for one replica. It
//! remembers everything the replica has observed (as a version vector) so
//! that each new timestamp is strictly greater than anything seen so far,
//! local or foreign.

use crate::{Error, ReplicaId, Result, Timestamp, VersionVector};

/// A timestamp generator bound to one replica.
///
/// Data types never mint timestamps on their own; local operations ask an
/// environment, and merges report what they absorbed back to it.
pub trait Environment {
    /// Returns the replica this environment mints timestamps for.
    fn replica_id(&self) -> ReplicaId;

    /// Mints a timestamp one greater than the largest counter currently known.
    ///
    /// Fails with [`Error::Overflow`] if that counter is not representable.
    fn new_timestamp(&mut self) -> Result<Timestamp>;

    /// Returns a copy of the current causal state.
    fn current_state(&self) -> VersionVector;

    /// Folds a single foreign or local timestamp into the state.
    fn update_state_ts(&mut self, ts: &Timestamp);

    /// Folds an entire version vector into the state.
    fn update_state_vv(&mut self, vv: &VersionVector);

    /// Alias of [`new_timestamp`](Self::new_timestamp).
    fn tick(&mut self) -> Result<Timestamp> {
        self.new_timestamp()
    }
}

impl<E: Environment + ?Sized> Environment for &mut E {
    fn replica_id(&self) -> ReplicaId {
        (**self).replica_id()
    }

    fn new_timestamp(&mut self) -> Result<Timestamp> {
        (**self).new_timestamp()
    }

    fn current_state(&self) -> VersionVector {
        (**self).current_state()
    }

    fn update_state_ts(&mut self, ts: &Timestamp) {
        (**self).update_state_ts(ts);
    }

    fn update_state_vv(&mut self, vv: &VersionVector) {
        (**self).update_state_vv(vv);
    }
}

/// The standard environment: a replica id plus the version vector it has seen.
#[derive(Debug, Clone)]
pub struct ReplicaEnvironment {
    replica: ReplicaId,
    state: VersionVector,
}

impl ReplicaEnvironment {
    /// Creates an environment that has observed nothing yet.
    #[must_use]
    pub fn new(replica: ReplicaId) -> Self {
        Self {
            replica,
            state: VersionVector::new(),
        }
    }

    /// Creates an environment resuming from a previously observed state.
    #[must_use]
    pub fn with_state(replica: ReplicaId, state: VersionVector) -> Self {
        Self { replica, state }
    }

    /// Returns the observed state without copying it.
    #[must_use]
    pub fn state(&self) -> &VersionVector {
        &self.state
    }
}

impl Environment for ReplicaEnvironment {
    fn replica_id(&self) -> ReplicaId {
        self.replica
    }

    fn new_timestamp(&mut self) -> Result<Timestamp> {
        let last = self.state.max();
        let counter = last.checked_add(1).ok_or(Error::Overflow {
            replica: self.replica,
            counter: last,
        })?;
        let ts = Timestamp::new(self.replica, counter);
        self.state.update(&ts);
        Ok(ts)
    }

    fn current_state(&self) -> VersionVector {
        self.state.clone()
    }

    fn update_state_ts(&mut self, ts: &Timestamp) {
        self.state.update(ts);
    }

    fn update_state_vv(&mut self, vv: &VersionVector) {
        self.state.merge(vv);
    }
}
