//! Replicated Growable Array (RGA) for sequences.
//!
//! A CRDT for ordered sequences that supports insert and remove operations.
//! Every node remembers the node it was inserted after (its anchor), which
//! makes the sequence a tree rooted at an implicit head. The physical order
//! is a depth-first walk of that tree with siblings sorted by decreasing
//! uid, so a later insert at the same position lands first.
//!
//! Removed nodes stay in place as tombstones: they no longer show up in the
//! logical sequence but remain valid anchors for concurrent inserts.
//!
//! A node that arrives before its anchor waits in a pending buffer, with its
//! anchor untouched, until a later merge brings the anchor in.
//!
//! Use cases:
//! - Text content (the characters in a paragraph)
//! - Ordered lists where position matters

use crate::json::JsonCodec;
use crate::{CrdtError, CrdtResult, DeltaCrdt};
use replikit_types::{Environment, ReplicaId, Timestamp, VersionVector};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// One element of the sequence, live or removed.
#[derive(Debug, Clone, PartialEq)]
struct Node<T> {
    /// `None` once removed.
    atom: Option<T>,
    /// Uid of the node this one was inserted after; `None` for the head.
    anchor: Option<Timestamp>,
    uid: Timestamp,
    /// The insert timestamp, or the removal timestamp for a tombstone.
    ts: Timestamp,
    removed: bool,
}

/// A Replicated Growable Array.
///
/// Nodes are kept in one flat vector in sequence order, with a uid index
/// for anchor lookups. Nodes whose anchor is not stored yet are kept apart,
/// sorted by uid.
#[derive(Debug, Clone)]
pub struct RGA<T> {
    nodes: Vec<Node<T>>,
    positions: HashMap<Timestamp, usize>,
    pending: Vec<Node<T>>,
}

impl<T> Default for RGA<T> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            positions: HashMap::new(),
            pending: Vec::new(),
        }
    }
}

impl<T: PartialEq> PartialEq for RGA<T> {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes && self.pending == other.pending
    }
}

/// Applies a removal carried by `incoming` to the stored copy of the node.
fn supersede<T>(local: &mut Node<T>, incoming: &Node<T>) {
    if incoming.removed && (!local.removed || incoming.ts > local.ts) {
        local.atom = None;
        local.removed = true;
        local.ts = incoming.ts;
    }
}

impl<T> RGA<T> {
    /// Creates a new empty sequence.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of visible (non-removed) elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| !n.removed).count()
    }

    /// Returns true if the sequence has no visible elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of stored nodes, tombstones and pending nodes
    /// included.
    #[must_use]
    pub fn physical_len(&self) -> usize {
        self.nodes.len() + self.pending.len()
    }

    /// Returns the number of nodes waiting for their anchor to arrive.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Returns the element at the given visible index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.physical(index).and_then(|i| self.nodes[i].atom.as_ref())
    }

    /// Iterates over the visible elements in order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.nodes.iter().filter_map(|n| n.atom.as_ref())
    }

    /// Returns the uid of the element at the given visible index.
    #[must_use]
    pub fn uid_at(&self, index: usize) -> Option<Timestamp> {
        self.physical(index).map(|i| self.nodes[i].uid)
    }

    /// Returns the visible index of a live node.
    #[must_use]
    pub fn index_of(&self, uid: &Timestamp) -> Option<usize> {
        let pos = *self.positions.get(uid)?;
        if self.nodes[pos].removed {
            return None;
        }
        Some(self.nodes[..pos].iter().filter(|n| !n.removed).count())
    }

    /// Returns true if a node with this uid is stored, live or removed.
    ///
    /// Pending nodes count as stored.
    #[must_use]
    pub fn contains_node(&self, uid: &Timestamp) -> bool {
        self.positions.contains_key(uid) || self.pending.iter().any(|n| n.uid == *uid)
    }

    /// Returns true if the node with this uid is a tombstone.
    #[must_use]
    pub fn is_removed(&self, uid: &Timestamp) -> bool {
        self.positions
            .get(uid)
            .is_some_and(|&i| self.nodes[i].removed)
    }

    /// Maps a visible index to a physical position.
    fn physical(&self, index: usize) -> Option<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.removed)
            .nth(index)
            .map(|(i, _)| i)
    }

    /// Finds where a new node belongs: after its anchor, before the first
    /// sibling with a smaller uid, past the subtrees of greater siblings.
    ///
    /// Returns `None` if the anchor is not stored.
    fn integration_point(&self, anchor: Option<Timestamp>, uid: Timestamp) -> Option<usize> {
        let start = match anchor {
            None => 0,
            Some(a) => *self.positions.get(&a)? + 1,
        };
        let mut skipped = HashSet::new();
        for (offset, node) in self.nodes[start..].iter().enumerate() {
            if node.anchor == anchor {
                if node.uid < uid {
                    return Some(start + offset);
                }
                skipped.insert(node.uid);
            } else if node.anchor.is_some_and(|a| skipped.contains(&a)) {
                skipped.insert(node.uid);
            } else {
                return Some(start + offset);
            }
        }
        Some(self.nodes.len())
    }

    /// Stores a node whose anchor is unknown, keeping the buffer sorted and
    /// free of duplicate uids.
    fn park(&mut self, node: Node<T>) {
        match self.pending.binary_search_by_key(&node.uid, |n| n.uid) {
            Ok(i) => supersede(&mut self.pending[i], &node),
            Err(i) => self.pending.insert(i, node),
        }
    }

    fn place(&mut self, at: usize, node: Node<T>) {
        self.nodes.insert(at, node);
        for (i, n) in self.nodes.iter().enumerate().skip(at) {
            self.positions.insert(n.uid, i);
        }
    }

    /// Inserts `atom` so that it becomes visible index `index`.
    ///
    /// Returns the uid of the new node.
    pub fn insert_at<E: Environment + ?Sized>(
        &mut self,
        index: usize,
        atom: T,
        env: &mut E,
    ) -> CrdtResult<Timestamp> {
        let anchor = match index {
            0 => None,
            _ => Some(self.uid_at(index - 1).ok_or(CrdtError::IndexOutOfBounds {
                index,
                len: self.len(),
            })?),
        };
        let uid = env.new_timestamp()?;
        let at = self
            .integration_point(anchor, uid)
            .unwrap_or(self.nodes.len());
        self.place(at, Node {
            atom: Some(atom),
            anchor,
            uid,
            ts: uid,
            removed: false,
        });
        Ok(uid)
    }

    /// Appends `atom` at the end of the visible sequence.
    pub fn push<E: Environment + ?Sized>(&mut self, atom: T, env: &mut E) -> CrdtResult<Timestamp> {
        self.insert_at(self.len(), atom, env)
    }

    /// Removes the element at visible index `index`, leaving a tombstone.
    pub fn remove_at<E: Environment + ?Sized>(&mut self, index: usize, env: &mut E) -> CrdtResult<T> {
        let pos = self.physical(index).ok_or(CrdtError::IndexOutOfBounds {
            index,
            len: self.len(),
        })?;
        let ts = env.new_timestamp()?;
        let node = &mut self.nodes[pos];
        let atom = node
            .atom
            .take()
            .ok_or_else(|| CrdtError::Malformed(format!("live node {} has no atom", node.uid)))?;
        node.removed = true;
        node.ts = ts;
        Ok(atom)
    }
}

impl<T: Clone> RGA<T> {
    /// Returns the visible elements as a vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    /// Integrates one foreign node. Returns false if its anchor is unknown.
    fn absorb(&mut self, node: &Node<T>) -> bool {
        if let Some(&pos) = self.positions.get(&node.uid) {
            supersede(&mut self.nodes[pos], node);
            return true;
        }
        match self.integration_point(node.anchor, node.uid) {
            Some(at) => {
                self.place(at, node.clone());
                true
            }
            None => false,
        }
    }

    /// Integrates every pending node whose anchor is now stored.
    fn settle(&mut self) {
        let mut waiting = std::mem::take(&mut self.pending);
        loop {
            let before = waiting.len();
            waiting.retain(|n| !self.absorb(n));
            if waiting.len() == before {
                break;
            }
        }
        for node in waiting {
            self.park(node);
        }
    }

    /// Every timestamp carried, pending nodes included.
    fn carried(&self) -> VersionVector {
        self.nodes
            .iter()
            .chain(&self.pending)
            .flat_map(|n| [n.uid, n.ts])
            .collect()
    }
}

impl<T: Clone> DeltaCrdt for RGA<T> {
    const TYPE_NAME: &'static str = "RGA";

    /// Nodes inserted or removed outside `since`. Nodes whose anchor is
    /// also in the delta keep their sequence order; the rest are pending.
    fn generate_delta(&self, since: &VersionVector) -> Self {
        let unseen = |n: &&Node<T>| !since.contains(&n.uid) || !since.contains(&n.ts);
        let mut delta = Self::new();
        for node in self.nodes.iter().filter(unseen) {
            if node.anchor.is_none_or(|a| delta.positions.contains_key(&a)) {
                delta.positions.insert(node.uid, delta.nodes.len());
                delta.nodes.push(node.clone());
            } else {
                delta.park(node.clone());
            }
        }
        for node in self.pending.iter().filter(unseen) {
            delta.park(node.clone());
        }
        delta
    }

    /// A tombstone always overrides a live node with the same uid. A node
    /// whose anchor is still missing waits for a later merge.
    fn merge(&mut self, delta: &Self) {
        for node in delta.nodes.iter().chain(&delta.pending) {
            if !self.absorb(node) {
                self.park(node.clone());
            }
        }
        self.settle();
        if !self.pending.is_empty() {
            debug!(
                pending = self.pending.len(),
                "sequence nodes waiting for their anchors"
            );
        }
    }

    /// Timestamps of integrated nodes, held below every missing anchor so
    /// that peers send the anchors again.
    fn causal_context(&self) -> VersionVector {
        let mut ceiling: HashMap<ReplicaId, u64> = HashMap::new();
        for anchor in self.pending.iter().filter_map(|n| n.anchor) {
            let limit = anchor.counter().saturating_sub(1);
            ceiling
                .entry(anchor.replica())
                .and_modify(|c| *c = (*c).min(limit))
                .or_insert(limit);
        }
        self.nodes
            .iter()
            .flat_map(|n| [n.uid, n.ts])
            .filter(|ts| {
                ceiling
                    .get(&ts.replica())
                    .is_none_or(|&c| ts.counter() <= c)
            })
            .collect()
    }

    fn observed_context(&self) -> VersionVector {
        self.carried()
    }
}

impl RGA<char> {
    /// Builds a sequence holding the characters of `text`.
    pub fn from_text<E: Environment + ?Sized>(text: &str, env: &mut E) -> CrdtResult<Self> {
        let mut rga = Self::new();
        rga.insert_str(0, text, env)?;
        Ok(rga)
    }

    /// Returns the visible characters as a string.
    #[must_use]
    pub fn as_string(&self) -> String {
        self.iter().collect()
    }

    /// Inserts `text` starting at visible index `index`. All or nothing.
    pub fn insert_str<E: Environment + ?Sized>(
        &mut self,
        index: usize,
        text: &str,
        env: &mut E,
    ) -> CrdtResult<()> {
        let len = self.len();
        if index > len {
            return Err(CrdtError::IndexOutOfBounds { index, len });
        }
        let mut next = self.clone();
        for (offset, ch) in text.chars().enumerate() {
            next.insert_at(index + offset, ch, env)?;
        }
        *self = next;
        Ok(())
    }

    /// Removes `count` characters starting at visible index `start`. All or nothing.
    pub fn remove_range<E: Environment + ?Sized>(
        &mut self,
        start: usize,
        count: usize,
        env: &mut E,
    ) -> CrdtResult<()> {
        let len = self.len();
        match start.checked_add(count) {
            Some(end) if end <= len => {}
            _ => {
                return Err(CrdtError::IndexOutOfBounds {
                    index: start.saturating_add(count),
                    len,
                });
            }
        }
        let mut next = self.clone();
        for _ in 0..count {
            next.remove_at(start, env)?;
        }
        *self = next;
        Ok(())
    }
}

/// JSON form: `{"metadata":[<node>..],"pending":[<node>..],"value":[<atom>..]}`.
///
/// `pending` is omitted when no node is waiting for its anchor.
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct RGAWire<T> {
    metadata: Vec<NodeWire<T>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pending: Vec<NodeWire<T>>,
    value: Vec<T>,
}

impl<T: Clone> NodeWire<T> {
    fn from_node(n: &Node<T>) -> Self {
        NodeWire {
            atom: n.atom.clone(),
            anchor: n.anchor,
            uid: n.uid,
            ts: n.ts,
            removed: n.removed,
        }
    }
}

impl<T: DeserializeOwned> NodeWire<T> {
    /// Checks the node's own fields; placement is checked by the caller.
    fn into_node(self) -> CrdtResult<Node<T>> {
        let atom = match (self.removed, self.atom) {
            (true, _) => None,
            (false, Some(atom)) => Some(atom),
            // A live atom that itself encodes as null.
            (false, None) => Some(serde_json::from_value(serde_json::Value::Null).map_err(
                |_| CrdtError::Malformed(format!("live node {} has no atom", self.uid)),
            )?),
        };
        if !self.removed && self.ts != self.uid {
            return Err(CrdtError::Malformed(format!(
                "live node {} stamped {}",
                self.uid, self.ts
            )));
        }
        Ok(Node {
            atom,
            anchor: self.anchor,
            uid: self.uid,
            ts: self.ts,
            removed: self.removed,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeWire<T> {
    atom: Option<T>,
    anchor: Option<Timestamp>,
    uid: Timestamp,
    ts: Timestamp,
    removed: bool,
}

impl<T> JsonCodec for RGA<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    type Wire = RGAWire<T>;
    const WIRE_TYPE: Option<&'static str> = Some(Self::TYPE_NAME);

    fn to_wire(&self) -> Self::Wire {
        RGAWire {
            metadata: self.nodes.iter().map(NodeWire::from_node).collect(),
            pending: self.pending.iter().map(NodeWire::from_node).collect(),
            value: self.to_vec(),
        }
    }

    /// Rebuilds the sequence node by node; every anchor must come first.
    fn from_wire(wire: Self::Wire) -> CrdtResult<Self> {
        let mut rga = Self::new();
        for n in wire.metadata {
            let node = n.into_node()?;
            if rga.contains_node(&node.uid) {
                return Err(CrdtError::Malformed(format!("duplicate node {}", node.uid)));
            }
            if !rga.absorb(&node) {
                return Err(CrdtError::Malformed(format!(
                    "node {} precedes its anchor",
                    node.uid
                )));
            }
        }
        for n in wire.pending {
            let node = n.into_node()?;
            if rga.contains_node(&node.uid) {
                return Err(CrdtError::Malformed(format!("duplicate node {}", node.uid)));
            }
            rga.park(node);
        }
        rga.settle();
        Ok(rga)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replikit_types::{ReplicaEnvironment, ReplicaId};

    fn env(n: u8) -> ReplicaEnvironment {
        ReplicaEnvironment::new(ReplicaId::from_uuid(uuid::Uuid::from_bytes([n; 16])))
    }

    #[test]
    fn positions_track_shifts() {
        let mut e = env(1);
        let mut rga = RGA::new();
        let b = rga.insert_at(0, 'b', &mut e).unwrap();
        let a = rga.insert_at(0, 'a', &mut e).unwrap();
        let c = rga.insert_at(2, 'c', &mut e).unwrap();

        assert_eq!(rga.index_of(&a), Some(0));
        assert_eq!(rga.index_of(&b), Some(1));
        assert_eq!(rga.index_of(&c), Some(2));
    }

    #[test]
    fn insert_past_end_fails_without_minting() {
        let mut e = env(1);
        let mut rga: RGA<char> = RGA::new();
        let err = rga.insert_at(1, 'x', &mut e).unwrap_err();
        assert!(matches!(err, CrdtError::IndexOutOfBounds { index: 1, len: 0 }));
        assert!(e.state().is_empty());
    }

    #[test]
    fn delta_nodes_out_of_order_are_deferred() {
        let mut e = env(1);
        let mut source = RGA::new();
        source.insert_at(0, 1, &mut e).unwrap();
        source.insert_at(1, 2, &mut e).unwrap();
        source.insert_at(2, 3, &mut e).unwrap();

        let mut reversed = source.clone();
        reversed.nodes.reverse();

        let mut target = RGA::new();
        target.merge(&reversed);
        assert_eq!(target.to_vec(), vec![1, 2, 3]);
        assert_eq!(target, source);
    }

    #[test]
    fn context_stays_below_missing_anchor() {
        let mut e = env(1);
        let mut source = RGA::new();
        source.push('x', &mut e).unwrap();
        let base = source.causal_context();
        source.push('y', &mut e).unwrap();

        let mut target = RGA::new();
        target.merge(&source.generate_delta(&base));
        assert_eq!(target.pending_len(), 1);
        assert!(target.causal_context().is_empty());
        assert_eq!(target.observed_context().get(&e.replica_id()), 2);

        // Answering the held-back context resends the anchor.
        target.merge(&source.generate_delta(&target.causal_context()));
        assert_eq!(target.pending_len(), 0);
        assert_eq!(target, source);
    }

    #[test]
    fn pending_nodes_survive_json() {
        let mut e = env(1);
        let mut source = RGA::new();
        source.push('x', &mut e).unwrap();
        let base = source.causal_context();
        source.push('y', &mut e).unwrap();
        let mut target = RGA::new();
        target.merge(&source.generate_delta(&base));

        let json = target.to_json().unwrap();
        assert!(json.contains("\"pending\""));
        let back = RGA::<char>::from_json(&json).unwrap();
        assert_eq!(back, target);
        assert_eq!(back.pending_len(), 1);
        assert!(!source.to_json().unwrap().contains("\"pending\""));
    }

    #[test]
    fn live_null_atom_survives_json() {
        let mut e = env(1);
        let mut rga = RGA::new();
        rga.insert_at(0, serde_json::Value::Null, &mut e).unwrap();
        let back = RGA::<serde_json::Value>::from_json(&rga.to_json().unwrap()).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back, rga);
    }
}
