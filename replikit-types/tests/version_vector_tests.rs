use proptest::prelude::*;
use replikit_types::{CausalOrder, ReplicaId, Timestamp, VersionVector};

fn replica(n: u8) -> ReplicaId {
    ReplicaId::from_uuid(uuid::Uuid::from_bytes([
        n, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    ]))
}

fn ts(n: u8, counter: u64) -> Timestamp {
    Timestamp::new(replica(n), counter)
}

fn vv(entries: &[(u8, u64)]) -> VersionVector {
    entries.iter().map(|&(n, c)| ts(n, c)).collect()
}

#[test]
fn new_vector_is_empty() {
    let v = VersionVector::new();
    assert!(v.is_empty());
    assert_eq!(v.len(), 0);
    assert_eq!(v.max(), 0);
}

#[test]
fn get_unknown_replica_returns_sentinel() {
    let v = VersionVector::new();
    assert_eq!(v.get(&ReplicaId::new()), 0);
}

// ── Contains / update ────────────────────────────────────────────

#[test]
fn contains_up_to_recorded_counter() {
    let v = vv(&[(1, 5)]);
    assert!(v.contains(&ts(1, 1)));
    assert!(v.contains(&ts(1, 5)));
    assert!(!v.contains(&ts(1, 6)));
    assert!(!v.contains(&ts(2, 1)));
}

#[test]
fn update_lower_value_is_noop() {
    let mut v = VersionVector::new();
    v.update(&ts(1, 10));
    v.update(&ts(1, 3));
    assert_eq!(v.get(&replica(1)), 10);
}

#[test]
fn update_adds_replica() {
    let mut v = VersionVector::new();
    v.update(&ts(7, 2));
    assert_eq!(v.len(), 1);
    assert_eq!(v.iter().next(), Some((&replica(7), &2)));
}

#[test]
fn max_over_all_entries() {
    let v = vv(&[(1, 5), (2, 9), (3, 2)]);
    assert_eq!(v.max(), 9);
}

// ── Compare ──────────────────────────────────────────────────────

#[test]
fn compare_empty_vectors_are_equal() {
    assert_eq!(
        VersionVector::new().compare(&VersionVector::new()),
        CausalOrder::Equal
    );
}

#[test]
fn compare_before_after() {
    let a = vv(&[(1, 1)]);
    let b = vv(&[(1, 2)]);

    assert_eq!(a.compare(&b), CausalOrder::Before);
    assert_eq!(b.compare(&a), CausalOrder::After);
    assert!(a.is_smaller(&b));
    assert!(a.is_smaller_or_equal(&b));
    assert!(b.is_greater(&a));
    assert!(b.is_greater_or_equal(&a));
    assert!(a < b);
}

#[test]
fn compare_concurrent() {
    let a = vv(&[(1, 1)]);
    let b = vv(&[(2, 1)]);

    assert_eq!(a.compare(&b), CausalOrder::Concurrent);
    assert!(a.is_not_comparable(&b));
    assert!(!a.is_smaller(&b));
    assert!(!a.is_greater(&b));
    assert_eq!(a.partial_cmp(&b), None);
}

#[test]
fn equal_vectors_are_smaller_or_equal_both_ways() {
    let a = vv(&[(1, 3), (2, 4)]);
    let b = a.clone();
    assert!(a.is_smaller_or_equal(&b));
    assert!(a.is_greater_or_equal(&b));
    assert!(!a.is_smaller(&b));
    assert!(!a.is_greater(&b));
    assert_eq!(a, b);
}

// ── Merge ────────────────────────────────────────────────────────

#[test]
fn merge_takes_maximum() {
    let mut a = vv(&[(1, 2)]);
    let b = vv(&[(1, 1), (2, 3)]);

    a.merge(&b);
    assert_eq!(a.get(&replica(1)), 2);
    assert_eq!(a.get(&replica(2)), 3);
}

#[test]
fn update_vv_matches_merge() {
    let mut a = vv(&[(1, 2)]);
    let b = vv(&[(2, 5)]);
    let expected = a.merged(&b);
    a.update_vv(&b);
    assert_eq!(a, expected);
}

#[test]
fn merged_leaves_receiver_untouched() {
    let a = vv(&[(1, 1)]);
    let b = vv(&[(2, 1)]);
    let result = a.merged(&b);
    assert_eq!(result.get(&replica(2)), 1);
    assert_eq!(a.get(&replica(2)), 0);
}

// ── Serde ────────────────────────────────────────────────────────

#[test]
fn serializes_as_replica_keyed_object() {
    let v = vv(&[(1, 4)]);
    let json = serde_json::to_string(&v).unwrap();
    assert_eq!(json, format!("{{\"{}\":4}}", replica(1)));
    let parsed: VersionVector = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, v);
}

// ── Properties ───────────────────────────────────────────────────

fn vv_strategy() -> impl Strategy<Value = VersionVector> {
    prop::collection::vec((0u8..4, 0u64..20), 0..6).prop_map(|entries| vv(&entries))
}

proptest! {
    /// Exactly one of `<`, `>`, `==`, incomparable holds for any pair.
    #[test]
    fn ordering_predicates_partition_pairs(a in vv_strategy(), b in vv_strategy()) {
        let holds = [
            a.is_smaller(&b),
            a.is_greater(&b),
            a == b,
            a.is_not_comparable(&b),
        ];
        prop_assert_eq!(holds.iter().filter(|&&h| h).count(), 1);
    }

    #[test]
    fn merge_is_commutative(a in vv_strategy(), b in vv_strategy()) {
        prop_assert_eq!(a.merged(&b), b.merged(&a));
    }

    #[test]
    fn merge_is_associative(a in vv_strategy(), b in vv_strategy(), c in vv_strategy()) {
        prop_assert_eq!(a.merged(&b).merged(&c), a.merged(&b.merged(&c)));
    }

    #[test]
    fn merge_dominates_both_inputs(a in vv_strategy(), b in vv_strategy()) {
        let m = a.merged(&b);
        prop_assert!(m.is_greater_or_equal(&a));
        prop_assert!(m.is_greater_or_equal(&b));
    }
}
