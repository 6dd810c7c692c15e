use replikit_types::{ReplicaId, Timestamp};
use std::collections::HashSet;

fn replica(n: u8) -> ReplicaId {
    ReplicaId::from_uuid(uuid::Uuid::from_bytes([
        n, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    ]))
}

// ── Construction ─────────────────────────────────────────────────

#[test]
fn new_from_components() {
    let ts = Timestamp::new(replica(3), 42);
    assert_eq!(ts.replica(), replica(3));
    assert_eq!(ts.counter(), 42);
}

// ── Ordering ─────────────────────────────────────────────────────

#[test]
fn ordering_by_counter_first() {
    let a = Timestamp::new(replica(9), 1);
    let b = Timestamp::new(replica(1), 2);
    assert!(a < b);
}

#[test]
fn ordering_by_replica_when_counter_equal() {
    let a = Timestamp::new(replica(1), 5);
    let b = Timestamp::new(replica(2), 5);
    assert!(a < b);
    assert_eq!(a.partial_cmp(&b), Some(std::cmp::Ordering::Less));
}

#[test]
fn equal_timestamps() {
    let a = Timestamp::new(replica(1), 5);
    let b = Timestamp::new(replica(1), 5);
    assert_eq!(a, b);
    assert!(!(a < b));
    assert!(!(a > b));
}

#[test]
fn hash_eq() {
    let ts = Timestamp::new(replica(1), 1);
    let mut set = HashSet::new();
    set.insert(ts);
    set.insert(ts);
    assert_eq!(set.len(), 1);
}

// ── Text / JSON forms ────────────────────────────────────────────

#[test]
fn display_and_parse() {
    let ts = Timestamp::new(replica(4), 17);
    let text = ts.to_string();
    assert!(text.starts_with("17@"));
    let parsed: Timestamp = text.parse().unwrap();
    assert_eq!(parsed, ts);
}

#[test]
fn parse_invalid() {
    assert!("17".parse::<Timestamp>().is_err());
    assert!("x@00000000-0000-0000-0000-000000000000".parse::<Timestamp>().is_err());
    assert!("1@not-a-uuid".parse::<Timestamp>().is_err());
}

#[test]
fn json_shape() {
    let ts = Timestamp::new(ReplicaId::from_uuid(uuid::Uuid::nil()), 3);
    let json = serde_json::to_string(&ts).unwrap();
    assert_eq!(
        json,
        r#"{"replica":"00000000-0000-0000-0000-000000000000","counter":3}"#
    );
    let parsed: Timestamp = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, ts);
}
