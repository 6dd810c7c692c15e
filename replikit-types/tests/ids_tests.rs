use replikit_types::ReplicaId;
use std::collections::HashSet;
use std::str::FromStr;

#[test]
fn replica_id_new_is_unique() {
    let a = ReplicaId::new();
    let b = ReplicaId::new();
    assert_ne!(a, b);
}

#[test]
fn replica_id_from_uuid_roundtrip() {
    let uuid = uuid::Uuid::now_v7();
    let id = ReplicaId::from_uuid(uuid);
    assert_eq!(id.as_uuid(), uuid);
}

#[test]
fn replica_id_display_and_parse() {
    let id = ReplicaId::new();
    let parsed = ReplicaId::parse(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn replica_id_from_str() {
    let id = ReplicaId::new();
    let parsed = ReplicaId::from_str(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn replica_id_parse_invalid() {
    assert!(ReplicaId::parse("not-a-uuid").is_err());
}

#[test]
fn replica_id_hash_dedup() {
    let id = ReplicaId::new();
    let set: HashSet<_> = [id, id].into_iter().collect();
    assert_eq!(set.len(), 1);
}

#[test]
fn replica_id_serde_roundtrip() {
    let id = ReplicaId::new();
    let json = serde_json::to_string(&id).unwrap();
    let parsed: ReplicaId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, parsed);
}
