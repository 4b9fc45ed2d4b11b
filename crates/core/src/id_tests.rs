// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn uid_generation_has_prefix_and_fits() {
    let uid = Uid::new();
    assert!(uid.as_str().starts_with("uid-"));
    assert_eq!(uid.as_str().len(), ID_MAX_LEN);
}

#[test]
fn uid_default_is_empty() {
    let uid = Uid::default();
    assert!(uid.is_empty());
    assert_eq!(uid.as_str(), "");
}

#[test]
fn uid_from_string_round_trips() {
    let uid = Uid::from_string("uid-abc123");
    assert_eq!(uid.as_str(), "uid-abc123");
    assert_eq!(uid, "uid-abc123");
}

#[test]
fn uid_serde() {
    let uid = Uid::from_string("uid-xyz");
    let json = serde_json::to_string(&uid).unwrap();
    assert_eq!(json, "\"uid-xyz\"");

    let parsed: Uid = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, uid);
}

#[test]
fn uid_rejects_oversized_on_deserialize() {
    let long = format!("\"{}\"", "x".repeat(ID_MAX_LEN + 1));
    assert!(serde_json::from_str::<Uid>(&long).is_err());
}

#[test]
fn id_buf_borrow_matches_str_hash() {
    use std::collections::HashMap;

    let mut map: HashMap<IdBuf, u32> = HashMap::new();
    map.insert(IdBuf::new("uid-1"), 1);
    assert_eq!(map.get("uid-1"), Some(&1));
}

#[test]
fn generated_uids_are_unique() {
    let a = Uid::new();
    let b = Uid::new();
    assert_ne!(a, b);
}
