// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn source_node_has_no_operation() {
    let node = AdjacencyNode::source(vec![1, 2]);
    assert_eq!(node.id, VIRTUAL_SOURCE_ID);
    assert!(node.operation.is_empty());
    assert_eq!(node.to, vec![1, 2]);
}

#[test]
fn status_defaults_to_not_ready() {
    let set = OperationSet::new(
        "cpu-investigation",
        vec![AdjacencyNode::source(vec![1]), AdjacencyNode::new(1, "cpu-profiler", vec![])],
    );
    assert!(!set.status.ready);
    assert!(set.status.paths.is_empty());
    assert!(set.status.hash.is_empty());
}

#[test]
fn deserializes_without_status() {
    let json = r#"{
        "meta": {"name": "mem-investigation"},
        "spec": {"adjacency_list": [
            {"id": 0, "to": [1]},
            {"id": 1, "operation": "memory-collector"}
        ]}
    }"#;

    let set: OperationSet = serde_json::from_str(json).unwrap();
    assert_eq!(set.spec.adjacency_list.len(), 2);
    assert_eq!(set.spec.adjacency_list[0].id, VIRTUAL_SOURCE_ID);
    assert!(set.spec.adjacency_list[1].to.is_empty());
    assert!(!set.status.ready);
}

#[test]
fn source_node_omits_empty_fields_in_json() {
    let node = AdjacencyNode::source(vec![]);
    let json = serde_json::to_string(&node).unwrap();
    assert_eq!(json, r#"{"id":0}"#);
}

#[test]
fn path_serde_round_trip() {
    let path: Path = vec![
        PathNode { id: 1, operation: "pod-collector".to_string() },
        PathNode { id: 2, operation: "disk-analyzer".to_string() },
    ];

    let json = serde_json::to_string(&path).unwrap();
    let parsed: Path = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, path);
}
