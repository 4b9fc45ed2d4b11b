// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn node(id: u64, operation: &str, to: Vec<u64>) -> AdjacencyNode {
    AdjacencyNode::new(id, operation, to)
}

fn source(to: Vec<u64>) -> AdjacencyNode {
    AdjacencyNode::source(to)
}

fn ids(path: &Path) -> Vec<u64> {
    path.iter().map(|n| n.id).collect()
}

#[test]
fn linear_chain_yields_one_path() {
    let compiled = compile(&[
        source(vec![1]),
        node(1, "pod-collector", vec![2]),
        node(2, "disk-analyzer", vec![]),
    ])
    .unwrap();

    assert_eq!(compiled.paths.len(), 1);
    assert_eq!(ids(&compiled.paths[0]), vec![1, 2]);
    assert_eq!(compiled.paths[0][0].operation, "pod-collector");
    assert_eq!(compiled.paths[0][1].operation, "disk-analyzer");
}

#[test]
fn diamond_yields_two_paths_in_ascending_child_order() {
    let compiled = compile(&[
        source(vec![1]),
        node(1, "collect", vec![3, 2]),
        node(2, "profile", vec![4]),
        node(3, "analyze", vec![4]),
        node(4, "recover", vec![]),
    ])
    .unwrap();

    // Children are visited by ascending id regardless of declaration order.
    assert_eq!(compiled.paths.len(), 2);
    assert_eq!(ids(&compiled.paths[0]), vec![1, 2, 4]);
    assert_eq!(ids(&compiled.paths[1]), vec![1, 3, 4]);
}

#[test]
fn fan_out_from_source_yields_independent_paths() {
    let compiled = compile(&[
        source(vec![1, 2]),
        node(1, "collect", vec![]),
        node(2, "profile", vec![]),
    ])
    .unwrap();

    assert_eq!(compiled.paths.len(), 2);
    assert_eq!(ids(&compiled.paths[0]), vec![1]);
    assert_eq!(ids(&compiled.paths[1]), vec![2]);
}

#[test]
fn source_without_successors_yields_no_paths() {
    let compiled = compile(&[source(vec![])]).unwrap();
    assert!(compiled.paths.is_empty());
    assert!(!compiled.hash.is_empty());
}

#[test]
fn cycle_is_rejected_with_offending_edge() {
    let err = compile(&[
        source(vec![1]),
        node(1, "collect", vec![2]),
        node(2, "profile", vec![1]),
    ])
    .unwrap_err();

    assert_eq!(err, GraphError::Cycle { from: 2, to: 1 });
    assert_eq!(err.condition_kind(), CONDITION_DAG_NOT_READY);
}

#[test]
fn self_loop_is_rejected() {
    let err = compile(&[source(vec![1]), node(1, "collect", vec![1])]).unwrap_err();
    assert_eq!(err, GraphError::SelfLoop(1));
    assert_eq!(err.condition_kind(), CONDITION_DAG_NOT_READY);
}

#[test]
fn dangling_edge_is_rejected() {
    let err = compile(&[source(vec![1]), node(1, "collect", vec![9])]).unwrap_err();
    assert_eq!(err, GraphError::DanglingEdge { from: 1, to: 9 });
    assert_eq!(err.condition_kind(), CONDITION_SET_NOT_READY);
}

#[test]
fn duplicate_node_id_is_rejected() {
    let err = compile(&[
        source(vec![1]),
        node(1, "collect", vec![]),
        node(1, "profile", vec![]),
    ])
    .unwrap_err();
    assert_eq!(err, GraphError::DuplicateNode(1));
}

#[test]
fn missing_source_is_rejected() {
    let err = compile(&[node(1, "collect", vec![])]).unwrap_err();
    assert_eq!(err, GraphError::MissingSource);
}

#[test]
fn edge_into_source_is_rejected() {
    let err = compile(&[source(vec![1]), node(1, "collect", vec![0])]).unwrap_err();
    assert_eq!(err, GraphError::EdgeIntoSource { from: 1 });
}

#[test]
fn source_with_operation_is_rejected() {
    let err = compile(&[
        AdjacencyNode::new(0, "sneaky", vec![1]),
        node(1, "collect", vec![]),
    ])
    .unwrap_err();
    assert_eq!(err, GraphError::SourceHasOperation);
}

#[test]
fn non_source_node_without_operation_is_rejected() {
    let err = compile(&[source(vec![1]), AdjacencyNode::new(1, "", vec![])]).unwrap_err();
    assert_eq!(err, GraphError::MissingOperation(1));
}

#[test]
fn path_ceiling_is_enforced() {
    // Three binary fan-out layers: 2^3 = 8 paths.
    let adjacency = vec![
        source(vec![1, 2]),
        node(1, "a", vec![3, 4]),
        node(2, "b", vec![3, 4]),
        node(3, "c", vec![5, 6]),
        node(4, "d", vec![5, 6]),
        node(5, "e", vec![]),
        node(6, "f", vec![]),
    ];

    assert!(compile_with_limit(&adjacency, 8).is_ok());
    assert_eq!(
        compile_with_limit(&adjacency, 7).unwrap_err(),
        GraphError::TooManyPaths { limit: 7 }
    );
}

#[test]
fn hash_ignores_declaration_order() {
    let declared = vec![
        node(2, "profile", vec![]),
        source(vec![2, 1]),
        node(1, "collect", vec![2]),
    ];
    let canonical = vec![
        source(vec![1, 2]),
        node(1, "collect", vec![2]),
        node(2, "profile", vec![]),
    ];

    assert_eq!(adjacency_hash(&declared), adjacency_hash(&canonical));
}

#[test]
fn hash_changes_when_an_edge_changes() {
    let before = vec![source(vec![1]), node(1, "collect", vec![2]), node(2, "profile", vec![])];
    let after = vec![source(vec![1, 2]), node(1, "collect", vec![]), node(2, "profile", vec![])];

    assert_ne!(adjacency_hash(&before), adjacency_hash(&after));
}

#[test]
fn hash_changes_when_an_operation_is_renamed() {
    let before = vec![source(vec![1]), node(1, "collect", vec![])];
    let after = vec![source(vec![1]), node(1, "collect-v2", vec![])];

    assert_ne!(adjacency_hash(&before), adjacency_hash(&after));
}

#[test]
fn cache_compiles_each_graph_once() {
    let cache = CompileCache::new();
    let adjacency = vec![source(vec![1]), node(1, "collect", vec![])];

    let first = cache.get_or_compile(&adjacency).unwrap();
    let second = cache.get_or_compile(&adjacency).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len(), 1);
}

#[test]
fn cache_distinguishes_graphs_by_content() {
    let cache = CompileCache::new();
    let a = vec![source(vec![1]), node(1, "collect", vec![])];
    let b = vec![source(vec![1]), node(1, "profile", vec![])];

    cache.get_or_compile(&a).unwrap();
    cache.get_or_compile(&b).unwrap();

    assert_eq!(cache.len(), 2);
}

#[test]
fn cache_does_not_cache_failures() {
    let cache = CompileCache::new();
    let bad = vec![source(vec![1]), node(1, "collect", vec![1])];

    assert!(cache.get_or_compile(&bad).is_err());
    assert!(cache.is_empty());
}
