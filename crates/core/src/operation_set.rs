// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OperationSet: a DAG of operations defining a diagnosis pipeline.

use crate::meta::{Condition, ObjectMeta};
use serde::{Deserialize, Serialize};

/// Node id of the implicit virtual source. It carries no operation and every
/// execution path starts at one of its successors.
pub const VIRTUAL_SOURCE_ID: u64 = 0;

/// Condition set when the adjacency list is not a directed acyclic graph.
pub const CONDITION_DAG_NOT_READY: &str = "DirectedAcyclicGraphNotReady";

/// Condition set when the graph is a DAG but cannot be admitted for another
/// reason (missing operation, path ceiling exceeded).
pub const CONDITION_SET_NOT_READY: &str = "OperationSetNotReady";

/// One node of the declared graph: which operation to run and which nodes
/// may run after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjacencyNode {
    pub id: u64,
    /// Operation name; empty on the virtual source.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub operation: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<u64>,
}

impl AdjacencyNode {
    pub fn new(id: u64, operation: impl Into<String>, to: Vec<u64>) -> Self {
        Self { id, operation: operation.into(), to }
    }

    pub fn source(to: Vec<u64>) -> Self {
        Self { id: VIRTUAL_SOURCE_ID, operation: String::new(), to }
    }
}

/// One step of an enumerated execution path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathNode {
    pub id: u64,
    pub operation: String,
}

/// A source-to-sink walk through the graph, excluding the virtual source.
pub type Path = Vec<PathNode>;

/// Desired state: the declared adjacency list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSetSpec {
    pub adjacency_list: Vec<AdjacencyNode>,
}

/// Observed state: the compiled path enumeration.
///
/// `paths` is non-empty iff `ready` is true; `hash` is the content digest of
/// the canonicalized adjacency list that produced the enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSetStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<Path>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hash: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// A declared graph of operations plus its compiled enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSet {
    #[serde(default)]
    pub meta: ObjectMeta,
    pub spec: OperationSetSpec,
    #[serde(default)]
    pub status: OperationSetStatus,
}

impl OperationSet {
    pub fn new(name: impl Into<String>, adjacency_list: Vec<AdjacencyNode>) -> Self {
        Self {
            meta: ObjectMeta::named(name),
            spec: OperationSetSpec { adjacency_list },
            status: OperationSetStatus::default(),
        }
    }
}

#[cfg(test)]
#[path = "operation_set_tests.rs"]
mod tests;
