// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::diagnosis::Diagnosis;
use crate::operation::{Operation, OperationEndpoint, OperationSpec, Scheme};
use crate::operation_set::{AdjacencyNode, OperationSet};

// ── Proptest strategies ─────────────────────────────────────────────────

/// Proptest strategies for core state machine types.
#[cfg(test)]
pub mod strategies {
    use crate::diagnosis::DiagnosisPhase;
    use proptest::prelude::*;

    pub fn arb_phase() -> impl Strategy<Value = DiagnosisPhase> {
        prop_oneof![
            Just(DiagnosisPhase::Pending),
            Just(DiagnosisPhase::Running),
            Just(DiagnosisPhase::Succeeded),
            Just(DiagnosisPhase::Failed),
            Just(DiagnosisPhase::Unknown),
        ]
    }
}

// ── Object factory functions ────────────────────────────────────────────

/// Operation pointing at a local worker port, 5s timeout.
pub fn operation(name: &str, port: u16) -> Operation {
    Operation {
        meta: crate::meta::ObjectMeta::named(name),
        spec: OperationSpec {
            endpoint: OperationEndpoint {
                scheme: Scheme::Http,
                host: "127.0.0.1".to_string(),
                port,
                path: format!("/processor/{name}"),
            },
            timeout_seconds: 5,
            storage: None,
        },
    }
}

/// OperationSet whose source fans straight into a single chain
/// `0 -> 1 -> 2 -> ... -> n`.
pub fn linear_set(name: &str, operations: &[&str]) -> OperationSet {
    let mut adjacency = vec![AdjacencyNode::source(if operations.is_empty() {
        vec![]
    } else {
        vec![1]
    })];
    for (i, op) in operations.iter().enumerate() {
        let id = i as u64 + 1;
        let to = if i + 1 < operations.len() { vec![id + 1] } else { vec![] };
        adjacency.push(AdjacencyNode::new(id, *op, to));
    }
    OperationSet::new(name, adjacency)
}

/// Diagnosis bound directly to a node.
pub fn diagnosis(name: &str, operation_set: &str, node: &str) -> Diagnosis {
    Diagnosis::new(name, operation_set).node_name(node)
}
