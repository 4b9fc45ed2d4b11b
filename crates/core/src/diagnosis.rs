// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Diagnosis: a single investigation instance tied to a node or pod.

use crate::meta::{Condition, ObjectMeta, ADJACENCY_HASH_LABEL};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Condition set when a node-local agent picks the diagnosis up.
pub const CONDITION_ACCEPTED: &str = "Accepted";

/// Condition set when execution reaches a terminal phase.
pub const CONDITION_COMPLETE: &str = "Complete";

/// High-level summary of where a diagnosis is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosisPhase {
    /// Admitted and bound to a node, but no operation has started.
    Pending,
    /// A node-local engine is executing the pipeline.
    Running,
    /// Every operation on some path terminated successfully.
    Succeeded,
    /// Every path terminated with at least one failed operation,
    /// or a pre-condition failed terminally.
    Failed,
    /// The state of the diagnosis could not be determined.
    Unknown,
}

crate::simple_display! {
    DiagnosisPhase {
        Pending => "Pending",
        Running => "Running",
        Succeeded => "Succeeded",
        Failed => "Failed",
        Unknown => "Unknown",
    }
}

impl DiagnosisPhase {
    /// Terminal phases are absorbing: no further status mutation is legal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DiagnosisPhase::Succeeded | DiagnosisPhase::Failed | DiagnosisPhase::Unknown)
    }
}

/// Machine-readable reasons carried on conditions and in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// Cycle, dangling edge, or missing operation in the declared graph.
    GraphInvalid,
    /// The referenced OperationSet's hash drifted mid-run.
    GraphChanged,
    /// The OperationSet enumerates no paths.
    OperationSetEmpty,
    /// The OperationSet has not been compiled yet.
    OperationSetNotReady,
    /// Connection-level failure talking to a worker.
    Transport,
    /// Worker answered with a non-200 status.
    OperationRejected,
    /// Worker answered 200 with an unparseable body.
    MalformedResult,
    /// Worker result exceeded the configured size cap.
    ResultTooLarge,
    /// Per-operation or per-diagnosis wall-clock limit hit.
    Timeout,
    /// Optimistic status write lost the race too many times.
    StoreConflict,
    /// A referenced object is gone.
    Missing,
    /// At least one operation failed on every path.
    OperationFailed,
}

crate::simple_display! {
    FailureReason {
        GraphInvalid => "GraphInvalid",
        GraphChanged => "GraphChanged",
        OperationSetEmpty => "OperationSetEmpty",
        OperationSetNotReady => "OperationSetNotReady",
        Transport => "Transport",
        OperationRejected => "OperationRejected",
        MalformedResult => "MalformedResult",
        ResultTooLarge => "ResultTooLarge",
        Timeout => "Timeout",
        StoreConflict => "StoreConflict",
        Missing => "Missing",
        OperationFailed => "OperationFailed",
    }
}

/// Details of the pod a diagnosis targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodReference {
    pub namespace: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub container: String,
}

impl PodReference {
    /// Store key of the referenced pod.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Desired state of a Diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisSpec {
    /// Name of the OperationSet that defines the pipeline.
    pub operation_set: String,
    /// Node the diagnosis is bound to. Empty until binding when a pod
    /// reference is given instead.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_reference: Option<PodReference>,
    /// Seed values for the context map, keyed by graph node id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

/// Result of one executed operation. `result` holds the raw response body,
/// re-parseable into a context delta for resumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// Marker for resuming an unfinished pipeline: the position of the last
/// completed operation. Ordered lexicographically (path first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Checkpoint {
    pub path_index: usize,
    pub node_index: usize,
}

impl Checkpoint {
    pub fn new(path_index: usize, node_index: usize) -> Self {
        Self { path_index, node_index }
    }
}

/// Observed state of a Diagnosis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisStatus {
    /// `None` until the reconciler admits the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<DiagnosisPhase>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// Epoch milliseconds at which an engine accepted the diagnosis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time_ms: Option<u64>,
    /// Every failed path, the offending node last.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_paths: Vec<crate::operation_set::Path>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub succeeded_path: Option<crate::operation_set::Path>,
    /// Results keyed by graph node id. Across failed attempts of the same
    /// node only the latest is retained.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub operation_results: BTreeMap<u64, OperationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Checkpoint>,
}

impl DiagnosisStatus {
    pub fn is_terminal(&self) -> bool {
        self.phase.is_some_and(|p| p.is_terminal())
    }

    /// Advance the checkpoint to `proposed` unless the stored value is
    /// already at or past it. Stale writes are no-ops, which keeps the
    /// checkpoint monotonic under retries and replays.
    pub fn advance_checkpoint(&mut self, proposed: Checkpoint) {
        match self.checkpoint {
            Some(current) if current >= proposed => {}
            _ => self.checkpoint = Some(proposed),
        }
    }

    pub fn set_condition(&mut self, condition: Condition) -> bool {
        crate::meta::update_condition(&mut self.conditions, condition)
    }

    pub fn condition(&self, kind: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.kind == kind)
    }
}

/// A single investigation instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    #[serde(default)]
    pub meta: ObjectMeta,
    pub spec: DiagnosisSpec,
    #[serde(default)]
    pub status: DiagnosisStatus,
}

impl Diagnosis {
    pub fn new(name: impl Into<String>, operation_set: impl Into<String>) -> Self {
        Self {
            meta: ObjectMeta::named(name),
            spec: DiagnosisSpec {
                operation_set: operation_set.into(),
                node_name: String::new(),
                pod_reference: None,
                parameters: BTreeMap::new(),
            },
            status: DiagnosisStatus::default(),
        }
    }

    pub fn node_name(mut self, v: impl Into<String>) -> Self {
        self.spec.node_name = v.into();
        self
    }

    pub fn parameters(mut self, v: BTreeMap<String, String>) -> Self {
        self.spec.parameters = v;
        self
    }

    pub fn pod_reference(mut self, v: PodReference) -> Self {
        self.spec.pod_reference = Some(v);
        self
    }

    /// Graph hash stamped at admission, compared against the live
    /// OperationSet hash before every dispatch.
    pub fn graph_hash(&self) -> Option<&str> {
        self.meta.label(ADJACENCY_HASH_LABEL)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
#[path = "diagnosis_tests.rs"]
mod tests;
