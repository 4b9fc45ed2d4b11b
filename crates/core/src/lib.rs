// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ward-core: data model for the ward diagnostic orchestrator.
//!
//! Declarative records (Operation, OperationSet, Diagnosis, Pod), the
//! context map threaded through a diagnosis pipeline, and the small shared
//! vocabulary (ids, clock, conditions) used by every other crate.

pub mod macros;

pub mod clock;
pub mod context;
pub mod diagnosis;
pub mod id;
pub mod meta;
pub mod operation;
pub mod operation_set;
pub mod pod;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use context::{ContextError, ContextMap, RESERVED_CONTEXT_PREFIX};
pub use diagnosis::{
    Checkpoint, Diagnosis, DiagnosisPhase, DiagnosisSpec, DiagnosisStatus, FailureReason,
    OperationResult, PodReference, CONDITION_ACCEPTED, CONDITION_COMPLETE,
};
pub use id::Uid;
pub use meta::{update_condition, Condition, ConditionStatus, ObjectMeta, ADJACENCY_HASH_LABEL};
pub use operation::{Operation, OperationEndpoint, OperationSpec, Scheme, StorageSpec};
pub use operation_set::{
    AdjacencyNode, OperationSet, OperationSetSpec, OperationSetStatus, Path, PathNode,
    CONDITION_DAG_NOT_READY, CONDITION_SET_NOT_READY, VIRTUAL_SOURCE_ID,
};
pub use pod::{Pod, PodSpec};
