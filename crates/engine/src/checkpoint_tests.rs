// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ward_core::test_support::diagnosis as make_diagnosis;
use ward_core::{
    AdjacencyNode, Checkpoint, DiagnosisPhase, OperationSet, ADJACENCY_HASH_LABEL,
};
use ward_store::ObjectStores;

fn fixtures(hash: &str) -> (ObjectStores, StatusWriter) {
    let stores = ObjectStores::new();
    let mut set = OperationSet::new("set", vec![AdjacencyNode::source(vec![])]);
    set.status.hash = hash.to_string();
    set.status.ready = true;
    stores.operation_sets.create(set).unwrap();

    let mut d = make_diagnosis("d-1", "set", "node-1");
    d.meta.set_label(ADJACENCY_HASH_LABEL, hash);
    d.status.phase = Some(DiagnosisPhase::Running);
    stores.diagnoses.create(d).unwrap();

    let writer = StatusWriter::new(stores.diagnoses.clone(), stores.operation_sets.clone());
    (stores, writer)
}

#[test]
fn mutate_persists_and_bumps_version() {
    let (stores, writer) = fixtures("h1");
    let before = stores.diagnoses.get("d-1").unwrap().meta.resource_version;

    let written = writer
        .mutate("d-1", Some("h1"), |status| {
            status.advance_checkpoint(Checkpoint::new(0, 0));
        })
        .unwrap();

    assert_eq!(written.status.checkpoint, Some(Checkpoint::new(0, 0)));
    assert!(written.meta.resource_version > before);
    assert_eq!(stores.diagnoses.get("d-1").unwrap().status.checkpoint, Some(Checkpoint::new(0, 0)));
}

#[test]
fn terminal_phase_absorbs_mutations() {
    let (stores, writer) = fixtures("h1");
    let mut d = stores.diagnoses.get("d-1").unwrap();
    d.status.phase = Some(DiagnosisPhase::Failed);
    stores.diagnoses.update_status(d).unwrap();
    let before = stores.diagnoses.get("d-1").unwrap();

    let returned = writer
        .mutate("d-1", None, |status| {
            status.phase = Some(DiagnosisPhase::Running);
        })
        .unwrap();

    // No write happened; the stored record is untouched.
    assert_eq!(returned.status.phase, Some(DiagnosisPhase::Failed));
    assert_eq!(stores.diagnoses.get("d-1").unwrap().meta.resource_version, before.meta.resource_version);
}

#[test]
fn hash_guard_detects_graph_drift() {
    let (stores, writer) = fixtures("h1");
    let mut set = stores.operation_sets.get("set").unwrap();
    set.status.hash = "h2".to_string();
    stores.operation_sets.update_status(set).unwrap();

    let err = writer.mutate("d-1", Some("h1"), |_| {}).unwrap_err();

    assert_eq!(err, WriteError::GraphChanged("d-1".to_string()));
}

#[test]
fn missing_diagnosis_surfaces_as_missing() {
    let (_, writer) = fixtures("h1");
    let err = writer.mutate("d-9", None, |_| {}).unwrap_err();
    assert_eq!(err, WriteError::Missing("d-9".to_string()));
}

#[test]
fn missing_operation_set_surfaces_as_missing_when_guarded() {
    let (stores, writer) = fixtures("h1");
    stores.operation_sets.delete("set").unwrap();

    let err = writer.mutate("d-1", Some("h1"), |_| {}).unwrap_err();
    assert_eq!(err, WriteError::Missing("set".to_string()));

    // Unguarded writes still work; the set is irrelevant to them.
    assert!(writer.mutate("d-1", None, |_| {}).is_ok());
}

#[test]
fn checkpoint_writes_through_the_writer_stay_monotonic() {
    let (stores, writer) = fixtures("h1");

    writer.mutate("d-1", None, |s| s.advance_checkpoint(Checkpoint::new(1, 2))).unwrap();
    writer.mutate("d-1", None, |s| s.advance_checkpoint(Checkpoint::new(0, 5))).unwrap();

    assert_eq!(
        stores.diagnoses.get("d-1").unwrap().status.checkpoint,
        Some(Checkpoint::new(1, 2))
    );
}
