// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

mod resume;

use std::sync::Arc;

use super::*;
use crate::dispatcher::DispatchError;
use crate::test_support::ScriptedDispatcher;
use ward_core::test_support::{diagnosis as make_diagnosis, operation as make_operation};
use ward_core::{
    AdjacencyNode, ConditionStatus, Diagnosis, FakeClock, OperationSet, OperationSetStatus,
    PathNode, ADJACENCY_HASH_LABEL, CONDITION_ACCEPTED, CONDITION_COMPLETE,
};
use ward_store::{ObjectStores, WatchEvent};

const HASH: &str = "hash-1";

struct Harness {
    stores: ObjectStores,
    dispatcher: Arc<ScriptedDispatcher>,
    clock: FakeClock,
    engine: Engine<Arc<ScriptedDispatcher>, FakeClock>,
}

fn harness() -> Harness {
    harness_with(EngineConfig::new("node-1"))
}

fn harness_with(config: EngineConfig) -> Harness {
    let stores = ObjectStores::new();
    let dispatcher = Arc::new(ScriptedDispatcher::new());
    let clock = FakeClock::new();
    let engine = Engine::new(stores.clone(), Arc::clone(&dispatcher), clock.clone(), config);
    Harness { stores, dispatcher, clock, engine }
}

fn path_of(nodes: &[(u64, &str)]) -> Path {
    nodes.iter().map(|&(id, op)| PathNode { id, operation: op.to_string() }).collect()
}

fn ids(path: &Path) -> Vec<u64> {
    path.iter().map(|n| n.id).collect()
}

impl Harness {
    fn add_operation(&self, name: &str) {
        self.stores.operations.create(make_operation(name, 8090)).unwrap();
    }

    /// Store an OperationSet whose status is already compiled.
    fn add_ready_set(&self, name: &str, paths: Vec<Path>) {
        let mut set = OperationSet::new(name, vec![AdjacencyNode::source(vec![])]);
        set.meta.set_label(ADJACENCY_HASH_LABEL, HASH);
        set.status = OperationSetStatus {
            ready: true,
            paths,
            hash: HASH.to_string(),
            conditions: Vec::new(),
        };
        self.stores.operation_sets.create(set).unwrap();
    }

    fn add_pending_diagnosis(&self, name: &str, set: &str) -> Diagnosis {
        self.add_pending_diagnosis_with_parameters(name, set, &[])
    }

    fn add_pending_diagnosis_with_parameters(
        &self,
        name: &str,
        set: &str,
        parameters: &[(&str, &str)],
    ) -> Diagnosis {
        let mut d = make_diagnosis(name, set, "node-1").parameters(
            parameters.iter().map(|&(k, v)| (k.to_string(), v.to_string())).collect(),
        );
        d.meta.set_label(ADJACENCY_HASH_LABEL, HASH);
        d.status.phase = Some(DiagnosisPhase::Pending);
        self.stores.diagnoses.create(d).unwrap()
    }

    fn diagnosis(&self, name: &str) -> Diagnosis {
        self.stores.diagnoses.get(name).unwrap()
    }
}

// ── Linear success ──────────────────────────────────────────────────────

#[tokio::test]
async fn linear_path_succeeds_and_threads_context() {
    let h = harness();
    h.add_operation("collect");
    h.add_operation("analyze");
    h.add_ready_set("set", vec![path_of(&[(1, "collect"), (2, "analyze")])]);
    h.add_pending_diagnosis_with_parameters("d-1", "set", &[("1", "pid=1234")]);

    h.dispatcher.always_json("collect", r#"{"a":"x"}"#);
    h.dispatcher.always_json("analyze", r#"{"b":"y"}"#);

    let outcome = h.engine.execute("d-1").await.unwrap();
    assert_eq!(outcome, ExecuteOutcome::Completed);

    let d = h.diagnosis("d-1");
    assert_eq!(d.status.phase, Some(DiagnosisPhase::Succeeded));
    assert_eq!(ids(d.status.succeeded_path.as_ref().unwrap()), vec![1, 2]);
    assert!(d.status.failed_paths.is_empty());
    assert_eq!(d.status.checkpoint, Some(Checkpoint::new(0, 1)));
    assert_eq!(d.status.start_time_ms, Some(1_000_000));

    // Results hold exactly the succeeded path's nodes, raw bodies intact.
    let keys: Vec<u64> = d.status.operation_results.keys().copied().collect();
    assert_eq!(keys, vec![1, 2]);
    assert_eq!(d.status.operation_results[&1].result.as_deref(), Some(r#"{"a":"x"}"#));
    assert_eq!(d.status.operation_results[&2].operation, "analyze");

    // The second operation saw the first one's output plus the seeds.
    let calls = h.dispatcher.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].ctx.get("1"), Some("pid=1234"));
    assert_eq!(calls[1].ctx.get("1"), Some("pid=1234"));
    assert_eq!(calls[1].ctx.get("a"), Some("x"));
    assert_eq!(calls[1].ctx.get("diagnosis.name"), Some("d-1"));
    assert_eq!(calls[1].ctx.get("diagnosis.node-name"), Some("node-1"));

    let accepted = d.status.condition(CONDITION_ACCEPTED).unwrap();
    assert_eq!(accepted.status, ConditionStatus::True);
    let complete = d.status.condition(CONDITION_COMPLETE).unwrap();
    assert_eq!(complete.reason.as_deref(), Some("DiagnosisComplete"));
}

// ── Fail-over to the next path ──────────────────────────────────────────

fn two_path_harness() -> Harness {
    let h = harness();
    h.add_operation("collect");
    h.add_operation("analyze");
    h.add_operation("recover");
    h.add_ready_set(
        "set",
        vec![
            path_of(&[(1, "collect"), (2, "analyze")]),
            path_of(&[(1, "collect"), (3, "recover")]),
        ],
    );
    h.add_pending_diagnosis("d-1", "set");
    h
}

#[tokio::test]
async fn first_path_fails_second_succeeds() {
    let h = two_path_harness();
    h.dispatcher.always_json("collect", r#"{"a":"x"}"#);
    h.dispatcher.always_reject("analyze", 500, "analyzer exploded");
    h.dispatcher.always_json("recover", r#"{"c":"z"}"#);

    let outcome = h.engine.execute("d-1").await.unwrap();
    assert_eq!(outcome, ExecuteOutcome::Completed);

    let d = h.diagnosis("d-1");
    assert_eq!(d.status.phase, Some(DiagnosisPhase::Succeeded));
    assert_eq!(d.status.failed_paths.len(), 1);
    assert_eq!(ids(&d.status.failed_paths[0]), vec![1, 2]);
    assert_eq!(ids(d.status.succeeded_path.as_ref().unwrap()), vec![1, 3]);

    // Shared node 1 re-executed on the second path.
    assert_eq!(h.dispatcher.call_count("collect"), 2);

    // Results pruned to the succeeded path.
    let keys: Vec<u64> = d.status.operation_results.keys().copied().collect();
    assert_eq!(keys, vec![1, 3]);

    // The second path's context reset to the seed, then re-overlaid the
    // shared prefix result before re-dispatching node 1.
    let calls = h.dispatcher.calls();
    let second_collect = &calls[2];
    assert!(second_collect.url.ends_with("/collect"));
    assert_eq!(second_collect.ctx.get("a"), Some("x"));
}

#[tokio::test]
async fn all_paths_failing_fails_the_diagnosis() {
    let h = two_path_harness();
    h.dispatcher.always_json("collect", r#"{"a":"x"}"#);
    h.dispatcher.always_reject("analyze", 500, "boom");
    h.dispatcher.always_reject("recover", 503, "also boom");

    let outcome = h.engine.execute("d-1").await.unwrap();
    assert_eq!(outcome, ExecuteOutcome::Completed);

    let d = h.diagnosis("d-1");
    assert_eq!(d.status.phase, Some(DiagnosisPhase::Failed));
    assert!(d.status.succeeded_path.is_none());
    assert_eq!(d.status.failed_paths.len(), 2);
    assert_eq!(ids(&d.status.failed_paths[0]), vec![1, 2]);
    assert_eq!(ids(&d.status.failed_paths[1]), vec![1, 3]);
    assert_eq!(d.status.checkpoint, Some(Checkpoint::new(2, 0)));

    let complete = d.status.condition(CONDITION_COMPLETE).unwrap();
    assert_eq!(complete.reason.as_deref(), Some("OperationFailed"));
    assert!(complete.message.as_deref().unwrap().contains("last failure"));
}

// ── Graph-hash drift ────────────────────────────────────────────────────

#[tokio::test]
async fn drift_before_pickup_fails_immediately() {
    let h = harness();
    h.add_operation("collect");
    h.add_ready_set("set", vec![path_of(&[(1, "collect")])]);
    let mut d = make_diagnosis("d-1", "set", "node-1");
    d.meta.set_label(ADJACENCY_HASH_LABEL, "stale-hash");
    d.status.phase = Some(DiagnosisPhase::Pending);
    h.stores.diagnoses.create(d).unwrap();

    let outcome = h.engine.execute("d-1").await.unwrap();
    assert_eq!(outcome, ExecuteOutcome::Completed);

    let d = h.diagnosis("d-1");
    assert_eq!(d.status.phase, Some(DiagnosisPhase::Failed));
    let complete = d.status.condition(CONDITION_COMPLETE).unwrap();
    assert_eq!(complete.reason.as_deref(), Some("GraphChanged"));
    assert_eq!(h.dispatcher.calls().len(), 0);
}

#[tokio::test]
async fn drift_mid_run_fails_and_keeps_earlier_results() {
    let h = harness();
    h.add_operation("collect");
    h.add_operation("analyze");
    h.add_ready_set("set", vec![path_of(&[(1, "collect"), (2, "analyze")])]);
    h.add_pending_diagnosis("d-1", "set");

    h.dispatcher.always_json("collect", r#"{"a":"x"}"#);
    h.dispatcher.always_json("analyze", r#"{"b":"y"}"#);

    // The graph mutates while the second operation is in flight.
    let stores = h.stores.clone();
    h.dispatcher.on_invoke(move |operation| {
        if operation == "analyze" {
            let mut set = stores.operation_sets.get("set").unwrap();
            set.status.hash = "hash-2".to_string();
            stores.operation_sets.update_status(set).unwrap();
        }
    });

    let outcome = h.engine.execute("d-1").await.unwrap();
    assert_eq!(outcome, ExecuteOutcome::Completed);

    let d = h.diagnosis("d-1");
    assert_eq!(d.status.phase, Some(DiagnosisPhase::Failed));
    let complete = d.status.condition(CONDITION_COMPLETE).unwrap();
    assert_eq!(complete.reason.as_deref(), Some("GraphChanged"));

    // The first operation's evidence survives; the second was never recorded.
    let keys: Vec<u64> = d.status.operation_results.keys().copied().collect();
    assert_eq!(keys, vec![1]);
    assert!(d.status.succeeded_path.is_none());
}

// ── Pre-conditions ──────────────────────────────────────────────────────

#[tokio::test]
async fn not_ready_set_requeues_and_leaves_pending() {
    let h = harness();
    let mut set = OperationSet::new("set", vec![AdjacencyNode::source(vec![])]);
    set.status.hash = HASH.to_string();
    h.stores.operation_sets.create(set).unwrap();
    h.add_pending_diagnosis("d-1", "set");

    let outcome = h.engine.execute("d-1").await.unwrap();
    assert_eq!(outcome, ExecuteOutcome::Requeue);

    let d = h.diagnosis("d-1");
    assert_eq!(d.status.phase, Some(DiagnosisPhase::Pending));
    let accepted = d.status.condition(CONDITION_ACCEPTED).unwrap();
    assert_eq!(accepted.status, ConditionStatus::False);
    assert_eq!(accepted.reason.as_deref(), Some("OperationSetNotReady"));
}

#[tokio::test]
async fn empty_path_enumeration_fails_terminally() {
    let h = harness();
    h.add_ready_set("set", vec![]);
    h.add_pending_diagnosis("d-1", "set");

    h.engine.execute("d-1").await.unwrap();

    let d = h.diagnosis("d-1");
    assert_eq!(d.status.phase, Some(DiagnosisPhase::Failed));
    let complete = d.status.condition(CONDITION_COMPLETE).unwrap();
    assert_eq!(complete.reason.as_deref(), Some("OperationSetEmpty"));
}

#[tokio::test]
async fn missing_operation_set_halts_without_status_writes() {
    let h = harness();
    let created = h.add_pending_diagnosis("d-1", "nonexistent");

    let outcome = h.engine.execute("d-1").await.unwrap();
    assert_eq!(outcome, ExecuteOutcome::Skipped);
    assert_eq!(h.diagnosis("d-1").meta.resource_version, created.meta.resource_version);
}

#[tokio::test]
async fn unlabeled_diagnosis_requeues() {
    let h = harness();
    h.add_operation("collect");
    h.add_ready_set("set", vec![path_of(&[(1, "collect")])]);
    let mut d = make_diagnosis("d-1", "set", "node-1");
    d.status.phase = Some(DiagnosisPhase::Pending);
    h.stores.diagnoses.create(d).unwrap();

    let outcome = h.engine.execute("d-1").await.unwrap();
    assert_eq!(outcome, ExecuteOutcome::Requeue);
}

// ── Affinity and absorption ─────────────────────────────────────────────

#[tokio::test]
async fn foreign_node_diagnosis_is_skipped() {
    let h = harness();
    h.add_operation("collect");
    h.add_ready_set("set", vec![path_of(&[(1, "collect")])]);
    let mut d = make_diagnosis("d-1", "set", "node-2");
    d.meta.set_label(ADJACENCY_HASH_LABEL, HASH);
    d.status.phase = Some(DiagnosisPhase::Pending);
    h.stores.diagnoses.create(d).unwrap();

    let outcome = h.engine.execute("d-1").await.unwrap();
    assert_eq!(outcome, ExecuteOutcome::Skipped);
    assert!(h.dispatcher.calls().is_empty());
}

#[tokio::test]
async fn terminal_phase_absorbs_execution() {
    let h = harness();
    h.add_operation("collect");
    h.add_ready_set("set", vec![path_of(&[(1, "collect")])]);
    let mut d = make_diagnosis("d-1", "set", "node-1");
    d.meta.set_label(ADJACENCY_HASH_LABEL, HASH);
    d.status.phase = Some(DiagnosisPhase::Succeeded);
    let created = h.stores.diagnoses.create(d).unwrap();

    let outcome = h.engine.execute("d-1").await.unwrap();

    assert_eq!(outcome, ExecuteOutcome::Skipped);
    assert!(h.dispatcher.calls().is_empty());
    // No status write happened.
    assert_eq!(h.diagnosis("d-1").meta.resource_version, created.meta.resource_version);
}

// ── Result policy ───────────────────────────────────────────────────────

#[tokio::test]
async fn oversized_result_fails_the_path() {
    let h = harness_with(EngineConfig::new("node-1").max_result_bytes(16));
    h.add_operation("collect");
    h.add_ready_set("set", vec![path_of(&[(1, "collect")])]);
    h.add_pending_diagnosis("d-1", "set");

    h.dispatcher.always_json("collect", r#"{"a":"xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx"}"#);

    h.engine.execute("d-1").await.unwrap();

    let d = h.diagnosis("d-1");
    assert_eq!(d.status.phase, Some(DiagnosisPhase::Failed));
    assert_eq!(ids(&d.status.failed_paths[0]), vec![1]);
    assert!(d.status.operation_results.is_empty());
    let complete = d.status.condition(CONDITION_COMPLETE).unwrap();
    assert!(complete.message.as_deref().unwrap().contains("ResultTooLarge"));
}

#[tokio::test]
async fn delta_touching_reserved_keys_fails_the_path() {
    let h = harness();
    h.add_operation("collect");
    h.add_ready_set("set", vec![path_of(&[(1, "collect")])]);
    h.add_pending_diagnosis("d-1", "set");

    h.dispatcher.always_json("collect", r#"{"diagnosis.node-name":"spoofed"}"#);

    h.engine.execute("d-1").await.unwrap();

    let d = h.diagnosis("d-1");
    assert_eq!(d.status.phase, Some(DiagnosisPhase::Failed));
    assert!(d.status.operation_results.is_empty());
    let complete = d.status.condition(CONDITION_COMPLETE).unwrap();
    assert!(complete.message.as_deref().unwrap().contains("MalformedResult"));
}

#[tokio::test]
async fn transport_failure_fails_the_path() {
    let h = harness();
    h.add_operation("collect");
    h.add_ready_set("set", vec![path_of(&[(1, "collect")])]);
    h.add_pending_diagnosis("d-1", "set");

    h.dispatcher.enqueue("collect", Err(DispatchError::Transport("connection refused".into())));

    h.engine.execute("d-1").await.unwrap();

    let d = h.diagnosis("d-1");
    assert_eq!(d.status.phase, Some(DiagnosisPhase::Failed));
    assert!(d
        .status
        .condition(CONDITION_COMPLETE)
        .unwrap()
        .message
        .as_deref()
        .unwrap()
        .contains("Transport"));
}

// ── Deadlines and cancellation ──────────────────────────────────────────

#[tokio::test]
async fn diagnosis_deadline_fails_with_timeout() {
    let h = harness_with(
        EngineConfig::new("node-1").diagnosis_timeout(std::time::Duration::from_secs(60)),
    );
    h.add_operation("collect");
    h.add_operation("analyze");
    h.add_ready_set("set", vec![path_of(&[(1, "collect"), (2, "analyze")])]);
    h.add_pending_diagnosis("d-1", "set");

    h.dispatcher.always_json("collect", r#"{"a":"x"}"#);
    h.dispatcher.always_json("analyze", r#"{"b":"y"}"#);

    // The first operation takes two hours of wall-clock time.
    let clock = h.clock.clone();
    h.dispatcher.on_invoke(move |operation| {
        if operation == "collect" {
            clock.advance(std::time::Duration::from_secs(2 * 60 * 60));
        }
    });

    h.engine.execute("d-1").await.unwrap();

    let d = h.diagnosis("d-1");
    assert_eq!(d.status.phase, Some(DiagnosisPhase::Failed));
    let complete = d.status.condition(CONDITION_COMPLETE).unwrap();
    assert_eq!(complete.reason.as_deref(), Some("Timeout"));
    // The completed first step is retained.
    assert_eq!(d.status.operation_results.len(), 1);
    assert_eq!(h.dispatcher.call_count("analyze"), 0);
}

#[tokio::test(start_paused = true)]
async fn deleting_a_diagnosis_cancels_the_in_flight_dispatch() {
    let h = harness();
    h.add_operation("collect");
    h.add_ready_set("set", vec![path_of(&[(1, "collect")])]);
    let created = h.add_pending_diagnosis("d-1", "set");
    let uid = created.meta.uid.as_str().to_string();

    h.dispatcher.hang("collect");

    let (outcome, ()) = tokio::join!(h.engine.execute("d-1"), async {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        h.engine.cancel(&uid);
    });

    assert_eq!(outcome.unwrap(), ExecuteOutcome::Skipped);
    // The run was accepted but never finished.
    let d = h.diagnosis("d-1");
    assert_eq!(d.status.phase, Some(DiagnosisPhase::Running));
    assert!(d.status.succeeded_path.is_none());
}

// ── Checkpoint monotonicity (observed through the store) ────────────────

#[tokio::test]
async fn checkpoints_never_regress_across_a_run() {
    let h = two_path_harness();
    h.dispatcher.always_json("collect", r#"{"a":"x"}"#);
    h.dispatcher.always_reject("analyze", 500, "boom");
    h.dispatcher.always_json("recover", r#"{"c":"z"}"#);

    let mut watch = h.stores.diagnoses.watch();
    h.engine.execute("d-1").await.unwrap();

    let mut last = None;
    while let Ok(event) = watch.try_recv() {
        if let WatchEvent::Modified(d) = event {
            if let Some(checkpoint) = d.status.checkpoint {
                if let Some(previous) = last {
                    assert!(
                        checkpoint >= previous,
                        "checkpoint regressed: {previous:?} -> {checkpoint:?}"
                    );
                }
                last = Some(checkpoint);
            }
        }
    }
    assert_eq!(last, Some(Checkpoint::new(1, 1)));
}
