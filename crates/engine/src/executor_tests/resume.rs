// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resumption after preemption: a restarted engine picks up from the stored
//! checkpoint and lands on the same terminal state as an uninterrupted run.

use super::*;
use ward_core::OperationResult;

/// Put a diagnosis into the state a crash would leave behind: accepted,
/// some results recorded, checkpoint pointing at the last completed step.
fn seed_mid_run(
    h: &Harness,
    name: &str,
    results: &[(u64, &str, &str)],
    checkpoint: Checkpoint,
) {
    let mut d = h.diagnosis(name);
    d.status.phase = Some(DiagnosisPhase::Running);
    d.status.start_time_ms = Some(1_000_000);
    for &(id, operation, raw) in results {
        d.status.operation_results.insert(
            id,
            OperationResult { operation: operation.to_string(), result: Some(raw.to_string()) },
        );
    }
    d.status.checkpoint = Some(checkpoint);
    h.stores.diagnoses.update_status(d).unwrap();
}

#[tokio::test]
async fn resume_merges_recorded_results_into_the_context() {
    let h = harness();
    h.add_operation("collect");
    h.add_operation("analyze");
    h.add_ready_set("set", vec![path_of(&[(1, "collect"), (2, "analyze")])]);
    h.add_pending_diagnosis("d-1", "set");
    seed_mid_run(&h, "d-1", &[(1, "collect", r#"{"a":"x"}"#)], Checkpoint::new(0, 0));

    h.dispatcher.always_json("collect", r#"{"a":"x"}"#);
    h.dispatcher.always_json("analyze", r#"{"b":"y"}"#);

    let outcome = h.engine.execute("d-1").await.unwrap();
    assert_eq!(outcome, ExecuteOutcome::Completed);

    let d = h.diagnosis("d-1");
    assert_eq!(d.status.phase, Some(DiagnosisPhase::Succeeded));
    assert_eq!(ids(d.status.succeeded_path.as_ref().unwrap()), vec![1, 2]);
    // startTime survives from the first acceptance.
    assert_eq!(d.status.start_time_ms, Some(1_000_000));

    // The checkpointed step re-executes once, then the pipeline continues.
    assert_eq!(h.dispatcher.call_count("collect"), 1);
    let analyze_call = h.dispatcher.calls().into_iter().find(|c| c.url.ends_with("/analyze")).unwrap();
    assert_eq!(analyze_call.ctx.get("a"), Some("x"));
}

#[tokio::test]
async fn resume_after_path_failure_starts_at_the_next_path() {
    let h = two_path_harness();
    // Crash happened after path 0 failed: its prefix result is recorded and
    // the checkpoint already points at path 1.
    let mut d = h.diagnosis("d-1");
    d.status.phase = Some(DiagnosisPhase::Running);
    d.status.start_time_ms = Some(1_000_000);
    d.status.failed_paths = vec![path_of(&[(1, "collect"), (2, "analyze")])];
    d.status.operation_results.insert(
        1,
        OperationResult { operation: "collect".to_string(), result: Some(r#"{"a":"x"}"#.to_string()) },
    );
    d.status.checkpoint = Some(Checkpoint::new(1, 0));
    h.stores.diagnoses.update_status(d).unwrap();

    h.dispatcher.always_json("collect", r#"{"a":"x"}"#);
    h.dispatcher.always_reject("analyze", 500, "still broken");
    h.dispatcher.always_json("recover", r#"{"c":"z"}"#);

    h.engine.execute("d-1").await.unwrap();

    let d = h.diagnosis("d-1");
    assert_eq!(d.status.phase, Some(DiagnosisPhase::Succeeded));
    assert_eq!(ids(d.status.succeeded_path.as_ref().unwrap()), vec![1, 3]);
    // The failed path was not replayed.
    assert_eq!(h.dispatcher.call_count("analyze"), 0);
    assert_eq!(d.status.failed_paths.len(), 1);
}

#[tokio::test]
async fn resumed_run_matches_uninterrupted_run() {
    let script = |h: &Harness| {
        h.dispatcher.always_json("collect", r#"{"a":"x"}"#);
        h.dispatcher.always_reject("analyze", 500, "boom");
        h.dispatcher.always_json("recover", r#"{"c":"z"}"#);
    };

    // Uninterrupted run.
    let uninterrupted = two_path_harness();
    script(&uninterrupted);
    uninterrupted.engine.execute("d-1").await.unwrap();
    let expected = uninterrupted.diagnosis("d-1").status;

    // Interrupted after the first successful step, then resumed by a fresh
    // engine (deterministic workers).
    let resumed = two_path_harness();
    script(&resumed);
    seed_mid_run(&resumed, "d-1", &[(1, "collect", r#"{"a":"x"}"#)], Checkpoint::new(0, 0));
    resumed.engine.execute("d-1").await.unwrap();
    let actual = resumed.diagnosis("d-1").status;

    assert_eq!(actual.phase, expected.phase);
    assert_eq!(actual.succeeded_path, expected.succeeded_path);
    assert_eq!(actual.failed_paths, expected.failed_paths);
    assert_eq!(actual.operation_results, expected.operation_results);
}

#[tokio::test]
async fn resumption_gate_disabled_restarts_from_the_first_path() {
    let h = harness_with(EngineConfig::new("node-1").resume_from_checkpoint(false));
    h.add_operation("collect");
    h.add_operation("analyze");
    h.add_ready_set("set", vec![path_of(&[(1, "collect"), (2, "analyze")])]);
    h.add_pending_diagnosis("d-1", "set");
    seed_mid_run(&h, "d-1", &[(1, "collect", r#"{"a":"x"}"#)], Checkpoint::new(0, 1));

    h.dispatcher.always_json("collect", r#"{"a":"x"}"#);
    h.dispatcher.always_json("analyze", r#"{"b":"y"}"#);

    h.engine.execute("d-1").await.unwrap();

    // Both steps re-ran from the top despite the stored checkpoint.
    assert_eq!(h.dispatcher.call_count("collect"), 1);
    assert_eq!(h.dispatcher.call_count("analyze"), 1);
    let d = h.diagnosis("d-1");
    assert_eq!(d.status.phase, Some(DiagnosisPhase::Succeeded));
}

#[tokio::test]
async fn unreadable_stored_result_moves_to_unknown() {
    let h = harness();
    h.add_operation("collect");
    h.add_operation("analyze");
    h.add_ready_set("set", vec![path_of(&[(1, "collect"), (2, "analyze")])]);
    h.add_pending_diagnosis("d-1", "set");
    seed_mid_run(&h, "d-1", &[(1, "collect", "not json at all")], Checkpoint::new(0, 0));

    let outcome = h.engine.execute("d-1").await.unwrap();
    assert_eq!(outcome, ExecuteOutcome::Completed);

    let d = h.diagnosis("d-1");
    assert_eq!(d.status.phase, Some(DiagnosisPhase::Unknown));
    let complete = d.status.condition(CONDITION_COMPLETE).unwrap();
    assert_eq!(complete.reason.as_deref(), Some("MalformedResult"));
    assert!(complete.message.as_deref().unwrap().contains("node 1"));
    // No operation ran.
    assert!(h.dispatcher.calls().is_empty());
}

#[tokio::test]
async fn checkpoint_at_the_last_step_reexecutes_it_and_succeeds() {
    let h = harness();
    h.add_operation("collect");
    h.add_operation("analyze");
    h.add_ready_set("set", vec![path_of(&[(1, "collect"), (2, "analyze")])]);
    h.add_pending_diagnosis("d-1", "set");
    // Crash landed between the final step's checkpoint and the terminal write.
    seed_mid_run(
        &h,
        "d-1",
        &[(1, "collect", r#"{"a":"x"}"#), (2, "analyze", r#"{"b":"y"}"#)],
        Checkpoint::new(0, 1),
    );

    h.dispatcher.always_json("collect", r#"{"a":"x"}"#);
    h.dispatcher.always_json("analyze", r#"{"b":"y"}"#);

    h.engine.execute("d-1").await.unwrap();

    let d = h.diagnosis("d-1");
    assert_eq!(d.status.phase, Some(DiagnosisPhase::Succeeded));
    assert_eq!(ids(d.status.succeeded_path.as_ref().unwrap()), vec![1, 2]);
    // Only the checkpointed step re-ran.
    assert_eq!(h.dispatcher.call_count("collect"), 0);
    assert_eq!(h.dispatcher.call_count("analyze"), 1);
}
