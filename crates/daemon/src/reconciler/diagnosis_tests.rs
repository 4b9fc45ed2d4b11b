// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

use ward_core::test_support::{diagnosis as make_diagnosis, operation};
use ward_core::{AdjacencyNode, FakeClock, OperationSet, Pod, PodReference};
use ward_engine::test_support::ScriptedDispatcher;
use ward_engine::EngineConfig;
use ward_graph::compile;

use crate::queue::WorkQueue;

struct Harness {
    stores: ObjectStores,
    dispatcher: Arc<ScriptedDispatcher>,
    reconciler: Arc<DiagnosisReconciler<Arc<ScriptedDispatcher>, FakeClock>>,
    queue: WorkQueue,
    receiver: crate::queue::WorkReceiver,
}

fn harness() -> Harness {
    let stores = ObjectStores::new();
    let dispatcher = Arc::new(ScriptedDispatcher::new());
    let clock = FakeClock::new();
    let engine = Arc::new(Engine::new(
        stores.clone(),
        Arc::clone(&dispatcher),
        clock.clone(),
        EngineConfig::new("node-1"),
    ));
    let (queue, receiver) = WorkQueue::bounded(64);
    let reconciler = Arc::new(DiagnosisReconciler::new(
        stores.clone(),
        engine,
        queue.clone(),
        clock,
    ));
    Harness { stores, dispatcher, reconciler, queue, receiver }
}

/// Store a compiled two-step OperationSet named `set`.
fn add_compiled_set(stores: &ObjectStores) -> String {
    stores.operations.create(operation("collect", 8090)).unwrap();
    stores.operations.create(operation("analyze", 8091)).unwrap();

    let adjacency = vec![
        AdjacencyNode::source(vec![1]),
        AdjacencyNode::new(1, "collect", vec![2]),
        AdjacencyNode::new(2, "analyze", vec![]),
    ];
    let compiled = compile(&adjacency).unwrap();
    let mut set = OperationSet::new("set", adjacency);
    set.meta.set_label(ADJACENCY_HASH_LABEL, &compiled.hash);
    set.status.ready = true;
    set.status.paths = compiled.paths;
    set.status.hash = compiled.hash.clone();
    stores.operation_sets.create(set).unwrap();
    compiled.hash
}

#[tokio::test]
async fn admission_binds_directly_named_node() {
    let h = harness();
    let hash = add_compiled_set(&h.stores);
    h.stores.diagnoses.create(make_diagnosis("d-1", "set", "node-1")).unwrap();

    h.reconciler.process(WorkItem::new("d-1")).await;

    let d = h.stores.diagnoses.get("d-1").unwrap();
    assert_eq!(d.status.phase, Some(DiagnosisPhase::Pending));
    assert_eq!(d.graph_hash(), Some(hash.as_str()));
    assert_eq!(d.spec.node_name, "node-1");
}

#[tokio::test]
async fn admission_binds_node_through_pod_reference() {
    let h = harness();
    add_compiled_set(&h.stores);
    h.stores.pods.create(Pod::new("payments", "api-0", "node-7")).unwrap();

    let d = Diagnosis::new("d-1", "set").pod_reference(PodReference {
        namespace: "payments".to_string(),
        name: "api-0".to_string(),
        container: String::new(),
    });
    h.stores.diagnoses.create(d).unwrap();

    h.reconciler.process(WorkItem::new("d-1")).await;

    let d = h.stores.diagnoses.get("d-1").unwrap();
    assert_eq!(d.spec.node_name, "node-7");
    assert_eq!(d.status.phase, Some(DiagnosisPhase::Pending));
}

#[tokio::test(start_paused = true)]
async fn admission_defers_while_the_pod_is_missing() {
    let h = harness();
    add_compiled_set(&h.stores);
    let d = Diagnosis::new("d-1", "set").pod_reference(PodReference {
        namespace: "payments".to_string(),
        name: "api-0".to_string(),
        container: String::new(),
    });
    h.stores.diagnoses.create(d).unwrap();

    h.reconciler.process(WorkItem::new("d-1")).await;

    // Not admitted, and a backoff retry is in flight.
    assert_eq!(h.stores.diagnoses.get("d-1").unwrap().status.phase, None);
    let retry = h.receiver.recv().await.unwrap();
    assert_eq!(retry.key, "d-1");
    assert_eq!(retry.attempt, 1);
}

#[tokio::test]
async fn unbindable_diagnosis_fails_terminally() {
    let h = harness();
    add_compiled_set(&h.stores);
    h.stores.diagnoses.create(Diagnosis::new("d-1", "set")).unwrap();

    h.reconciler.process(WorkItem::new("d-1")).await;

    let d = h.stores.diagnoses.get("d-1").unwrap();
    assert_eq!(d.status.phase, Some(DiagnosisPhase::Failed));
    let complete = d.status.condition(CONDITION_COMPLETE).unwrap();
    assert_eq!(complete.reason.as_deref(), Some("NodeBindingFailed"));
}

#[tokio::test]
async fn foreign_node_diagnoses_are_not_executed() {
    let h = harness();
    add_compiled_set(&h.stores);
    h.stores.diagnoses.create(make_diagnosis("d-1", "set", "node-9")).unwrap();

    // Admission binds it, then execution is filtered out.
    h.reconciler.process(WorkItem::new("d-1")).await;
    h.reconciler.process(WorkItem::new("d-1")).await;

    let d = h.stores.diagnoses.get("d-1").unwrap();
    assert_eq!(d.status.phase, Some(DiagnosisPhase::Pending));
    assert!(h.dispatcher.calls().is_empty());
}

#[tokio::test]
async fn full_loop_drives_a_diagnosis_to_success() {
    let h = harness();
    add_compiled_set(&h.stores);
    h.dispatcher.always_json("collect", r#"{"a":"x"}"#);
    h.dispatcher.always_json("analyze", r#"{"b":"y"}"#);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let loop_task = tokio::spawn(Arc::clone(&h.reconciler).run(shutdown_rx.clone()));
    let workers = crate::queue::spawn_workers(1, h.receiver.clone(), shutdown_rx, {
        let reconciler = Arc::clone(&h.reconciler);
        move |item| {
            let reconciler = Arc::clone(&reconciler);
            async move { reconciler.process(item).await }
        }
    });

    h.stores.diagnoses.create(make_diagnosis("d-1", "set", "node-1")).unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let phase = h.stores.diagnoses.get("d-1").and_then(|d| d.status.phase);
            if phase == Some(DiagnosisPhase::Succeeded) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("diagnosis never succeeded");

    let d = h.stores.diagnoses.get("d-1").unwrap();
    let ids: Vec<u64> = d.status.succeeded_path.as_ref().unwrap().iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert!(d.status.failed_paths.is_empty());

    shutdown_tx.send(true).unwrap();
    loop_task.await.unwrap();
    for worker in workers {
        worker.await.unwrap();
    }

    // Queue stayed referenced throughout; nothing left behind.
    drop(h.queue);
}
