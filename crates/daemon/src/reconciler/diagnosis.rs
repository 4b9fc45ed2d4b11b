// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Diagnosis admission and execution feeding.
//!
//! Admission stamps the graph-hash label, binds the node (directly or via
//! the referenced pod), and moves the record to Pending. Admitted records
//! bound to this agent's node flow through the bounded work queue into the
//! execution engine; everything else is ignored (no work-stealing).

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use ward_core::{
    Clock, Condition, ConditionStatus, Diagnosis, DiagnosisPhase, CONDITION_COMPLETE,
    ADJACENCY_HASH_LABEL,
};
use ward_engine::{Dispatcher, Engine, ExecuteOutcome};
use ward_store::{ObjectStores, WatchEvent};

use crate::queue::{WorkItem, WorkQueue};

/// Condition reason for a diagnosis that names neither a node nor a pod.
const REASON_NODE_BINDING_FAILED: &str = "NodeBindingFailed";

enum Admission {
    Admitted,
    Defer(String),
    Rejected,
}

pub struct DiagnosisReconciler<D: Dispatcher, C: Clock> {
    stores: ObjectStores,
    engine: Arc<Engine<D, C>>,
    queue: WorkQueue,
    clock: C,
}

impl<D: Dispatcher, C: Clock> DiagnosisReconciler<D, C> {
    pub fn new(
        stores: ObjectStores,
        engine: Arc<Engine<D, C>>,
        queue: WorkQueue,
        clock: C,
    ) -> Self {
        Self { stores, engine, queue, clock }
    }

    /// Watch loop: requeue everything unfinished on startup (resumption
    /// after agent restart), then track watch events until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut events = self.stores.diagnoses.watch();

        let unfinished: Vec<_> =
            self.stores.diagnoses.list().into_iter().filter(|d| !d.is_terminal()).collect();
        if !unfinished.is_empty() {
            info!(count = unfinished.len(), "requeueing unfinished diagnoses after restart");
        }
        for diagnosis in unfinished {
            self.submit(&diagnosis.meta.name);
        }

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(WatchEvent::Added(d)) | Ok(WatchEvent::Modified(d)) => {
                        if !d.is_terminal() {
                            self.submit(&d.meta.name);
                        }
                    }
                    Ok(WatchEvent::Deleted(d)) => {
                        debug!(diagnosis = %d.meta.name, "diagnosis deleted, cancelling");
                        self.engine.cancel(d.meta.uid.as_str());
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "diagnosis watch lagged, relisting");
                        for d in self.stores.diagnoses.list() {
                            if !d.is_terminal() {
                                self.submit(&d.meta.name);
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.changed() => break,
            }
        }
    }

    fn submit(&self, key: &str) {
        if self.queue.submit(key).is_err() {
            // Full queue: back off instead of blocking the watch loop.
            self.queue.submit_after_backoff(key.to_string(), 1);
        }
    }

    /// Handle one queued item: admit unadmitted records, execute admitted
    /// records bound to this node.
    pub async fn process(&self, item: WorkItem) {
        let Some(diagnosis) = self.stores.diagnoses.get(&item.key) else {
            return;
        };
        if diagnosis.is_terminal() {
            return;
        }

        match diagnosis.status.phase {
            None => match self.admit(&diagnosis) {
                Admission::Admitted | Admission::Rejected => {}
                Admission::Defer(why) => {
                    debug!(diagnosis = %item.key, why, "admission deferred");
                    self.queue.submit_after_backoff(item.key, item.attempt + 1);
                }
            },
            Some(DiagnosisPhase::Pending) | Some(DiagnosisPhase::Running) => {
                if diagnosis.spec.node_name != self.engine.node_name() {
                    return;
                }
                match self.engine.execute(&item.key).await {
                    Ok(ExecuteOutcome::Completed) | Ok(ExecuteOutcome::Skipped) => {}
                    Ok(ExecuteOutcome::Requeue) => {
                        self.queue.submit_after_backoff(item.key, item.attempt + 1);
                    }
                    Err(e) => {
                        warn!(diagnosis = %item.key, error = %e, "execution attempt failed");
                        self.queue.submit_after_backoff(item.key, item.attempt + 1);
                    }
                }
            }
            Some(_) => {}
        }
    }

    /// One admission attempt. Writes are optimistic: a lost race defers and
    /// the next attempt re-reads fresh state.
    fn admit(&self, diagnosis: &Diagnosis) -> Admission {
        let key = diagnosis.meta.name.clone();

        let Some(set) = self.stores.operation_sets.get(&diagnosis.spec.operation_set) else {
            return Admission::Defer(format!(
                "operation set {:?} not found",
                diagnosis.spec.operation_set
            ));
        };
        if set.status.hash.is_empty() {
            return Admission::Defer(format!(
                "operation set {:?} not compiled yet",
                set.meta.name
            ));
        }

        let node_name = if !diagnosis.spec.node_name.is_empty() {
            diagnosis.spec.node_name.clone()
        } else if let Some(pod_ref) = &diagnosis.spec.pod_reference {
            let Some(pod) = self.stores.pods.get(&pod_ref.key()) else {
                return Admission::Defer(format!("pod {:?} not found", pod_ref.key()));
            };
            if pod.spec.node_name.is_empty() {
                return Admission::Defer(format!("pod {:?} not scheduled yet", pod_ref.key()));
            }
            pod.spec.node_name.clone()
        } else {
            return self.reject_unbindable(diagnosis);
        };

        let mut bound = diagnosis.clone();
        bound.spec.node_name = node_name.clone();
        bound.meta.set_label(ADJACENCY_HASH_LABEL, &set.status.hash);
        let bound = match self.stores.diagnoses.update(bound) {
            Ok(updated) => updated,
            Err(e) => return Admission::Defer(format!("binding write lost a race: {e}")),
        };

        let mut pending = bound;
        pending.status.phase = Some(DiagnosisPhase::Pending);
        match self.stores.diagnoses.update_status(pending) {
            Ok(_) => {
                info!(diagnosis = %key, node = %node_name, "diagnosis admitted");
                Admission::Admitted
            }
            Err(e) => Admission::Defer(format!("admission write lost a race: {e}")),
        }
    }

    /// A record with neither a node name nor a pod reference can never bind.
    fn reject_unbindable(&self, diagnosis: &Diagnosis) -> Admission {
        warn!(diagnosis = %diagnosis.meta.name, "neither node name nor pod reference given");
        let mut rejected = diagnosis.clone();
        rejected.status.phase = Some(DiagnosisPhase::Failed);
        rejected.status.set_condition(
            Condition::new(CONDITION_COMPLETE, ConditionStatus::True, self.clock.epoch_ms())
                .reason(REASON_NODE_BINDING_FAILED)
                .message("one of nodeName and podReference must be specified"),
        );
        match self.stores.diagnoses.update_status(rejected) {
            Ok(_) => Admission::Rejected,
            Err(e) => Admission::Defer(format!("rejection write lost a race: {e}")),
        }
    }
}

#[cfg(test)]
#[path = "diagnosis_tests.rs"]
mod tests;
