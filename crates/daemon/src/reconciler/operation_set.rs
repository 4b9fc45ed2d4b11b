// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OperationSet admission: compile the declared graph, enumerate its paths,
//! and publish them on the status together with the content hash.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use ward_core::{
    update_condition, Clock, Condition, ConditionStatus, FailureReason, OperationSet,
    OperationSetStatus, ADJACENCY_HASH_LABEL, CONDITION_SET_NOT_READY, VIRTUAL_SOURCE_ID,
};
use ward_graph::{adjacency_hash, CompileCache, GraphError};
use ward_store::{ObjectStores, WatchEvent};

pub struct OperationSetReconciler<C: Clock> {
    stores: ObjectStores,
    cache: Arc<CompileCache>,
    clock: C,
}

impl<C: Clock> OperationSetReconciler<C> {
    pub fn new(stores: ObjectStores, cache: Arc<CompileCache>, clock: C) -> Self {
        Self { stores, cache, clock }
    }

    /// Watch loop: an initial pass over everything already stored, then one
    /// reconcile per watch event until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut events = self.stores.operation_sets.watch();
        for set in self.stores.operation_sets.list() {
            self.reconcile(&set.meta.name);
        }

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(WatchEvent::Added(set)) | Ok(WatchEvent::Modified(set)) => {
                        self.reconcile(&set.meta.name);
                    }
                    Ok(WatchEvent::Deleted(set)) => {
                        debug!(operation_set = %set.meta.name, "operation set deleted");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "operation set watch lagged, relisting");
                        for set in self.stores.operation_sets.list() {
                            self.reconcile(&set.meta.name);
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.changed() => break,
            }
        }
    }

    /// Compile one OperationSet and publish the outcome.
    pub fn reconcile(&self, key: &str) {
        let Some(set) = self.stores.operation_sets.get(key) else {
            return;
        };

        let declared_hash = adjacency_hash(&set.spec.adjacency_list);
        if set.status.ready && set.status.hash == declared_hash {
            return;
        }

        match self.cache.get_or_compile(&set.spec.adjacency_list) {
            Ok(compiled) => {
                if let Some(missing) = self.first_missing_operation(&set) {
                    self.mark_not_ready(
                        set,
                        CONDITION_SET_NOT_READY,
                        FailureReason::GraphInvalid,
                        format!("operation {missing:?} not found"),
                        &declared_hash,
                    );
                } else if compiled.paths.is_empty() {
                    self.mark_not_ready(
                        set,
                        CONDITION_SET_NOT_READY,
                        FailureReason::OperationSetEmpty,
                        "the virtual source has no successors".to_string(),
                        &declared_hash,
                    );
                } else {
                    self.mark_ready(set, &compiled.paths, &compiled.hash);
                }
            }
            Err(e) => {
                let reason = match e {
                    GraphError::TooManyPaths { .. } => FailureReason::OperationSetNotReady,
                    _ => FailureReason::GraphInvalid,
                };
                self.mark_not_ready(set, e.condition_kind(), reason, e.to_string(), &declared_hash);
            }
        }
    }

    fn first_missing_operation(&self, set: &OperationSet) -> Option<String> {
        set.spec
            .adjacency_list
            .iter()
            .filter(|node| node.id != VIRTUAL_SOURCE_ID)
            .find(|node| self.stores.operations.get(&node.operation).is_none())
            .map(|node| node.operation.clone())
    }

    fn mark_ready(&self, set: OperationSet, paths: &[ward_core::Path], hash: &str) {
        // Label first (a metadata write), then the compiled status.
        let mut labeled = set;
        labeled.meta.set_label(ADJACENCY_HASH_LABEL, hash);
        let labeled = match self.stores.operation_sets.update(labeled) {
            Ok(updated) => updated,
            Err(e) => {
                warn!(error = %e, "label update lost a race, retrying on next event");
                return;
            }
        };

        let mut ready = labeled;
        ready.status = OperationSetStatus {
            ready: true,
            paths: paths.to_vec(),
            hash: hash.to_string(),
            conditions: Vec::new(),
        };
        match self.stores.operation_sets.update_status(ready) {
            Ok(updated) => info!(
                operation_set = %updated.meta.name,
                paths = paths.len(),
                hash,
                "operation set compiled"
            ),
            Err(e) => warn!(error = %e, "status update lost a race, retrying on next event"),
        }
    }

    fn mark_not_ready(
        &self,
        set: OperationSet,
        condition_kind: &str,
        reason: FailureReason,
        message: String,
        declared_hash: &str,
    ) {
        warn!(
            operation_set = %set.meta.name,
            condition = condition_kind,
            %reason,
            message,
            "operation set rejected"
        );
        let mut rejected = set.clone();
        rejected.status.ready = false;
        rejected.status.paths.clear();
        rejected.status.hash = declared_hash.to_string();
        update_condition(
            &mut rejected.status.conditions,
            Condition::new(condition_kind, ConditionStatus::True, self.clock.epoch_ms())
                .reason(reason.to_string())
                .message(message),
        );
        // Writing an unchanged status would echo through the watch forever.
        if rejected.status == set.status {
            return;
        }
        if let Err(e) = self.stores.operation_sets.update_status(rejected) {
            warn!(error = %e, "status update lost a race, retrying on next event");
        }
    }
}

#[cfg(test)]
#[path = "operation_set_tests.rs"]
mod tests;
