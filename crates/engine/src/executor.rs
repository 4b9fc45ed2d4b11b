// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-diagnosis execution loop.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use ward_core::{
    Checkpoint, Clock, Condition, ConditionStatus, ContextMap, Diagnosis, DiagnosisPhase,
    FailureReason, OperationResult, Path, CONDITION_ACCEPTED, CONDITION_COMPLETE,
};
use ward_store::ObjectStores;

use crate::checkpoint::{StatusWriter, WriteError};
use crate::dispatcher::Dispatcher;

/// Cap on the raw byte size of a single operation result.
pub const DEFAULT_MAX_RESULT_BYTES: usize = 1024 * 1024;

/// Stripe count for the per-record run locks.
const LOCK_STRIPES: usize = 64;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Node this engine instance serves. Only diagnoses bound to it run here.
    pub node_name: String,
    /// Per-result size cap; larger results fail the path.
    pub max_result_bytes: usize,
    /// Bounded retries for optimistic status writes.
    pub status_retry_limit: u32,
    /// Optional wall-clock bound for a whole diagnosis.
    pub diagnosis_timeout: Option<Duration>,
    /// Honor stored checkpoints on pickup. Disabled, every run starts from
    /// the first path.
    pub resume_from_checkpoint: bool,
}

impl EngineConfig {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
            status_retry_limit: crate::checkpoint::DEFAULT_STATUS_RETRIES,
            diagnosis_timeout: None,
            resume_from_checkpoint: true,
        }
    }

    ward_core::setters! {
        set {
            max_result_bytes: usize,
            status_retry_limit: u32,
            resume_from_checkpoint: bool,
        }
        option {
            diagnosis_timeout: Duration,
        }
    }
}

/// What a single `execute` call achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// The diagnosis reached (or already had) a terminal phase.
    Completed,
    /// Transient obstacle; run again after a backoff.
    Requeue,
    /// Nothing to do here: wrong node, record gone, or already in flight.
    Skipped,
}

#[derive(Debug, Error)]
pub enum ExecuteError {
    /// Status writes kept losing version races; the caller should requeue.
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Striped per-record mutexes: at most one in-flight execution per
/// diagnosis uid within this process.
struct RunLocks {
    stripes: Vec<Arc<tokio::sync::Mutex<()>>>,
}

impl RunLocks {
    fn new() -> Self {
        Self {
            stripes: (0..LOCK_STRIPES).map(|_| Arc::new(tokio::sync::Mutex::new(()))).collect(),
        }
    }

    fn try_lock(&self, uid: &str) -> Option<tokio::sync::OwnedMutexGuard<()>> {
        let mut hasher = DefaultHasher::new();
        uid.hash(&mut hasher);
        let stripe = (hasher.finish() as usize) % self.stripes.len();
        Arc::clone(&self.stripes[stripe]).try_lock_owned().ok()
    }
}

/// Cancellation flags for in-flight runs, keyed by diagnosis uid.
#[derive(Default)]
struct CancelRegistry {
    flags: parking_lot::Mutex<HashMap<String, watch::Sender<bool>>>,
}

impl CancelRegistry {
    fn register(&self, uid: &str) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        self.flags.lock().insert(uid.to_string(), tx);
        rx
    }

    fn deregister(&self, uid: &str) {
        self.flags.lock().remove(uid);
    }

    fn cancel(&self, uid: &str) {
        if let Some(tx) = self.flags.lock().remove(uid) {
            // Receiver observes either the flipped value or the closed channel.
            let _ = tx.send(true);
        }
    }
}

enum StatusWrite {
    Written(Diagnosis),
    Halt(ExecuteOutcome),
}

/// The diagnosis execution engine. Generic over the dispatch transport and
/// the clock so tests can script both.
pub struct Engine<D: Dispatcher, C: Clock> {
    stores: ObjectStores,
    dispatcher: D,
    clock: C,
    config: EngineConfig,
    writer: StatusWriter,
    locks: RunLocks,
    cancels: CancelRegistry,
}

impl<D: Dispatcher, C: Clock> Engine<D, C> {
    pub fn new(stores: ObjectStores, dispatcher: D, clock: C, config: EngineConfig) -> Self {
        let writer = StatusWriter::new(stores.diagnoses.clone(), stores.operation_sets.clone())
            .with_retry_limit(config.status_retry_limit);
        Self {
            stores,
            dispatcher,
            clock,
            config,
            writer,
            locks: RunLocks::new(),
            cancels: CancelRegistry::default(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.config.node_name
    }

    /// Abort the in-flight run for a deleted diagnosis. In-flight dispatches
    /// are dropped mid-request.
    pub fn cancel(&self, uid: &str) {
        self.cancels.cancel(uid);
    }

    /// Run one diagnosis to the furthest point currently possible.
    pub async fn execute(&self, key: &str) -> Result<ExecuteOutcome, ExecuteError> {
        let Some(diagnosis) = self.stores.diagnoses.get(key) else {
            debug!(diagnosis = key, "skipping: record is gone");
            return Ok(ExecuteOutcome::Skipped);
        };

        // Node-affinity filter: no work-stealing across agents.
        if diagnosis.spec.node_name != self.config.node_name {
            return Ok(ExecuteOutcome::Skipped);
        }
        if diagnosis.is_terminal() {
            return Ok(ExecuteOutcome::Skipped);
        }

        let uid = diagnosis.meta.uid.as_str().to_string();
        let Some(_guard) = self.locks.try_lock(&uid) else {
            debug!(diagnosis = key, "execution already in flight, requeueing");
            return Ok(ExecuteOutcome::Requeue);
        };

        let mut cancelled = self.cancels.register(&uid);
        let result = self.execute_locked(key, &mut cancelled).await;
        self.cancels.deregister(&uid);
        result
    }

    async fn execute_locked(
        &self,
        key: &str,
        cancelled: &mut watch::Receiver<bool>,
    ) -> Result<ExecuteOutcome, ExecuteError> {
        let Some(diagnosis) = self.stores.diagnoses.get(key) else {
            return Ok(ExecuteOutcome::Skipped);
        };
        if diagnosis.is_terminal() {
            return Ok(ExecuteOutcome::Skipped);
        }

        let set_name = diagnosis.spec.operation_set.clone();
        let Some(set) = self.stores.operation_sets.get(&set_name) else {
            warn!(diagnosis = key, operation_set = %set_name, "halting: operation set is gone");
            return Ok(ExecuteOutcome::Skipped);
        };

        if !set.status.ready {
            let now = self.clock.epoch_ms();
            let write = self.write_status(key, None, move |status| {
                status.set_condition(
                    Condition::new(CONDITION_ACCEPTED, ConditionStatus::False, now)
                        .reason(FailureReason::OperationSetNotReady.to_string())
                        .message(format!("operation set {set_name:?} is not ready")),
                );
            })?;
            return Ok(match write {
                StatusWrite::Written(_) => ExecuteOutcome::Requeue,
                StatusWrite::Halt(outcome) => outcome,
            });
        }

        let Some(expected) = diagnosis.graph_hash().map(str::to_string) else {
            // Admission has not stamped the label yet.
            debug!(diagnosis = key, "no graph hash label, requeueing");
            return Ok(ExecuteOutcome::Requeue);
        };
        if expected != set.status.hash {
            return self.fail(
                key,
                FailureReason::GraphChanged,
                format!("admitted graph {} drifted to {}", expected, set.status.hash),
            );
        }
        if set.status.paths.is_empty() {
            return self.fail(
                key,
                FailureReason::OperationSetEmpty,
                format!("operation set {:?} enumerates no paths", diagnosis.spec.operation_set),
            );
        }

        // Pending -> Running
        let now = self.clock.epoch_ms();
        let diagnosis = match self.write_status(key, Some(&expected), move |status| {
            status.phase = Some(DiagnosisPhase::Running);
            if status.start_time_ms.is_none() {
                status.start_time_ms = Some(now);
            }
            status.set_condition(
                Condition::new(CONDITION_ACCEPTED, ConditionStatus::True, now)
                    .reason("DiagnosisAccepted"),
            );
        })? {
            StatusWrite::Written(d) => d,
            StatusWrite::Halt(outcome) => return Ok(outcome),
        };

        let seed = self.seed_context(&diagnosis);
        let paths = set.status.paths.clone();
        let (first_path, first_node) = if self.config.resume_from_checkpoint {
            diagnosis
                .status
                .checkpoint
                .map(|c| (c.path_index, c.node_index))
                .unwrap_or((0, 0))
        } else {
            (0, 0)
        };

        let mut last_failure = String::new();

        'paths: for path_index in first_path..paths.len() {
            let path = &paths[path_index];
            let start_node = if path_index == first_path { first_node.min(path.len()) } else { 0 };

            // Rebuild the context for this path: seed plus stored results of
            // its own nodes, in path order.
            let Some(latest) = self.stores.diagnoses.get(key) else {
                return Ok(ExecuteOutcome::Skipped);
            };
            let mut ctx = match rebuild_context(&seed, path, &latest.status.operation_results) {
                Ok(ctx) => ctx,
                Err(node_id) => {
                    return self.mark_unknown(key, node_id);
                }
            };

            for node_index in start_node..path.len() {
                // Refetch both records before each dispatch: deletion halts,
                // graph drift fails terminally, the deadline fails with Timeout.
                let Some(current) = self.stores.diagnoses.get(key) else {
                    return Ok(ExecuteOutcome::Skipped);
                };
                if current.is_terminal() {
                    return Ok(ExecuteOutcome::Skipped);
                }
                let Some(live) = self.stores.operation_sets.get(&current.spec.operation_set)
                else {
                    warn!(diagnosis = key, "halting: operation set is gone mid-run");
                    return Ok(ExecuteOutcome::Skipped);
                };
                if live.status.hash != expected {
                    return self.fail(
                        key,
                        FailureReason::GraphChanged,
                        format!("admitted graph {} drifted to {}", expected, live.status.hash),
                    );
                }
                if let (Some(limit), Some(started)) =
                    (self.config.diagnosis_timeout, current.status.start_time_ms)
                {
                    if self.clock.since_ms(started) > limit.as_millis() as u64 {
                        return self.fail(
                            key,
                            FailureReason::Timeout,
                            format!("diagnosis exceeded its {}s deadline", limit.as_secs()),
                        );
                    }
                }

                let node = &path[node_index];
                let Some(operation) = self.stores.operations.get(&node.operation) else {
                    last_failure = format!("operation {:?} is gone", node.operation);
                    match self.record_path_failure(
                        key,
                        &expected,
                        path,
                        path_index,
                        node_index,
                        FailureReason::Missing,
                        &last_failure,
                    )? {
                        StatusWrite::Written(_) => continue 'paths,
                        StatusWrite::Halt(outcome) => return Ok(outcome),
                    }
                };

                info!(
                    diagnosis = key,
                    path = path_index,
                    node = node.id,
                    operation = %node.operation,
                    "dispatching operation"
                );
                let started = std::time::Instant::now();
                let url = operation.spec.endpoint.url();
                let invoke = self.dispatcher.invoke(&url, operation.timeout(), &ctx);
                let outcome = tokio::select! {
                    result = invoke => result,
                    _ = cancelled.changed() => {
                        info!(diagnosis = key, "run cancelled mid-dispatch");
                        return Ok(ExecuteOutcome::Skipped);
                    }
                };
                let elapsed_ms = started.elapsed().as_millis() as u64;

                let failure = match outcome {
                    Ok(result) if result.raw.len() > self.config.max_result_bytes => {
                        (FailureReason::ResultTooLarge, format!(
                            "result is {} bytes, cap is {}",
                            result.raw.len(),
                            self.config.max_result_bytes
                        ))
                    }
                    Ok(result) => match ctx.merge(&result.delta) {
                        Ok(()) => {
                            info!(
                                diagnosis = key,
                                node = node.id,
                                elapsed_ms,
                                result_bytes = result.raw.len(),
                                "operation completed"
                            );
                            match self.record_step(key, &expected, node, path_index, node_index, &result.raw)? {
                                StatusWrite::Written(_) => continue,
                                StatusWrite::Halt(outcome) => return Ok(outcome),
                            }
                        }
                        Err(e) => (FailureReason::MalformedResult, e.to_string()),
                    },
                    Err(e) => (e.reason(), e.to_string()),
                };

                let (reason, message) = failure;
                warn!(
                    diagnosis = key,
                    node = node.id,
                    elapsed_ms,
                    %reason,
                    message,
                    "operation failed, abandoning path"
                );
                last_failure = format!("{reason}: {message}");
                match self.record_path_failure(
                    key,
                    &expected,
                    path,
                    path_index,
                    node_index,
                    reason,
                    &message,
                )? {
                    StatusWrite::Written(_) => continue 'paths,
                    StatusWrite::Halt(outcome) => return Ok(outcome),
                }
            }

            // Every node on this path completed.
            return self.succeed(key, &expected, path);
        }

        let message = if last_failure.is_empty() {
            format!("all {} paths failed", paths.len())
        } else {
            format!("all {} paths failed; last failure: {}", paths.len(), last_failure)
        };
        self.fail(key, FailureReason::OperationFailed, message)
    }

    /// Seed context: diagnosis parameters plus the orchestrator-owned keys.
    fn seed_context(&self, diagnosis: &Diagnosis) -> ContextMap {
        let mut ctx = ContextMap::from_parameters(&diagnosis.spec.parameters);
        ctx.insert_reserved("name", diagnosis.meta.name.clone());
        ctx.insert_reserved("node-name", diagnosis.spec.node_name.clone());
        ctx
    }

    fn write_status(
        &self,
        key: &str,
        guard_hash: Option<&str>,
        mutate: impl Fn(&mut ward_core::DiagnosisStatus),
    ) -> Result<StatusWrite, ExecuteError> {
        match self.writer.mutate(key, guard_hash, mutate) {
            Ok(d) => Ok(StatusWrite::Written(d)),
            Err(WriteError::Missing(gone)) => {
                debug!(diagnosis = key, missing = %gone, "halting: object gone during status write");
                Ok(StatusWrite::Halt(ExecuteOutcome::Skipped))
            }
            Err(WriteError::GraphChanged(_)) => {
                let outcome = self.fail(
                    key,
                    FailureReason::GraphChanged,
                    "admitted graph drifted during execution".to_string(),
                )?;
                Ok(StatusWrite::Halt(outcome))
            }
            Err(e @ WriteError::Conflict { .. }) => Err(e.into()),
        }
    }

    fn record_step(
        &self,
        key: &str,
        expected: &str,
        node: &ward_core::PathNode,
        path_index: usize,
        node_index: usize,
        raw: &str,
    ) -> Result<StatusWrite, ExecuteError> {
        let operation = node.operation.clone();
        let node_id = node.id;
        let raw = raw.to_string();
        self.write_status(key, Some(expected), move |status| {
            status.operation_results.insert(
                node_id,
                OperationResult { operation: operation.clone(), result: Some(raw.clone()) },
            );
            status.advance_checkpoint(Checkpoint::new(path_index, node_index));
        })
    }

    fn record_path_failure(
        &self,
        key: &str,
        expected: &str,
        path: &Path,
        path_index: usize,
        node_index: usize,
        reason: FailureReason,
        message: &str,
    ) -> Result<StatusWrite, ExecuteError> {
        let failed: Path = path[..=node_index].to_vec();
        let now = self.clock.epoch_ms();
        let message = format!("node {} ({}): {}", path[node_index].id, reason, message);
        self.write_status(key, Some(expected), move |status| {
            if !status.failed_paths.contains(&failed) {
                status.failed_paths.push(failed.clone());
            }
            // Never replay a failed path after a restart.
            status.advance_checkpoint(Checkpoint::new(path_index + 1, 0));
            status.set_condition(
                Condition::new(CONDITION_ACCEPTED, ConditionStatus::True, now)
                    .reason("DiagnosisAccepted")
                    .message(message.clone()),
            );
        })
    }

    fn succeed(
        &self,
        key: &str,
        expected: &str,
        path: &Path,
    ) -> Result<ExecuteOutcome, ExecuteError> {
        let now = self.clock.epoch_ms();
        let keep: HashSet<u64> = path.iter().map(|n| n.id).collect();
        let path = path.clone();
        info!(diagnosis = key, "diagnosis succeeded");
        let write = self.write_status(key, Some(expected), move |status| {
            status.phase = Some(DiagnosisPhase::Succeeded);
            status.succeeded_path = Some(path.clone());
            status.operation_results.retain(|id, _| keep.contains(id));
            status.set_condition(
                Condition::new(CONDITION_COMPLETE, ConditionStatus::True, now)
                    .reason("DiagnosisComplete"),
            );
        })?;
        Ok(match write {
            StatusWrite::Written(_) => ExecuteOutcome::Completed,
            StatusWrite::Halt(outcome) => outcome,
        })
    }

    fn fail(
        &self,
        key: &str,
        reason: FailureReason,
        message: String,
    ) -> Result<ExecuteOutcome, ExecuteError> {
        let now = self.clock.epoch_ms();
        warn!(diagnosis = key, %reason, message, "diagnosis failed");
        let write = self.write_status(key, None, move |status| {
            status.phase = Some(DiagnosisPhase::Failed);
            status.set_condition(
                Condition::new(CONDITION_COMPLETE, ConditionStatus::True, now)
                    .reason(reason.to_string())
                    .message(message.clone()),
            );
        })?;
        Ok(match write {
            StatusWrite::Written(_) => ExecuteOutcome::Completed,
            StatusWrite::Halt(outcome) => outcome,
        })
    }

    fn mark_unknown(&self, key: &str, node_id: u64) -> Result<ExecuteOutcome, ExecuteError> {
        let now = self.clock.epoch_ms();
        warn!(diagnosis = key, node = node_id, "stored result is unreadable");
        let write = self.write_status(key, None, move |status| {
            status.phase = Some(DiagnosisPhase::Unknown);
            status.set_condition(
                Condition::new(CONDITION_COMPLETE, ConditionStatus::Unknown, now)
                    .reason(FailureReason::MalformedResult.to_string())
                    .message(format!("stored result for node {node_id} is no longer parseable")),
            );
        })?;
        Ok(match write {
            StatusWrite::Written(_) => ExecuteOutcome::Completed,
            StatusWrite::Halt(outcome) => outcome,
        })
    }
}

/// Seed plus, in path order, the stored results of nodes on this path.
/// Returns the offending node id if a stored blob no longer parses.
fn rebuild_context(
    seed: &ContextMap,
    path: &Path,
    results: &std::collections::BTreeMap<u64, OperationResult>,
) -> Result<ContextMap, u64> {
    let mut ctx = seed.clone();
    for node in path {
        let Some(result) = results.get(&node.id) else { continue };
        let Some(raw) = result.result.as_deref() else { continue };
        if raw.is_empty() {
            continue;
        }
        let delta: ContextMap = serde_json::from_str(raw).map_err(|_| node.id)?;
        ctx.merge(&delta).map_err(|_| node.id)?;
    }
    Ok(ctx)
}

#[cfg(test)]
#[path = "executor_tests/mod.rs"]
mod tests;
