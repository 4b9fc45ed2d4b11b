// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable status writes for the execution engine.
//!
//! Every mutation goes through one fetch→guard→mutate→write cycle with a
//! bounded retry on version conflicts. Two guards apply before every write:
//! a terminal phase absorbs the mutation (terminal statuses never change
//! again), and when a hash guard is supplied the diagnosis's admitted graph
//! hash must still match the live OperationSet.

use thiserror::Error;
use tracing::warn;
use ward_core::{Diagnosis, DiagnosisStatus, OperationSet};
use ward_store::{Store, StoreError};

/// Status write attempts before giving up on a version race.
pub const DEFAULT_STATUS_RETRIES: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("{0:?} is gone")]
    Missing(String),

    #[error("status write for {key:?} lost {attempts} version races")]
    Conflict { key: String, attempts: u32 },

    #[error("graph hash for {0:?} no longer matches its operation set")]
    GraphChanged(String),
}

/// Writer for Diagnosis status updates.
#[derive(Clone)]
pub struct StatusWriter {
    diagnoses: Store<Diagnosis>,
    operation_sets: Store<OperationSet>,
    retry_limit: u32,
}

impl StatusWriter {
    pub fn new(diagnoses: Store<Diagnosis>, operation_sets: Store<OperationSet>) -> Self {
        Self { diagnoses, operation_sets, retry_limit: DEFAULT_STATUS_RETRIES }
    }

    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// Apply `mutate` to the live status and persist it.
    ///
    /// The closure may run several times: each conflict retry reloads the
    /// record and reapplies the mutation to the fresh copy, so closures must
    /// be idempotent against already-mutated state (checkpoint advancement
    /// and condition updates are; plain inserts overwrite).
    ///
    /// Returns the stored record unchanged when its phase is terminal.
    pub fn mutate(
        &self,
        key: &str,
        guard_hash: Option<&str>,
        mutate: impl Fn(&mut DiagnosisStatus),
    ) -> Result<Diagnosis, WriteError> {
        for attempt in 1..=self.retry_limit {
            let current = self
                .diagnoses
                .get(key)
                .ok_or_else(|| WriteError::Missing(key.to_string()))?;

            if current.status.is_terminal() {
                return Ok(current);
            }

            if let Some(expected) = guard_hash {
                let set_name = &current.spec.operation_set;
                let live = self
                    .operation_sets
                    .get(set_name)
                    .ok_or_else(|| WriteError::Missing(set_name.clone()))?;
                if live.status.hash != expected {
                    return Err(WriteError::GraphChanged(key.to_string()));
                }
            }

            let mut updated = current.clone();
            mutate(&mut updated.status);

            // A mutation that changes nothing must not write: the Modified
            // event would feed the watch loop its own echo forever.
            if updated.status == current.status {
                return Ok(current);
            }

            match self.diagnoses.update_status(updated) {
                Ok(stored) => return Ok(stored),
                Err(e) if e.is_conflict() => {
                    warn!(diagnosis = key, attempt, "status write conflict, retrying");
                }
                Err(StoreError::Missing { .. }) => {
                    return Err(WriteError::Missing(key.to_string()));
                }
                Err(e) => {
                    // AlreadyExists cannot happen on update; treat as gone.
                    warn!(diagnosis = key, error = %e, "unexpected status write failure");
                    return Err(WriteError::Missing(key.to_string()));
                }
            }
        }

        Err(WriteError::Conflict { key: key.to_string(), attempts: self.retry_limit })
    }
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
