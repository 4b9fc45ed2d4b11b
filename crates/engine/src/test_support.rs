// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted dispatcher for engine and reconciler tests.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use ward_core::ContextMap;

use crate::dispatcher::{DispatchError, DispatchOutcome, Dispatcher};

/// One observed invocation.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub url: String,
    pub ctx: ContextMap,
}

/// Dispatcher whose outcomes are scripted per operation name (the last path
/// segment of the endpoint URL). One-shot outcomes queue ahead of a sticky
/// default, so tests can model deterministic workers and one-off failures.
#[derive(Default)]
pub struct ScriptedDispatcher {
    queued: Mutex<HashMap<String, VecDeque<Result<DispatchOutcome, DispatchError>>>>,
    sticky: Mutex<HashMap<String, Result<DispatchOutcome, DispatchError>>>,
    hung: Mutex<std::collections::HashSet<String>>,
    on_invoke: Mutex<Option<Box<dyn Fn(&str) + Send + Sync>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot outcome for the named operation.
    pub fn enqueue(&self, operation: &str, outcome: Result<DispatchOutcome, DispatchError>) {
        self.queued.lock().entry(operation.to_string()).or_default().push_back(outcome);
    }

    /// Set the outcome returned whenever no one-shot outcome is queued,
    /// modeling a deterministic worker.
    pub fn always(&self, operation: &str, outcome: Result<DispatchOutcome, DispatchError>) {
        self.sticky.lock().insert(operation.to_string(), outcome);
    }

    /// Deterministic worker answering 200 with the given JSON body.
    pub fn always_json(&self, operation: &str, body: &str) {
        self.always(operation, Ok(outcome_from_json(body)));
    }

    /// Deterministic worker answering the given non-200 status.
    pub fn always_reject(&self, operation: &str, status: u16, body: &str) {
        self.always(
            operation,
            Err(DispatchError::Rejected { status, body: body.to_string() }),
        );
    }

    /// Make the named operation hang forever; the run must be cancelled.
    pub fn hang(&self, operation: &str) {
        self.hung.lock().insert(operation.to_string());
    }

    /// Run a hook at the start of every invocation, before the scripted
    /// outcome resolves. Lets tests mutate store state mid-run.
    pub fn on_invoke(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *self.on_invoke.lock() = Some(Box::new(hook));
    }

    /// Every invocation observed so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        let suffix = format!("/{operation}");
        self.calls.lock().iter().filter(|c| c.url.ends_with(&suffix)).count()
    }
}

/// Parse a JSON body into the outcome a real worker response would produce.
pub fn outcome_from_json(body: &str) -> DispatchOutcome {
    let delta: ContextMap = serde_json::from_str(body).unwrap_or_default();
    DispatchOutcome { delta, raw: body.to_string() }
}

#[async_trait]
impl Dispatcher for ScriptedDispatcher {
    async fn invoke(
        &self,
        url: &str,
        _timeout: Duration,
        ctx: &ContextMap,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.calls.lock().push(RecordedCall { url: url.to_string(), ctx: ctx.clone() });

        let operation = url.rsplit('/').next().unwrap_or_default().to_string();
        if let Some(hook) = self.on_invoke.lock().as_ref() {
            hook(&operation);
        }
        if self.hung.lock().contains(&operation) {
            std::future::pending::<()>().await;
        }
        if let Some(outcome) =
            self.queued.lock().get_mut(&operation).and_then(|queue| queue.pop_front())
        {
            return outcome;
        }
        if let Some(outcome) = self.sticky.lock().get(&operation) {
            return outcome.clone();
        }
        Err(DispatchError::Transport(format!("no scripted outcome for {operation:?}")))
    }
}
