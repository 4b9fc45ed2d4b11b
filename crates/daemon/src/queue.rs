// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded work queue feeding the reconcile workers.
//!
//! Submission never blocks: a full queue is an error and the caller decides
//! whether to drop or resubmit with backoff. Consumers are a fixed pool of
//! worker tasks sharing one receiver.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default queue depth per kind.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

const BASE_RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// An enqueue that would block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("work queue is full")]
pub struct QueueFull;

/// One unit of reconcile work: an object key plus how many times it has
/// been retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub key: String,
    pub attempt: u32,
}

impl WorkItem {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into(), attempt: 0 }
    }
}

/// Submission side of the queue.
#[derive(Clone)]
pub struct WorkQueue {
    tx: mpsc::Sender<WorkItem>,
}

/// Consumption side, shared by the worker pool.
#[derive(Clone)]
pub struct WorkReceiver {
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<WorkItem>>>,
}

impl WorkQueue {
    pub fn bounded(capacity: usize) -> (WorkQueue, WorkReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        (WorkQueue { tx }, WorkReceiver { rx: Arc::new(tokio::sync::Mutex::new(rx)) })
    }

    /// Enqueue a fresh item. Fails instead of blocking when the queue is
    /// at capacity.
    pub fn submit(&self, key: impl Into<String>) -> Result<(), QueueFull> {
        self.submit_item(WorkItem::new(key))
    }

    pub fn submit_item(&self, item: WorkItem) -> Result<(), QueueFull> {
        self.tx.try_send(item).map_err(|_| QueueFull)
    }

    /// Resubmit after an exponential backoff keyed to the attempt count.
    /// An item that finds the queue full after its delay is dropped; the
    /// next watch event for the object starts a fresh attempt chain.
    pub fn submit_after_backoff(&self, key: String, attempt: u32) {
        let tx = self.tx.clone();
        let delay = backoff_delay(attempt);
        debug!(key = %key, attempt, delay_ms = delay.as_millis() as u64, "requeueing with backoff");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.try_send(WorkItem { key: key.clone(), attempt }).is_err() {
                warn!(key = %key, attempt, "queue full after backoff, dropping");
            }
        });
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.min(6);
    (BASE_RETRY_DELAY * 2u32.pow(exp)).min(MAX_RETRY_DELAY)
}

impl WorkReceiver {
    pub async fn recv(&self) -> Option<WorkItem> {
        self.rx.lock().await.recv().await
    }
}

/// Spawn `count` workers draining the queue until shutdown.
pub fn spawn_workers<F, Fut>(
    count: usize,
    receiver: WorkReceiver,
    shutdown: watch::Receiver<bool>,
    handler: F,
) -> Vec<JoinHandle<()>>
where
    F: Fn(WorkItem) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send,
{
    (0..count)
        .map(|worker| {
            let receiver = receiver.clone();
            let mut shutdown = shutdown.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                debug!(worker, "reconcile worker started");
                loop {
                    tokio::select! {
                        item = receiver.recv() => match item {
                            Some(item) => handler(item).await,
                            None => break,
                        },
                        _ = shutdown.changed() => break,
                    }
                }
                debug!(worker, "reconcile worker stopped");
            })
        })
        .collect()
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
