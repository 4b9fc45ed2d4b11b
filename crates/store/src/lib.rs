// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ward-store: the versioned object store the orchestrator consumes.
//!
//! A generic in-memory registry with the semantics the reconcilers rely on:
//! store-assigned uids, a store-wide resource version bumped on every write,
//! optimistic concurrency on update, a status subresource, and broadcast
//! watch fan-out. In a cluster deployment this seam is backed by the
//! cluster's API server; everything above it only sees these operations.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

use ward_core::{Diagnosis, ObjectMeta, Operation, OperationSet, Pod, Uid};

/// Buffered watch events per subscriber before it is considered lagged.
const WATCH_CAPACITY: usize = 256;

/// A kind the store can hold.
pub trait Object: Clone + Send + Sync + 'static {
    const KIND: &'static str;

    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;

    /// Copy the status subresource from `src`. Kinds without one do nothing,
    /// which makes `update` whole-object for them.
    fn copy_status_from(&mut self, _src: &Self) {}

    /// Store key; `namespace/name` for namespaced kinds.
    fn key(&self) -> String {
        self.meta().key()
    }
}

impl Object for Operation {
    const KIND: &'static str = "Operation";

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}

impl Object for OperationSet {
    const KIND: &'static str = "OperationSet";

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }

    fn copy_status_from(&mut self, src: &Self) {
        self.status = src.status.clone();
    }
}

impl Object for Diagnosis {
    const KIND: &'static str = "Diagnosis";

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }

    fn copy_status_from(&mut self, src: &Self) {
        self.status = src.status.clone();
    }
}

impl Object for Pod {
    const KIND: &'static str = "Pod";

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}

/// Change notification delivered to watchers.
#[derive(Debug, Clone)]
pub enum WatchEvent<T> {
    Added(T),
    Modified(T),
    Deleted(T),
}

impl<T> WatchEvent<T> {
    pub fn object(&self) -> &T {
        match self {
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) | WatchEvent::Deleted(obj) => obj,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, WatchEvent::Deleted(_))
    }
}

/// Store access errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{kind} {key:?} not found")]
    Missing { kind: &'static str, key: String },

    #[error("{kind} {key:?} already exists")]
    AlreadyExists { kind: &'static str, key: String },

    #[error("{kind} {key:?} version conflict: expected {expected}, stored {stored}")]
    Conflict { kind: &'static str, key: String, expected: u64, stored: u64 },
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, StoreError::Missing { .. })
    }
}

struct Registry<T> {
    objects: HashMap<String, T>,
    next_version: u64,
}

/// One kind's registry. Clones share the underlying state.
pub struct Store<T: Object> {
    registry: Arc<RwLock<Registry<T>>>,
    watch_tx: broadcast::Sender<WatchEvent<T>>,
}

impl<T: Object> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self { registry: Arc::clone(&self.registry), watch_tx: self.watch_tx.clone() }
    }
}

impl<T: Object> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Object> Store<T> {
    pub fn new() -> Self {
        let (watch_tx, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            registry: Arc::new(RwLock::new(Registry { objects: HashMap::new(), next_version: 0 })),
            watch_tx,
        }
    }

    /// Subscribe to change notifications. A subscriber that falls more than
    /// the buffer size behind observes a lag error and should relist.
    pub fn watch(&self) -> broadcast::Receiver<WatchEvent<T>> {
        self.watch_tx.subscribe()
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.registry.read().objects.get(key).cloned()
    }

    pub fn list(&self) -> Vec<T> {
        self.registry.read().objects.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.registry.read().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.read().objects.is_empty()
    }

    /// Insert a new object. Assigns the uid (unless pre-set) and the first
    /// resource version.
    pub fn create(&self, mut obj: T) -> Result<T, StoreError> {
        let key = obj.key();
        let mut registry = self.registry.write();
        if registry.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists { kind: T::KIND, key });
        }

        if obj.meta().uid.is_empty() {
            obj.meta_mut().uid = Uid::new();
        }
        registry.next_version += 1;
        obj.meta_mut().resource_version = registry.next_version;

        registry.objects.insert(key, obj.clone());
        drop(registry);

        self.notify(WatchEvent::Added(obj.clone()));
        Ok(obj)
    }

    /// Replace an object's metadata and spec; the status subresource is
    /// preserved from the stored copy. Fails with `Conflict` unless the
    /// caller's resource version matches the stored one.
    pub fn update(&self, obj: T) -> Result<T, StoreError> {
        self.write(obj, |stored, mut incoming| {
            incoming.copy_status_from(stored);
            incoming
        })
    }

    /// Replace an object's status subresource only; metadata and spec are
    /// preserved from the stored copy.
    pub fn update_status(&self, obj: T) -> Result<T, StoreError> {
        self.write(obj, |stored, incoming| {
            let mut merged = stored.clone();
            merged.copy_status_from(&incoming);
            merged
        })
    }

    pub fn delete(&self, key: &str) -> Result<T, StoreError> {
        let removed = self
            .registry
            .write()
            .objects
            .remove(key)
            .ok_or_else(|| StoreError::Missing { kind: T::KIND, key: key.to_string() })?;

        self.notify(WatchEvent::Deleted(removed.clone()));
        Ok(removed)
    }

    fn write(&self, obj: T, merge: impl FnOnce(&T, T) -> T) -> Result<T, StoreError> {
        let key = obj.key();
        let mut registry = self.registry.write();
        let stored = registry
            .objects
            .get(&key)
            .ok_or_else(|| StoreError::Missing { kind: T::KIND, key: key.clone() })?;

        let expected = obj.meta().resource_version;
        let current = stored.meta().resource_version;
        if expected != current {
            return Err(StoreError::Conflict { kind: T::KIND, key, expected, stored: current });
        }

        let mut merged = merge(stored, obj);
        // uid is immutable once assigned
        merged.meta_mut().uid = stored.meta().uid;
        registry.next_version += 1;
        merged.meta_mut().resource_version = registry.next_version;

        registry.objects.insert(key, merged.clone());
        drop(registry);

        self.notify(WatchEvent::Modified(merged.clone()));
        Ok(merged)
    }

    fn notify(&self, event: WatchEvent<T>) {
        // No receivers is fine; watches are optional.
        if self.watch_tx.send(event).is_err() {
            tracing::trace!(kind = T::KIND, "watch event dropped: no subscribers");
        }
    }
}

/// The three CRD-like kinds plus the pod cache, grouped for wiring.
#[derive(Clone, Default)]
pub struct ObjectStores {
    pub operations: Store<Operation>,
    pub operation_sets: Store<OperationSet>,
    pub diagnoses: Store<Diagnosis>,
    pub pods: Store<Pod>,
}

impl ObjectStores {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
