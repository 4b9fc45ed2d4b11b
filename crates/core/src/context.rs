// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The context map threaded through a diagnosis pipeline.
//!
//! On the wire this is a flat JSON object of opaque string values; workers
//! decide their own encoding and the orchestrator never interprets them.
//! In memory it is wrapped in a type that owns the merge semantics and
//! fences off the reserved key space.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key prefix owned by the orchestrator. Seeded keys such as
/// `diagnosis.name` live under it; worker deltas may not write to it.
pub const RESERVED_CONTEXT_PREFIX: &str = "diagnosis.";

/// A worker delta tried to touch the reserved key space.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("context key {0:?} uses the reserved prefix {RESERVED_CONTEXT_PREFIX:?}")]
pub struct ContextError(pub String);

/// Accumulating key→value dictionary handed to each operation.
///
/// Backed by a `BTreeMap` so serialization is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextMap(BTreeMap<String, String>);

impl ContextMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a seed context from diagnosis parameters (keys are graph node
    /// ids; values are opaque).
    pub fn from_parameters(parameters: &BTreeMap<String, String>) -> Self {
        Self(parameters.clone())
    }

    /// Insert a key under the orchestrator-owned reserved prefix.
    pub fn insert_reserved(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(format!("{RESERVED_CONTEXT_PREFIX}{key}"), value.into());
    }

    /// Merge a worker delta: delta keys overwrite existing keys.
    ///
    /// Rejects the whole delta if any key is under the reserved prefix, so
    /// a bad worker cannot partially corrupt the context.
    pub fn merge(&mut self, delta: &ContextMap) -> Result<(), ContextError> {
        if let Some(key) = delta.0.keys().find(|k| k.starts_with(RESERVED_CONTEXT_PREFIX)) {
            return Err(ContextError(key.clone()));
        }
        for (key, value) in &delta.0 {
            self.0.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
