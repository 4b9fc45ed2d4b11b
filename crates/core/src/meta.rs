// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared object metadata and condition handling.

use crate::id::Uid;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label key that carries the content hash of an OperationSet's adjacency
/// list. Stamped on admitted OperationSets and on every Diagnosis that
/// references one, so a mid-flight Diagnosis can detect graph mutation.
pub const ADJACENCY_HASH_LABEL: &str = "adjacency-list-hash";

/// Metadata common to every stored object.
///
/// `uid` and `resource_version` are managed by the store: the uid is
/// assigned once on create, the resource version bumped on every write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Uid::is_empty")]
    pub uid: Uid,
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub created_at_ms: u64,
}

impl ObjectMeta {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    /// Store key: `namespace/name` for namespaced objects, `name` otherwise.
    pub fn key(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.namespace, self.name)
        }
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn set_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.labels.insert(key.into(), value.into());
    }
}

/// Status of a condition: the observed truth value of one aspect of an
/// object's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

crate::simple_display! {
    ConditionStatus {
        True => "True",
        False => "False",
        Unknown => "Unknown",
    }
}

/// One observed aspect of an object's state, with a machine-readable reason
/// and a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub last_transition_ms: u64,
}

impl Condition {
    pub fn new(kind: impl Into<String>, status: ConditionStatus, now_ms: u64) -> Self {
        Self {
            kind: kind.into(),
            status,
            reason: None,
            message: None,
            last_transition_ms: now_ms,
        }
    }

    crate::setters! {
        option {
            reason: String,
            message: String,
        }
    }
}

/// Update an existing condition of the same kind or append a new one.
///
/// `last_transition_ms` is preserved when the status did not change, so the
/// transition time always names the moment the truth value flipped.
/// Returns true if the condition list changed.
pub fn update_condition(conditions: &mut Vec<Condition>, mut condition: Condition) -> bool {
    match conditions.iter_mut().find(|c| c.kind == condition.kind) {
        None => {
            conditions.push(condition);
            true
        }
        Some(existing) => {
            if existing.status == condition.status {
                condition.last_transition_ms = existing.last_transition_ms;
            }
            let changed = *existing != condition;
            *existing = condition;
            changed
        }
    }
}

#[cfg(test)]
#[path = "meta_tests.rs"]
mod tests;
