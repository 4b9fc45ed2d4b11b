// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal pod record: just enough for node binding.

use crate::meta::ObjectMeta;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSpec {
    /// Node the pod is scheduled on; empty while unscheduled.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    #[serde(default)]
    pub meta: ObjectMeta,
    #[serde(default)]
    pub spec: PodSpec,
}

impl Pod {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, node_name: impl Into<String>) -> Self {
        let mut meta = ObjectMeta::named(name);
        meta.namespace = namespace.into();
        Self { meta, spec: PodSpec { node_name: node_name.into(), containers: Vec::new() } }
    }
}
