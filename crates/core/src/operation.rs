// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operation: a declaratively named HTTP worker endpoint.

use crate::meta::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default wall-clock limit for a single operation dispatch.
pub const DEFAULT_OPERATION_TIMEOUT_SECONDS: u64 = 30;

/// URL scheme of an operation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

crate::simple_display! {
    Scheme {
        Http => "http",
        Https => "https",
    }
}

impl Default for Scheme {
    fn default() -> Self {
        Scheme::Http
    }
}

/// Address of the worker process behind an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationEndpoint {
    #[serde(default)]
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    /// Request path, including the leading slash.
    pub path: String,
}

impl OperationEndpoint {
    pub fn url(&self) -> String {
        format!("{}://{}:{}{}", self.scheme, self.host, self.port, self.path)
    }
}

/// Contract for an on-node artifact directory owned by the worker.
/// The engine never reads or writes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSpec {
    pub host_path: PathBuf,
}

/// Desired state of an Operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSpec {
    pub endpoint: OperationEndpoint,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageSpec>,
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_OPERATION_TIMEOUT_SECONDS
}

/// A declarative record describing one diagnostic worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub meta: ObjectMeta,
    pub spec: OperationSpec,
}

impl Operation {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.spec.timeout_seconds)
    }
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;
