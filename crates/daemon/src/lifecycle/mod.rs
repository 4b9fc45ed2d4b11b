// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: configuration, startup, shutdown.

mod startup;
pub use startup::startup;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use ward_core::SystemClock;
use ward_engine::{Engine, HttpDispatcher};
use ward_store::ObjectStores;

use crate::features::{FeatureSnapshot, UnknownFeature};
use crate::queue::DEFAULT_QUEUE_CAPACITY;

/// Which half of the control plane this process runs.
///
/// Master compiles OperationSets and hosts the producer surfaces; agent
/// additionally executes the diagnoses bound to its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Master,
    Agent,
}

ward_core::simple_display! {
    Mode {
        Master => "master",
        Agent => "agent",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized mode {0:?}, expected \"master\" or \"agent\"")]
pub struct InvalidMode(pub String);

impl FromStr for Mode {
    type Err = InvalidMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "master" => Ok(Mode::Master),
            "agent" => Ok(Mode::Agent),
            other => Err(InvalidMode(other.to_string())),
        }
    }
}

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    /// This agent's node; every diagnosis executed here is bound to it.
    pub node_name: String,
    /// Address for the health endpoint.
    pub bind_address: String,
    /// Root under which workers keep their on-node artifact directories.
    /// The daemon only guarantees it exists.
    pub data_root: PathBuf,
    /// `--feature-gates` overrides, applied over the defaults.
    pub feature_gates: HashMap<String, bool>,
    /// Work queue depth per kind.
    pub queue_capacity: usize,
    /// Reconcile workers draining the diagnosis queue.
    pub workers: usize,
}

impl Config {
    pub fn new(mode: Mode, node_name: impl Into<String>) -> Self {
        Self {
            mode,
            node_name: node_name.into(),
            bind_address: "0.0.0.0:8090".to_string(),
            data_root: PathBuf::from("/var/lib/ward"),
            feature_gates: HashMap::new(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            workers: 1,
        }
    }

    ward_core::setters! {
        into {
            bind_address: String,
            data_root: PathBuf,
        }
        set {
            feature_gates: HashMap<String, bool>,
            queue_capacity: usize,
            workers: usize,
        }
    }
}

/// A running daemon: stores, engine, background tasks.
pub struct DaemonState {
    pub stores: ObjectStores,
    pub features: Arc<FeatureSnapshot>,
    /// Present in agent mode only.
    pub engine: Option<Arc<Engine<HttpDispatcher, SystemClock>>>,
    /// Address the health listener actually bound (relevant with port 0).
    pub bound_address: SocketAddr,
    pub(crate) shutdown_tx: watch::Sender<bool>,
    pub(crate) tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for DaemonState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonState")
            .field("bound_address", &self.bound_address)
            .field("engine", &self.engine.is_some())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl DaemonState {
    /// Signal every background task and wait for them to drain.
    pub async fn shutdown(self) {
        info!("shutting down");
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "background task ended abnormally");
                }
            }
        }
        info!("shutdown complete");
    }
}

/// Startup failures.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    UnknownFeatureGate(#[from] UnknownFeature),

    #[error("agent mode requires --node-name")]
    MissingNodeName,

    #[error("invalid bind address {addr:?}: {source}")]
    InvalidBindAddress {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("failed to bind {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to prepare data root {path:?}: {source}")]
    DataRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
