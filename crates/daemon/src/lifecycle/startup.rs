// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup: validate configuration, bind the health endpoint, and
//! spawn the reconcilers for the configured mode.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use ward_core::SystemClock;
use ward_engine::{Engine, EngineConfig, HttpDispatcher};
use ward_graph::CompileCache;
use ward_store::ObjectStores;

use crate::features::{Feature, FeatureGates};
use crate::queue::{spawn_workers, WorkQueue};
use crate::reconciler::{DiagnosisReconciler, OperationSetReconciler};

use super::{Config, DaemonState, LifecycleError, Mode};

const HEALTH_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\n\
content-type: text/plain\r\n\
content-length: 3\r\n\
connection: close\r\n\
\r\n\
ok\n";

/// Start the daemon.
pub async fn startup(config: &Config) -> Result<DaemonState, LifecycleError> {
    // 1. Feature gates fail fast on unknown names.
    let gates = FeatureGates::new();
    gates.set_from_map(&config.feature_gates)?;
    let features = gates.snapshot();

    if config.mode == Mode::Agent && config.node_name.is_empty() {
        return Err(LifecycleError::MissingNodeName);
    }

    // 2. Workers own artifact directories under the data root; the daemon
    //    only guarantees the root exists.
    std::fs::create_dir_all(&config.data_root).map_err(|source| LifecycleError::DataRoot {
        path: config.data_root.clone(),
        source,
    })?;

    // 3. Health endpoint binds before any reconciler starts, so a bad
    //    address fails startup rather than a half-running daemon.
    let addr: SocketAddr = config
        .bind_address
        .parse()
        .map_err(|source| LifecycleError::InvalidBindAddress {
            addr: config.bind_address.clone(),
            source,
        })?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| LifecycleError::BindFailed { addr, source })?;
    let bound_address = listener.local_addr().map_err(|source| LifecycleError::BindFailed {
        addr,
        source,
    })?;

    let stores = ObjectStores::new();
    let cache = Arc::new(CompileCache::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(serve_health(listener, shutdown_rx.clone())));

    // 4. Both modes compile OperationSets; only the agent executes.
    let set_reconciler =
        OperationSetReconciler::new(stores.clone(), Arc::clone(&cache), SystemClock);
    tasks.push(tokio::spawn(set_reconciler.run(shutdown_rx.clone())));

    let engine = match config.mode {
        Mode::Master => {
            for feature in [Feature::Alertmanager, Feature::Eventer, Feature::ClusterHealthEvaluator]
            {
                info!(
                    gate = %feature,
                    enabled = features.enabled(feature),
                    "producer surface gate"
                );
            }
            None
        }
        Mode::Agent => {
            let engine_config = EngineConfig::new(&config.node_name)
                .resume_from_checkpoint(features.enabled(Feature::DiagnosisResumption));
            let engine = Arc::new(Engine::new(
                stores.clone(),
                HttpDispatcher::new(),
                SystemClock,
                engine_config,
            ));

            let (queue, receiver) = WorkQueue::bounded(config.queue_capacity);
            let reconciler = Arc::new(DiagnosisReconciler::new(
                stores.clone(),
                Arc::clone(&engine),
                queue,
                SystemClock,
            ));
            tasks.push(tokio::spawn(Arc::clone(&reconciler).run(shutdown_rx.clone())));
            tasks.extend(spawn_workers(
                config.workers,
                receiver,
                shutdown_rx.clone(),
                move |item| {
                    let reconciler = Arc::clone(&reconciler);
                    async move { reconciler.process(item).await }
                },
            ));
            Some(engine)
        }
    };

    info!(
        mode = %config.mode,
        node = %config.node_name,
        health = %bound_address,
        data_root = %config.data_root.display(),
        "daemon started"
    );

    Ok(DaemonState { stores, features, engine, bound_address, shutdown_tx, tasks })
}

/// Minimal liveness endpoint: any connection gets a fixed 200.
async fn serve_health(listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((mut stream, peer)) => {
                    debug!(%peer, "health probe");
                    if let Err(e) = stream.write_all(HEALTH_RESPONSE).await {
                        debug!(error = %e, "health response write failed");
                    }
                }
                Err(e) => warn!(error = %e, "health accept failed"),
            },
            _ = shutdown.changed() => break,
        }
    }
}
