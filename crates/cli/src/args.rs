// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-line surface of the `ward` binary.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;
use ward_daemon::{Config, InvalidMode, Mode};

#[derive(Debug, Parser)]
#[command(name = "ward", version, about = "Cluster diagnostic orchestrator")]
pub struct Args {
    /// Node this agent serves; diagnoses bound to other nodes are ignored.
    /// Required in agent mode.
    #[arg(long, default_value = "", value_name = "NAME")]
    pub node_name: String,

    /// Address of the health endpoint.
    #[arg(long, default_value = "0.0.0.0:8090", value_name = "HOST:PORT")]
    pub bind_address: String,

    /// Feature gate overrides, comma separated (e.g. Eventer=true).
    #[arg(long, value_delimiter = ',', value_name = "KEY=BOOL")]
    pub feature_gates: Vec<String>,

    /// Root directory under which workers keep on-node artifacts.
    #[arg(long, default_value = "/var/lib/ward", value_name = "DIR")]
    pub data_root: PathBuf,

    /// "master" compiles diagnosis pipelines; "agent" also executes the
    /// ones bound to this node.
    #[arg(long, default_value = "agent", value_name = "MODE")]
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgsError {
    #[error(transparent)]
    Mode(#[from] InvalidMode),

    #[error("invalid feature gate {0:?}, expected KEY=true|false")]
    FeatureGate(String),
}

impl Args {
    pub fn into_config(self) -> Result<Config, ArgsError> {
        let mode: Mode = self.mode.parse()?;
        let gates = parse_feature_gates(&self.feature_gates)?;
        Ok(Config::new(mode, self.node_name)
            .bind_address(self.bind_address)
            .data_root(self.data_root)
            .feature_gates(gates))
    }
}

/// Parse `KEY=BOOL` pairs. Unknown gate names are rejected later, at
/// startup, where the daemon owns the gate registry.
pub fn parse_feature_gates(pairs: &[String]) -> Result<HashMap<String, bool>, ArgsError> {
    let mut gates = HashMap::new();
    for pair in pairs {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| ArgsError::FeatureGate(pair.clone()))?;
        let value: bool =
            value.parse().map_err(|_| ArgsError::FeatureGate(pair.clone()))?;
        gates.insert(key.to_string(), value);
    }
    Ok(gates)
}

#[cfg(test)]
#[path = "args_tests.rs"]
mod tests;
