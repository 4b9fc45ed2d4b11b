// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Feature gates.
//!
//! Readers hold an immutable [`FeatureSnapshot`] taken at construction time;
//! configuration changes build a whole new snapshot and swap it in under a
//! write lock, so no read path ever contends on gate lookups.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Gates known to this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Feature {
    /// Master: accept alert payloads and synthesize diagnoses from them.
    Alertmanager,
    /// Master: synthesize diagnoses from cluster events.
    Eventer,
    /// Master: periodic cluster health evaluation.
    ClusterHealthEvaluator,
    /// Agent: honor stored checkpoints when picking up unfinished diagnoses.
    DiagnosisResumption,
}

ward_core::simple_display! {
    Feature {
        Alertmanager => "Alertmanager",
        Eventer => "Eventer",
        ClusterHealthEvaluator => "ClusterHealthEvaluator",
        DiagnosisResumption => "DiagnosisResumption",
    }
}

const DEFAULTS: &[(Feature, bool)] = &[
    (Feature::Alertmanager, true),
    (Feature::Eventer, false),
    (Feature::ClusterHealthEvaluator, true),
    (Feature::DiagnosisResumption, true),
];

/// A gate name that is not known to this build.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized feature gate: {0}")]
pub struct UnknownFeature(pub String);

impl FromStr for Feature {
    type Err = UnknownFeature;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Alertmanager" => Ok(Feature::Alertmanager),
            "Eventer" => Ok(Feature::Eventer),
            "ClusterHealthEvaluator" => Ok(Feature::ClusterHealthEvaluator),
            "DiagnosisResumption" => Ok(Feature::DiagnosisResumption),
            other => Err(UnknownFeature(other.to_string())),
        }
    }
}

/// Immutable view of every gate's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSnapshot {
    enabled: BTreeMap<Feature, bool>,
}

impl FeatureSnapshot {
    fn defaults() -> Self {
        Self { enabled: DEFAULTS.iter().copied().collect() }
    }

    pub fn enabled(&self, feature: Feature) -> bool {
        self.enabled.get(&feature).copied().unwrap_or(false)
    }
}

/// Gate registry: hands out snapshots and applies configuration.
pub struct FeatureGates {
    current: RwLock<Arc<FeatureSnapshot>>,
}

impl Default for FeatureGates {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureGates {
    pub fn new() -> Self {
        Self { current: RwLock::new(Arc::new(FeatureSnapshot::defaults())) }
    }

    /// The current snapshot. Cheap; the snapshot itself never changes.
    pub fn snapshot(&self) -> Arc<FeatureSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Apply `--feature-gates` style overrides. Rejects unknown names
    /// without applying anything.
    pub fn set_from_map(&self, overrides: &HashMap<String, bool>) -> Result<(), UnknownFeature> {
        let mut next = (**self.current.read()).clone();
        for (name, &value) in overrides {
            let feature = Feature::from_str(name)?;
            next.enabled.insert(feature, value);
        }
        *self.current.write() = Arc::new(next);
        Ok(())
    }

    /// Human-readable gate descriptions for `--help` output, sorted.
    pub fn known_features() -> Vec<String> {
        DEFAULTS
            .iter()
            .map(|(feature, default)| format!("{feature}=true|false (default={default})"))
            .collect()
    }
}

#[cfg(test)]
#[path = "features_tests.rs"]
mod tests;
