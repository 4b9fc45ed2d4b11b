// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    alertmanager = { Feature::Alertmanager, true },
    eventer      = { Feature::Eventer, false },
    evaluator    = { Feature::ClusterHealthEvaluator, true },
    resumption   = { Feature::DiagnosisResumption, true },
)]
fn defaults(feature: Feature, expected: bool) {
    let gates = FeatureGates::new();
    assert_eq!(gates.snapshot().enabled(feature), expected);
}

#[test]
fn overrides_apply_over_defaults() {
    let gates = FeatureGates::new();
    let overrides: HashMap<String, bool> =
        [("Eventer".to_string(), true), ("Alertmanager".to_string(), false)].into_iter().collect();

    gates.set_from_map(&overrides).unwrap();

    let snapshot = gates.snapshot();
    assert!(snapshot.enabled(Feature::Eventer));
    assert!(!snapshot.enabled(Feature::Alertmanager));
    // Untouched gates keep their defaults.
    assert!(snapshot.enabled(Feature::DiagnosisResumption));
}

#[test]
fn unknown_gate_is_rejected() {
    let gates = FeatureGates::new();
    let overrides: HashMap<String, bool> =
        [("TimeTravel".to_string(), true)].into_iter().collect();

    let err = gates.set_from_map(&overrides).unwrap_err();
    assert_eq!(err, UnknownFeature("TimeTravel".to_string()));
}

#[test]
fn snapshots_are_immutable_views() {
    let gates = FeatureGates::new();
    let before = gates.snapshot();

    let overrides: HashMap<String, bool> = [("Eventer".to_string(), true)].into_iter().collect();
    gates.set_from_map(&overrides).unwrap();

    // The earlier snapshot still reads the old world.
    assert!(!before.enabled(Feature::Eventer));
    assert!(gates.snapshot().enabled(Feature::Eventer));
}

#[test]
fn feature_parses_from_display_name() {
    for feature in
        [Feature::Alertmanager, Feature::Eventer, Feature::ClusterHealthEvaluator, Feature::DiagnosisResumption]
    {
        assert_eq!(feature.to_string().parse::<Feature>().unwrap(), feature);
    }
    assert!("bogus".parse::<Feature>().is_err());
}

#[test]
fn known_features_lists_every_gate_with_default() {
    let known = FeatureGates::known_features();
    assert_eq!(known.len(), 4);
    assert!(known.contains(&"Eventer=true|false (default=false)".to_string()));
    assert!(known.contains(&"DiagnosisResumption=true|false (default=true)".to_string()));
}
