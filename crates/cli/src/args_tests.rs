// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn parse(argv: &[&str]) -> Args {
    Args::parse_from(std::iter::once("ward").chain(argv.iter().copied()))
}

#[test]
fn defaults() {
    let args = parse(&[]);
    assert_eq!(args.mode, "agent");
    assert_eq!(args.bind_address, "0.0.0.0:8090");
    assert_eq!(args.data_root, PathBuf::from("/var/lib/ward"));
    assert!(args.node_name.is_empty());
    assert!(args.feature_gates.is_empty());
}

#[test]
fn agent_config_round_trip() {
    let args = parse(&[
        "--node-name",
        "node-3",
        "--bind-address",
        "127.0.0.1:9000",
        "--data-root",
        "/tmp/ward",
        "--feature-gates",
        "Eventer=true,Alertmanager=false",
    ]);

    let config = args.into_config().unwrap();
    assert_eq!(config.mode, Mode::Agent);
    assert_eq!(config.node_name, "node-3");
    assert_eq!(config.bind_address, "127.0.0.1:9000");
    assert_eq!(config.data_root, PathBuf::from("/tmp/ward"));
    assert_eq!(config.feature_gates.get("Eventer"), Some(&true));
    assert_eq!(config.feature_gates.get("Alertmanager"), Some(&false));
}

#[test]
fn master_mode_parses() {
    let config = parse(&["--mode", "master"]).into_config().unwrap();
    assert_eq!(config.mode, Mode::Master);
}

#[test]
fn unknown_mode_is_rejected() {
    let err = parse(&["--mode", "observer"]).into_config().unwrap_err();
    assert_eq!(err, ArgsError::Mode(InvalidMode("observer".to_string())));
}

#[yare::parameterized(
    missing_eq  = { "Eventer" },
    bad_bool    = { "Eventer=maybe" },
    empty_value = { "Eventer=" },
)]
fn malformed_feature_gates_are_rejected(pair: &str) {
    let err = parse_feature_gates(&[pair.to_string()]).unwrap_err();
    assert_eq!(err, ArgsError::FeatureGate(pair.to_string()));
}

#[test]
fn empty_gate_entries_are_ignored() {
    let gates = parse_feature_gates(&[String::new()]).unwrap();
    assert!(gates.is_empty());
}
