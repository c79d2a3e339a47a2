//! Run artifacts: the partitioning dump round-trip, the report log, and
//! configuration-driven wiring of a whole run.

use faultline_config::{Config, Procedure};
use faultline_netlist::Circuit;
use faultline_sat::SatCtx;
use faultline_verify::partitions::partitions_from_file;
use faultline_verify::{
    compute_faultable_signals, init_partitions, run_partition_refinement, RefineOptions,
};
use indexmap::IndexMap;
use std::collections::HashSet;

const PAIR: &str = r#"{ "modules": { "top": {
    "ports": {
        "clk": { "direction": "input", "bits": [2] },
        "d": { "direction": "input", "bits": [3] },
        "y1": { "direction": "output", "bits": [6] },
        "y2": { "direction": "output", "bits": [7] }
    },
    "cells": {
        "r1": { "type": "$_DFF_P_", "connections": { "C": [2], "D": [3], "Q": [4] } },
        "r2": { "type": "$_DFF_P_", "connections": { "C": [2], "D": [3], "Q": [5] } },
        "o1": { "type": "$_BUF_", "connections": { "A": [4], "Y": [6] } },
        "o2": { "type": "$_BUF_", "connections": { "A": [5], "Y": [7] } }
    },
    "netnames": { "q1": { "bits": [4] }, "q2": { "bits": [5] } }
} } }"#;

#[test]
fn dumped_partitioning_reloads_as_initial_partitioning() {
    let mut circuit = Circuit::from_json_str(PAIR, "top").unwrap();
    circuit.build_adjacent_lists();
    let faultable: HashSet<_> = circuit.sigs().iter().copied().collect();

    let dir = tempfile::tempdir().unwrap();
    let opts = RefineOptions {
        dump_partitioning: true,
        dump_path: dir.path().to_path_buf(),
        ..RefineOptions::default()
    };
    let mut ctx = SatCtx::new();
    let outcome = run_partition_refinement(
        &mut ctx,
        &circuit,
        &opts,
        init_partitions(&circuit),
        &faultable,
        &HashSet::new(),
        &IndexMap::new(),
        &IndexMap::new(),
        &mut std::io::sink(),
    )
    .unwrap();
    drop(ctx);
    assert_eq!(outcome.partitions.len(), 1);

    // The last dump reflects the final partitioning and loads back.
    let mut dumps: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with("partitioning-"))
                .unwrap_or(false)
        })
        .collect();
    assert!(!dumps.is_empty());
    dumps.sort();
    let reloaded = partitions_from_file(&circuit, dumps.last().unwrap()).unwrap();
    assert_eq!(reloaded, outcome.partitions);
}

#[test]
fn configuration_drives_a_full_procedure_run() {
    let dir = tempfile::tempdir().unwrap();
    let design_path = dir.path().join("pair.json");
    std::fs::write(&design_path, PAIR).unwrap();
    let dump_path = dir.path().join("out");

    let doc = format!(
        r#"{{ "default": {{
            "design_path": "{design}",
            "design_name": "top",
            "k": 1,
            "delay": 1,
            "dump_path": "{dump}",
            "alert_list": {{}},
            "exclude_inputs": false,
            "dump_partitioning": true
        }} }}"#,
        design = design_path.display(),
        dump = dump_path.display()
    );
    let config_path = dir.path().join("config.json");
    std::fs::write(&config_path, &doc).unwrap();

    let config = Config::load(&config_path, "default").unwrap();
    assert_eq!(config.procedure, Procedure::Both);
    assert!(dump_path.join("config_file").exists());

    let mut circuit = Circuit::from_json_file(&config.design_path, &config.design_name).unwrap();
    circuit.build_adjacent_lists();

    let faultable = compute_faultable_signals(
        &circuit,
        &config.f_included_prefix,
        &config.f_excluded_prefix,
        &config.f_excluded_signals,
        config.exclude_inputs,
    );

    let opts = RefineOptions {
        k: config.k,
        delay: config.delay,
        increasing_k: config.increasing_k,
        gates: config.f_gates,
        enumerate_exploitable: config.enumerate_exploitable,
        optim_atleast2: config.optim_atleast2,
        dump_vcd: config.dump_vcd,
        dump_partitioning: config.dump_partitioning,
        merge_seed: config.merge_seed,
        interesting_names: config.interesting_names.clone(),
        dump_path: config.dump_path.clone(),
    };
    let mut report = Vec::new();
    let mut ctx = SatCtx::new();
    let outcome = run_partition_refinement(
        &mut ctx,
        &circuit,
        &opts,
        init_partitions(&circuit),
        &faultable,
        &HashSet::new(),
        &config.alert_list,
        &config.invariant_list,
        &mut report,
    )
    .unwrap();

    assert_eq!(outcome.partitions.len(), 1);
    let text = String::from_utf8(report).unwrap();
    assert!(text.contains("Merge together"));
    assert!(text.contains("Write partitioning in file"));
}

#[test]
fn invariants_restrict_the_golden_initial_state() {
    // Pin q1 to 1 via an invariant: the golden trace must satisfy it, and
    // the report still reaches a fixed point.
    let mut circuit = Circuit::from_json_str(PAIR, "top").unwrap();
    circuit.build_adjacent_lists();
    let faultable: HashSet<_> = circuit.sigs().iter().copied().collect();

    let mut invariants = IndexMap::new();
    invariants.insert("q1".to_string(), vec![true]);

    let mut ctx = SatCtx::new();
    let outcome = run_partition_refinement(
        &mut ctx,
        &circuit,
        &RefineOptions::default(),
        init_partitions(&circuit),
        &faultable,
        &HashSet::new(),
        &IndexMap::new(),
        &invariants,
        &mut std::io::sink(),
    )
    .unwrap();
    assert_eq!(outcome.partitions.len(), 1);
}
