//! End-to-end fault-model scenarios over small hand-built netlists.

use faultline_netlist::{Circuit, SignalId};
use faultline_sat::SatCtx;
use faultline_verify::{
    init_partitions, run_output_integrity, run_partition_refinement, GateFaults, IntegrityOptions,
    RefineOptions,
};
use indexmap::IndexMap;
use std::collections::HashSet;

fn sig(raw: u32) -> SignalId {
    SignalId::from_raw(raw)
}

fn load(doc: &str) -> Circuit {
    let mut circuit = Circuit::from_json_str(doc, "top").expect("netlist parses");
    circuit.build_adjacent_lists();
    circuit
}

fn all_sigs(circuit: &Circuit) -> HashSet<SignalId> {
    circuit.sigs().iter().copied().collect()
}

// Scenario: trivial wire. One input, one output, no registers.
const WIRE: &str = r#"{ "modules": { "top": {
    "ports": {
        "a": { "direction": "input", "bits": [2] },
        "y": { "direction": "output", "bits": [3] }
    },
    "cells": { "w": { "type": "$_BUF_", "connections": { "A": [2], "Y": [3] } } },
    "netnames": {}
} } }"#;

#[test]
fn trivial_wire_partitioning_is_empty_and_output_is_exploitable() {
    let circuit = load(WIRE);
    let faultable = all_sigs(&circuit);

    // No registers: Procedure 1 has nothing to refine.
    let mut ctx = SatCtx::new();
    let outcome = run_partition_refinement(
        &mut ctx,
        &circuit,
        &RefineOptions::default(),
        init_partitions(&circuit),
        &faultable,
        &HashSet::new(),
        &IndexMap::new(),
        &IndexMap::new(),
        &mut std::io::sink(),
    )
    .unwrap();
    assert!(outcome.partitions.is_empty());
    assert!(outcome.enumerated_faults.is_empty());

    // A single fault flips the primary output unobserved.
    let mut ctx = SatCtx::new();
    let outcome = run_output_integrity(
        &mut ctx,
        &circuit,
        &IntegrityOptions::default(),
        &[],
        &faultable,
        &HashSet::new(),
        &IndexMap::new(),
        &IndexMap::new(),
        &mut std::io::sink(),
    )
    .unwrap();
    assert!(!outcome.witnesses.is_empty());
    assert!(outcome
        .witnesses
        .iter()
        .all(|w| w.corrupted_outputs == vec![sig(3)]));
}

// Scenario: single register identity path.
const SINGLE_REG: &str = r#"{ "modules": { "top": {
    "ports": {
        "clk": { "direction": "input", "bits": [2] },
        "din": { "direction": "input", "bits": [3] },
        "y": { "direction": "output", "bits": [5] }
    },
    "cells": {
        "state": { "type": "$_DFF_P_", "connections": { "C": [2], "D": [3], "Q": [4] } },
        "out": { "type": "$_BUF_", "connections": { "A": [4], "Y": [5] } }
    },
    "netnames": { "q": { "bits": [4] } }
} } }"#;

#[test]
fn single_register_needs_no_merging() {
    let circuit = load(SINGLE_REG);
    let faultable = all_sigs(&circuit);

    let mut ctx = SatCtx::new();
    let outcome = run_partition_refinement(
        &mut ctx,
        &circuit,
        &RefineOptions::default(),
        init_partitions(&circuit),
        &faultable,
        &HashSet::new(),
        &IndexMap::new(),
        &IndexMap::new(),
        &mut std::io::sink(),
    )
    .unwrap();

    // A one-partition partitioning can never have two faulty partitions.
    assert_eq!(outcome.partitions.len(), 1);
    assert_eq!(outcome.partitions[0], [sig(4)].into_iter().collect());
}

// Scenario: two parallel registers with an XOR alert over their outputs.
// The registers capture independent inputs.
const ALERTED_PAIR: &str = r#"{ "modules": { "top": {
    "ports": {
        "clk": { "direction": "input", "bits": [2] },
        "d1": { "direction": "input", "bits": [3] },
        "d2": { "direction": "input", "bits": [4] },
        "alert": { "direction": "output", "bits": [7] },
        "y1": { "direction": "output", "bits": [8] },
        "y2": { "direction": "output", "bits": [9] }
    },
    "cells": {
        "r1": { "type": "$_DFF_P_", "connections": { "C": [2], "D": [3], "Q": [5] } },
        "r2": { "type": "$_DFF_P_", "connections": { "C": [2], "D": [4], "Q": [6] } },
        "cmp": { "type": "$_XOR_", "connections": { "A": [5], "B": [6], "Y": [7] } },
        "o1": { "type": "$_BUF_", "connections": { "A": [5], "Y": [8] } },
        "o2": { "type": "$_BUF_", "connections": { "A": [6], "Y": [9] } }
    },
    "netnames": { "q1": { "bits": [5] }, "q2": { "bits": [6] } }
} } }"#;

#[test]
fn xor_alert_blocks_all_single_fault_instability() {
    let circuit = load(ALERTED_PAIR);
    let faultable = all_sigs(&circuit);

    let mut alert_list = IndexMap::new();
    alert_list.insert("alert".to_string(), vec![false]);
    let alert_signals: HashSet<SignalId> = [sig(7)].into_iter().collect();

    let mut ctx = SatCtx::new();
    let outcome = run_partition_refinement(
        &mut ctx,
        &circuit,
        &RefineOptions::default(),
        init_partitions(&circuit),
        &faultable,
        &alert_signals,
        &alert_list,
        &IndexMap::new(),
        &mut std::io::sink(),
    )
    .unwrap();

    // Flipping either register alone trips the comparator, and no single
    // combinational fault reaches both registers: no merge ever happens.
    assert_eq!(outcome.partitions.len(), 2);
}

// Scenario: the same pair without the alert, sharing one data input.
const UNALERTED_PAIR: &str = r#"{ "modules": { "top": {
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
fn unalerted_pair_merges_after_one_witness() {
    let circuit = load(UNALERTED_PAIR);
    let faultable = all_sigs(&circuit);

    let mut ctx = SatCtx::new();
    let outcome = run_partition_refinement(
        &mut ctx,
        &circuit,
        &RefineOptions::default(),
        init_partitions(&circuit),
        &faultable,
        &HashSet::new(),
        &IndexMap::new(),
        &IndexMap::new(),
        &mut std::io::sink(),
    )
    .unwrap();

    // One fault on the shared input corrupts both registers a cycle later;
    // the two singletons collapse into {q1, q2}.
    assert_eq!(outcome.partitions.len(), 1);
    assert_eq!(
        outcome.partitions[0],
        [sig(4), sig(5)].into_iter().collect()
    );
}

#[test]
fn refinement_is_idempotent_on_its_own_result() {
    let circuit = load(UNALERTED_PAIR);
    let faultable = all_sigs(&circuit);

    let mut ctx = SatCtx::new();
    let first = run_partition_refinement(
        &mut ctx,
        &circuit,
        &RefineOptions::default(),
        init_partitions(&circuit),
        &faultable,
        &HashSet::new(),
        &IndexMap::new(),
        &IndexMap::new(),
        &mut std::io::sink(),
    )
    .unwrap();
    drop(ctx);

    // Re-running from the refined partitioning finds no further witness.
    let mut ctx = SatCtx::new();
    let second = run_partition_refinement(
        &mut ctx,
        &circuit,
        &RefineOptions::default(),
        first.partitions.clone(),
        &faultable,
        &HashSet::new(),
        &IndexMap::new(),
        &IndexMap::new(),
        &mut std::io::sink(),
    )
    .unwrap();
    assert_eq!(first.partitions, second.partitions);
}

#[test]
fn seq_mode_disables_combinational_attacks() {
    let circuit = load(UNALERTED_PAIR);
    let faultable = all_sigs(&circuit);

    let opts = RefineOptions {
        gates: GateFaults::Seq,
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

    // Without the shared-input fault the pair never becomes jointly
    // faulty, so no merge happens.
    assert_eq!(outcome.partitions.len(), 2);
}

#[test]
fn report_carries_procedure_banner_and_verdicts() {
    let circuit = load(SINGLE_REG);
    let faultable = all_sigs(&circuit);

    let mut report = Vec::new();
    let mut ctx = SatCtx::new();
    run_partition_refinement(
        &mut ctx,
        &circuit,
        &RefineOptions::default(),
        init_partitions(&circuit),
        &faultable,
        &HashSet::new(),
        &IndexMap::new(),
        &IndexMap::new(),
        &mut report,
    )
    .unwrap();

    let text = String::from_utf8(report).unwrap();
    assert!(text.contains("Procedure 1 -- Build partitions"));
    assert!(text.contains("Running solver 1"));
    assert!(text.contains("UNSAT"));
    assert!(text.contains("Partitioning finished with 1 partitions."));
}
