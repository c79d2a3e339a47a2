//! Faultable-signal selection.

use faultline_netlist::{Circuit, SignalId};
use std::collections::{BTreeSet, HashSet};

/// Computes the set of signals the adversary may target.
///
/// Net-name prefixes select bits in or out; individual ids and (optionally)
/// all primary inputs can be excluded. An empty include list means every
/// signal of the circuit is a candidate.
pub fn compute_faultable_signals(
    circuit: &Circuit,
    included_prefixes: &[String],
    excluded_prefixes: &[String],
    excluded_signals: &[SignalId],
    exclude_inputs: bool,
) -> HashSet<SignalId> {
    let mut excluded: BTreeSet<SignalId> = BTreeSet::new();
    for prefix in excluded_prefixes {
        for (name, bits) in circuit.nets() {
            if name.starts_with(prefix.as_str()) {
                excluded.extend(bits.iter().copied());
            }
        }
    }
    if exclude_inputs {
        excluded.extend(circuit.ins().iter().copied());
    }
    excluded.extend(excluded_signals.iter().copied());

    let mut included: BTreeSet<SignalId> = BTreeSet::new();
    for prefix in included_prefixes {
        for (name, bits) in circuit.nets() {
            if name.starts_with(prefix.as_str()) {
                included.extend(bits.iter().copied());
            }
        }
    }
    if included_prefixes.is_empty() {
        included.extend(circuit.sigs().iter().copied());
    }

    included.difference(&excluded).copied().collect()
}
