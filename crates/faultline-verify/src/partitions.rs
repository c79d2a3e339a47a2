//! Register partitioning bookkeeping.

use crate::fault::FaultSelector;
use crate::{VerifyError, VerifyResult};
use faultline_netlist::{Circuit, SignalId};
use faultline_sat::{Lit, SatCtx};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;

/// One register partition: a non-empty set of register-output bits treated
/// atomically for fault accounting.
pub type Partition = HashSet<SignalId>;

/// The trivial partitioning: one partition per register output.
pub fn init_partitions(circuit: &Circuit) -> Vec<Partition> {
    let mut regs: Vec<SignalId> = circuit.regs().iter().copied().collect();
    regs.sort_unstable();
    regs.into_iter().map(|reg| [reg].into_iter().collect()).collect()
}

/// Loads a partitioning dumped as `{"0": [ids…], "1": [ids…]}`.
pub fn partitions_from_file(circuit: &Circuit, path: impl AsRef<Path>) -> VerifyResult<Vec<Partition>> {
    let data = std::fs::read_to_string(path)?;
    partitions_from_json_str(circuit, &data)
}

pub fn partitions_from_json_str(circuit: &Circuit, data: &str) -> VerifyResult<Vec<Partition>> {
    let doc: IndexMap<String, Vec<SignalId>> = serde_json::from_str(data)?;

    let mut partitions = Vec::with_capacity(doc.len());
    let mut visited: HashSet<SignalId> = HashSet::new();
    for (_, sigs) in doc {
        if sigs.is_empty() {
            return Err(VerifyError::EmptyPartition);
        }
        let mut partition = Partition::new();
        for sig in sigs {
            if !circuit.regs().contains(&sig) {
                return Err(VerifyError::NotARegister(sig));
            }
            if !visited.insert(sig) {
                return Err(VerifyError::OverlappingPartitions(sig));
            }
            partition.insert(sig);
        }
        partitions.push(partition);
    }
    if visited.len() != circuit.regs().len() {
        return Err(VerifyError::IncompletePartitioning);
    }
    Ok(partitions)
}

/// Human-readable partitioning summary: the largest partitions by size, and
/// per-name occurrence counts inside the biggest ones when
/// `interesting_names` is non-empty.
pub fn partition_info(
    circuit: &Circuit,
    partitions: &[Partition],
    interesting_names: &[String],
) -> String {
    let mut out = String::new();
    out.push_str("******* Partition info ********\n");
    out.push_str(&format!("Number of partitions: {}\n", partitions.len()));
    out.push_str("Largest partitions: ");

    let mut by_size: Vec<usize> = (0..partitions.len()).collect();
    by_size.sort_by_key(|&idx| std::cmp::Reverse(partitions[idx].len()));
    let largest: Vec<usize> = by_size.into_iter().take(10).collect();
    for &idx in &largest {
        out.push_str(&format!("({}: {}) ", idx, partitions[idx].len()));
    }
    out.push('\n');

    if !interesting_names.is_empty() {
        for &idx in largest.iter().take(4) {
            out.push_str(&format!("Contents of {idx}: "));
            for name in interesting_names {
                let found = partitions[idx]
                    .iter()
                    .filter(|&&sig| {
                        circuit
                            .bit_label(sig)
                            .map(|label| label.display().contains(name))
                            .unwrap_or(false)
                    })
                    .count();
                out.push_str(&format!("({name}: {found}) "));
            }
            out.push('\n');
        }
    }
    out
}

/// Partition indexes whose registers are combinationally reachable from the
/// registers of partition `part_idx`.
pub fn conn_parts_of_partition(
    circuit: &Circuit,
    partitions: &[Partition],
    part_idx: usize,
) -> HashSet<usize> {
    let mut adjacent: HashSet<SignalId> = HashSet::new();
    for &sig in &partitions[part_idx] {
        adjacent.extend(circuit.conn_regs(sig).iter().copied());
    }
    conn_parts(partitions, &adjacent)
}

/// Partition indexes whose registers are combinationally reachable from
/// signal `sig`.
pub fn conn_parts_of_signal(
    circuit: &Circuit,
    partitions: &[Partition],
    sig: SignalId,
) -> HashSet<usize> {
    conn_parts(partitions, circuit.conn_regs(sig))
}

fn conn_parts(partitions: &[Partition], adjacent: &HashSet<SignalId>) -> HashSet<usize> {
    let mut indexes = HashSet::new();
    for (idx, partition) in partitions.iter().enumerate() {
        if partition.iter().any(|sig| adjacent.contains(sig)) {
            indexes.insert(idx);
        }
    }
    indexes
}

/// Connectivity pruning for Procedure 1: a fault that can reach at most one
/// partition can never make more partitions faulty than the budget, so its
/// difference (or selector) variable is permanently forced off.
///
/// Merged-away partitions keep their old unit clauses, which can over-prune
/// a freshly merged partition; the option driving this pass is off by
/// default for that reason.
pub fn prune_single_partition_targets(
    ctx: &mut SatCtx,
    circuit: &Circuit,
    partitions: &[Partition],
    initial_faults: &IndexMap<SignalId, FaultSelector>,
    initial_diff: &[Lit],
    report: &mut dyn Write,
) -> std::io::Result<()> {
    let mut reg_part: HashMap<SignalId, usize> = HashMap::new();
    for (idx, partition) in partitions.iter().enumerate() {
        for &reg in partition {
            reg_part.insert(reg, idx);
        }
    }

    let spans_multiple = |adjacent: &mut dyn Iterator<Item = SignalId>| -> bool {
        let mut first: Option<usize> = None;
        for reg in adjacent {
            let idx = reg_part[&reg];
            match first {
                None => first = Some(idx),
                Some(existing) if existing != idx => return true,
                Some(_) => {}
            }
        }
        false
    };

    let mut pruned_partitions = 0;
    for (idx, partition) in partitions.iter().enumerate() {
        let mut adjacent: HashSet<SignalId> = HashSet::new();
        for &sig in partition {
            adjacent.extend(circuit.conn_regs(sig).iter().copied());
        }
        if adjacent.len() <= 1 || !spans_multiple(&mut adjacent.iter().copied()) {
            ctx.add_clause(&[!initial_diff[idx]]);
            pruned_partitions += 1;
        }
    }
    writeln!(report, "  Optimize {pruned_partitions} faults in partitions")?;

    let mut pruned_faults = 0;
    for (&sig, selector) in initial_faults {
        let adjacent = circuit.conn_regs(sig);
        if adjacent.len() <= 1 || !spans_multiple(&mut adjacent.iter().copied()) {
            ctx.add_clause(&[!selector.is_faulted()]);
            pruned_faults += 1;
        }
    }
    writeln!(report, "  Optimize {pruned_faults} faults in comb logic")?;
    Ok(())
}
