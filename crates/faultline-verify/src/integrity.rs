//! Procedure 2: output-integrity checking by enumerate-and-forbid.
//!
//! Against a fixed partitioning, asks the solver for fault assignments that
//! corrupt at least one primary output while every alert stays quiet. Each
//! witness is recorded as exploitable and permanently forbidden, so the loop
//! enumerates distinct attacks until UNSAT.

use crate::partitions::Partition;
use crate::unroll::DualTrace;
use crate::{GateFaults, VerifyResult};
use faultline_dump::{dump_vcd, time_tag, VcdFilter};
use faultline_netlist::{Circuit, SignalId};
use faultline_sat::{Lit, SatCtx, SatResult};
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashSet};
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use crate::refine::MAX_ITER;

#[derive(Debug, Clone)]
pub struct IntegrityOptions {
    pub k: u32,
    /// Cycles to unroll beyond the first.
    pub delay: u32,
    pub increasing_k: bool,
    pub gates: GateFaults,
    pub dump_vcd: bool,
    pub dump_path: PathBuf,
}

impl Default for IntegrityOptions {
    fn default() -> IntegrityOptions {
        IntegrityOptions {
            k: 1,
            delay: 0,
            increasing_k: true,
            gates: GateFaults::All,
            dump_vcd: false,
            dump_path: PathBuf::from("."),
        }
    }
}

/// One SAT witness of an exploitable fault assignment.
#[derive(Debug, Clone)]
pub struct ExploitWitness {
    /// Faulted combinational signals, with the cycle their selector fired.
    pub comb_faults: Vec<(u32, SignalId)>,
    /// Initially-faulty partition indexes.
    pub faulty_partitions: Vec<usize>,
    /// Output bits that differ between the traces at cycle 0.
    pub corrupted_outputs: Vec<SignalId>,
}

#[derive(Debug, Default)]
pub struct IntegrityOutcome {
    pub witnesses: Vec<ExploitWitness>,
    /// Distinct combinational fault sites across all witnesses, sorted.
    pub exploitable_faults: Vec<SignalId>,
    /// Distinct initially-faulty partition indexes across all witnesses.
    pub exploitable_partitions: Vec<usize>,
    pub solver_queries: u32,
}

#[allow(clippy::too_many_arguments)]
pub fn run_output_integrity(
    ctx: &mut SatCtx,
    circuit: &Circuit,
    opts: &IntegrityOptions,
    partitions: &[Partition],
    faultable: &HashSet<SignalId>,
    alert_signals: &HashSet<SignalId>,
    alert_list: &IndexMap<String, Vec<bool>>,
    invariant_list: &IndexMap<String, Vec<bool>>,
    report: &mut dyn Write,
) -> VerifyResult<IntegrityOutcome> {
    writeln!(report, "\n{}", "*".repeat(80))?;
    writeln!(report, "{}Procedure 2 -- Check output integrity", " ".repeat(20))?;
    writeln!(report, "{}", "*".repeat(80))?;

    let mut trace = DualTrace::new();
    for cycle in 0..=opts.delay {
        if cycle == 0 {
            trace.unroll_init(ctx, circuit, faultable);
            trace.assert_invariants_at_step(ctx, circuit, invariant_list, 0)?;
        } else {
            trace.unroll(ctx, circuit, faultable, alert_signals);
        }
        trace.assert_no_alert_at_step(ctx, circuit, alert_list, cycle as usize)?;
    }

    // Partition differences at cycle 0.
    let mut part_diff: Vec<Lit> = Vec::with_capacity(partitions.len());
    for partition in partitions {
        let mut sigs: Vec<SignalId> = partition.iter().copied().collect();
        sigs.sort_unstable();
        let bits: Vec<Lit> = sigs.iter().map(|&sig| trace.diff(ctx, 0, sig)).collect();
        part_diff.push(ctx.make_or_many(&bits));
    }

    let mut comb_fault_vars: [Vec<Lit>; 2] = [Vec::new(), Vec::new()];
    for cycle in 0..trace.cycles() {
        let slot = usize::from(cycle != 0);
        comb_fault_vars[slot].extend(trace.faults(cycle).values().map(|sel| sel.is_faulted()));
    }

    // Primary outputs are the non-alert output ports.
    let mut primary_outputs: Vec<SignalId> = circuit
        .outs()
        .iter()
        .copied()
        .filter(|sig| !alert_signals.contains(sig))
        .collect();
    primary_outputs.sort_unstable();
    let primary_set: HashSet<SignalId> = primary_outputs.iter().copied().collect();

    let output_diff: Vec<Lit> = primary_outputs
        .iter()
        .map(|&sig| trace.diff(ctx, 0, sig))
        .collect();

    let started = Instant::now();

    // A partition that cannot reach a primary output through combinational
    // logic cannot corrupt one: force its difference off for good.
    let mut pruned = 0;
    for (idx, partition) in partitions.iter().enumerate() {
        let reaches = partition
            .iter()
            .any(|&sig| circuit.conn_outs(sig).iter().any(|o| primary_set.contains(o)));
        if !reaches {
            ctx.add_clause(&[!part_diff[idx]]);
            pruned += 1;
        }
    }
    writeln!(report, "  Optimize {pruned} faults in partitions")?;

    // Same for cycle-0 combinational fault sites.
    let mut pruned = 0;
    for (&sig, selector) in trace.faults(0) {
        let reaches = circuit.conn_outs(sig).iter().any(|o| primary_set.contains(o));
        if !reaches {
            ctx.add_clause(&[!selector.is_faulted()]);
            pruned += 1;
        }
    }
    writeln!(report, "  Optimize {pruned} faults in comb logic")?;

    let all_comb_vars: Vec<Lit> = comb_fault_vars
        .iter()
        .flat_map(|vars| vars.iter().copied())
        .collect();

    let mut outcome = IntegrityOutcome::default();
    let mut exploitable_faults: BTreeSet<SignalId> = BTreeSet::new();
    let mut exploitable_partitions: BTreeSet<usize> = BTreeSet::new();
    let tag = time_tag();

    let k = i64::from(opts.k);
    let k_start = if opts.increasing_k { 1 } else { k };
    for k_faults in k_start..=k {
        let max_k_f_comb = if opts.gates == GateFaults::Seq { 0 } else { k_faults };
        for k_f_comb in 0..=max_k_f_comb {
            let k_f_part = (k_faults - k_f_comb) as usize;

            writeln!(report, "{}", "-".repeat(80))?;
            writeln!(
                report,
                "Check output integrity for {k_f_part}/{} faulty partitions,",
                partitions.len()
            )?;
            writeln!(
                report,
                "{k_f_comb}/{} combinational faults",
                all_comb_vars.len()
            )?;
            writeln!(report, "{}", "-".repeat(80))?;

            // The cardinality indicators survive across the inner loop;
            // only the assumptions are one-shot.
            let comb_bound = ctx.at_most(&all_comb_vars, k_f_comb as usize);
            let part_bound = ctx.at_most(&part_diff, k_f_part);
            let corrupted = ctx.make_or_many(&output_diff);

            while outcome.solver_queries < MAX_ITER {
                outcome.solver_queries += 1;
                ctx.assume(comb_bound);
                ctx.assume(part_bound);
                ctx.assume(corrupted);

                write!(report, "\nEnumerate exploitable faults: ")?;
                for sig in &exploitable_faults {
                    write!(report, "{sig} ")?;
                }
                writeln!(report)?;
                write!(report, "Enumerate exploitable partitions: ")?;
                for idx in &exploitable_partitions {
                    write!(report, "{idx} ")?;
                }
                writeln!(report)?;

                write!(report, "\n  Running solver {}: ", outcome.solver_queries)?;
                report.flush()?;
                let result = ctx.check();
                let elapsed = ctx.last_check_time().as_secs_f64();

                match result {
                    SatResult::Unsat => {
                        writeln!(report, "UNSAT {elapsed:.3} s")?;
                        break;
                    }
                    SatResult::Unknown => {
                        writeln!(report, "UNKNOWN {elapsed:.3} s")?;
                        log::warn!(
                            "solver query {} gave up; no further attacks enumerated for this bound",
                            outcome.solver_queries
                        );
                        break;
                    }
                    SatResult::Sat => {
                        writeln!(report, "SAT {elapsed:.3} s")?;
                    }
                }

                let mut witness = ExploitWitness {
                    comb_faults: Vec::new(),
                    faulty_partitions: Vec::new(),
                    corrupted_outputs: Vec::new(),
                };

                for cycle in 0..trace.cycles() {
                    let faulty: Vec<SignalId> = trace
                        .faults(cycle)
                        .iter()
                        .filter(|(_, sel)| ctx.value(sel.is_faulted()))
                        .map(|(&sig, _)| sig)
                        .collect();
                    write!(report, "Faulty comb gates at clock cycle {cycle}: ")?;
                    for &sig in &faulty {
                        write!(report, "{sig} ")?;
                        witness.comb_faults.push((cycle as u32, sig));
                        if exploitable_faults.insert(sig) {
                            // Forbid the cycle-0 selector of this site.
                            if let Some(sel) = trace.faults(0).get(&sig) {
                                ctx.add_clause(&[!sel.is_faulted()]);
                            }
                        }
                    }
                    writeln!(report)?;
                }

                write!(report, "Faulty partitions (initial): ")?;
                for (idx, &lit) in part_diff.iter().enumerate() {
                    if !ctx.value(lit) {
                        continue;
                    }
                    witness.faulty_partitions.push(idx);
                    if exploitable_partitions.insert(idx) {
                        ctx.add_clause(&[!lit]);
                    }
                    write!(report, "{idx} ( ")?;
                    let mut sigs: Vec<SignalId> = partitions[idx].iter().copied().collect();
                    sigs.sort_unstable();
                    for sig in sigs {
                        write!(report, "{sig} ")?;
                    }
                    write!(report, ") ")?;
                }
                writeln!(report)?;

                write!(report, "Corrupted outputs: ")?;
                let mut outs: Vec<SignalId> = circuit.outs().iter().copied().collect();
                outs.sort_unstable();
                for sig in outs {
                    let g = ctx.value(trace.golden(0)[&sig]);
                    let f = ctx.value(trace.faulty(0)[&sig]);
                    if g != f {
                        write!(report, "{sig} ")?;
                        witness.corrupted_outputs.push(sig);
                    }
                }
                writeln!(report)?;

                if opts.dump_vcd {
                    let vcd_path = opts.dump_path.join(format!("integrity-{tag}.vcd"));
                    dump_vcd(
                        &vcd_path,
                        circuit,
                        ctx,
                        trace.golden_states(),
                        trace.faulty_states(),
                        VcdFilter::All,
                    )?;
                }

                outcome.witnesses.push(witness);
            }
        }
    }

    writeln!(
        report,
        "=> Procedure 2 verification time: {:.3} s",
        started.elapsed().as_secs_f64()
    )?;

    outcome.exploitable_faults = exploitable_faults.into_iter().collect();
    outcome.exploitable_partitions = exploitable_partitions.into_iter().collect();
    Ok(outcome)
}
