//! Procedure 1: SAT-guided partition refinement.
//!
//! Starting from a partitioning of the register outputs, repeatedly asks the
//! solver for an assignment of at most `k` faults that leaves every alert
//! quiet while making more than `k` partitions faulty one cycle later. Every
//! witness merges the next-cycle-faulty partitions into at most `k` larger
//! ones; UNSAT means the partitioning is stable for the queried fault split
//! and the driver advances to the next split.

use crate::partitions::{partition_info, prune_single_partition_targets, Partition};
use crate::unroll::DualTrace;
use crate::{GateFaults, VerifyResult};
use faultline_dump::{dump_vcd, time_tag, write_gtkw_savefile, write_partitioning, VcdFilter};
use faultline_netlist::{Circuit, SignalId};
use faultline_sat::{Lit, SatCtx, SatResult};
use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeSet, HashSet};
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

/// Shared budget of solver queries across all fault splits of one run.
pub const MAX_ITER: u32 = 2000;

#[derive(Debug, Clone)]
pub struct RefineOptions {
    /// Maximum adversary order.
    pub k: u32,
    /// Cycles to unroll beyond the first; at least one more cycle is always
    /// produced so the instability query has a "next" state.
    pub delay: u32,
    /// Iterate `k_faults` from 1 up to `k` instead of checking `k` alone.
    pub increasing_k: bool,
    pub gates: GateFaults,
    /// Enumerate exploitable combinational faults instead of merging.
    pub enumerate_exploitable: bool,
    /// Connectivity-based pruning; may over-prune freshly merged
    /// partitions, off unless verified for the design at hand.
    pub optim_atleast2: bool,
    pub dump_vcd: bool,
    pub dump_partitioning: bool,
    /// Seed of the randomized merge strategy.
    pub merge_seed: u64,
    pub interesting_names: Vec<String>,
    pub dump_path: PathBuf,
}

impl Default for RefineOptions {
    fn default() -> RefineOptions {
        RefineOptions {
            k: 1,
            delay: 1,
            increasing_k: true,
            gates: GateFaults::All,
            enumerate_exploitable: false,
            optim_atleast2: false,
            dump_vcd: false,
            dump_partitioning: false,
            merge_seed: 42,
            interesting_names: Vec::new(),
            dump_path: PathBuf::from("."),
        }
    }
}

#[derive(Debug)]
pub struct RefineOutcome {
    /// The refined partitioning, stable for every queried fault split.
    pub partitions: Vec<Partition>,
    /// Combinational faults recorded in enumeration mode, sorted.
    pub enumerated_faults: Vec<SignalId>,
    /// Solver queries spent.
    pub solver_queries: u32,
}

#[allow(clippy::too_many_arguments)]
pub fn run_partition_refinement(
    ctx: &mut SatCtx,
    circuit: &Circuit,
    opts: &RefineOptions,
    initial_partitions: Vec<Partition>,
    faultable: &HashSet<SignalId>,
    alert_signals: &HashSet<SignalId>,
    alert_list: &IndexMap<String, Vec<bool>>,
    invariant_list: &IndexMap<String, Vec<bool>>,
    report: &mut dyn Write,
) -> VerifyResult<RefineOutcome> {
    let mut partitions = initial_partitions;

    // Unroll cycles 0..=max(1, delay): register faults live in the free
    // initial state, combinational faults are injected while unrolling.
    let horizon = opts.delay.max(1);
    let mut trace = DualTrace::new();
    for cycle in 0..=horizon {
        if cycle == 0 {
            trace.unroll_init(ctx, circuit, faultable);
            trace.assert_invariants_at_step(ctx, circuit, invariant_list, 0)?;
        } else {
            trace.unroll(ctx, circuit, faultable, alert_signals);
        }
        trace.assert_no_alert_at_step(ctx, circuit, alert_list, cycle as usize)?;
    }

    // Per-partition difference variables at cycles 0 and 1.
    let mut part_diff: [Vec<Lit>; 2] = [Vec::new(), Vec::new()];
    for (cycle, diffs) in part_diff.iter_mut().enumerate() {
        for partition in &partitions {
            let mut sigs: Vec<SignalId> = partition.iter().copied().collect();
            sigs.sort_unstable();
            let bits: Vec<Lit> = sigs
                .iter()
                .map(|&sig| trace.diff(ctx, cycle, sig))
                .collect();
            diffs.push(ctx.make_or_many(&bits));
        }
    }

    // Combinational selectors: cycle 0 in slot 0, all later cycles merged
    // into slot 1.
    let mut comb_fault_vars: [Vec<Lit>; 2] = [Vec::new(), Vec::new()];
    for cycle in 0..trace.cycles() {
        let slot = usize::from(cycle != 0);
        comb_fault_vars[slot].extend(trace.faults(cycle).values().map(|sel| sel.is_faulted()));
    }

    let mut rng = StdRng::seed_from_u64(opts.merge_seed);
    let tag = time_tag();
    let mut enumerated: BTreeSet<SignalId> = BTreeSet::new();
    let mut solver_iter: u32 = 0;
    let started = Instant::now();

    writeln!(report, "\n{}", "*".repeat(80))?;
    writeln!(report, "{}Procedure 1 -- Build partitions", " ".repeat(20))?;
    writeln!(report, "{}", "*".repeat(80))?;

    let k = i64::from(opts.k);
    let k_start = if opts.increasing_k { 1 } else { k };
    for k_faults in k_start..=k {
        let max_k_f_comb = if opts.gates == GateFaults::Seq { 0 } else { k_faults };
        let mut k_f_comb = max_k_f_comb;
        while k_f_comb >= 0 {
            let mut k_f_comb_next: i64 = 0;
            while k_f_comb_next <= (k_faults - 1).min(k_f_comb) {
                let k_f_part = (k_faults - k_f_comb) as usize;
                let k_f_comb_init = (k_f_comb - k_f_comb_next) as usize;

                writeln!(report, "{}", "-".repeat(80))?;
                writeln!(
                    report,
                    "Partitioning for {k_f_part}/{} faulty partitions,",
                    partitions.len()
                )?;
                writeln!(
                    report,
                    "{k_f_comb_init}/{} combinational faults at initial state,",
                    comb_fault_vars[0].len()
                )?;
                writeln!(
                    report,
                    "and {k_f_comb_next}/{} combinational faults in the following clock cycles.",
                    comb_fault_vars[1].len()
                )?;
                writeln!(report, "{}", "-".repeat(80))?;

                refine_for_split(
                    ctx,
                    circuit,
                    opts,
                    &trace,
                    &mut partitions,
                    &mut part_diff,
                    &comb_fault_vars,
                    k_faults as usize,
                    k_f_part,
                    k_f_comb_init,
                    k_f_comb_next as usize,
                    &mut enumerated,
                    &mut rng,
                    &tag,
                    &mut solver_iter,
                    &mut *report,
                )?;

                writeln!(
                    report,
                    "  Partitioning finished with {} partitions.",
                    partitions.len()
                )?;
                if opts.dump_partitioning {
                    let path = opts
                        .dump_path
                        .join(format!("partitioning-{solver_iter}.json"));
                    write_partitioning(&path, &partitions)?;
                    writeln!(report, "  Write partitioning in file `{}`", path.display())?;
                }

                k_f_comb_next += 1;
            }
            k_f_comb -= 1;
        }
    }

    writeln!(
        report,
        "=> Procedure 1 verification time: {:.3} s",
        started.elapsed().as_secs_f64()
    )?;

    Ok(RefineOutcome {
        partitions,
        enumerated_faults: enumerated.into_iter().collect(),
        solver_queries: solver_iter,
    })
}

/// Runs the inner refinement loop for one `(k_f_part, k_f_comb_init,
/// k_f_comb_next)` split until the solver reports UNSAT (or gives up).
#[allow(clippy::too_many_arguments)]
fn refine_for_split(
    ctx: &mut SatCtx,
    circuit: &Circuit,
    opts: &RefineOptions,
    trace: &DualTrace,
    partitions: &mut Vec<Partition>,
    part_diff: &mut [Vec<Lit>; 2],
    comb_fault_vars: &[Vec<Lit>; 2],
    k_faults: usize,
    k_f_part: usize,
    k_f_comb_init: usize,
    k_f_comb_next: usize,
    enumerated: &mut BTreeSet<SignalId>,
    rng: &mut StdRng,
    tag: &str,
    solver_iter: &mut u32,
    report: &mut dyn Write,
) -> VerifyResult<()> {
    while *solver_iter < MAX_ITER {
        *solver_iter += 1;

        if opts.optim_atleast2 {
            prune_single_partition_targets(
                ctx,
                circuit,
                partitions,
                trace.faults(0),
                &part_diff[0],
                &mut *report,
            )?;
        }

        // One-shot assumptions for this query.
        let comb_init_bound = ctx.at_most(&comb_fault_vars[0], k_f_comb_init);
        ctx.assume(comb_init_bound);
        let comb_next_bound = ctx.at_most(&comb_fault_vars[1], k_f_comb_next);
        ctx.assume(comb_next_bound);
        let part_bound = ctx.at_most(&part_diff[0], k_f_part);
        ctx.assume(part_bound);
        // Instability: more partitions faulty next cycle than any k-fault
        // adversary could set directly.
        let unstable = ctx.at_least(&part_diff[1], k_faults + 1);
        ctx.assume(unstable);

        if opts.enumerate_exploitable {
            write!(report, "\nEnumerate exploitable faults: ")?;
            for sig in enumerated.iter() {
                write!(report, "{sig} ")?;
            }
            writeln!(report)?;
        }

        write!(report, "\n  Running solver {}: ", *solver_iter)?;
        report.flush()?;
        let result = ctx.check();
        write!(report, "{:.3} s -> ", ctx.last_check_time().as_secs_f64())?;

        match result {
            SatResult::Unsat => {
                writeln!(report, "UNSAT")?;
                return Ok(());
            }
            SatResult::Unknown => {
                writeln!(report, "UNKNOWN")?;
                log::warn!(
                    "solver query {} gave up; treating the current fault split as finished",
                    *solver_iter
                );
                return Ok(());
            }
            SatResult::Sat => {
                writeln!(report, "SAT")?;
            }
        }

        // Attack gates chosen by the model.
        for cycle in 0..trace.cycles() {
            let faulty: Vec<SignalId> = trace
                .faults(cycle)
                .iter()
                .filter(|(_, sel)| ctx.value(sel.is_faulted()))
                .map(|(&sig, _)| sig)
                .collect();
            write!(report, "  - Faulty comb gates at clock cycle {cycle}: ")?;
            for &sig in &faulty {
                if opts.enumerate_exploitable && enumerated.insert(sig) {
                    if let Some(sel) = trace.faults(0).get(&sig) {
                        ctx.add_clause(&[!sel.is_faulted()]);
                    }
                }
                write!(report, "{sig} ({}) ", circuit.describe(sig))?;
            }
            writeln!(report)?;
        }

        let faulty_initial = model_true_indexes(ctx, &part_diff[0]);
        write!(report, "  - Faulty partitions (initial): ")?;
        write_partition_indexes(report, partitions, &faulty_initial)?;

        let faulty_next = model_true_indexes(ctx, &part_diff[1]);
        write!(report, "  - Faulty partitions (next): ")?;
        write_partition_indexes(report, partitions, &faulty_next)?;

        if opts.dump_vcd {
            let vcd_path = opts
                .dump_path
                .join(format!("refinement-{tag}-{}.vcd", *solver_iter));
            dump_vcd(
                &vcd_path,
                circuit,
                ctx,
                trace.golden_states(),
                trace.faulty_states(),
                VcdFilter::All,
            )?;
            write_gtkw_savefile(&vcd_path, &faulty_initial, &faulty_next, partitions, circuit)?;
        }

        if !opts.enumerate_exploitable {
            merge_faulty_partitions(
                ctx,
                partitions,
                part_diff,
                &faulty_next,
                k_faults,
                rng,
                &mut *report,
            )?;
            write!(
                report,
                "{}",
                partition_info(circuit, partitions, &opts.interesting_names)
            )?;
        }
    }
    log::warn!("refinement stopped after {MAX_ITER} solver queries");
    Ok(())
}

fn model_true_indexes(ctx: &SatCtx, lits: &[Lit]) -> Vec<usize> {
    lits.iter()
        .enumerate()
        .filter(|(_, &lit)| ctx.value(lit))
        .map(|(idx, _)| idx)
        .collect()
}

fn write_partition_indexes(
    report: &mut dyn Write,
    partitions: &[Partition],
    indexes: &[usize],
) -> std::io::Result<()> {
    for &idx in indexes {
        write!(report, "{idx} ( ")?;
        let mut sigs: Vec<SignalId> = partitions[idx].iter().copied().collect();
        sigs.sort_unstable();
        for sig in sigs {
            write!(report, "{sig} ")?;
        }
        write!(report, ") ")?;
    }
    writeln!(report)
}

/// Buckets the next-cycle-faulty partitions randomly into `k_faults` groups
/// and replaces them by the merged unions. The difference variable of a
/// merged partition is the OR of its constituents' variables, so no
/// re-unrolling is needed.
fn merge_faulty_partitions(
    ctx: &mut SatCtx,
    partitions: &mut Vec<Partition>,
    part_diff: &mut [Vec<Lit>; 2],
    faulty_next: &[usize],
    k_faults: usize,
    rng: &mut StdRng,
    report: &mut dyn Write,
) -> std::io::Result<()> {
    if faulty_next.is_empty() {
        return Ok(());
    }

    let bucket_size = faulty_next.len() as f64 / k_faults as f64;
    let mut next_bucket = 0.0;
    let mut remaining: Vec<usize> = faulty_next.to_vec();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for position in 0..faulty_next.len() {
        if position as f64 >= next_bucket {
            groups.push(Vec::new());
            next_bucket += bucket_size;
        }
        let chosen = rng.gen_range(0..remaining.len());
        let idx = remaining.remove(chosen);
        groups
            .last_mut()
            .expect("bucket opened before first pick")
            .push(idx);
    }
    debug_assert!(groups.len() <= k_faults);

    for group in &groups {
        let mut merged = Partition::new();
        let mut diffs0: Vec<Lit> = Vec::with_capacity(group.len());
        let mut diffs1: Vec<Lit> = Vec::with_capacity(group.len());
        write!(report, "  Merge together : ")?;
        for &idx in group {
            write!(report, "{idx} ")?;
            merged.extend(partitions[idx].iter().copied());
            diffs0.push(part_diff[0][idx]);
            diffs1.push(part_diff[1][idx]);
        }
        writeln!(report)?;

        partitions.push(merged);
        let merged0 = ctx.make_or_many(&diffs0);
        part_diff[0].push(merged0);
        let merged1 = ctx.make_or_many(&diffs1);
        part_diff[1].push(merged1);
    }

    // Merged-away indexes are ascending; removal shifts by the count
    // already dropped.
    for (removed, &idx) in faulty_next.iter().enumerate() {
        partitions.remove(idx - removed);
        part_diff[0].remove(idx - removed);
        part_diff[1].remove(idx - removed);
    }
    writeln!(
        report,
        "  Merged: {}, Remaining: {}",
        faulty_next.len(),
        partitions.len()
    )
}
