//! Dual-trace symbolic unrolling.

use crate::fault::FaultSelector;
use crate::{VerifyError, VerifyResult};
use faultline_netlist::{Circuit, SignalId};
use faultline_sat::{Lit, SatCtx};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// Per-cycle assignment of solver literals to signals.
pub type State = HashMap<SignalId, Lit>;

/// The golden and faulty symbolic executions plus the per-cycle fault
/// selectors injected into the faulty one.
#[derive(Default)]
pub struct DualTrace {
    golden: Vec<State>,
    faulty: Vec<State>,
    faults: Vec<IndexMap<SignalId, FaultSelector>>,
}

fn seed_constants(ctx: &SatCtx, state: &mut State) {
    state.insert(SignalId::S0, ctx.lit_false());
    state.insert(SignalId::S1, ctx.lit_true());
    // x and z coerce to 0; four-valued simulation is out of scope.
    state.insert(SignalId::SX, ctx.lit_false());
    state.insert(SignalId::SZ, ctx.lit_false());
}

fn sorted_non_const(set: &HashSet<SignalId>) -> Vec<SignalId> {
    let mut sigs: Vec<SignalId> = set.iter().copied().filter(|s| !s.is_const()).collect();
    sigs.sort_unstable();
    sigs
}

impl DualTrace {
    pub fn new() -> DualTrace {
        DualTrace::default()
    }

    pub fn cycles(&self) -> usize {
        self.golden.len()
    }

    pub fn golden(&self, cycle: usize) -> &State {
        &self.golden[cycle]
    }

    pub fn faulty(&self, cycle: usize) -> &State {
        &self.faulty[cycle]
    }

    pub fn faults(&self, cycle: usize) -> &IndexMap<SignalId, FaultSelector> {
        &self.faults[cycle]
    }

    pub fn golden_states(&self) -> &[State] {
        &self.golden
    }

    pub fn faulty_states(&self) -> &[State] {
        &self.faulty
    }

    /// Difference literal `golden ^ faulty` of one signal at one cycle.
    pub fn diff(&self, ctx: &mut SatCtx, cycle: usize, sig: SignalId) -> Lit {
        let g = self.golden[cycle][&sig];
        let f = self.faulty[cycle][&sig];
        ctx.make_xor(g, f)
    }

    /// Builds cycle 0.
    ///
    /// Primary inputs get one fresh variable shared by both traces (XORed
    /// with a fresh selector on the faulty side when faultable). Register
    /// outputs get *independent* fresh variables in the two traces: the
    /// unconstrained initial state is where register faults live. Every
    /// faultable combinational output is fitted with a selector.
    pub fn unroll_init(
        &mut self,
        ctx: &mut SatCtx,
        circuit: &Circuit,
        faultable: &HashSet<SignalId>,
    ) {
        assert!(self.golden.is_empty(), "unroll_init runs once");

        let mut golden = State::new();
        let mut faulty = State::new();
        let mut faults: IndexMap<SignalId, FaultSelector> = IndexMap::new();
        seed_constants(ctx, &mut golden);
        seed_constants(ctx, &mut faulty);

        for sig in sorted_non_const(circuit.ins()) {
            let var = ctx.new_var();
            golden.insert(sig, var);
            if faultable.contains(&sig) {
                let selector = FaultSelector::new(ctx);
                faulty.insert(sig, selector.induce_fault(ctx, var));
                faults.insert(sig, selector);
            } else {
                faulty.insert(sig, var);
            }
        }

        for sig in sorted_non_const(circuit.regs()) {
            golden.insert(sig, ctx.new_var());
            faulty.insert(sig, ctx.new_var());
        }

        let empty = State::new();
        for cell in circuit.cells() {
            if cell.is_register() {
                continue;
            }
            cell.eval(ctx, &empty, &mut golden);
            cell.eval(ctx, &empty, &mut faulty);

            let out = cell.output();
            if faultable.contains(&out) {
                let selector = FaultSelector::new(ctx);
                let current = faulty[&out];
                faulty.insert(out, selector.induce_fault(ctx, current));
                faults.insert(out, selector);
            }
        }

        self.golden.push(golden);
        self.faulty.push(faulty);
        self.faults.push(faults);
    }

    /// Appends cycle `t > 0`.
    ///
    /// Inputs stay equal across the traces (modulo injected faults);
    /// registers advance from the previous cycle under their reset/enable
    /// semantics. Combinational outputs only receive a selector when their
    /// forward cone reaches an alert signal - a fault that cannot suppress
    /// an alert later adds nothing beyond the cycle-0 case.
    pub fn unroll(
        &mut self,
        ctx: &mut SatCtx,
        circuit: &Circuit,
        faultable: &HashSet<SignalId>,
        alert_signals: &HashSet<SignalId>,
    ) {
        let steps = self.golden.len();
        assert!(steps > 0, "unroll_init must run first");

        let mut golden = State::new();
        let mut faulty = State::new();
        let mut faults: IndexMap<SignalId, FaultSelector> = IndexMap::new();
        seed_constants(ctx, &mut golden);
        seed_constants(ctx, &mut faulty);

        for sig in sorted_non_const(circuit.ins()) {
            let var = ctx.new_var();
            golden.insert(sig, var);
            if faultable.contains(&sig) {
                let selector = FaultSelector::new(ctx);
                faulty.insert(sig, selector.induce_fault(ctx, var));
                faults.insert(sig, selector);
            } else {
                faulty.insert(sig, var);
            }
        }

        let prev_golden = &self.golden[steps - 1];
        let prev_faulty = &self.faulty[steps - 1];

        for cell in circuit.cells() {
            cell.eval(ctx, prev_golden, &mut golden);
            cell.eval(ctx, prev_faulty, &mut faulty);

            if cell.is_register() {
                continue;
            }
            let out = cell.output();
            if !faultable.contains(&out) {
                continue;
            }
            let reaches_alert = circuit
                .conn_outs(out)
                .iter()
                .any(|o| alert_signals.contains(o));
            if reaches_alert {
                let selector = FaultSelector::new(ctx);
                let current = faulty[&out];
                faulty.insert(out, selector.induce_fault(ctx, current));
                faults.insert(out, selector);
            }
        }

        self.golden.push(golden);
        self.faulty.push(faulty);
        self.faults.push(faults);
    }

    /// Forces the golden state of each invariant net to its literal bit
    /// vector at `step` (one unit clause per bit).
    pub fn assert_invariants_at_step(
        &self,
        ctx: &mut SatCtx,
        circuit: &Circuit,
        invariant_list: &IndexMap<String, Vec<bool>>,
        step: usize,
    ) -> VerifyResult<()> {
        for (name, bits) in invariant_list {
            let sigs = resolve_net(circuit, name, bits.len())?;
            for (&sig, &value) in sigs.iter().zip(bits) {
                let lit = self.golden[step][&sig];
                ctx.add_clause(&[if value { lit } else { !lit }]);
            }
        }
        Ok(())
    }

    /// Forbids every alert from triggering at `step` in either trace: one
    /// permanent clause asserting the conjunction of all safe-value
    /// equivalences.
    pub fn assert_no_alert_at_step(
        &self,
        ctx: &mut SatCtx,
        circuit: &Circuit,
        alert_list: &IndexMap<String, Vec<bool>>,
        step: usize,
    ) -> VerifyResult<()> {
        for (name, bits) in alert_list {
            let sigs = resolve_net(circuit, name, bits.len())?;
            let mut safe: Vec<Lit> = Vec::with_capacity(bits.len() * 2);
            for (&sig, &value) in sigs.iter().zip(bits) {
                let g = self.golden[step][&sig];
                let f = self.faulty[step][&sig];
                safe.push(if value { g } else { !g });
                safe.push(if value { f } else { !f });
            }
            let quiet = ctx.make_and_many(&safe);
            ctx.add_clause(&[quiet]);
        }
        Ok(())
    }
}

fn resolve_net<'c>(
    circuit: &'c Circuit,
    name: &str,
    provided: usize,
) -> VerifyResult<&'c [SignalId]> {
    let sigs = circuit
        .net(name)
        .ok_or_else(|| VerifyError::UnknownNet(name.to_string()))?;
    if sigs.len() != provided {
        return Err(VerifyError::WidthMismatch {
            name: name.to_string(),
            expected: sigs.len(),
            got: provided,
        });
    }
    Ok(sigs)
}
