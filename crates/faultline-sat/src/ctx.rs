//! The solver context: variables, gates, assumptions, models.

use faultline_netlist::{ConstBit, GateOps};
use std::time::{Duration, Instant};
use varisat::{ExtendFormula, Lit, Solver};

/// Result of one incremental satisfiability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatResult {
    Sat,
    Unsat,
    /// The backend gave up (interrupt or internal error). Callers treat this
    /// like `Unsat` for progress but log it distinctly.
    Unknown,
}

/// Incremental SAT context.
///
/// Variable ids grow monotonically; model values are only meaningful for
/// variables that existed before the last satisfiable [`check`](SatCtx::check).
pub struct SatCtx {
    solver: Solver<'static>,
    num_vars: usize,
    assumptions: Vec<Lit>,
    model: Vec<bool>,
    lit_true: Lit,
    last_check_time: Duration,
}

impl SatCtx {
    pub fn new() -> SatCtx {
        let mut solver = Solver::new();
        let lit_true = Lit::positive(solver.new_var());
        solver.add_clause(&[lit_true]);
        SatCtx {
            solver,
            num_vars: 1,
            assumptions: Vec::new(),
            model: Vec::new(),
            lit_true,
            last_check_time: Duration::ZERO,
        }
    }

    /// Allocates a fresh variable, returned as its positive literal.
    pub fn new_var(&mut self) -> Lit {
        self.num_vars += 1;
        Lit::positive(self.solver.new_var())
    }

    pub fn num_vars(&self) -> usize {
        self.num_vars
    }

    /// The interned constant-true literal.
    pub fn lit_true(&self) -> Lit {
        self.lit_true
    }

    pub fn lit_false(&self) -> Lit {
        !self.lit_true
    }

    /// Adds a permanent clause.
    pub fn add_clause(&mut self, lits: &[Lit]) {
        self.solver.add_clause(lits);
    }

    /// `y = a & b` with constant and redundancy folding.
    pub fn make_and(&mut self, a: Lit, b: Lit) -> Lit {
        let t = self.lit_true;
        let f = !t;
        if a == f || b == f {
            return f;
        }
        if a == t {
            return b;
        }
        if b == t {
            return a;
        }
        if a == b {
            return a;
        }
        if a == !b {
            return f;
        }
        let y = self.new_var();
        self.solver.add_clause(&[!y, a]);
        self.solver.add_clause(&[!y, b]);
        self.solver.add_clause(&[y, !a, !b]);
        y
    }

    /// `y = a | b`.
    pub fn make_or(&mut self, a: Lit, b: Lit) -> Lit {
        let y = self.make_and(!a, !b);
        !y
    }

    /// `y = a ^ b`.
    pub fn make_xor(&mut self, a: Lit, b: Lit) -> Lit {
        let t = self.lit_true;
        let f = !t;
        if a == f {
            return b;
        }
        if a == t {
            return !b;
        }
        if b == f {
            return a;
        }
        if b == t {
            return !a;
        }
        if a == b {
            return f;
        }
        if a == !b {
            return t;
        }
        let y = self.new_var();
        self.solver.add_clause(&[!y, a, b]);
        self.solver.add_clause(&[!y, !a, !b]);
        self.solver.add_clause(&[y, !a, b]);
        self.solver.add_clause(&[y, a, !b]);
        y
    }

    /// `y = s ? b : a`.
    pub fn make_mux(&mut self, s: Lit, a: Lit, b: Lit) -> Lit {
        let t = self.lit_true;
        if s == t {
            return b;
        }
        if s == !t {
            return a;
        }
        if a == b {
            return a;
        }
        let y = self.new_var();
        self.solver.add_clause(&[s, !a, y]);
        self.solver.add_clause(&[s, a, !y]);
        self.solver.add_clause(&[!s, !b, y]);
        self.solver.add_clause(&[!s, b, !y]);
        y
    }

    /// Conjunction over a literal list.
    pub fn make_and_many(&mut self, lits: &[Lit]) -> Lit {
        let t = self.lit_true;
        let f = !t;
        let mut inputs: Vec<Lit> = Vec::with_capacity(lits.len());
        for &lit in lits {
            if lit == f {
                return f;
            }
            if lit == t {
                continue;
            }
            inputs.push(lit);
        }
        match inputs.len() {
            0 => t,
            1 => inputs[0],
            _ => {
                let y = self.new_var();
                for &lit in &inputs {
                    self.solver.add_clause(&[!y, lit]);
                }
                let mut closing: Vec<Lit> = inputs.iter().map(|&lit| !lit).collect();
                closing.push(y);
                self.solver.add_clause(&closing);
                y
            }
        }
    }

    /// Disjunction over a literal list.
    pub fn make_or_many(&mut self, lits: &[Lit]) -> Lit {
        let negated: Vec<Lit> = lits.iter().map(|&lit| !lit).collect();
        let y = self.make_and_many(&negated);
        !y
    }

    /// Queues a one-shot assumption for the next [`check`](SatCtx::check).
    pub fn assume(&mut self, lit: Lit) {
        self.assumptions.push(lit);
    }

    /// Runs an incremental check under the queued assumptions, which are
    /// consumed whatever the outcome. On `Sat` the model is stored for
    /// [`value`](SatCtx::value) lookups.
    pub fn check(&mut self) -> SatResult {
        let assumptions = std::mem::take(&mut self.assumptions);
        self.solver.assume(&assumptions);
        let start = Instant::now();
        let result = match self.solver.solve() {
            Ok(true) => {
                self.model = vec![false; self.num_vars];
                if let Some(model) = self.solver.model() {
                    for lit in model {
                        let idx = lit.var().index();
                        if idx < self.model.len() {
                            self.model[idx] = lit.is_positive();
                        }
                    }
                }
                SatResult::Sat
            }
            Ok(false) => SatResult::Unsat,
            Err(err) => {
                log::warn!("solver gave up: {err}");
                SatResult::Unknown
            }
        };
        self.last_check_time = start.elapsed();
        result
    }

    /// Wall-clock time of the most recent [`check`](SatCtx::check).
    pub fn last_check_time(&self) -> Duration {
        self.last_check_time
    }

    /// Model value of a literal after a satisfiable check.
    pub fn value(&self, lit: Lit) -> bool {
        let positive = self
            .model
            .get(lit.var().index())
            .copied()
            .unwrap_or(false);
        positive != lit.is_negative()
    }
}

impl Default for SatCtx {
    fn default() -> SatCtx {
        SatCtx::new()
    }
}

impl GateOps for SatCtx {
    type Value = Lit;

    fn const_bit(&mut self, bit: ConstBit) -> Lit {
        match bit {
            ConstBit::One => self.lit_true(),
            _ => self.lit_false(),
        }
    }

    fn not(&mut self, a: Lit) -> Lit {
        !a
    }

    fn and(&mut self, a: Lit, b: Lit) -> Lit {
        self.make_and(a, b)
    }

    fn or(&mut self, a: Lit, b: Lit) -> Lit {
        self.make_or(a, b)
    }

    fn xor(&mut self, a: Lit, b: Lit) -> Lit {
        self.make_xor(a, b)
    }

    fn mux(&mut self, s: Lit, a: Lit, b: Lit) -> Lit {
        self.make_mux(s, a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn force(ctx: &mut SatCtx, lit: Lit, value: bool) {
        ctx.assume(if value { lit } else { !lit });
    }

    #[test]
    fn and_gate_truth_table() {
        for (va, vb, expected) in [
            (false, false, false),
            (false, true, false),
            (true, false, false),
            (true, true, true),
        ] {
            let mut ctx = SatCtx::new();
            let a = ctx.new_var();
            let b = ctx.new_var();
            let y = ctx.make_and(a, b);
            force(&mut ctx, a, va);
            force(&mut ctx, b, vb);
            assert_eq!(ctx.check(), SatResult::Sat);
            assert_eq!(ctx.value(y), expected);
        }
    }

    #[test]
    fn xor_gate_truth_table() {
        for (va, vb) in [(false, false), (false, true), (true, false), (true, true)] {
            let mut ctx = SatCtx::new();
            let a = ctx.new_var();
            let b = ctx.new_var();
            let y = ctx.make_xor(a, b);
            force(&mut ctx, a, va);
            force(&mut ctx, b, vb);
            assert_eq!(ctx.check(), SatResult::Sat);
            assert_eq!(ctx.value(y), va != vb);
        }
    }

    #[test]
    fn mux_selects_second_operand_when_high() {
        for (vs, va, vb) in [
            (false, true, false),
            (false, false, true),
            (true, true, false),
            (true, false, true),
        ] {
            let mut ctx = SatCtx::new();
            let s = ctx.new_var();
            let a = ctx.new_var();
            let b = ctx.new_var();
            let y = ctx.make_mux(s, a, b);
            force(&mut ctx, s, vs);
            force(&mut ctx, a, va);
            force(&mut ctx, b, vb);
            assert_eq!(ctx.check(), SatResult::Sat);
            assert_eq!(ctx.value(y), if vs { vb } else { va });
        }
    }

    #[test]
    fn constant_folding_short_circuits() {
        let mut ctx = SatCtx::new();
        let a = ctx.new_var();
        let t = ctx.lit_true();
        let f = ctx.lit_false();
        assert_eq!(ctx.make_and(a, t), a);
        assert_eq!(ctx.make_and(a, f), f);
        assert_eq!(ctx.make_and(a, !a), f);
        assert_eq!(ctx.make_xor(a, f), a);
        assert_eq!(ctx.make_xor(a, t), !a);
        assert_eq!(ctx.make_or_many(&[]), f);
        assert_eq!(ctx.make_and_many(&[]), t);
    }

    #[test]
    fn assumptions_are_one_shot() {
        let mut ctx = SatCtx::new();
        let a = ctx.new_var();
        ctx.add_clause(&[a]);
        ctx.assume(!a);
        assert_eq!(ctx.check(), SatResult::Unsat);
        // The contradictory assumption is gone; the formula itself is fine.
        assert_eq!(ctx.check(), SatResult::Sat);
        assert!(ctx.value(a));
    }

    #[test]
    fn unsat_on_contradiction() {
        let mut ctx = SatCtx::new();
        let a = ctx.new_var();
        ctx.add_clause(&[a]);
        ctx.add_clause(&[!a]);
        assert_eq!(ctx.check(), SatResult::Unsat);
    }
}
