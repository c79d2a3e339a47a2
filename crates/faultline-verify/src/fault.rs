//! Per-signal fault selectors.

use faultline_sat::{Lit, SatCtx};

/// One freshly allocated solver variable deciding whether a signal is
/// flipped in the faulty trace: 0 passes the value through, 1 flips it.
///
/// Selectors are created at unroll time and live exactly as long as the
/// trace that owns them; they are meaningless once the solver context is
/// gone.
#[derive(Debug, Clone, Copy)]
pub struct FaultSelector {
    f0: Lit,
}

impl FaultSelector {
    pub fn new(ctx: &mut SatCtx) -> FaultSelector {
        FaultSelector { f0: ctx.new_var() }
    }

    /// The selector variable itself, for cardinality budgets and model
    /// readback.
    pub fn is_faulted(&self) -> Lit {
        self.f0
    }

    /// Returns a fresh literal constrained to `normal ^ f0`.
    pub fn induce_fault(&self, ctx: &mut SatCtx, normal: Lit) -> Lit {
        let flipped = ctx.new_var();
        // f0 = 0: pass through.
        ctx.add_clause(&[normal, self.f0, !flipped]);
        ctx.add_clause(&[!normal, self.f0, flipped]);
        // f0 = 1: bit flip.
        ctx.add_clause(&[normal, !self.f0, flipped]);
        ctx.add_clause(&[!normal, !self.f0, !flipped]);
        flipped
    }
}
