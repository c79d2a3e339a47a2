//! Totalizer cardinality constraints.
//!
//! [`SatCtx::at_most`] and [`SatCtx::at_least`] return indicator literals
//! over a sorted unary count of the input literals. The encoding is
//! two-sided, so an indicator is exact: it can be assumed in either polarity
//! and read back from a model.

use crate::ctx::SatCtx;
use varisat::Lit;

impl SatCtx {
    /// Indicator literal for `count(lits) <= bound`.
    pub fn at_most(&mut self, lits: &[Lit], bound: usize) -> Lit {
        if bound >= lits.len() {
            return self.lit_true();
        }
        let counts = self.sorted_counts(lits);
        !counts[bound]
    }

    /// Indicator literal for `count(lits) >= bound`.
    pub fn at_least(&mut self, lits: &[Lit], bound: usize) -> Lit {
        if bound == 0 {
            return self.lit_true();
        }
        if bound > lits.len() {
            return self.lit_false();
        }
        let counts = self.sorted_counts(lits);
        counts[bound - 1]
    }

    /// Sorted unary count: element `i` is true iff at least `i + 1` of the
    /// inputs are true.
    fn sorted_counts(&mut self, lits: &[Lit]) -> Vec<Lit> {
        match lits.len() {
            0 => Vec::new(),
            1 => vec![lits[0]],
            n => {
                let (lo, hi) = lits.split_at(n / 2);
                let a = self.sorted_counts(lo);
                let b = self.sorted_counts(hi);
                self.merge_counts(&a, &b)
            }
        }
    }

    fn merge_counts(&mut self, a: &[Lit], b: &[Lit]) -> Vec<Lit> {
        let (m, n) = (a.len(), b.len());
        let out: Vec<Lit> = (0..m + n).map(|_| self.new_var()).collect();
        for i in 0..=m {
            for j in 0..=n {
                // count_a >= i and count_b >= j imply count >= i + j.
                if i + j >= 1 {
                    let mut clause = vec![out[i + j - 1]];
                    if i > 0 {
                        clause.push(!a[i - 1]);
                    }
                    if j > 0 {
                        clause.push(!b[j - 1]);
                    }
                    self.add_clause(&clause);
                }
                // count_a <= i and count_b <= j imply count <= i + j.
                if i + j < m + n {
                    let mut clause = vec![!out[i + j]];
                    if i < m {
                        clause.push(a[i]);
                    }
                    if j < n {
                        clause.push(b[j]);
                    }
                    self.add_clause(&clause);
                }
            }
        }
        out
    }
}
