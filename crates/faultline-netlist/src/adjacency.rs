//! Forward-connectivity overlays, computed by one backward pass.
//!
//! For every signal `s` the overlays record which register outputs
//! (`conn_regs`) and which primary outputs (`conn_outs`) are reachable from
//! `s` through combinational logic only. Both are computed in reverse
//! combinational topological order; since many signals share the same
//! successor sets, set values are interned in an arena and referenced by
//! index. Index 0 is the canonical empty set. A shared set is never mutated
//! after interning.

use crate::cell::Cell;
use crate::circuit::Circuit;
use crate::signal::SignalId;
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct AdjacencyLists {
    sets: Vec<HashSet<SignalId>>,
    conn_regs: HashMap<SignalId, usize>,
    conn_outs: HashMap<SignalId, usize>,
    prev_regs: HashMap<SignalId, HashSet<SignalId>>,
}

impl AdjacencyLists {
    pub(crate) fn build(circuit: &Circuit) -> AdjacencyLists {
        let mut lists = AdjacencyLists {
            sets: vec![HashSet::new()],
            conn_regs: HashMap::new(),
            conn_outs: HashMap::new(),
            prev_regs: HashMap::new(),
        };

        // Consumers of each signal.
        let mut consumers: HashMap<SignalId, Vec<usize>> = HashMap::new();
        for (idx, cell) in circuit.cells().iter().enumerate() {
            for input in cell.inputs() {
                consumers.entry(input).or_default().push(idx);
            }
        }

        // Constants, then inputs, then cell outputs in the circuit's
        // registers-first topological order.
        let mut order: Vec<SignalId> = Vec::with_capacity(circuit.cells().len() + 8);
        order.extend(SignalId::CONSTANTS);
        let mut inputs: Vec<SignalId> = circuit
            .ins()
            .iter()
            .copied()
            .filter(|sig| !sig.is_const())
            .collect();
        inputs.sort_unstable();
        order.extend(inputs);
        order.extend(circuit.cells().iter().map(Cell::output));

        let empty: Vec<usize> = Vec::new();
        for &sig in order.iter().rev() {
            let mut direct_regs: HashSet<SignalId> = HashSet::new();
            let mut direct_outs: HashSet<SignalId> = HashSet::new();
            let mut reg_sources: BTreeSet<usize> = BTreeSet::new();
            let mut out_sources: BTreeSet<usize> = BTreeSet::new();

            if circuit.outs().contains(&sig) {
                direct_outs.insert(sig);
            }

            for &idx in consumers.get(&sig).unwrap_or(&empty) {
                let cell = &circuit.cells()[idx];
                if cell.is_register() {
                    direct_regs.insert(cell.output());
                } else {
                    let downstream = cell.output();
                    let reg_set = lists.conn_regs[&downstream];
                    if reg_set != 0 {
                        reg_sources.insert(reg_set);
                    }
                    let out_set = lists.conn_outs[&downstream];
                    if out_set != 0 {
                        out_sources.insert(out_set);
                    }
                }
            }

            let reg_id = lists.intern(direct_regs, &reg_sources);
            lists.conn_regs.insert(sig, reg_id);
            let out_id = lists.intern(direct_outs, &out_sources);
            lists.conn_outs.insert(sig, out_id);
        }

        for &reg in circuit.regs() {
            let set = lists.conn_regs[&reg];
            for &target in &lists.sets[set].clone() {
                lists.prev_regs.entry(target).or_default().insert(reg);
            }
        }

        lists
    }

    /// Places a successor set in the arena. A single non-empty source with
    /// no direct members is shared by reference; anything else allocates.
    fn intern(&mut self, direct: HashSet<SignalId>, sources: &BTreeSet<usize>) -> usize {
        if sources.is_empty() && direct.is_empty() {
            return 0;
        }
        if sources.is_empty() {
            self.sets.push(direct);
            return self.sets.len() - 1;
        }
        if sources.len() == 1 && direct.is_empty() {
            return *sources.iter().next().expect("non-empty source set");
        }
        let mut merged = direct;
        for &source in sources {
            merged.extend(self.sets[source].iter().copied());
        }
        self.sets.push(merged);
        self.sets.len() - 1
    }

    pub fn conn_regs(&self, sig: SignalId) -> &HashSet<SignalId> {
        let id = self.conn_regs.get(&sig).copied().unwrap_or(0);
        &self.sets[id]
    }

    pub fn conn_outs(&self, sig: SignalId) -> &HashSet<SignalId> {
        let id = self.conn_outs.get(&sig).copied().unwrap_or(0);
        &self.sets[id]
    }

    pub fn prev_regs(&self, sig: SignalId) -> &HashSet<SignalId> {
        self.prev_regs.get(&sig).unwrap_or(&self.sets[0])
    }
}
