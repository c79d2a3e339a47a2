//! The circuit ownership boundary.

use crate::adjacency::AdjacencyLists;
use crate::cell::Cell;
use crate::signal::{BitLabel, SignalId};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// A loaded, validated circuit.
///
/// Owns the signal universe, the port and register-output sets, the cell
/// sequence (registers first, then a valid combinational topological order),
/// the net-name table and per-bit labels, and - once
/// [`build_adjacent_lists`](Circuit::build_adjacent_lists) has run - the
/// forward-connectivity overlays used by the verification procedures.
#[derive(Debug, Clone)]
pub struct Circuit {
    pub(crate) module_name: String,
    pub(crate) signals: HashSet<SignalId>,
    pub(crate) in_ports: HashSet<SignalId>,
    pub(crate) out_ports: HashSet<SignalId>,
    pub(crate) reg_outs: HashSet<SignalId>,
    pub(crate) cells: Vec<Cell>,
    pub(crate) nets: IndexMap<String, Vec<SignalId>>,
    pub(crate) bit_labels: HashMap<SignalId, BitLabel>,
    pub(crate) clock: Option<SignalId>,
    pub(crate) adjacency: Option<AdjacencyLists>,
}

impl Circuit {
    /// A circuit containing only the four constant signals.
    pub(crate) fn empty(module_name: &str) -> Circuit {
        let mut signals = HashSet::new();
        let mut bit_labels = HashMap::new();
        for (sig, label) in [
            (SignalId::S0, "constant 0"),
            (SignalId::S1, "constant 1"),
            (SignalId::SX, "constant x"),
            (SignalId::SZ, "constant z"),
        ] {
            signals.insert(sig);
            bit_labels.insert(sig, BitLabel::new(Arc::from(label), 0));
        }
        Circuit {
            module_name: module_name.to_string(),
            signals,
            in_ports: HashSet::new(),
            out_ports: HashSet::new(),
            reg_outs: HashSet::new(),
            cells: Vec::new(),
            nets: IndexMap::new(),
            bit_labels,
            clock: None,
            adjacency: None,
        }
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn sigs(&self) -> &HashSet<SignalId> {
        &self.signals
    }

    pub fn ins(&self) -> &HashSet<SignalId> {
        &self.in_ports
    }

    pub fn outs(&self) -> &HashSet<SignalId> {
        &self.out_ports
    }

    pub fn regs(&self) -> &HashSet<SignalId> {
        &self.reg_outs
    }

    pub fn nets(&self) -> &IndexMap<String, Vec<SignalId>> {
        &self.nets
    }

    pub fn has(&self, name: &str) -> bool {
        self.nets.contains_key(name)
    }

    pub fn net(&self, name: &str) -> Option<&[SignalId]> {
        self.nets.get(name).map(|bits| bits.as_slice())
    }

    /// The common clock of all registers, or `None` for purely
    /// combinational circuits.
    pub fn clock(&self) -> Option<SignalId> {
        self.clock
    }

    pub fn bit_label(&self, sig: SignalId) -> Option<&BitLabel> {
        self.bit_labels.get(&sig)
    }

    /// Label display that falls back to the raw id for unnamed bits.
    pub fn describe(&self, sig: SignalId) -> String {
        match self.bit_labels.get(&sig) {
            Some(label) => label.display(),
            None => format!("sig {sig}"),
        }
    }

    /// Computes the `conn_regs` / `conn_outs` / `previous_regs` overlays.
    pub fn build_adjacent_lists(&mut self) {
        self.adjacency = Some(AdjacencyLists::build(self));
    }

    pub fn has_adjacency(&self) -> bool {
        self.adjacency.is_some()
    }

    fn adjacency(&self) -> &AdjacencyLists {
        self.adjacency
            .as_ref()
            .expect("build_adjacent_lists must run before connectivity queries")
    }

    /// Register outputs reachable from `sig` through combinational logic.
    pub fn conn_regs(&self, sig: SignalId) -> &HashSet<SignalId> {
        self.adjacency().conn_regs(sig)
    }

    /// Primary outputs reachable from `sig` through combinational logic.
    pub fn conn_outs(&self, sig: SignalId) -> &HashSet<SignalId> {
        self.adjacency().conn_outs(sig)
    }

    /// Registers whose outputs combinationally reach register `sig`.
    pub fn prev_regs(&self, sig: SignalId) -> &HashSet<SignalId> {
        self.adjacency().prev_regs(sig)
    }

    pub fn stats(&self) -> CircuitStats {
        CircuitStats {
            cells: self.cells.len(),
            sigs: self.signals.len(),
            ins: self.in_ports.len(),
            outs: self.out_ports.len(),
            regs: self.reg_outs.len(),
            nets: self.nets.len(),
        }
    }
}

/// Size summary of a loaded circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitStats {
    pub cells: usize,
    pub sigs: usize,
    pub ins: usize,
    pub outs: usize,
    pub regs: usize,
    pub nets: usize,
}

impl fmt::Display for CircuitStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "******* Circuit Stats ********")?;
        writeln!(f, "Cells size: {}", self.cells)?;
        writeln!(f, "Sigs size: {}", self.sigs)?;
        writeln!(f, "Inputs size: {}", self.ins)?;
        writeln!(f, "Outputs size: {}", self.outs)?;
        writeln!(f, "Registers size: {}", self.regs)?;
        writeln!(f, "Nets size: {}", self.nets)
    }
}
