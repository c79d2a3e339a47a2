//! Gate-level circuit model for fault-resistance verification.
//!
//! This crate loads a structural netlist (the JSON export of a synthesized
//! design) into a [`Circuit`]: canonical bit-level signals, a closed set of
//! cell variants, and a cell sequence ordered registers-first followed by a
//! valid combinational topological order. On top of the loaded circuit it
//! computes the connectivity overlays the verification procedures depend on:
//!
//! ```text
//! netlist JSON → Circuit → build_adjacent_lists → conn_regs / conn_outs
//!                    ↓
//!          extract_subcircuit (optional interface-driven slice)
//! ```
//!
//! Key types:
//! - [`SignalId`] - bit-level signal identifier with reserved constant bits
//! - [`Cell`] / [`CellKind`] - tagged cell variants with a uniform output slot
//! - [`Circuit`] - ownership boundary over signals, cells, nets and overlays
//! - [`GateOps`] - the value abstraction the cell evaluator is generic over

pub mod adjacency;
pub mod cell;
pub mod circuit;
pub mod loader;
pub mod signal;
pub mod subcircuit;

pub use cell::{
    BinaryOp, BoolOps, Cell, CellKind, ClockEdge, EnablePort, FlipFlop, GateOps, Polarity,
    ResetPort, UnaryOp,
};
pub use circuit::{Circuit, CircuitStats};
pub use signal::{BitLabel, ConstBit, SignalId};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetlistError {
    #[error("illegal port direction `{0}`")]
    IllegalPortDirection(String),
    #[error("illegal signal list for `{0}`")]
    IllegalSignalList(String),
    #[error("illegal signal reference in `{0}`")]
    IllegalSignalType(String),
    #[error("unknown cell type `{0}`")]
    IllegalCellType(String),
    #[error("cell `{cell}` has no connection for port {port}")]
    MissingConnection { cell: String, port: char },
    #[error("name `{0}` redeclared with different bits")]
    IllegalNameRedeclaration(String),
    #[error("cell `{0}` reads its own output")]
    IllegalCellCycle(String),
    #[error("netlist references signals that are never produced")]
    IllegalMissingSignals,
    #[error("combinational loop through cell `{0}`")]
    CombinationalLoop(String),
    #[error("register `{0}` is clocked by a constant")]
    IllegalClockSignal(String),
    #[error("register `{0}` disagrees on the clock signal")]
    IllegalMultipleClocks(String),
    #[error("registers disagree on the clock edge")]
    IllegalClockEdge,
    #[error("module `{0}` not found in netlist")]
    UnknownModule(String),
    #[error("subcircuit reads top-level input {0} outside its interface")]
    SubcircuitMissingInput(SignalId),
    #[error("subcircuit internal signal {0} is a top-level output but not a subcircuit output")]
    SubcircuitImplicitOutput(SignalId),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type NetlistResult<T> = Result<T, NetlistError>;
