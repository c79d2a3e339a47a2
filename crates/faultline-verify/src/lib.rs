//! Fault-resistance verification procedures.
//!
//! The circuit is lifted into a dual-trace symbolic model: a *golden* and a
//! *faulty* execution share all primary inputs, registers start from
//! unconstrained (and independent) initial states, and fault-selector
//! variables decide where the faulty trace flips a bit. Two procedures drive
//! the solver over this model:
//!
//! - [`refine::run_partition_refinement`] (Procedure 1) merges register
//!   partitions until no assignment of at most `k` faults can corrupt more
//!   than `k` partitions one cycle later without tripping an alert.
//! - [`integrity::run_output_integrity`] (Procedure 2) enumerates fault
//!   assignments that corrupt a primary output without tripping an alert,
//!   against a fixed partitioning.

pub mod fault;
pub mod faultable;
pub mod integrity;
pub mod partitions;
pub mod refine;
pub mod unroll;

pub use fault::FaultSelector;
pub use faultable::compute_faultable_signals;
pub use integrity::{run_output_integrity, ExploitWitness, IntegrityOptions, IntegrityOutcome};
pub use partitions::{init_partitions, partition_info, Partition};
pub use refine::{run_partition_refinement, RefineOptions, RefineOutcome, MAX_ITER};
pub use unroll::DualTrace;

use faultline_netlist::SignalId;
use thiserror::Error;

/// Which gates the fault model may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateFaults {
    /// Combinational gates and registers.
    #[default]
    All,
    /// Registers only; the combinational fault budget is pinned to zero.
    Seq,
}

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("net `{0}` not found in circuit")]
    UnknownNet(String),
    #[error("net `{name}` is {expected} bits wide but {got} values were given")]
    WidthMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("partition entry {0} is not a register output")]
    NotARegister(SignalId),
    #[error("register {0} appears in more than one partition")]
    OverlappingPartitions(SignalId),
    #[error("partitioning does not cover all register outputs")]
    IncompletePartitioning,
    #[error("partitioning contains an empty partition")]
    EmptyPartition,
    #[error(transparent)]
    Dump(#[from] faultline_dump::DumpError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type VerifyResult<T> = Result<T, VerifyError>;
