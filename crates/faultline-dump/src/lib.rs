//! Dump writers for analysis artifacts: dual-trace VCD waveforms, GTKWave
//! savefiles grouping faulty partitions, and partitioning JSON files.

mod gtkw;
mod partitioning;
mod vcd;

pub use gtkw::write_gtkw_savefile;
pub use partitioning::write_partitioning;
pub use vcd::{dump_vcd, VcdFilter};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DumpError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type DumpResult<T> = Result<T, DumpError>;

/// Timestamp tag embedded in dump file names.
pub fn time_tag() -> String {
    chrono::Local::now().format("%y.%m.%d@%H.%M.%S").to_string()
}
