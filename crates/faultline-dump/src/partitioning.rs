//! Partitioning JSON dumps: partition index (as a string key) to the sorted
//! list of register-output ids.

use crate::DumpResult;
use faultline_netlist::SignalId;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub fn write_partitioning(
    path: impl AsRef<Path>,
    partitions: &[HashSet<SignalId>],
) -> DumpResult<()> {
    let mut doc = serde_json::Map::new();
    for (idx, partition) in partitions.iter().enumerate() {
        let mut sigs: Vec<SignalId> = partition.iter().copied().collect();
        sigs.sort_unstable();
        doc.insert(idx.to_string(), serde_json::to_value(sigs)?);
    }
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut out, &serde_json::Value::Object(doc))?;
    out.flush()?;
    Ok(())
}
