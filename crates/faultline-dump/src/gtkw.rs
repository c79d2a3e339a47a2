//! GTKWave savefile generation.
//!
//! Groups the `diff` bits of the initially-faulty and next-cycle-faulty
//! partitions so a witness opens pre-organized in the viewer.

use crate::DumpResult;
use faultline_netlist::{Circuit, SignalId};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const OPEN_GROUP: &str = "@800200";
const CLOSE_GROUP: &str = "@1000200";
const DISPLAY_BINARY: &str = "@8";

/// Writes `<dumpfile stem>.gtkw` next to the VCD file.
pub fn write_gtkw_savefile(
    vcd_path: impl AsRef<Path>,
    faulty_initial: &[usize],
    faulty_next: &[usize],
    partitions: &[HashSet<SignalId>],
    circuit: &Circuit,
) -> DumpResult<()> {
    let vcd_path = vcd_path.as_ref();
    let save_path = vcd_path.with_extension("gtkw");
    let mut out = BufWriter::new(File::create(save_path)?);

    writeln!(out, "[*] Fault analysis result")?;
    let base = vcd_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    writeln!(out, "[dumpfile] \"{base}\"")?;

    for (title, indexes) in [("initial faulty", faulty_initial), ("next faulty", faulty_next)] {
        for &idx in indexes {
            writeln!(out, "{OPEN_GROUP}")?;
            writeln!(out, "-{title} {idx}")?;
            writeln!(out, "{DISPLAY_BINARY}")?;
            let mut sigs: Vec<SignalId> = partitions[idx].iter().copied().collect();
            sigs.sort_unstable();
            for sig in sigs {
                if let Some(label) = circuit.bit_label(sig) {
                    let name = label.name().replace(':', "_");
                    writeln!(out, "diff.\\{name}[{}]", label.pos())?;
                }
            }
            writeln!(out, "{CLOSE_GROUP}")?;
            writeln!(out, "-{title} {idx}")?;
        }
    }
    Ok(())
}
