//! Dual-trace VCD writer.
//!
//! Three scopes are emitted over the same wire set: `golden` and `faulty`
//! carry the model values of the two traces, `diff` shows `x` wherever they
//! disagree. Each cycle occupies 1000 ticks with a clock pulse dropping at
//! +500.

use crate::DumpResult;
use faultline_netlist::{Circuit, SignalId};
use faultline_sat::{Lit, SatCtx};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Which named wires land in the dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcdFilter {
    All,
    /// Only register outputs (and the clock pulse).
    RegsOnly,
}

fn vcd_identifier(sig: SignalId) -> String {
    format!("s{}", sig.raw())
}

fn sanitize(name: &str) -> String {
    let cleaned = name.replace(':', "_");
    if cleaned.contains('$') {
        format!("\\{cleaned}")
    } else {
        cleaned
    }
}

fn write_diff(out: &mut impl Write, id: &str, golden: bool, faulty: bool) -> std::io::Result<()> {
    if golden != faulty {
        writeln!(out, "bx d{id}")
    } else {
        writeln!(out, "b{} d{id}", golden as u8)
    }
}

/// Writes the two traces as a VCD file; values are read from the model of
/// the last satisfiable check.
pub fn dump_vcd(
    path: impl AsRef<Path>,
    circuit: &Circuit,
    ctx: &SatCtx,
    golden_trace: &[HashMap<SignalId, Lit>],
    faulty_trace: &[HashMap<SignalId, Lit>],
    filter: VcdFilter,
) -> DumpResult<()> {
    assert_eq!(golden_trace.len(), faulty_trace.len());
    let mut out = BufWriter::new(File::create(path)?);

    writeln!(out, "$date")?;
    writeln!(out, "\t{}", chrono::Local::now().format("%a %b %e %T %Y"))?;
    writeln!(out, "$end")?;
    writeln!(out, "$version")?;
    writeln!(out, "\tfaultline {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(out, "$end")?;
    writeln!(out, "$timescale")?;
    writeln!(out, "\t1ps")?;
    writeln!(out, "$end")?;

    // Elect the wires to dump and their identifiers.
    let mut in_vcd: Vec<(SignalId, String)> = Vec::new();
    let mut scope_entries: Vec<(String, String, usize)> = Vec::new();
    let mut seen: HashSet<SignalId> = HashSet::new();
    for (name, bits) in circuit.nets() {
        if filter == VcdFilter::RegsOnly {
            let first = bits.first().copied();
            let is_reg = first.map(|sig| circuit.regs().contains(&sig)).unwrap_or(false);
            let is_clock = first == circuit.clock();
            if !is_reg && !is_clock {
                continue;
            }
        }
        let display = sanitize(name);
        for (pos, &sig) in bits.iter().enumerate().rev() {
            let id = vcd_identifier(sig);
            if seen.insert(sig) {
                in_vcd.push((sig, id.clone()));
            }
            scope_entries.push((id, display.clone(), pos));
        }
    }
    // The clock gets explicit pulses instead of model values.
    if let Some(clock) = circuit.clock() {
        in_vcd.retain(|(sig, _)| *sig != clock);
    }
    in_vcd.sort_by_key(|(sig, _)| *sig);

    for (scope, prefix) in [("golden", "g"), ("faulty", "f"), ("diff", "d")] {
        writeln!(out, "$scope module {scope} $end")?;
        for (id, name, pos) in &scope_entries {
            writeln!(out, "\t$var wire 1 {prefix}{id} {name}[{pos}] $end")?;
        }
        writeln!(out, "$upscope $end")?;
    }
    writeln!(out, "$enddefinitions $end")?;

    if golden_trace.is_empty() {
        return Ok(());
    }

    let clock_id = circuit.clock().map(vcd_identifier);
    let mut tick: u64 = 0;
    for cycle in 0..golden_trace.len() {
        writeln!(out, "#{tick}")?;
        if cycle == 0 {
            writeln!(out, "$dumpvars")?;
        }
        if let Some(id) = &clock_id {
            for prefix in ["g", "f", "d"] {
                writeln!(out, "b1 {prefix}{id}")?;
            }
        }

        let golden = &golden_trace[cycle];
        let faulty = &faulty_trace[cycle];
        for (sig, id) in &in_vcd {
            match (golden.get(sig), faulty.get(sig)) {
                (Some(&g), Some(&f)) => {
                    let val_g = ctx.value(g);
                    let val_f = ctx.value(f);
                    let changed = |prev: Option<&Lit>, curr: bool| match prev {
                        Some(&lit) => ctx.value(lit) != curr,
                        None => true,
                    };
                    let prev_g = (cycle > 0).then(|| golden_trace[cycle - 1].get(sig)).flatten();
                    let prev_f = (cycle > 0).then(|| faulty_trace[cycle - 1].get(sig)).flatten();
                    if cycle == 0 || changed(prev_g, val_g) {
                        writeln!(out, "b{} g{id}", val_g as u8)?;
                    }
                    if cycle == 0 || changed(prev_f, val_f) {
                        writeln!(out, "b{} f{id}", val_f as u8)?;
                    }
                    if cycle == 0 || changed(prev_g, val_g) || changed(prev_f, val_f) {
                        write_diff(&mut out, id, val_g, val_f)?;
                    }
                }
                _ if cycle == 0 => {
                    // Bits outside an extracted slice have no value.
                    for prefix in ["g", "f", "d"] {
                        writeln!(out, "bz {prefix}{id}")?;
                    }
                }
                _ => {}
            }
        }
        if cycle == 0 {
            writeln!(out, "$end")?;
        }

        if let Some(id) = &clock_id {
            writeln!(out, "#{}", tick + 500)?;
            for prefix in ["g", "f", "d"] {
                writeln!(out, "b0 {prefix}{id}")?;
            }
        }
        tick += 1000;
    }
    writeln!(out, "#{tick}")?;
    Ok(())
}
