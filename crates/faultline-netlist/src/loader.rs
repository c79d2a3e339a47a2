//! Netlist decoding and circuit validation.
//!
//! The input is the JSON export of a synthesized design: a `modules` table
//! whose entries carry `ports`, `cells` and `netnames` sub-tables. Bits are
//! either integers (wire ids, starting at 2) or the constant tokens `"0"`,
//! `"1"`, `"x"`, `"z"`.
//!
//! Loading follows a fixed order: constants and input ports seed the signal
//! universe, cells are resolved in declaration order against a pending set,
//! clock consistency is checked across all registers, the cell list is
//! linearized registers-first, and finally net names are merged in and bit
//! labels elected.

use crate::cell::{cell_type_from_str, Cell, CellKind, FlipFlop, ParsedCellType};
use crate::cell::{EnablePort, ResetPort};
use crate::circuit::Circuit;
use crate::signal::{BitLabel, ConstBit, SignalId};
use crate::{NetlistError, NetlistResult};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub(crate) struct NetlistDoc {
    pub(crate) modules: IndexMap<String, ModuleDoc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModuleDoc {
    #[serde(default)]
    pub(crate) ports: IndexMap<String, PortDoc>,
    #[serde(default)]
    pub(crate) cells: IndexMap<String, CellDoc>,
    #[serde(default)]
    pub(crate) netnames: IndexMap<String, NetDoc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PortDoc {
    pub(crate) direction: String,
    pub(crate) bits: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CellDoc {
    #[serde(rename = "type")]
    pub(crate) cell_type: String,
    #[serde(default)]
    pub(crate) connections: IndexMap<String, Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NetDoc {
    pub(crate) bits: Value,
}

impl Circuit {
    pub fn from_json_file(path: impl AsRef<Path>, module_name: &str) -> NetlistResult<Circuit> {
        let data = std::fs::read_to_string(path)?;
        Circuit::from_json_str(&data, module_name)
    }

    pub fn from_json_str(data: &str, module_name: &str) -> NetlistResult<Circuit> {
        let doc: NetlistDoc = serde_json::from_str(data)?;
        let module = doc
            .modules
            .get(module_name)
            .ok_or_else(|| NetlistError::UnknownModule(module_name.to_string()))?;
        build_circuit(module_name, module)
    }
}

fn build_circuit(module_name: &str, module: &ModuleDoc) -> NetlistResult<Circuit> {
    let mut circuit = Circuit::empty(module_name);

    register_ports(&mut circuit, &module.ports)?;
    resolve_cells(&mut circuit, &module.cells)?;
    determine_clock(&mut circuit)?;
    linearize(&mut circuit)?;
    merge_netnames(&mut circuit, &module.netnames)?;

    Ok(circuit)
}

/// Converts a JSON bit (wire id or constant token) into a signal id.
pub(crate) fn signal_from_value(bit: &Value, context: &str) -> NetlistResult<SignalId> {
    if let Some(n) = bit.as_u64() {
        // Wire ids start at 2; anything else would collide with a constant.
        if n < 2 || n >= u64::from(SignalId::SX.raw()) {
            return Err(NetlistError::IllegalSignalType(context.to_string()));
        }
        return Ok(SignalId::from_raw(n as u32));
    }
    if let Some(token) = bit.as_str() {
        return ConstBit::from_token(token)
            .map(SignalId::from_const)
            .ok_or_else(|| NetlistError::IllegalSignalType(context.to_string()));
    }
    Err(NetlistError::IllegalSignalType(context.to_string()))
}

pub(crate) fn signal_list(bits: &Value, context: &str) -> NetlistResult<Vec<SignalId>> {
    let array = bits
        .as_array()
        .ok_or_else(|| NetlistError::IllegalSignalList(context.to_string()))?;
    array
        .iter()
        .map(|bit| signal_from_value(bit, context))
        .collect()
}

/// Registers the module ports: net names, bit labels, port sets. Input port
/// bits join the known-signal set; output bits must be produced later.
pub(crate) fn register_ports(
    circuit: &mut Circuit,
    ports: &IndexMap<String, PortDoc>,
) -> NetlistResult<()> {
    for (name, port) in ports {
        let is_input = match port.direction.as_str() {
            "input" => true,
            "output" => false,
            other => return Err(NetlistError::IllegalPortDirection(other.to_string())),
        };
        let bits = signal_list(&port.bits, name)?;

        if circuit.nets.contains_key(name) {
            return Err(NetlistError::IllegalNameRedeclaration(name.clone()));
        }
        circuit.nets.insert(name.clone(), bits.clone());
        add_bit_labels(circuit, name, &bits);

        for &sig in &bits {
            if is_input {
                circuit.in_ports.insert(sig);
                circuit.signals.insert(sig);
            } else {
                circuit.out_ports.insert(sig);
            }
        }
    }
    Ok(())
}

pub(crate) fn add_bit_labels(circuit: &mut Circuit, name: &str, bits: &[SignalId]) {
    let shared: Arc<str> = Arc::from(name);
    for (pos, &sig) in bits.iter().enumerate() {
        let label = BitLabel::new(shared.clone(), pos as u32);
        match circuit.bit_labels.get(&sig) {
            Some(existing) if !label.prefer_over(existing) => {}
            _ => {
                circuit.bit_labels.insert(sig, label);
            }
        }
    }
}

fn resolve_cells(circuit: &mut Circuit, cells: &IndexMap<String, CellDoc>) -> NetlistResult<()> {
    let mut pending: HashSet<SignalId> = HashSet::new();

    for (cell_name, cell_doc) in cells {
        // Formal-only cells carry no gate semantics.
        if cell_doc.cell_type == "$assert" {
            log::debug!("skipping formal-only cell `{cell_name}`");
            continue;
        }
        let parsed = cell_type_from_str(&cell_doc.cell_type)
            .ok_or_else(|| NetlistError::IllegalCellType(cell_doc.cell_type.clone()))?;
        let cell = bind_cell(cell_name, parsed, &cell_doc.connections)?;

        for input in cell.inputs() {
            if !circuit.signals.contains(&input) {
                pending.insert(input);
            }
        }
        let output = cell.output();
        if !circuit.signals.insert(output) {
            return Err(NetlistError::IllegalNameRedeclaration(cell_name.clone()));
        }
        pending.remove(&output);
        if cell.is_register() {
            circuit.reg_outs.insert(output);
        }
        circuit.cells.push(cell);
    }

    if !pending.is_empty() {
        return Err(NetlistError::IllegalMissingSignals);
    }
    for sig in &circuit.out_ports {
        if !circuit.signals.contains(sig) {
            return Err(NetlistError::IllegalMissingSignals);
        }
    }
    Ok(())
}

/// Resolves the connection table of one cell against its parsed shape.
fn bind_cell(
    name: &str,
    parsed: ParsedCellType,
    connections: &IndexMap<String, Value>,
) -> NetlistResult<Cell> {
    let bit = |port: char| -> NetlistResult<SignalId> {
        let value = connections
            .get(port.to_string().as_str())
            .ok_or_else(|| NetlistError::MissingConnection {
                cell: name.to_string(),
                port,
            })?;
        let bits = signal_list(value, name)?;
        bits.first()
            .copied()
            .ok_or_else(|| NetlistError::IllegalSignalList(name.to_string()))
    };
    let no_cycle = |input: SignalId, output: SignalId| -> NetlistResult<()> {
        if input == output {
            return Err(NetlistError::IllegalCellCycle(name.to_string()));
        }
        Ok(())
    };

    let kind = match parsed {
        ParsedCellType::Unary(op) => {
            let a = bit('A')?;
            let y = bit('Y')?;
            no_cycle(a, y)?;
            CellKind::Unary { op, a, y }
        }
        ParsedCellType::Binary(op) => {
            let a = bit('A')?;
            let b = bit('B')?;
            let y = bit('Y')?;
            no_cycle(a, y)?;
            no_cycle(b, y)?;
            CellKind::Binary { op, a, b, y }
        }
        ParsedCellType::Mux => {
            let a = bit('A')?;
            let b = bit('B')?;
            let s = bit('S')?;
            let y = bit('Y')?;
            no_cycle(a, y)?;
            no_cycle(b, y)?;
            no_cycle(s, y)?;
            CellKind::Mux { a, b, s, y }
        }
        ParsedCellType::Dff { edge, reset, enable } => {
            let clk = bit('C')?;
            let d = bit('D')?;
            let q = bit('Q')?;
            // D may equal Q (a hold loop through time); the control ports
            // may not.
            no_cycle(clk, q)?;
            let reset = match reset {
                Some((active, value, sync)) => {
                    let sig = bit('R')?;
                    no_cycle(sig, q)?;
                    Some(ResetPort {
                        sig,
                        active,
                        value,
                        sync,
                    })
                }
                None => None,
            };
            let enable = match enable {
                Some(active) => {
                    let sig = bit('E')?;
                    no_cycle(sig, q)?;
                    Some(EnablePort { sig, active })
                }
                None => None,
            };
            CellKind::Dff(FlipFlop {
                clk,
                edge,
                d,
                q,
                reset,
                enable,
            })
        }
    };
    Ok(Cell::new(name, kind))
}

/// Determines the common clock and checks edge consistency.
fn determine_clock(circuit: &mut Circuit) -> NetlistResult<()> {
    let mut clock: Option<SignalId> = None;
    let mut rising = false;
    let mut falling = false;

    for cell in &circuit.cells {
        let CellKind::Dff(ff) = cell.kind() else {
            continue;
        };
        match ff.edge {
            crate::cell::ClockEdge::Rising => rising = true,
            crate::cell::ClockEdge::Falling => falling = true,
        }
        if ff.clk.is_const() {
            return Err(NetlistError::IllegalClockSignal(cell.name().to_string()));
        }
        match clock {
            None => clock = Some(ff.clk),
            Some(existing) if existing != ff.clk => {
                return Err(NetlistError::IllegalMultipleClocks(cell.name().to_string()));
            }
            Some(_) => {}
        }
    }
    if rising && falling {
        return Err(NetlistError::IllegalClockEdge);
    }
    circuit.clock = clock;
    Ok(())
}

/// Reorders the cell list: registers first (their outputs pre-visited), then
/// combinational cells by repeated scans until every cell has all inputs
/// visited.
fn linearize(circuit: &mut Circuit) -> NetlistResult<()> {
    let cells = std::mem::take(&mut circuit.cells);

    let mut visited: HashSet<SignalId> = circuit.in_ports.iter().copied().collect();
    visited.extend(SignalId::CONSTANTS);

    let mut emitted = vec![false; cells.len()];
    let mut order: Vec<usize> = Vec::with_capacity(cells.len());

    for (idx, cell) in cells.iter().enumerate() {
        if cell.is_register() {
            emitted[idx] = true;
            order.push(idx);
            visited.insert(cell.output());
        }
    }

    while order.len() != cells.len() {
        let mut progressed = false;
        for (idx, cell) in cells.iter().enumerate() {
            if emitted[idx] {
                continue;
            }
            if cell.inputs().iter().all(|sig| visited.contains(sig)) {
                visited.insert(cell.output());
                emitted[idx] = true;
                order.push(idx);
                progressed = true;
            }
        }
        if !progressed {
            let culprit = cells
                .iter()
                .enumerate()
                .find(|(idx, _)| !emitted[*idx])
                .map(|(_, cell)| cell.name().to_string())
                .unwrap_or_default();
            return Err(NetlistError::CombinationalLoop(culprit));
        }
    }

    let mut slots: Vec<Option<Cell>> = cells.into_iter().map(Some).collect();
    circuit.cells = order
        .into_iter()
        .map(|idx| slots[idx].take().expect("cell emitted twice"))
        .collect();
    Ok(())
}

/// Merges the `netnames` table: redeclarations must match bit-for-bit, new
/// names join the table and take part in label election.
fn merge_netnames(circuit: &mut Circuit, netnames: &IndexMap<String, NetDoc>) -> NetlistResult<()> {
    for (name, net) in netnames {
        let bits = signal_list(&net.bits, name)?;
        if let Some(existing) = circuit.nets.get(name) {
            if *existing != bits {
                return Err(NetlistError::IllegalNameRedeclaration(name.clone()));
            }
        } else {
            circuit.nets.insert(name.clone(), bits.clone());
            add_bit_labels(circuit, name, &bits);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{BinaryOp, UnaryOp};

    fn sig(raw: u32) -> SignalId {
        SignalId::from_raw(raw)
    }

    // One input, one register, an inverter ahead of the register and a
    // buffer behind it. The inverter is declared after its consumer so the
    // linearization has to reorder.
    const SMALL: &str = r#"{
        "modules": {
            "top": {
                "ports": {
                    "clk": { "direction": "input", "bits": [2] },
                    "din": { "direction": "input", "bits": [3] },
                    "dout": { "direction": "output", "bits": [6] }
                },
                "cells": {
                    "out_buf": { "type": "$_BUF_", "connections": { "A": [5], "Y": [6] } },
                    "state": { "type": "$_DFF_P_", "connections": { "C": [2], "D": [4], "Q": [5] } },
                    "inv": { "type": "$_NOT_", "connections": { "A": [3], "Y": [4] } }
                },
                "netnames": {
                    "din_n": { "bits": [4] },
                    "state_q": { "bits": [5] }
                }
            }
        }
    }"#;

    #[test]
    fn loads_and_orders_small_circuit() {
        let circuit = Circuit::from_json_str(SMALL, "top").unwrap();
        assert_eq!(circuit.clock(), Some(sig(2)));
        assert_eq!(circuit.regs().len(), 1);
        assert!(circuit.regs().contains(&sig(5)));
        assert_eq!(circuit.ins().len(), 2);
        assert_eq!(circuit.outs().len(), 1);

        // Registers first, then combinational cells in dependency order.
        let names: Vec<&str> = circuit.cells().iter().map(|c| c.name()).collect();
        assert_eq!(names, ["state", "inv", "out_buf"]);

        let stats = circuit.stats();
        assert_eq!(stats.cells, 3);
        assert_eq!(stats.regs, 1);
    }

    #[test]
    fn every_signal_has_one_producer() {
        let circuit = Circuit::from_json_str(SMALL, "top").unwrap();
        let mut producers: std::collections::HashMap<SignalId, usize> =
            std::collections::HashMap::new();
        for cell in circuit.cells() {
            *producers.entry(cell.output()).or_default() += 1;
        }
        for sig in circuit.sigs() {
            if sig.is_const() {
                continue;
            }
            let from_cells = producers.get(sig).copied().unwrap_or(0);
            let from_ports = usize::from(circuit.ins().contains(sig));
            assert_eq!(from_cells + from_ports, 1, "signal {sig}");
        }
    }

    #[test]
    fn topological_invariant_holds() {
        let circuit = Circuit::from_json_str(SMALL, "top").unwrap();
        let mut seen: HashSet<SignalId> = circuit.ins().iter().copied().collect();
        seen.extend(SignalId::CONSTANTS);
        for cell in circuit.cells() {
            if cell.is_register() {
                seen.insert(cell.output());
            }
        }
        for cell in circuit.cells() {
            if cell.is_register() {
                continue;
            }
            for input in cell.inputs() {
                assert!(seen.contains(&input), "{} reads unseen {input}", cell.name());
            }
            seen.insert(cell.output());
        }
    }

    #[test]
    fn rejects_self_loop() {
        let doc = r#"{ "modules": { "m": {
            "ports": { "a": { "direction": "input", "bits": [2] } },
            "cells": { "g": { "type": "$_AND_", "connections": { "A": [2], "B": [3], "Y": [3] } } },
            "netnames": {}
        } } }"#;
        let err = Circuit::from_json_str(doc, "m").unwrap_err();
        assert!(matches!(err, NetlistError::IllegalCellCycle(_)));
    }

    #[test]
    fn rejects_combinational_loop() {
        let doc = r#"{ "modules": { "m": {
            "ports": { "a": { "direction": "input", "bits": [2] } },
            "cells": {
                "g1": { "type": "$_AND_", "connections": { "A": [2], "B": [4], "Y": [3] } },
                "g2": { "type": "$_NOT_", "connections": { "A": [3], "Y": [4] } }
            },
            "netnames": {}
        } } }"#;
        let err = Circuit::from_json_str(doc, "m").unwrap_err();
        assert!(matches!(err, NetlistError::CombinationalLoop(_)));
    }

    #[test]
    fn rejects_output_redeclaration() {
        let doc = r#"{ "modules": { "m": {
            "ports": { "a": { "direction": "input", "bits": [2] } },
            "cells": {
                "g1": { "type": "$_NOT_", "connections": { "A": [2], "Y": [3] } },
                "g2": { "type": "$_BUF_", "connections": { "A": [2], "Y": [3] } }
            },
            "netnames": {}
        } } }"#;
        let err = Circuit::from_json_str(doc, "m").unwrap_err();
        assert!(matches!(err, NetlistError::IllegalNameRedeclaration(_)));
    }

    #[test]
    fn rejects_unproduced_signals() {
        let doc = r#"{ "modules": { "m": {
            "ports": { "y": { "direction": "output", "bits": [3] } },
            "cells": { "g": { "type": "$_NOT_", "connections": { "A": [9], "Y": [3] } } },
            "netnames": {}
        } } }"#;
        let err = Circuit::from_json_str(doc, "m").unwrap_err();
        assert!(matches!(err, NetlistError::IllegalMissingSignals));
    }

    #[test]
    fn rejects_clock_inconsistencies() {
        let two_clocks = r#"{ "modules": { "m": {
            "ports": {
                "c1": { "direction": "input", "bits": [2] },
                "c2": { "direction": "input", "bits": [3] },
                "d": { "direction": "input", "bits": [4] }
            },
            "cells": {
                "r1": { "type": "$_DFF_P_", "connections": { "C": [2], "D": [4], "Q": [5] } },
                "r2": { "type": "$_DFF_P_", "connections": { "C": [3], "D": [4], "Q": [6] } }
            },
            "netnames": {}
        } } }"#;
        assert!(matches!(
            Circuit::from_json_str(two_clocks, "m").unwrap_err(),
            NetlistError::IllegalMultipleClocks(_)
        ));

        let mixed_edges = r#"{ "modules": { "m": {
            "ports": {
                "c": { "direction": "input", "bits": [2] },
                "d": { "direction": "input", "bits": [3] }
            },
            "cells": {
                "r1": { "type": "$_DFF_P_", "connections": { "C": [2], "D": [3], "Q": [4] } },
                "r2": { "type": "$_DFF_N_", "connections": { "C": [2], "D": [3], "Q": [5] } }
            },
            "netnames": {}
        } } }"#;
        assert!(matches!(
            Circuit::from_json_str(mixed_edges, "m").unwrap_err(),
            NetlistError::IllegalClockEdge
        ));

        let const_clock = r#"{ "modules": { "m": {
            "ports": { "d": { "direction": "input", "bits": [2] } },
            "cells": {
                "r": { "type": "$_DFF_P_", "connections": { "C": ["1"], "D": [2], "Q": [3] } }
            },
            "netnames": {}
        } } }"#;
        assert!(matches!(
            Circuit::from_json_str(const_clock, "m").unwrap_err(),
            NetlistError::IllegalClockSignal(_)
        ));
    }

    #[test]
    fn rejects_unknown_cell_type() {
        let doc = r#"{ "modules": { "m": {
            "ports": { "a": { "direction": "input", "bits": [2] } },
            "cells": { "g": { "type": "$_LATCH_P_", "connections": { "E": [2], "D": [2], "Q": [3] } } },
            "netnames": {}
        } } }"#;
        assert!(matches!(
            Circuit::from_json_str(doc, "m").unwrap_err(),
            NetlistError::IllegalCellType(_)
        ));
    }

    #[test]
    fn skips_assert_cells() {
        let doc = r#"{ "modules": { "m": {
            "ports": { "a": { "direction": "input", "bits": [2] } },
            "cells": {
                "chk": { "type": "$assert", "connections": { "A": [2] } },
                "g": { "type": "$_NOT_", "connections": { "A": [2], "Y": [3] } }
            },
            "netnames": {}
        } } }"#;
        let circuit = Circuit::from_json_str(doc, "m").unwrap();
        assert_eq!(circuit.cells().len(), 1);
    }

    #[test]
    fn net_redeclaration_must_match() {
        let doc = r#"{ "modules": { "m": {
            "ports": { "a": { "direction": "input", "bits": [2, 3] } },
            "cells": {},
            "netnames": { "a": { "bits": [2, 4] } }
        } } }"#;
        assert!(matches!(
            Circuit::from_json_str(doc, "m").unwrap_err(),
            NetlistError::IllegalNameRedeclaration(_)
        ));
    }

    #[test]
    fn elects_preferred_bit_labels() {
        let doc = r#"{ "modules": { "m": {
            "ports": { "a": { "direction": "input", "bits": [2] } },
            "cells": { "g": { "type": "$_NOT_", "connections": { "A": [2], "Y": [3] } } },
            "netnames": {
                "_synthesized_wire": { "bits": [3] },
                "core.result": { "bits": [3] },
                "res": { "bits": [3] }
            }
        } } }"#;
        let circuit = Circuit::from_json_str(doc, "m").unwrap();
        assert_eq!(circuit.bit_label(sig(3)).unwrap().name(), "res");
    }

    #[test]
    fn parses_port_constants() {
        let doc = r#"{ "modules": { "m": {
            "ports": {
                "a": { "direction": "input", "bits": [2] },
                "tied": { "direction": "output", "bits": ["1", 3] }
            },
            "cells": { "g": { "type": "$_BUF_", "connections": { "A": [2], "Y": [3] } } },
            "netnames": {}
        } } }"#;
        let circuit = Circuit::from_json_str(doc, "m").unwrap();
        assert!(circuit.outs().contains(&SignalId::S1));
        assert_eq!(circuit.net("tied").unwrap(), &[SignalId::S1, sig(3)]);
    }

    #[test]
    fn cell_ops_parse_via_loader() {
        let doc = r#"{ "modules": { "m": {
            "ports": {
                "a": { "direction": "input", "bits": [2] },
                "b": { "direction": "input", "bits": [3] }
            },
            "cells": {
                "u": { "type": "$_NOT_", "connections": { "A": [2], "Y": [4] } },
                "v": { "type": "$_ANDNOT_", "connections": { "A": [2], "B": [3], "Y": [5] } }
            },
            "netnames": {}
        } } }"#;
        let circuit = Circuit::from_json_str(doc, "m").unwrap();
        let unary = circuit.cells().iter().find(|c| c.name() == "u").unwrap();
        assert!(matches!(
            unary.kind(),
            CellKind::Unary {
                op: UnaryOp::Not,
                ..
            }
        ));
        let binary = circuit.cells().iter().find(|c| c.name() == "v").unwrap();
        assert!(matches!(
            binary.kind(),
            CellKind::Binary {
                op: BinaryOp::AndNot,
                ..
            }
        ));
    }
}
