//! Interface-driven subcircuit extraction.
//!
//! Given a loaded top circuit and a port specification for a sub-module,
//! carves out the sub-DAG feeding the subcircuit outputs, stopping at the
//! subcircuit inputs. Visited cells keep the top-level topological order;
//! net names are copied when any of their bits lands in the slice.

use crate::cell::CellKind;
use crate::circuit::Circuit;
use crate::loader::{add_bit_labels, register_ports, NetlistDoc};
use crate::signal::SignalId;
use crate::{NetlistError, NetlistResult};
use std::collections::HashSet;
use std::path::Path;

impl Circuit {
    pub fn extract_subcircuit_from_file(
        &self,
        interface_path: impl AsRef<Path>,
        module_name: &str,
    ) -> NetlistResult<Circuit> {
        let data = std::fs::read_to_string(interface_path)?;
        self.extract_subcircuit(&data, module_name)
    }

    /// Extracts the subcircuit described by `interface_json` (a netlist
    /// document whose module only needs its `ports` table).
    pub fn extract_subcircuit(
        &self,
        interface_json: &str,
        module_name: &str,
    ) -> NetlistResult<Circuit> {
        let doc: NetlistDoc = serde_json::from_str(interface_json)?;
        let module = doc
            .modules
            .get(module_name)
            .ok_or_else(|| NetlistError::UnknownModule(module_name.to_string()))?;

        let mut sub = Circuit::empty(module_name);
        register_ports(&mut sub, &module.ports)?;

        // Backward fixpoint from the subcircuit outputs over the top
        // circuit's cells.
        let mut visited_sigs: HashSet<SignalId> = sub.out_ports.iter().copied().collect();
        let mut visited_cells: Vec<bool> = vec![false; self.cells.len()];
        let mut prev_size = usize::MAX;

        while visited_sigs.len() != prev_size {
            prev_size = visited_sigs.len();
            for (idx, cell) in self.cells.iter().enumerate().rev() {
                if visited_cells[idx] {
                    continue;
                }
                let out_sig = cell.output();
                if !visited_sigs.contains(&out_sig) {
                    continue;
                }
                // Cells behind a subcircuit input stay outside the slice.
                if sub.in_ports.contains(&out_sig) {
                    continue;
                }

                for sig_in in cell.inputs() {
                    if self.in_ports.contains(&sig_in) && !sub.in_ports.contains(&sig_in) {
                        return Err(NetlistError::SubcircuitMissingInput(sig_in));
                    }
                    visited_sigs.insert(sig_in);
                }
                visited_cells[idx] = true;
                if cell.is_register() {
                    sub.reg_outs.insert(out_sig);
                }
            }
        }

        for &sig in &sub.in_ports {
            if !visited_sigs.contains(&sig) {
                log::warn!("subcircuit input {sig} is unused");
            }
        }

        // Internal signals may not silently stand in for top-level outputs.
        for &sig in &visited_sigs {
            if sig.is_const() {
                continue;
            }
            if self.out_ports.contains(&sig) && !sub.out_ports.contains(&sig) {
                return Err(NetlistError::SubcircuitImplicitOutput(sig));
            }
        }

        // Cells outside the slice reading sliced-internal signals would see
        // values the subcircuit no longer produces for them.
        for (idx, cell) in self.cells.iter().enumerate() {
            if visited_cells[idx] {
                continue;
            }
            for sig in cell.inputs() {
                if sig.is_const() || sub.in_ports.contains(&sig) {
                    continue;
                }
                if visited_sigs.contains(&sig) && !sub.out_ports.contains(&sig) {
                    log::warn!(
                        "cell `{}` outside the subcircuit reads internal signal {sig}",
                        cell.name()
                    );
                }
            }
        }

        for &sig in &visited_sigs {
            sub.signals.insert(sig);
        }

        // Copy visited cells preserving the top order: registers stay first.
        sub.cells = self
            .cells
            .iter()
            .enumerate()
            .filter(|(idx, _)| visited_cells[*idx])
            .map(|(_, cell)| cell.clone())
            .collect();

        // The top circuit validated clock consistency; any copied register
        // carries the shared clock.
        sub.clock = sub.cells.iter().find_map(|cell| match cell.kind() {
            CellKind::Dff(ff) => Some(ff.clk),
            _ => None,
        });

        // Copy net names that intersect the slice; interface port names must
        // agree with the top circuit where both declare them.
        for (name, bits) in &self.nets {
            if let Some(existing) = sub.nets.get(name) {
                if existing != bits {
                    return Err(NetlistError::IllegalNameRedeclaration(name.clone()));
                }
            } else if bits.iter().any(|sig| sub.signals.contains(sig)) {
                sub.nets.insert(name.clone(), bits.clone());
                add_bit_labels(&mut sub, name, bits);
            }
        }

        Ok(sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(raw: u32) -> SignalId {
        SignalId::from_raw(raw)
    }

    // Top: in a=3 -> inv -> 4 -> r1 (q=5) -> buf -> y=6
    //      in b=7 -> and(5,7) -> 8 -> z=8 (second output path)
    const TOP: &str = r#"{ "modules": { "top": {
        "ports": {
            "clk": { "direction": "input", "bits": [2] },
            "a": { "direction": "input", "bits": [3] },
            "b": { "direction": "input", "bits": [7] },
            "y": { "direction": "output", "bits": [6] },
            "z": { "direction": "output", "bits": [8] }
        },
        "cells": {
            "inv": { "type": "$_NOT_", "connections": { "A": [3], "Y": [4] } },
            "r1": { "type": "$_DFF_P_", "connections": { "C": [2], "D": [4], "Q": [5] } },
            "buf": { "type": "$_BUF_", "connections": { "A": [5], "Y": [6] } },
            "g": { "type": "$_AND_", "connections": { "A": [5], "B": [7], "Y": [8] } }
        },
        "netnames": { "d_int": { "bits": [4] } }
    } } }"#;

    const IFACE: &str = r#"{ "modules": { "sub": {
        "ports": {
            "clk": { "direction": "input", "bits": [2] },
            "a": { "direction": "input", "bits": [3] },
            "y": { "direction": "output", "bits": [6] }
        }
    } } }"#;

    fn top() -> Circuit {
        Circuit::from_json_str(TOP, "top").unwrap()
    }

    #[test]
    fn extracts_cone_of_influence() {
        let sub = top().extract_subcircuit(IFACE, "sub").unwrap();
        let names: Vec<&str> = sub.cells().iter().map(|c| c.name()).collect();
        assert_eq!(names, ["r1", "inv", "buf"]);
        assert!(sub.regs().contains(&sig(5)));
        assert_eq!(sub.clock(), Some(sig(2)));
        // Sliced nets keep their names; unrelated nets are dropped.
        assert!(sub.has("d_int"));
        assert!(!sub.has("z"));
    }

    #[test]
    fn missing_input_is_fatal() {
        let iface = r#"{ "modules": { "sub": {
            "ports": {
                "clk": { "direction": "input", "bits": [2] },
                "y": { "direction": "output", "bits": [6] }
            }
        } } }"#;
        let err = top().extract_subcircuit(iface, "sub").unwrap_err();
        assert!(matches!(err, NetlistError::SubcircuitMissingInput(s) if s == sig(3)));
    }

    #[test]
    fn implicit_top_output_is_fatal() {
        // The cone of z passes through signal 4, which the top module
        // exposes as output y but the interface does not declare.
        let top_doc = r#"{ "modules": { "top": {
            "ports": {
                "clk": { "direction": "input", "bits": [2] },
                "a": { "direction": "input", "bits": [3] },
                "y": { "direction": "output", "bits": [4] },
                "z": { "direction": "output", "bits": [5] }
            },
            "cells": {
                "inv": { "type": "$_NOT_", "connections": { "A": [3], "Y": [4] } },
                "buf": { "type": "$_BUF_", "connections": { "A": [4], "Y": [5] } }
            },
            "netnames": {}
        } } }"#;
        let iface = r#"{ "modules": { "sub": {
            "ports": {
                "a": { "direction": "input", "bits": [3] },
                "z": { "direction": "output", "bits": [5] }
            }
        } } }"#;
        let top = Circuit::from_json_str(top_doc, "top").unwrap();
        let err = top.extract_subcircuit(iface, "sub").unwrap_err();
        assert!(matches!(err, NetlistError::SubcircuitImplicitOutput(s) if s == sig(4)));
    }
}
