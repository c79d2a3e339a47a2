//! Cell variants and the value-polymorphic evaluator.

use crate::signal::{ConstBit, SignalId};
use std::collections::HashMap;

/// Unary gate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Buf,
    Not,
}

/// Binary gate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Nand,
    Or,
    Nor,
    Xor,
    Xnor,
    /// `Y = A & !B`
    AndNot,
    /// `Y = A | !B`
    OrNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEdge {
    Rising,
    Falling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    ActiveHigh,
    ActiveLow,
}

/// Reset side of a flip-flop. `sync` distinguishes the `$_SDFF…_` netlist
/// variants from the async `$_DFF…_` ones; in the cycle-level model both
/// override the captured data with `value` whenever the port is asserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetPort {
    pub sig: SignalId,
    pub active: Polarity,
    pub value: bool,
    pub sync: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnablePort {
    pub sig: SignalId,
    pub active: Polarity,
}

/// A flip-flop with optional reset and enable ports. The four register
/// sub-variants of the netlist format are the four populations of the two
/// `Option` fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlipFlop {
    pub clk: SignalId,
    pub edge: ClockEdge,
    pub d: SignalId,
    pub q: SignalId,
    pub reset: Option<ResetPort>,
    pub enable: Option<EnablePort>,
}

/// The closed set of cell variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellKind {
    Unary {
        op: UnaryOp,
        a: SignalId,
        y: SignalId,
    },
    Binary {
        op: BinaryOp,
        a: SignalId,
        b: SignalId,
        y: SignalId,
    },
    /// `Y = S ? B : A`
    Mux {
        a: SignalId,
        b: SignalId,
        s: SignalId,
        y: SignalId,
    },
    Dff(FlipFlop),
}

/// A named node of the combinational/sequential graph.
#[derive(Debug, Clone)]
pub struct Cell {
    name: String,
    kind: CellKind,
}

impl Cell {
    pub fn new(name: impl Into<String>, kind: CellKind) -> Cell {
        Cell {
            name: name.into(),
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &CellKind {
        &self.kind
    }

    /// The output signal, uniform across all variants.
    pub fn output(&self) -> SignalId {
        match &self.kind {
            CellKind::Unary { y, .. } | CellKind::Binary { y, .. } | CellKind::Mux { y, .. } => *y,
            CellKind::Dff(ff) => ff.q,
        }
    }

    /// All input signals, including the clock and control ports of registers.
    pub fn inputs(&self) -> Vec<SignalId> {
        match &self.kind {
            CellKind::Unary { a, .. } => vec![*a],
            CellKind::Binary { a, b, .. } => vec![*a, *b],
            CellKind::Mux { a, b, s, .. } => vec![*a, *b, *s],
            CellKind::Dff(ff) => {
                let mut ins = vec![ff.clk, ff.d];
                if let Some(rst) = &ff.reset {
                    ins.push(rst.sig);
                }
                if let Some(en) = &ff.enable {
                    ins.push(en.sig);
                }
                ins
            }
        }
    }

    pub fn is_register(&self) -> bool {
        matches!(self.kind, CellKind::Dff(_))
    }

    /// Evaluates the cell into `curr`.
    ///
    /// Combinational cells read their inputs from `curr`; the register data
    /// and control ports read from `prev`. The cell sequence of a loaded
    /// circuit guarantees that combinational inputs are present by the time
    /// a cell is visited.
    pub fn eval<G: GateOps>(
        &self,
        g: &mut G,
        prev: &HashMap<SignalId, G::Value>,
        curr: &mut HashMap<SignalId, G::Value>,
    ) {
        match &self.kind {
            CellKind::Unary { op, a, y } => {
                let va = fetch(curr, *a);
                let vy = match op {
                    UnaryOp::Buf => va,
                    UnaryOp::Not => g.not(va),
                };
                curr.insert(*y, vy);
            }
            CellKind::Binary { op, a, b, y } => {
                let va = fetch(curr, *a);
                let vb = fetch(curr, *b);
                let vy = match op {
                    BinaryOp::And => g.and(va, vb),
                    BinaryOp::Nand => g.nand(va, vb),
                    BinaryOp::Or => g.or(va, vb),
                    BinaryOp::Nor => g.nor(va, vb),
                    BinaryOp::Xor => g.xor(va, vb),
                    BinaryOp::Xnor => g.xnor(va, vb),
                    BinaryOp::AndNot => g.andnot(va, vb),
                    BinaryOp::OrNot => g.ornot(va, vb),
                };
                curr.insert(*y, vy);
            }
            CellKind::Mux { a, b, s, y } => {
                let va = fetch(curr, *a);
                let vb = fetch(curr, *b);
                let vs = fetch(curr, *s);
                let vy = g.mux(vs, va, vb);
                curr.insert(*y, vy);
            }
            CellKind::Dff(ff) => {
                let d = fetch(prev, ff.d);
                let mut next = d;
                if let Some(en) = &ff.enable {
                    let raw = fetch(prev, en.sig);
                    let active = match en.active {
                        Polarity::ActiveHigh => raw,
                        Polarity::ActiveLow => g.not(raw),
                    };
                    let held = fetch(prev, ff.q);
                    next = g.mux(active, held, next);
                }
                // Reset takes precedence over enable.
                if let Some(rst) = &ff.reset {
                    let raw = fetch(prev, rst.sig);
                    let active = match rst.active {
                        Polarity::ActiveHigh => raw,
                        Polarity::ActiveLow => g.not(raw),
                    };
                    let value = g.const_bit(if rst.value { ConstBit::One } else { ConstBit::Zero });
                    next = g.mux(active, next, value);
                }
                curr.insert(ff.q, next);
            }
        }
    }
}

fn fetch<V: Copy>(state: &HashMap<SignalId, V>, sig: SignalId) -> V {
    match state.get(&sig) {
        Some(v) => *v,
        None => panic!("signal {sig} read before it was produced"),
    }
}

/// Value abstraction the evaluator is generic over: plain booleans for
/// concrete simulation, solver literals for symbolic unrolling.
pub trait GateOps {
    type Value: Copy;

    fn const_bit(&mut self, bit: ConstBit) -> Self::Value;
    fn not(&mut self, a: Self::Value) -> Self::Value;
    fn and(&mut self, a: Self::Value, b: Self::Value) -> Self::Value;
    fn or(&mut self, a: Self::Value, b: Self::Value) -> Self::Value;
    fn xor(&mut self, a: Self::Value, b: Self::Value) -> Self::Value;
    /// `s ? b : a`
    fn mux(&mut self, s: Self::Value, a: Self::Value, b: Self::Value) -> Self::Value;

    fn nand(&mut self, a: Self::Value, b: Self::Value) -> Self::Value {
        let y = self.and(a, b);
        self.not(y)
    }

    fn nor(&mut self, a: Self::Value, b: Self::Value) -> Self::Value {
        let y = self.or(a, b);
        self.not(y)
    }

    fn xnor(&mut self, a: Self::Value, b: Self::Value) -> Self::Value {
        let y = self.xor(a, b);
        self.not(y)
    }

    fn andnot(&mut self, a: Self::Value, b: Self::Value) -> Self::Value {
        let nb = self.not(b);
        self.and(a, nb)
    }

    fn ornot(&mut self, a: Self::Value, b: Self::Value) -> Self::Value {
        let nb = self.not(b);
        self.or(a, nb)
    }
}

/// Concrete two-valued evaluation; `x` and `z` coerce to 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct BoolOps;

impl GateOps for BoolOps {
    type Value = bool;

    fn const_bit(&mut self, bit: ConstBit) -> bool {
        matches!(bit, ConstBit::One)
    }

    fn not(&mut self, a: bool) -> bool {
        !a
    }

    fn and(&mut self, a: bool, b: bool) -> bool {
        a && b
    }

    fn or(&mut self, a: bool, b: bool) -> bool {
        a || b
    }

    fn xor(&mut self, a: bool, b: bool) -> bool {
        a != b
    }

    fn mux(&mut self, s: bool, a: bool, b: bool) -> bool {
        if s {
            b
        } else {
            a
        }
    }
}

/// Cell shape resolved from a netlist type name, before port binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParsedCellType {
    Unary(UnaryOp),
    Binary(BinaryOp),
    Mux,
    Dff {
        edge: ClockEdge,
        reset: Option<(Polarity, bool, bool)>,
        enable: Option<Polarity>,
    },
}

/// Maps the `$_…_` cell type names of the netlist format onto the closed
/// enumeration. Returns `None` for anything unrecognized.
pub(crate) fn cell_type_from_str(name: &str) -> Option<ParsedCellType> {
    match name {
        "$_BUF_" => Some(ParsedCellType::Unary(UnaryOp::Buf)),
        "$_NOT_" => Some(ParsedCellType::Unary(UnaryOp::Not)),
        "$_AND_" => Some(ParsedCellType::Binary(BinaryOp::And)),
        "$_NAND_" => Some(ParsedCellType::Binary(BinaryOp::Nand)),
        "$_OR_" => Some(ParsedCellType::Binary(BinaryOp::Or)),
        "$_NOR_" => Some(ParsedCellType::Binary(BinaryOp::Nor)),
        "$_XOR_" => Some(ParsedCellType::Binary(BinaryOp::Xor)),
        "$_XNOR_" => Some(ParsedCellType::Binary(BinaryOp::Xnor)),
        "$_ANDNOT_" => Some(ParsedCellType::Binary(BinaryOp::AndNot)),
        "$_ORNOT_" => Some(ParsedCellType::Binary(BinaryOp::OrNot)),
        "$_MUX_" => Some(ParsedCellType::Mux),
        _ => dff_type_from_str(name),
    }
}

fn dff_type_from_str(name: &str) -> Option<ParsedCellType> {
    let body = name.strip_prefix("$_")?.strip_suffix('_')?;
    let (rest, sync) = match body.strip_prefix("SDFF") {
        Some(rest) => (rest, true),
        None => (body.strip_prefix("DFF")?, false),
    };
    let (has_enable, flags) = match rest.strip_prefix("E_") {
        Some(flags) => (true, flags),
        None => (false, rest.strip_prefix('_')?),
    };

    let edge = |c: char| match c {
        'P' => Some(ClockEdge::Rising),
        'N' => Some(ClockEdge::Falling),
        _ => None,
    };
    let pol = |c: char| match c {
        'P' => Some(Polarity::ActiveHigh),
        'N' => Some(Polarity::ActiveLow),
        _ => None,
    };
    let val = |c: char| match c {
        '0' => Some(false),
        '1' => Some(true),
        _ => None,
    };

    let chars: Vec<char> = flags.chars().collect();
    match (has_enable, sync, chars.as_slice()) {
        (false, false, [e]) => Some(ParsedCellType::Dff {
            edge: edge(*e)?,
            reset: None,
            enable: None,
        }),
        (false, _, [e, r, v]) => Some(ParsedCellType::Dff {
            edge: edge(*e)?,
            reset: Some((pol(*r)?, val(*v)?, sync)),
            enable: None,
        }),
        (true, false, [e, p]) => Some(ParsedCellType::Dff {
            edge: edge(*e)?,
            reset: None,
            enable: Some(pol(*p)?),
        }),
        (true, _, [e, r, v, p]) => Some(ParsedCellType::Dff {
            edge: edge(*e)?,
            reset: Some((pol(*r)?, val(*v)?, sync)),
            enable: Some(pol(*p)?),
        }),
        _ => None,
    }
}
