//! Bit-level signal identifiers and display labels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifier of a single wire bit.
///
/// Four ids are reserved for the constant bits `0`, `1`, `x` and `z`. The
/// netlist format encodes constants as string tokens and real wires as
/// integers starting at 2, so the constant ids live at the extremes of the
/// range and can never collide with a loaded wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalId(u32);

impl SignalId {
    /// Constant logic 0.
    pub const S0: SignalId = SignalId(0);
    /// Constant logic 1.
    pub const S1: SignalId = SignalId(1);
    /// Constant unknown; coerced to 0 during evaluation.
    pub const SX: SignalId = SignalId(u32::MAX - 1);
    /// Constant high-impedance; coerced to 0 during evaluation.
    pub const SZ: SignalId = SignalId(u32::MAX);

    /// The four reserved constant ids.
    pub const CONSTANTS: [SignalId; 4] = [Self::S0, Self::S1, Self::SX, Self::SZ];

    pub fn from_raw(raw: u32) -> SignalId {
        SignalId(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_const(self) -> bool {
        matches!(self, Self::S0 | Self::S1 | Self::SX | Self::SZ)
    }

    pub fn from_const(bit: ConstBit) -> SignalId {
        match bit {
            ConstBit::Zero => Self::S0,
            ConstBit::One => Self::S1,
            ConstBit::X => Self::SX,
            ConstBit::Z => Self::SZ,
        }
    }

    pub fn const_bit(self) -> Option<ConstBit> {
        match self {
            Self::S0 => Some(ConstBit::Zero),
            Self::S1 => Some(ConstBit::One),
            Self::SX => Some(ConstBit::X),
            Self::SZ => Some(ConstBit::Z),
            _ => None,
        }
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.const_bit() {
            Some(bit) => write!(f, "{}", bit.token()),
            None => write!(f, "{}", self.0),
        }
    }
}

/// One of the four constant bit values a netlist can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstBit {
    Zero,
    One,
    X,
    Z,
}

impl ConstBit {
    /// Parses the string token the netlist format uses for constants.
    pub fn from_token(token: &str) -> Option<ConstBit> {
        match token {
            "0" => Some(ConstBit::Zero),
            "1" => Some(ConstBit::One),
            "x" | "X" => Some(ConstBit::X),
            "z" | "Z" => Some(ConstBit::Z),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            ConstBit::Zero => "0",
            ConstBit::One => "1",
            ConstBit::X => "x",
            ConstBit::Z => "z",
        }
    }
}

/// Preferred human-readable label of a signal: a net name plus bit position.
///
/// A bit frequently appears under several net names. The election keeps the
/// label that is not compiler-synthesized (names starting with `_`), has the
/// smallest hierarchical depth, and is lexically shortest, in that order.
#[derive(Debug, Clone)]
pub struct BitLabel {
    name: Arc<str>,
    pos: u32,
    depth: u32,
}

impl BitLabel {
    pub fn new(name: Arc<str>, pos: u32) -> BitLabel {
        let depth = name.matches('.').count() as u32 + 1;
        BitLabel { name, pos, depth }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pos(&self) -> u32 {
        self.pos
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Strict-weak preference order between two labels of the same bit.
    pub fn prefer_over(&self, other: &BitLabel) -> bool {
        let self_synth = self.name.starts_with('_');
        let other_synth = other.name.starts_with('_');
        if self_synth != other_synth {
            return other_synth;
        }
        if self.depth != other.depth {
            return self.depth < other.depth;
        }
        self.name.len() < other.name.len()
    }

    pub fn display(&self) -> String {
        format!("{} [{}]", self.name, self.pos)
    }
}
