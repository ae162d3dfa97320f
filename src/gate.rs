//! # Gate catalog
//!
//! The closed set of gate kinds and their boolean functions. A [`Gate`] is a
//! pure descriptor (id + kind); it carries no evaluation state.
//!
//! ```rust
//! use circuit_evo::GateKind;
//!
//! assert_eq!(GateKind::Nand.compute(&[true, true]).unwrap(), false);
//! assert_eq!(GateKind::Xor.compute(&[true, false]).unwrap(), true);
//! assert!(GateKind::Input.compute(&[]).is_err());
//! ```

use crate::error::CircuitError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Gate kinds.
///
/// `Input` and `Output` are circuit boundaries; the others are
/// combinational functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateKind {
    And,
    Or,
    Not,
    Nand,
    Nor,
    Xor,
    Xnor,
    /// Single-input buffer. Exported as an identity cover; never produced by mutation.
    Buf,
    Input,
    Output,
}

/// The kinds the mutation engine draws from.
pub const COMBINATIONAL: [GateKind; 7] = [
    GateKind::And,
    GateKind::Or,
    GateKind::Xor,
    GateKind::Not,
    GateKind::Nand,
    GateKind::Nor,
    GateKind::Xnor,
];

impl GateKind {
    /// Canonical upper-case name, as used in BLIF comments and description files.
    pub fn as_str(&self) -> &'static str {
        match self {
            GateKind::And => "AND",
            GateKind::Or => "OR",
            GateKind::Not => "NOT",
            GateKind::Nand => "NAND",
            GateKind::Nor => "NOR",
            GateKind::Xor => "XOR",
            GateKind::Xnor => "XNOR",
            GateKind::Buf => "BUF",
            GateKind::Input => "INPUT",
            GateKind::Output => "OUTPUT",
        }
    }

    pub fn is_boundary(&self) -> bool {
        matches!(self, GateKind::Input | GateKind::Output)
    }

    /// Kinds that need exactly one predecessor.
    pub fn is_unary(&self) -> bool {
        matches!(self, GateKind::Not | GateKind::Buf | GateKind::Output)
    }

    /// Kinds that need at least two predecessors.
    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            GateKind::And
                | GateKind::Or
                | GateKind::Nand
                | GateKind::Nor
                | GateKind::Xor
                | GateKind::Xnor
        )
    }

    /// Number of inputs `compute` consumes. `None` for INPUT.
    pub fn arity(&self) -> Option<usize> {
        if self.is_unary() {
            Some(1)
        } else if self.is_binary() {
            Some(2)
        } else {
            None
        }
    }

    /// Evaluates the gate function over ordered inputs.
    ///
    /// Only the first `arity` inputs are read; extra inputs are ignored.
    /// Input count is not otherwise validated here, the circuit's validity
    /// check is the arity gate.
    pub fn compute(&self, inputs: &[bool]) -> Result<bool, CircuitError> {
        if self.is_boundary() {
            return Err(CircuitError::NoComputeSemantics(*self));
        }
        let expected = self.arity().unwrap_or(0);
        if inputs.len() < expected {
            return Err(CircuitError::ArityMismatch {
                gate: self.as_str().to_string(),
                expected,
                got: inputs.len(),
            });
        }
        let value = match self {
            GateKind::And => inputs[0] && inputs[1],
            GateKind::Or => inputs[0] || inputs[1],
            GateKind::Not => !inputs[0],
            GateKind::Nand => !(inputs[0] && inputs[1]),
            GateKind::Nor => !(inputs[0] || inputs[1]),
            GateKind::Xor => inputs[0] ^ inputs[1],
            GateKind::Xnor => !(inputs[0] ^ inputs[1]),
            GateKind::Buf => inputs[0],
            GateKind::Input | GateKind::Output => {
                return Err(CircuitError::NoComputeSemantics(*self))
            }
        };
        Ok(value)
    }
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GateKind {
    type Err = CircuitError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(GateKind::And),
            "OR" => Ok(GateKind::Or),
            "NOT" => Ok(GateKind::Not),
            "NAND" => Ok(GateKind::Nand),
            "NOR" => Ok(GateKind::Nor),
            "XOR" => Ok(GateKind::Xor),
            "XNOR" => Ok(GateKind::Xnor),
            "BUF" => Ok(GateKind::Buf),
            "INPUT" => Ok(GateKind::Input),
            "OUTPUT" => Ok(GateKind::Output),
            _ => Err(CircuitError::UnknownGateType(name.to_string())),
        }
    }
}

/// A named node of a circuit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Gate {
    pub id: String,
    pub kind: GateKind,
}

impl Gate {
    pub fn new(id: impl Into<String>, kind: GateKind) -> Self {
        Gate {
            id: id.into(),
            kind,
        }
    }

    pub fn input(id: impl Into<String>) -> Self {
        Gate::new(id, GateKind::Input)
    }

    pub fn output(id: impl Into<String>) -> Self {
        Gate::new(id, GateKind::Output)
    }
}
