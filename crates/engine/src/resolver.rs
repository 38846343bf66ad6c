// SymStack - Symbolic EVM Stack Tracker
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Opcode effect resolution
//!
//! Maps an opcode mnemonic, as it appears in a trace, to its stack effect:
//! how many items it pops and how many it pushes. The families with a numeric
//! suffix are parsed directly:
//! - `PUSH0` through `PUSH32`
//! - `DUP1` through `DUP16`
//! - `SWAP1` through `SWAP16`
//!
//! Every other mnemonic is looked up in the opcode table shipped by `revm`,
//! extended with the legacy names some tracers still emit (`SHA3`, `SUICIDE`,
//! `DIFFICULTY`). An unrecognized mnemonic resolves to [`OpcodeEffect::UNKNOWN`].

use std::{collections::HashMap, fmt};

use once_cell::sync::Lazy;
use revm::bytecode::opcode::OpCode;
use serde::Serialize;

use crate::Diagnostic;

/// Name of the placeholder effect for unrecognized opcodes
pub const UNKNOWN_OPCODE: &str = "UNKNOWN";

/// Legacy mnemonics and the opcodes they denote
const ALIASES: &[(&str, OpCode)] = &[
    ("SHA3", OpCode::KECCAK256),
    ("SUICIDE", OpCode::SELFDESTRUCT),
    ("DIFFICULTY", OpCode::DIFFICULTY),
    ("PREVRANDAO", OpCode::DIFFICULTY),
];

static OPCODE_TABLE: Lazy<HashMap<&'static str, OpCode>> = Lazy::new(|| {
    let mut table: HashMap<&'static str, OpCode> =
        (0..=u8::MAX).filter_map(OpCode::new).map(|op| (op.as_str(), op)).collect();
    for (alias, op) in ALIASES {
        table.entry(*alias).or_insert(*op);
    }
    table
});

/// Stack effect of one opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct OpcodeEffect {
    /// Canonical name, or `"UNKNOWN"`
    pub name: &'static str,
    /// Number of items consumed
    pub pops: usize,
    /// Number of items produced
    pub pushes: usize,
}

impl OpcodeEffect {
    /// Effect assumed for unrecognized opcodes
    pub const UNKNOWN: Self = Self { name: UNKNOWN_OPCODE, pops: 0, pushes: 0 };

    const PUSH: Self = Self { name: "PUSH", pops: 0, pushes: 1 };
    const DUP: Self = Self { name: "DUP", pops: 0, pushes: 1 };
    const SWAP: Self = Self { name: "SWAP", pops: 0, pushes: 0 };

    fn from_revm(op: OpCode) -> Self {
        let info = op.info();
        Self { name: op.as_str(), pops: info.inputs() as usize, pushes: info.outputs() as usize }
    }

    /// Whether this is the placeholder effect
    pub fn is_unknown(&self) -> bool {
        self.name == UNKNOWN_OPCODE
    }

    /// Net change in stack depth
    pub fn delta(&self) -> isize {
        self.pushes as isize - self.pops as isize
    }
}

/// An opcode mnemonic parsed once, ready for dispatch
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// `PUSH0` through `PUSH32`
    Push(u8),
    /// `DUP1` through `DUP16`
    Dup(u8),
    /// `SWAP1` through `SWAP16`
    Swap(u8),
    /// `MLOAD`
    Mload,
    /// `POP`
    Pop,
    /// Any other mnemonic, upper-cased
    Other(String),
}

fn numeric_suffix(mnemonic: &str, prefix: &str) -> Option<u8> {
    let digits = mnemonic.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl Opcode {
    /// Parse a mnemonic. Matching is case-insensitive; surrounding whitespace is ignored.
    pub fn parse(mnemonic: &str) -> Self {
        let upper = mnemonic.trim().to_ascii_uppercase();

        if let Some(n) = numeric_suffix(&upper, "PUSH").filter(|n| *n <= 32) {
            return Self::Push(n);
        }
        if let Some(n) = numeric_suffix(&upper, "DUP").filter(|n| (1..=16).contains(n)) {
            return Self::Dup(n);
        }
        if let Some(n) = numeric_suffix(&upper, "SWAP").filter(|n| (1..=16).contains(n)) {
            return Self::Swap(n);
        }

        match upper.as_str() {
            "MLOAD" => Self::Mload,
            "POP" => Self::Pop,
            _ => Self::Other(upper),
        }
    }

    /// Baseline stack effect
    ///
    /// DUP and SWAP report their baseline arity; the transition rules read
    /// their operands by position instead of popping them.
    pub fn effect(&self) -> OpcodeEffect {
        match self {
            Self::Push(_) => OpcodeEffect::PUSH,
            Self::Dup(_) => OpcodeEffect::DUP,
            Self::Swap(_) => OpcodeEffect::SWAP,
            Self::Mload => OpcodeEffect::from_revm(OpCode::MLOAD),
            Self::Pop => OpcodeEffect::from_revm(OpCode::POP),
            Self::Other(name) => OPCODE_TABLE
                .get(name.as_str())
                .copied()
                .map(OpcodeEffect::from_revm)
                .unwrap_or(OpcodeEffect::UNKNOWN),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push(n) => write!(f, "PUSH{n}"),
            Self::Dup(n) => write!(f, "DUP{n}"),
            Self::Swap(n) => write!(f, "SWAP{n}"),
            Self::Mload => f.write_str("MLOAD"),
            Self::Pop => f.write_str("POP"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

impl From<&str> for Opcode {
    fn from(mnemonic: &str) -> Self {
        Self::parse(mnemonic)
    }
}

/// Resolve a mnemonic, reporting unrecognized ones as a diagnostic
pub fn try_resolve(mnemonic: &str, step: usize) -> Result<OpcodeEffect, Diagnostic> {
    let effect = Opcode::parse(mnemonic).effect();
    if effect.is_unknown() {
        Err(Diagnostic::UnknownOpcode { step, opcode: mnemonic.to_string() })
    } else {
        Ok(effect)
    }
}

/// Resolve a mnemonic, never failing
///
/// Unrecognized mnemonics are logged and resolve to [`OpcodeEffect::UNKNOWN`].
pub fn resolve(mnemonic: &str, step: usize) -> OpcodeEffect {
    try_resolve(mnemonic, step).unwrap_or_else(|diag| {
        diag.log();
        OpcodeEffect::UNKNOWN
    })
}

/// Look up a mnemonic without logging
pub fn resolve_mnemonic(mnemonic: &str) -> Option<OpcodeEffect> {
    Some(Opcode::parse(mnemonic).effect()).filter(|effect| !effect.is_unknown())
}
