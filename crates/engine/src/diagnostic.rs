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

//! Recoverable anomalies observed while tracking the symbolic stack.
//!
//! A diagnostic never aborts a replay: the engine substitutes a placeholder
//! (or leaves the stack untouched), records the diagnostic and moves on.

use serde::Serialize;
use symstack_common::types::VariableId;
use thiserror::Error;
use tracing::warn;

/// An anomaly detected at one trace step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// The opcode needs more operands than the symbolic stack holds
    #[error("step {step}: {opcode} needs {required} stack item(s) but only {available} available")]
    StackUnderflow {
        /// Trace step
        step: usize,
        /// Mnemonic as it appeared in the trace
        opcode: String,
        /// Items the opcode reads
        required: usize,
        /// Items that were on the stack
        available: usize,
    },

    /// The mnemonic is not a known EVM opcode
    #[error("step {step}: unknown opcode {opcode:?}, assuming no stack effect")]
    UnknownOpcode {
        /// Trace step
        step: usize,
        /// Unrecognized mnemonic
        opcode: String,
    },

    /// A binding targeted a slot outside the stack
    #[error(
        "step {step}: cannot bind variable {variable_id} at stack index {stack_index} (depth {depth})"
    )]
    OutOfBoundsBind {
        /// Step the binding targeted
        step: usize,
        /// Variable being bound
        variable_id: VariableId,
        /// Requested index, bottom first
        stack_index: isize,
        /// Depth of the stack at `step`
        depth: usize,
    },

    /// POP removed the original slot of a declaration
    #[error(
        "step {step}: POP removed declaration {variable_name:?} (id {variable_id}) at stack index {stack_index}"
    )]
    DeclarationRemoved {
        /// Step of the POP
        step: usize,
        /// Removed variable
        variable_id: VariableId,
        /// Its declared name
        variable_name: String,
        /// Index the slot had before the POP
        stack_index: usize,
    },

    /// The symbolic stack grew past the configured limit
    #[error("step {step}: symbolic stack depth {depth} exceeds limit {limit}")]
    StackOverflow {
        /// Trace step
        step: usize,
        /// Depth after the transition
        depth: usize,
        /// Configured maximum
        limit: usize,
    },

    /// A lifecycle update named a variable that was never bound
    #[error("step {step}: variable {variable_id} is not tracked")]
    UntrackedVariable {
        /// Step of the update
        step: usize,
        /// Unknown variable
        variable_id: VariableId,
    },

    /// The symbolic depth disagrees with the stack recorded in the trace
    #[error("step {step}: symbolic stack depth {symbolic} differs from concrete depth {concrete}")]
    DepthMismatch {
        /// Step carrying the concrete stack
        step: usize,
        /// Depth of the symbolic stack
        symbolic: usize,
        /// Depth recorded by the tracer
        concrete: usize,
    },
}

impl Diagnostic {
    /// Step at which the anomaly was observed
    pub fn step(&self) -> usize {
        match self {
            Self::StackUnderflow { step, .. }
            | Self::UnknownOpcode { step, .. }
            | Self::OutOfBoundsBind { step, .. }
            | Self::DeclarationRemoved { step, .. }
            | Self::StackOverflow { step, .. }
            | Self::UntrackedVariable { step, .. }
            | Self::DepthMismatch { step, .. } => *step,
        }
    }

    /// Short snake_case name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StackUnderflow { .. } => "stack_underflow",
            Self::UnknownOpcode { .. } => "unknown_opcode",
            Self::OutOfBoundsBind { .. } => "out_of_bounds_bind",
            Self::DeclarationRemoved { .. } => "declaration_removed",
            Self::StackOverflow { .. } => "stack_overflow",
            Self::UntrackedVariable { .. } => "untracked_variable",
            Self::DepthMismatch { .. } => "depth_mismatch",
        }
    }

    /// Emit the diagnostic as a warning
    pub fn log(&self) {
        warn!(kind = self.kind(), "{self}");
    }

    /// Emit and return the diagnostic
    pub(crate) fn logged(self) -> Self {
        self.log();
        self
    }
}
