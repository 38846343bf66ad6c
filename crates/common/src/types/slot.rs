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

//! Symbolic stack slots.
//!
//! A [`StackSlot`] is one abstract cell of the EVM stack at one trace step. It
//! does not hold a concrete word; it records *what* the value is (a bound
//! variable, a temporary, or unknown) and *where* it came from.

use serde::{Deserialize, Serialize};

use crate::types::{
    Lifecycle, ScopeId, VariableBinding, VariableDescriptor, VariableId, VariableReference,
};

/// What a stack slot holds.
///
/// Only the bound variants carry identity metadata, so reading a variable id
/// off a temporary is impossible by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotKind {
    /// A local variable declaration
    Variable(VariableBinding),
    /// A function input parameter
    Parameter(VariableBinding),
    /// A return parameter
    ReturnValue(VariableBinding),
    /// A temporary computed from other slots
    Intermediate,
    /// A slot whose origin could not be reconstructed
    Unknown,
}

impl SlotKind {
    /// Choose the bound variant matching the descriptor's flags
    pub fn from_descriptor(
        descriptor: &VariableDescriptor,
        lifecycle: Lifecycle,
        function_scope_id: Option<ScopeId>,
    ) -> Self {
        let binding = VariableBinding::from_descriptor(descriptor, lifecycle, function_scope_id);
        if descriptor.is_return_parameter {
            Self::ReturnValue(binding)
        } else if descriptor.is_parameter {
            Self::Parameter(binding)
        } else {
            Self::Variable(binding)
        }
    }

    /// Identity metadata, if the slot holds a bound variable
    pub fn binding(&self) -> Option<&VariableBinding> {
        match self {
            Self::Variable(binding) | Self::Parameter(binding) | Self::ReturnValue(binding) => {
                Some(binding)
            }
            Self::Intermediate | Self::Unknown => None,
        }
    }

    /// Mutable identity metadata, if the slot holds a bound variable
    pub fn binding_mut(&mut self) -> Option<&mut VariableBinding> {
        match self {
            Self::Variable(binding) | Self::Parameter(binding) | Self::ReturnValue(binding) => {
                Some(binding)
            }
            Self::Intermediate | Self::Unknown => None,
        }
    }

    /// Short lowercase name of the variant
    pub fn name(&self) -> &'static str {
        match self {
            Self::Variable(_) => "variable",
            Self::Parameter(_) => "parameter",
            Self::ReturnValue(_) => "return_value",
            Self::Intermediate => "intermediate",
            Self::Unknown => "unknown",
        }
    }
}

/// One abstract stack cell at one execution step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackSlot {
    /// What the slot holds
    #[serde(flatten)]
    pub kind: SlotKind,
    /// Trace step that produced this slot
    pub origin_step: usize,
    /// Opcode that produced this slot
    pub origin_op: String,
    /// Indices in the previous step's stack this value was computed from
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub derived_from: Vec<usize>,
    /// Set when this slot is a copy of a bound variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references_variable: Option<VariableReference>,
}

impl StackSlot {
    /// A temporary value
    pub fn intermediate(step: usize, op: impl Into<String>, derived_from: Vec<usize>) -> Self {
        Self {
            kind: SlotKind::Intermediate,
            origin_step: step,
            origin_op: op.into(),
            derived_from,
            references_variable: None,
        }
    }

    /// A placeholder for a value that could not be reconstructed
    pub fn unknown(step: usize, op: impl Into<String>) -> Self {
        Self {
            kind: SlotKind::Unknown,
            origin_step: step,
            origin_op: op.into(),
            derived_from: Vec::new(),
            references_variable: None,
        }
    }

    /// A bound variable slot
    pub fn bound(kind: SlotKind, step: usize, op: impl Into<String>) -> Self {
        Self {
            kind,
            origin_step: step,
            origin_op: op.into(),
            derived_from: Vec::new(),
            references_variable: None,
        }
    }

    /// Attach a back-reference
    pub fn with_reference(mut self, reference: VariableReference) -> Self {
        self.references_variable = Some(reference);
        self
    }

    /// Identity metadata, if any
    pub fn binding(&self) -> Option<&VariableBinding> {
        self.kind.binding()
    }

    /// Declaration id, if the slot holds a bound variable
    pub fn variable_id(&self) -> Option<VariableId> {
        self.binding().map(|binding| binding.variable_id)
    }

    /// Declared name, if the slot holds a bound variable
    pub fn variable_name(&self) -> Option<&str> {
        self.binding().map(|binding| binding.variable_name.as_str())
    }

    /// Lifecycle, if the slot holds a bound variable
    pub fn lifecycle(&self) -> Option<Lifecycle> {
        self.binding().map(|binding| binding.lifecycle)
    }

    /// Holds a variable, parameter or return value
    pub fn is_bound(&self) -> bool {
        self.binding().is_some()
    }

    /// Holds a variable or parameter. These are the slots whose identity the
    /// DUP, SWAP and POP rules protect.
    pub fn is_declaration(&self) -> bool {
        matches!(self.kind, SlotKind::Variable(_) | SlotKind::Parameter(_))
    }

    /// A declaration that is not itself a copy of another slot
    pub fn is_original_declaration(&self) -> bool {
        self.is_bound() && self.references_variable.is_none()
    }

    /// Holds a function input parameter
    pub fn is_parameter(&self) -> bool {
        matches!(self.kind, SlotKind::Parameter(_))
    }

    /// Holds a return parameter
    pub fn is_return_parameter(&self) -> bool {
        matches!(self.kind, SlotKind::ReturnValue(_))
    }

    /// Holds a temporary
    pub fn is_intermediate(&self) -> bool {
        matches!(self.kind, SlotKind::Intermediate)
    }

    /// Holds a placeholder
    pub fn is_unknown(&self) -> bool {
        matches!(self.kind, SlotKind::Unknown)
    }

    /// A back-reference to the variable held by this slot, if any
    pub fn reference_at(&self, stack_index: usize) -> Option<VariableReference> {
        self.binding().map(|binding| binding.reference_at(stack_index))
    }
}
