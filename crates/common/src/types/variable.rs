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

//! Source-level variable identities as seen by the symbolic stack.
//!
//! The source-map decoder describes a declaration with a [`VariableDescriptor`].
//! Once bound onto a stack slot, the identity lives on as a [`VariableBinding`]
//! inside the slot's kind, while copies of that slot only carry a
//! [`VariableReference`] back to it.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// Identifier of a source-level declaration (the AST node id of the declaration).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    From,
)]
#[serde(transparent)]
pub struct VariableId(pub u64);

/// Identifier of a function scope (the AST node id of the enclosing function).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    From,
)]
#[serde(transparent)]
pub struct ScopeId(pub u64);

/// Lifecycle state of a bound variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// The declaration has been reached but no value has been assigned yet
    #[default]
    #[display("declared")]
    Declared,
    /// A value has been assigned
    #[display("assigned")]
    Assigned,
    /// The variable went out of scope or its slot was removed
    #[display("destroyed")]
    Destroyed,
}

/// A declaration as described by the source-level decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDescriptor {
    /// Declaration id
    pub id: VariableId,
    /// Declared name
    pub name: String,
    /// Solidity type string, e.g. `uint256`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    /// ABI fragment describing the type, as emitted by the compiler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abi: Option<serde_json::Value>,
    /// Name of the enclosing scope (function or block)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Whether this is a function input parameter
    #[serde(default)]
    pub is_parameter: bool,
    /// Whether this is a named or anonymous return parameter
    #[serde(default)]
    pub is_return_parameter: bool,
    /// Trace step at which the declaration was reached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declaration_step: Option<usize>,
}

impl VariableDescriptor {
    /// Create a descriptor for a local variable
    pub fn new(id: impl Into<VariableId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ty: None,
            abi: None,
            scope: None,
            is_parameter: false,
            is_return_parameter: false,
            declaration_step: None,
        }
    }

    /// Set the Solidity type
    pub fn with_type(mut self, ty: impl Into<String>) -> Self {
        self.ty = Some(ty.into());
        self
    }

    /// Set the enclosing scope name
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Mark the descriptor as a function input parameter
    pub fn parameter(mut self) -> Self {
        self.is_parameter = true;
        self
    }

    /// Mark the descriptor as a return parameter
    pub fn return_parameter(mut self) -> Self {
        self.is_return_parameter = true;
        self
    }

    /// Set the step at which the declaration was reached
    pub fn declared_at(mut self, step: usize) -> Self {
        self.declaration_step = Some(step);
        self
    }
}

/// Identity metadata carried by a slot that holds a bound variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableBinding {
    /// Declaration id
    pub variable_id: VariableId,
    /// Declared name
    pub variable_name: String,
    /// Solidity type string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_type: Option<String>,
    /// ABI fragment of the type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abi: Option<serde_json::Value>,
    /// Current lifecycle state
    pub lifecycle: Lifecycle,
    /// Name of the enclosing scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_scope: Option<String>,
    /// Enclosing function scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_scope_id: Option<ScopeId>,
    /// Trace step at which the declaration was reached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declaration_step: Option<usize>,
}

impl VariableBinding {
    /// Build the binding for `descriptor`
    pub fn from_descriptor(
        descriptor: &VariableDescriptor,
        lifecycle: Lifecycle,
        function_scope_id: Option<ScopeId>,
    ) -> Self {
        Self {
            variable_id: descriptor.id,
            variable_name: descriptor.name.clone(),
            variable_type: descriptor.ty.clone(),
            abi: descriptor.abi.clone(),
            lifecycle,
            variable_scope: descriptor.scope.clone(),
            function_scope_id,
            declaration_step: descriptor.declaration_step,
        }
    }

    /// A back-reference to this binding, located at `source_stack_index`
    pub fn reference_at(&self, source_stack_index: usize) -> VariableReference {
        VariableReference {
            variable_id: self.variable_id,
            variable_name: self.variable_name.clone(),
            variable_type: self.variable_type.clone(),
            source_stack_index,
        }
    }
}

/// Back-reference recorded on a slot that is a copy of a bound variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableReference {
    /// Declaration id of the referenced variable
    pub variable_id: VariableId,
    /// Name of the referenced variable
    pub variable_name: String,
    /// Type of the referenced variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_type: Option<String>,
    /// Stack index (in the step the copy was made from) of the original
    pub source_stack_index: usize,
}

/// Current known position and state of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableLocation {
    /// Step of the most recent binding or lifecycle update
    pub step: usize,
    /// Stack index the variable was bound at
    pub stack_index: usize,
    /// Lifecycle state
    pub lifecycle: Lifecycle,
}
