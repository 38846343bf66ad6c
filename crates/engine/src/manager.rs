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

//! Per-step stack snapshots and variable lifecycle bookkeeping
//!
//! The manager owns two maps:
//! - step → symbolic stack, sparse and ordered by step
//! - variable id → where and in which state the variable was last seen
//!
//! Snapshots are written once by the transition driver. Binding a variable
//! and updating its lifecycle are the only edits made to a stored snapshot;
//! because stacks are persistent, such an edit never leaks into the snapshots
//! of other steps.

use std::collections::{BTreeMap, HashMap};

use symstack_common::{
    symstack_assert,
    types::{
        Lifecycle, ScopeId, SlotKind, StackSlot, VariableDescriptor, VariableId,
        VariableLocation,
    },
};
use tracing::debug;

use crate::{Diagnostic, SymbolicStack};

/// Stores symbolic stacks per step and tracks variable lifecycles
#[derive(Debug, Clone, Default)]
pub struct StackStateManager {
    steps: BTreeMap<usize, SymbolicStack>,
    lifecycles: HashMap<VariableId, VariableLocation>,
}

impl StackStateManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Stack stored at `step`, or an empty stack
    pub fn get_stack_at_step(&self, step: usize) -> SymbolicStack {
        self.steps.get(&step).cloned().unwrap_or_default()
    }

    /// Stack stored at `step`, if any
    pub fn stack_at(&self, step: usize) -> Option<&SymbolicStack> {
        self.steps.get(&step)
    }

    /// Store the stack for `step`, replacing any previous snapshot
    pub fn set_stack_at_step(&mut self, step: usize, stack: SymbolicStack) {
        self.steps.insert(step, stack);
    }

    /// Nearest snapshot stored strictly before `step`, or an empty stack
    pub fn get_previous_stack(&self, step: usize) -> SymbolicStack {
        self.steps.range(..step).next_back().map(|(_, stack)| stack.clone()).unwrap_or_default()
    }

    /// Bind a declaration onto the slot at `stack_index` of the stack stored at `step`
    ///
    /// The slot keeps its provenance and takes the identity of `descriptor`.
    /// Any other original slot of the same variable at that step is demoted to
    /// a temporary referencing the new binding. A different variable whose
    /// recorded location was this very slot loses its lifecycle entry. An
    /// index outside the stack leaves everything untouched and is returned as
    /// [`Diagnostic::OutOfBoundsBind`].
    pub fn bind_variable_with_lifecycle(
        &mut self,
        step: usize,
        descriptor: &VariableDescriptor,
        stack_index: isize,
        lifecycle: Lifecycle,
        function_scope_id: Option<ScopeId>,
    ) -> Result<(), Diagnostic> {
        let depth = self.stack_depth(step);
        let index = usize::try_from(stack_index).ok().filter(|index| *index < depth);
        let (Some(index), Some(stack)) = (index, self.steps.get_mut(&step)) else {
            return Err(Diagnostic::OutOfBoundsBind {
                step,
                variable_id: descriptor.id,
                stack_index,
                depth,
            }
            .logged());
        };

        let kind = SlotKind::from_descriptor(descriptor, lifecycle, function_scope_id);
        let Some(previous) = stack.get(index) else {
            return Ok(());
        };
        let displaced = previous
            .variable_id()
            .filter(|id| *id != descriptor.id && previous.is_original_declaration());
        let bound = StackSlot {
            kind,
            origin_step: previous.origin_step,
            origin_op: previous.origin_op.clone(),
            derived_from: previous.derived_from.clone(),
            references_variable: None,
        };
        let Some(reference) = bound.reference_at(index) else {
            return Ok(());
        };

        let stale: Vec<usize> = stack
            .enumerate()
            .filter(|(i, slot)| {
                *i != index &&
                    slot.is_original_declaration() &&
                    slot.variable_id() == Some(descriptor.id)
            })
            .map(|(i, _)| i)
            .collect();
        for i in stale {
            if let Some(slot) = stack.get_mut(i) {
                slot.kind = SlotKind::Intermediate;
                slot.references_variable = Some(reference.clone());
            }
        }

        stack.set_mut(index, bound);
        symstack_assert!(
            stack.has_unique_originals(),
            "step {step}: variable {} bound twice",
            descriptor.id
        );

        if let Some(old) = displaced {
            let overwritten = self
                .lifecycles
                .get(&old)
                .is_some_and(|location| location.step == step && location.stack_index == index);
            if overwritten {
                self.lifecycles.remove(&old);
                debug!(step, stack_index = index, id = %old, "binding replaced variable");
            }
        }
        self.lifecycles
            .insert(descriptor.id, VariableLocation { step, stack_index: index, lifecycle });
        debug!(
            step,
            stack_index = index,
            variable = %descriptor.name,
            id = %descriptor.id,
            %lifecycle,
            "bound variable"
        );
        Ok(())
    }

    /// The variable or parameter slot at `position` of the stack stored at `step`
    pub fn find_variable_at_position(&self, step: usize, position: usize) -> Option<&StackSlot> {
        self.steps.get(&step)?.get(position).filter(|slot| slot.is_declaration())
    }

    /// All bound slots at `step`, bottom first, with their indices
    pub fn get_all_variables_at_step(&self, step: usize) -> Vec<(usize, &StackSlot)> {
        self.steps
            .get(&step)
            .map(|stack| stack.enumerate().filter(|(_, slot)| slot.is_bound()).collect())
            .unwrap_or_default()
    }

    /// Bound slots at `step` belonging to the function scope `scope`
    pub fn get_variables_in_function_scope(
        &self,
        step: usize,
        scope: ScopeId,
    ) -> Vec<(usize, &StackSlot)> {
        self.get_all_variables_at_step(step)
            .into_iter()
            .filter(|(_, slot)| {
                slot.binding().is_some_and(|binding| binding.function_scope_id == Some(scope))
            })
            .collect()
    }

    /// Record a new lifecycle state for a tracked variable
    ///
    /// If the stack stored at `step` still holds the variable's original slot,
    /// that slot is updated and the index entry moves to it. Otherwise only
    /// the state changes and the entry keeps the last place the variable was
    /// seen.
    pub fn update_variable_lifecycle(
        &mut self,
        step: usize,
        variable_id: VariableId,
        lifecycle: Lifecycle,
    ) -> Result<(), Diagnostic> {
        let Some(location) = self.lifecycles.get_mut(&variable_id) else {
            return Err(Diagnostic::UntrackedVariable { step, variable_id }.logged());
        };
        location.lifecycle = lifecycle;

        let Some(stack) = self.steps.get_mut(&step) else {
            return Ok(());
        };
        let resident = stack.enumerate().find_map(|(i, slot)| {
            (slot.is_original_declaration() && slot.variable_id() == Some(variable_id)).then_some(i)
        });
        if let Some(index) = resident {
            if let Some(binding) = stack.get_mut(index).and_then(|slot| slot.kind.binding_mut()) {
                binding.lifecycle = lifecycle;
            }
            location.step = step;
            location.stack_index = index;
        }
        Ok(())
    }

    /// Where and in which state `variable_id` was last recorded
    pub fn get_variable_lifecycle(&self, variable_id: VariableId) -> Option<VariableLocation> {
        self.lifecycles.get(&variable_id).copied()
    }

    /// All tracked variables and their last recorded location
    pub fn tracked_variables(&self) -> impl Iterator<Item = (VariableId, VariableLocation)> + '_ {
        self.lifecycles.iter().map(|(id, location)| (*id, *location))
    }

    /// Mark every variable of `scope` resident at `step` as destroyed
    ///
    /// Returns the ids that were updated.
    pub fn destroy_function_scope(&mut self, step: usize, scope: ScopeId) -> Vec<VariableId> {
        let ids: Vec<VariableId> = self
            .get_variables_in_function_scope(step, scope)
            .into_iter()
            .filter(|(_, slot)| slot.is_original_declaration())
            .filter_map(|(_, slot)| slot.variable_id())
            .collect();

        for id in &ids {
            // Every id here was bound through this manager, so it is tracked.
            let _ = self.update_variable_lifecycle(step, *id, Lifecycle::Destroyed);
        }
        if !ids.is_empty() {
            debug!(step, %scope, count = ids.len(), "destroyed function scope");
        }
        ids
    }

    /// Depth of the stack stored at `step`, 0 when absent
    pub fn stack_depth(&self, step: usize) -> usize {
        self.steps.get(&step).map_or(0, SymbolicStack::len)
    }

    /// Highest step with a stored snapshot
    pub fn latest_step(&self) -> Option<usize> {
        self.steps.keys().next_back().copied()
    }

    /// Iterate stored snapshots in step order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &SymbolicStack)> {
        self.steps.iter().map(|(step, stack)| (*step, stack))
    }

    /// Number of stored snapshots
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether no snapshot is stored
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Drop every snapshot and lifecycle entry
    pub fn reset(&mut self) {
        self.steps.clear();
        self.lifecycles.clear();
    }
}
