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

//! Symbolic stack transitions
//!
//! [`StackEngine::advance`] derives the stack after one executed opcode from
//! the stack before it. The rules are tried in this order:
//!
//! 1. `DUPn` copies the n-th slot from the top. The copy is always a
//!    temporary; copying a declaration records a back-reference to it.
//! 2. `SWAPn` exchanges the top with the slot n below it. When one side is a
//!    declaration and the other a temporary, the declaration keeps its index
//!    (see [`EngineConfig::pin_swapped_variables`]).
//! 3. `MLOAD` replaces the address with the loaded word, which inherits the
//!    identity of the address slot when it had one.
//! 4. `POP` drops the top. Dropping the original slot of a declaration is
//!    reported as [`Diagnostic::DeclarationRemoved`].
//! 5. Everything else pops and pushes according to its [`OpcodeEffect`]; the
//!    pushed slots are temporaries derived from the popped ones.
//!
//! A transition never fails. Underflows and unknown opcodes are substituted
//! (an `Unknown` slot, or no change) and returned as diagnostics alongside
//! the produced stack.

use symstack_common::{symstack_debug_assert, types::StackSlot};
use tracing::trace;

use crate::{Diagnostic, EngineConfig, Opcode, OpcodeEffect, SymbolicStack};

/// Outcome of one transition
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum Transition {
    /// The opcode applied without anomalies
    Clean(SymbolicStack),
    /// The opcode applied with substitutions
    Degraded {
        /// The produced stack
        stack: SymbolicStack,
        /// What went wrong, in the order it was observed
        diagnostics: Vec<Diagnostic>,
    },
}

impl Transition {
    fn new(stack: SymbolicStack, diagnostics: Vec<Diagnostic>) -> Self {
        if diagnostics.is_empty() {
            Self::Clean(stack)
        } else {
            Self::Degraded { stack, diagnostics }
        }
    }

    /// The produced stack
    pub fn stack(&self) -> &SymbolicStack {
        match self {
            Self::Clean(stack) | Self::Degraded { stack, .. } => stack,
        }
    }

    /// Diagnostics raised by the transition, empty when clean
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::Clean(_) => &[],
            Self::Degraded { diagnostics, .. } => diagnostics,
        }
    }

    /// Whether the transition raised no diagnostics
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean(_))
    }

    /// Take the produced stack, discarding diagnostics
    pub fn into_stack(self) -> SymbolicStack {
        self.into_parts().0
    }

    /// Split into the produced stack and its diagnostics
    pub fn into_parts(self) -> (SymbolicStack, Vec<Diagnostic>) {
        match self {
            Self::Clean(stack) => (stack, Vec::new()),
            Self::Degraded { stack, diagnostics } => (stack, diagnostics),
        }
    }
}

/// Applies transition rules under a fixed configuration
#[derive(Debug, Clone, Default)]
pub struct StackEngine {
    config: EngineConfig,
}

/// Per-transition state shared by the rules
struct Step<'a> {
    index: usize,
    op: String,
    config: &'a EngineConfig,
    diagnostics: Vec<Diagnostic>,
}

impl Step<'_> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic.logged());
    }

    fn underflow(&mut self, required: usize, available: usize) {
        self.report(Diagnostic::StackUnderflow {
            step: self.index,
            opcode: self.op.clone(),
            required,
            available,
        });
    }

    fn provenance(&self, indices: Vec<usize>) -> Vec<usize> {
        if self.config.track_provenance {
            indices
        } else {
            Vec::new()
        }
    }

    fn intermediate(&self, derived_from: Vec<usize>) -> StackSlot {
        StackSlot::intermediate(self.index, self.op.clone(), self.provenance(derived_from))
    }

    fn unknown(&self) -> StackSlot {
        StackSlot::unknown(self.index, self.op.clone())
    }
}

impl StackEngine {
    /// Create an engine with the given configuration
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// The active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Derive the stack after executing `mnemonic` at `step`
    pub fn advance(&self, previous: &SymbolicStack, mnemonic: &str, step: usize) -> Transition {
        self.advance_parsed(previous, &Opcode::parse(mnemonic), step)
    }

    /// Derive the stack after executing an already parsed opcode at `step`
    pub fn advance_parsed(
        &self,
        previous: &SymbolicStack,
        opcode: &Opcode,
        step: usize,
    ) -> Transition {
        let mut ctx =
            Step { index: step, op: opcode.to_string(), config: &self.config, diagnostics: vec![] };

        let stack = match opcode {
            Opcode::Dup(n) => apply_dup(&mut ctx, previous, *n as usize),
            Opcode::Swap(n) => apply_swap(&mut ctx, previous, *n as usize),
            Opcode::Mload => apply_mload(&mut ctx, previous),
            Opcode::Pop => apply_pop(&mut ctx, previous),
            Opcode::Push(_) | Opcode::Other(_) => {
                apply_generic(&mut ctx, previous, opcode.effect())
            }
        };

        if stack.len() > self.config.max_stack_depth {
            let limit = self.config.max_stack_depth;
            ctx.report(Diagnostic::StackOverflow { step, depth: stack.len(), limit });
        }

        symstack_debug_assert!(
            stack.has_unique_originals(),
            "step {step}: {opcode} left a variable with two original slots"
        );
        trace!(step, op = %opcode, before = previous.len(), after = stack.len(), "advanced");

        Transition::new(stack, ctx.diagnostics)
    }
}

/// Derive the next stack with the default configuration
pub fn advance(previous: &SymbolicStack, mnemonic: &str, step: usize) -> Transition {
    StackEngine::default().advance(previous, mnemonic, step)
}

fn apply_dup(ctx: &mut Step<'_>, previous: &SymbolicStack, n: usize) -> SymbolicStack {
    let depth = previous.len();
    let Some(source) = depth.checked_sub(n) else {
        ctx.underflow(n, depth);
        return previous.push(ctx.unknown());
    };
    let Some(original) = previous.get(source) else {
        ctx.underflow(n, depth);
        return previous.push(ctx.unknown());
    };

    let mut copy = ctx.intermediate(vec![source]);
    copy.references_variable = if original.is_declaration() {
        original.reference_at(source)
    } else {
        // A copy of a copy still refers to the same declaration
        original.references_variable.clone()
    };
    previous.push(copy)
}

fn apply_swap(ctx: &mut Step<'_>, previous: &SymbolicStack, n: usize) -> SymbolicStack {
    let depth = previous.len();
    if depth <= n {
        ctx.underflow(n + 1, depth);
        return previous.clone();
    }

    let top = depth - 1;
    let other = top - n;
    let (Some(top_slot), Some(other_slot)) = (previous.get(top), previous.get(other)) else {
        ctx.underflow(n + 1, depth);
        return previous.clone();
    };

    let pinned = match (top_slot.is_declaration(), other_slot.is_declaration()) {
        (true, false) if other_slot.is_intermediate() => Some((top, other)),
        (false, true) if top_slot.is_intermediate() => Some((other, top)),
        _ => None,
    };

    match pinned.filter(|_| ctx.config.pin_swapped_variables) {
        Some((var_index, tmp_index)) => pin_variable(ctx, previous, var_index, tmp_index),
        None => previous.swap(top, other).unwrap_or_else(|| previous.clone()),
    }
}

/// Keep the declaration at `var_index` and leave a reference to it at `tmp_index`
fn pin_variable(
    ctx: &Step<'_>,
    previous: &SymbolicStack,
    var_index: usize,
    tmp_index: usize,
) -> SymbolicStack {
    let mut stack = previous.clone();
    let Some(variable) = previous.get(var_index) else {
        return stack;
    };

    let mut placeholder = ctx.intermediate(vec![var_index]);
    placeholder.references_variable = variable.reference_at(var_index);

    let mut pinned = variable.clone();
    pinned.origin_step = ctx.index;
    pinned.origin_op = ctx.op.clone();
    pinned.derived_from = ctx.provenance(vec![tmp_index]);

    stack.set_mut(var_index, pinned);
    stack.set_mut(tmp_index, placeholder);
    stack
}

fn apply_mload(ctx: &mut Step<'_>, previous: &SymbolicStack) -> SymbolicStack {
    let Some((address, rest)) = previous.pop() else {
        ctx.underflow(1, 0);
        return previous.push(ctx.unknown());
    };

    let address_index = rest.len();
    let mut loaded = ctx.intermediate(vec![address_index]);
    if address.is_declaration() {
        loaded.kind = address.kind;
    } else if address.is_bound() {
        // return values are not inherited, only referenced
        loaded.references_variable = address.reference_at(address_index);
    } else {
        loaded.references_variable = address.references_variable;
    }
    rest.push(loaded)
}

fn apply_pop(ctx: &mut Step<'_>, previous: &SymbolicStack) -> SymbolicStack {
    let Some((top, rest)) = previous.pop() else {
        ctx.underflow(1, 0);
        return previous.clone();
    };

    if top.is_declaration() && top.references_variable.is_none() {
        if let Some(binding) = top.binding() {
            ctx.report(Diagnostic::DeclarationRemoved {
                step: ctx.index,
                variable_id: binding.variable_id,
                variable_name: binding.variable_name.clone(),
                stack_index: rest.len(),
            });
        }
    }
    rest
}

fn apply_generic(
    ctx: &mut Step<'_>,
    previous: &SymbolicStack,
    effect: OpcodeEffect,
) -> SymbolicStack {
    if effect.is_unknown() {
        ctx.report(Diagnostic::UnknownOpcode { step: ctx.index, opcode: ctx.op.clone() });
    }

    let depth = previous.len();
    if depth < effect.pops {
        ctx.underflow(effect.pops, depth);
    }

    let mut stack = previous.clone();
    let mut popped = Vec::with_capacity(effect.pops);
    for _ in 0..effect.pops.min(depth) {
        stack.pop_mut();
        popped.push(stack.len());
    }
    popped.reverse();

    for _ in 0..effect.pushes {
        stack.push_mut(ctx.intermediate(popped.clone()));
    }
    stack
}
