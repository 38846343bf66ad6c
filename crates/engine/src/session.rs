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

//! Trace replay
//!
//! A [`DebugSession`] owns one [`StackStateManager`] and feeds it a trace one
//! step at a time. On top of the plain transition rules it handles:
//!
//! - **Call frames**: when the call depth grows, the caller's stack is set
//!   aside and the callee starts empty; when it shrinks, the caller resumes.
//! - **Bindings**: decoder-supplied bindings are applied right after the
//!   transition of their step.
//! - **Concrete depth**: when the trace recorded the real stack, the symbolic
//!   depth is checked against it and realigned on mismatch.
//! - **Lifecycle**: a declaration removed by `POP` is recorded as destroyed.

use std::collections::BTreeMap;

use itertools::Itertools;
use serde::Serialize;
use symstack_common::types::{BindingRequest, Lifecycle, StackSlot, Trace, TraceStep};
use tracing::{debug, info};

use crate::{
    Diagnostic, EngineConfig, Opcode, StackEngine, StackStateManager, SymbolicStack, Transition,
};

/// Summary of a replayed trace
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplayReport {
    /// Number of replayed steps
    pub steps: usize,
    /// Number of steps that raised at least one diagnostic
    pub degraded_steps: usize,
    /// Every diagnostic, in step order
    pub diagnostics: Vec<Diagnostic>,
}

impl ReplayReport {
    /// Whether the replay raised no diagnostics
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Diagnostic counts per kind, sorted by kind
    pub fn counts_by_kind(&self) -> BTreeMap<&'static str, usize> {
        self.diagnostics.iter().map(Diagnostic::kind).counts().into_iter().collect()
    }

    /// Diagnostics raised at `step`
    pub fn diagnostics_at(&self, step: usize) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |diag| diag.step() == step)
    }
}

/// One debugging session over one trace
#[derive(Debug, Clone, Default)]
pub struct DebugSession {
    engine: StackEngine,
    manager: StackStateManager,
    /// Stack of the frame currently executing
    current: SymbolicStack,
    /// Stacks of callers waiting for their callee to return, innermost last
    suspended: Vec<SymbolicStack>,
    /// Call depth of the last replayed step
    depth: Option<usize>,
}

impl DebugSession {
    /// Create a session with the given configuration
    pub fn new(config: EngineConfig) -> Self {
        Self { engine: StackEngine::new(config), ..Default::default() }
    }

    /// The transition engine
    pub fn engine(&self) -> &StackEngine {
        &self.engine
    }

    /// The active configuration
    pub fn config(&self) -> &EngineConfig {
        self.engine.config()
    }

    /// The stack-state manager holding every snapshot
    pub fn manager(&self) -> &StackStateManager {
        &self.manager
    }

    /// Mutable access to the stack-state manager
    pub fn manager_mut(&mut self) -> &mut StackStateManager {
        &mut self.manager
    }

    /// Number of callers currently suspended
    pub fn suspended_frames(&self) -> usize {
        self.suspended.len()
    }

    /// Apply `opcode` at `step` on top of the nearest earlier snapshot and store the result
    pub fn advance(&mut self, step: usize, opcode: &str) -> Transition {
        let previous = self.manager.get_previous_stack(step);
        let transition = self.engine.advance(&previous, opcode, step);
        self.commit(step, &transition);
        transition
    }

    /// Apply a binding request to its step
    pub fn bind(&mut self, request: &BindingRequest) -> Result<(), Diagnostic> {
        self.manager.bind_variable_with_lifecycle(
            request.step,
            &request.variable,
            request.stack_index,
            request.lifecycle,
            request.function_scope_id,
        )?;
        if self.manager.latest_step() == Some(request.step) {
            self.current = self.manager.get_stack_at_step(request.step);
        }
        Ok(())
    }

    /// Replay a whole trace from a fresh state
    ///
    /// Steps are numbered from 0 in trace order. Bindings whose step lies
    /// beyond the trace are still attempted, and reported as out of bounds.
    pub fn replay(&mut self, trace: &Trace, bindings: &[BindingRequest]) -> ReplayReport {
        self.reset();
        info!(steps = trace.len(), bindings = bindings.len(), "replaying trace");

        let mut pending: BTreeMap<usize, Vec<&BindingRequest>> = BTreeMap::new();
        for request in bindings {
            pending.entry(request.step).or_default().push(request);
        }

        let mut report = ReplayReport { steps: trace.len(), ..Default::default() };
        for (step, entry) in trace.iter().enumerate() {
            let mut diagnostics = self.replay_step(step, entry);
            for request in pending.remove(&step).unwrap_or_default() {
                if let Err(diag) = self.bind(request) {
                    diagnostics.push(diag);
                }
            }
            if !diagnostics.is_empty() {
                report.degraded_steps += 1;
                report.diagnostics.extend(diagnostics);
            }
        }

        for request in pending.into_values().flatten() {
            if let Err(diag) = self.bind(request) {
                report.diagnostics.push(diag);
            }
        }

        info!(
            steps = report.steps,
            degraded = report.degraded_steps,
            diagnostics = report.diagnostics.len(),
            "replay finished"
        );
        report
    }

    /// Drop every snapshot, lifecycle entry and suspended frame
    pub fn reset(&mut self) {
        self.manager.reset();
        self.current = SymbolicStack::new();
        self.suspended.clear();
        self.depth = None;
    }

    fn replay_step(&mut self, step: usize, entry: &TraceStep) -> Vec<Diagnostic> {
        let opcode = Opcode::parse(&entry.op);
        self.enter_frame(step, entry.depth);

        let mut diagnostics = Vec::new();
        let mut previous = self.current.clone();
        let check_depth = self.config().check_concrete_depth;
        if let Some(concrete) = entry.stack.as_ref().filter(|_| check_depth) {
            if concrete.len() != previous.len() {
                diagnostics.push(
                    Diagnostic::DepthMismatch {
                        step,
                        symbolic: previous.len(),
                        concrete: concrete.len(),
                    }
                    .logged(),
                );
                previous = realign(&previous, concrete.len(), step, &opcode);
            }
        }

        let transition = self.engine.advance_parsed(&previous, &opcode, step);
        self.commit(step, &transition);
        diagnostics.extend(transition.into_parts().1);
        diagnostics
    }

    /// Switch to the frame executing at `depth`
    fn enter_frame(&mut self, step: usize, depth: usize) {
        let Some(last) = self.depth.replace(depth) else {
            return;
        };

        if depth > last {
            debug!(step, from = last, to = depth, "entering call frame");
            self.suspended.push(std::mem::take(&mut self.current));
            // Frames skipped by a multi-level jump never ran any code
            for _ in last + 1..depth {
                self.suspended.push(SymbolicStack::new());
            }
        } else if depth < last {
            debug!(step, from = last, to = depth, "returning to caller");
            for _ in depth..last {
                self.current = self.suspended.pop().unwrap_or_default();
            }
        }
    }

    /// Store the produced stack and record removed declarations as destroyed
    fn commit(&mut self, step: usize, transition: &Transition) {
        self.current = transition.stack().clone();
        self.manager.set_stack_at_step(step, transition.stack().clone());

        for diag in transition.diagnostics() {
            if let Diagnostic::DeclarationRemoved { variable_id, .. } = diag {
                // Slots placed by other means than a binding are not tracked.
                let _ = self.manager.update_variable_lifecycle(
                    step,
                    *variable_id,
                    Lifecycle::Destroyed,
                );
            }
        }
    }
}

/// Resize `stack` to `depth`, keeping the top slots and padding the bottom with unknowns
fn realign(stack: &SymbolicStack, depth: usize, step: usize, opcode: &Opcode) -> SymbolicStack {
    let slots = stack.to_vec();
    let keep = slots.len().min(depth);
    let skip = slots.len() - keep;
    let op = opcode.to_string();

    (0..depth - keep)
        .map(|_| StackSlot::unknown(step, op.clone()))
        .chain(slots.into_iter().skip(skip))
        .collect()
}
