//! Rendering of symbolic stacks for the terminal and for JSON output

use itertools::Itertools;
use serde_json::{json, Value};
use symstack_common::types::{SlotKind, StackSlot, TraceStep};
use symstack_engine::{ReplayReport, SymbolicStack};

/// One-line description of a slot
pub fn describe_slot(slot: &StackSlot) -> String {
    let what = match (&slot.kind, slot.binding()) {
        (kind, Some(binding)) => {
            let ty =
                binding.variable_type.as_deref().map(|ty| format!(": {ty}")).unwrap_or_default();
            format!("{}{ty} [{}, {}]", binding.variable_name, kind.name(), binding.lifecycle)
        }
        (SlotKind::Unknown, None) => "unknown".to_string(),
        (_, None) => match &slot.references_variable {
            Some(reference) => format!(
                "intermediate (copy of {}@{})",
                reference.variable_name, reference.source_stack_index
            ),
            None => "intermediate".to_string(),
        },
    };
    format!("{what} <- {}@{}", slot.origin_op, slot.origin_step)
}

/// The stack after `step`, top first
pub fn render_step_text(step: usize, op: &str, stack: &SymbolicStack) -> String {
    let header = format!("step {step:>4}  {op:<14} depth {}", stack.len());
    let slots = stack
        .enumerate()
        .collect_vec()
        .into_iter()
        .rev()
        .map(|(index, slot)| format!("    [{index:>3}] {}", describe_slot(slot)));

    std::iter::once(header).chain(slots).join("\n")
}

/// The stack after `step` as JSON
pub fn step_json(step: usize, entry: &TraceStep, stack: &SymbolicStack) -> Value {
    json!({
        "step": step,
        "pc": entry.pc,
        "op": entry.op,
        "depth": entry.depth,
        "stack": stack,
    })
}

/// Short replay summary for stderr
pub fn render_summary(report: &ReplayReport) -> String {
    let header = format!(
        "replayed {} steps, {} with diagnostics",
        report.steps, report.degraded_steps
    );
    let counts =
        report.counts_by_kind().into_iter().map(|(kind, count)| format!("  {kind}: {count}"));
    std::iter::once(header).chain(counts).join("\n")
}
