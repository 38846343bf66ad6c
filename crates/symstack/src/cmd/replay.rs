//! Replay command - replay a trace file and print the symbolic stacks

use std::path::Path;

use eyre::{bail, Result};
use itertools::Itertools;
use serde_json::json;
use symstack_common::types::{bindings_from_json_file, Trace};
use symstack_engine::{DebugSession, EngineConfig, ReplayReport, StackStateManager};

use crate::{render, OutputFormat};

/// Replay `trace_path` with optional bindings and print the result
pub fn replay_trace(
    trace_path: &Path,
    bindings_path: Option<&Path>,
    step: Option<usize>,
    format: OutputFormat,
    config: EngineConfig,
) -> Result<()> {
    let trace = Trace::from_json_file(trace_path)?;
    let bindings = match bindings_path {
        Some(path) => bindings_from_json_file(path)?,
        None => Vec::new(),
    };
    tracing::info!("Loaded {} trace steps and {} bindings", trace.len(), bindings.len());

    if let Some(step) = step.filter(|step| *step >= trace.len()) {
        bail!("step {step} is out of range, the trace has {} steps", trace.len());
    }

    let mut session = DebugSession::new(config);
    let report = session.replay(&trace, &bindings);

    println!("{}", render_output(&trace, session.manager(), &report, step, format)?);
    eprintln!("{}", render::render_summary(&report));
    Ok(())
}

fn render_output(
    trace: &Trace,
    manager: &StackStateManager,
    report: &ReplayReport,
    step: Option<usize>,
    format: OutputFormat,
) -> Result<String> {
    let steps = step.map_or_else(|| (0..trace.len()).collect_vec(), |step| vec![step]);

    match format {
        OutputFormat::Text => Ok(steps
            .into_iter()
            .map(|step| {
                render::render_step_text(step, &trace[step].op, &manager.get_stack_at_step(step))
            })
            .join("\n")),
        OutputFormat::Json => {
            let mut rendered = steps.into_iter().map(|step| {
                render::step_json(step, &trace[step], &manager.get_stack_at_step(step))
            });
            let value = match step {
                Some(_) => rendered.next().unwrap_or_default(),
                None => json!({ "steps": rendered.collect_vec(), "report": report }),
            };
            Ok(serde_json::to_string_pretty(&value)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn replayed(ops: &[&str]) -> (Trace, DebugSession, ReplayReport) {
        let trace = Trace::from_ops(ops.iter().copied());
        let mut session = DebugSession::default();
        let report = session.replay(&trace, &[]);
        (trace, session, report)
    }

    #[test]
    fn test_text_output_covers_every_step() {
        let (trace, session, report) = replayed(&["PUSH1", "PUSH1", "ADD"]);
        let text =
            render_output(&trace, session.manager(), &report, None, OutputFormat::Text).unwrap();

        assert_eq!(text.lines().filter(|line| line.starts_with("step")).count(), 3);
        assert!(text.contains("ADD@2"));
    }

    #[test]
    fn test_json_output_for_one_step() {
        let (trace, session, report) = replayed(&["PUSH1", "DUP1"]);
        let json =
            render_output(&trace, session.manager(), &report, Some(1), OutputFormat::Json).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["step"], 1);
        assert_eq!(value["stack"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_json_output_includes_report() {
        let (trace, session, report) = replayed(&["POP"]);
        let json =
            render_output(&trace, session.manager(), &report, None, OutputFormat::Json).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["steps"].as_array().unwrap().len(), 1);
        assert_eq!(value["report"]["degraded_steps"], 1);
        assert_eq!(value["report"]["diagnostics"][0]["kind"], "stack_underflow");
    }
}
