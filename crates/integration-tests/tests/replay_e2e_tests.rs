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

//! End-to-end replay tests
//!
//! These tests drive whole struct-log traces through a debug session:
//! - Call frames entered and left mid-trace
//! - Concrete stacks disagreeing with the symbolic one
//! - Bindings and configuration loaded from files
//! - Diagnostics surfacing both in the report and in the logs

use eyre::Result;
use serde_json::Value;
use symstack_common::types::{
    bindings_from_json, bindings_from_json_file, Lifecycle, ScopeId, Trace, VariableId,
};
use symstack_engine::{DebugSession, Diagnostic, EngineConfig};
use symstack_integration_tests::test_utils::{
    fixtures::{self, TraceBuilder},
    init,
    logging,
};
use tempfile::TempDir;
use tracing::info;

#[test]
fn test_variable_survives_a_nested_call() -> Result<()> {
    init::init_test_environment();
    info!("Replaying a trace with a nested call");

    let trace = TraceBuilder::new()
        .op("PUSH1") // x
        .ops(&["PUSH1"; 7])
        .op_with_stack("CALL", &[9, 1, 2, 3, 4, 5, 6, 7])
        .enter_call()
        .op_with_stack("PUSH0", &[])
        .op("PUSH0")
        .op("RETURN")
        .leave_call()
        .op_with_stack("ISZERO", &[9, 1])
        .build()?;
    let bindings =
        bindings_from_json(&Value::Array(vec![fixtures::binding(0, 0, 1, "x")]).to_string())?;

    let mut session = DebugSession::default();
    let report = session.replay(&trace, &bindings);

    assert!(report.is_clean(), "unexpected diagnostics: {:?}", report.diagnostics);
    assert_eq!(report.steps, 13);
    assert_eq!(session.suspended_frames(), 0);

    let manager = session.manager();
    let call = manager.get_stack_at_step(8);
    assert_eq!(call.len(), 2);
    assert_eq!(call.top().unwrap().derived_from, (1..=7).collect::<Vec<_>>());

    // The callee never sees the caller's variable
    assert!(manager.get_all_variables_at_step(10).is_empty());
    assert!(manager.get_stack_at_step(11).is_empty());

    let resumed = manager.get_stack_at_step(12);
    assert_eq!(resumed.len(), 2);
    assert_eq!(manager.find_variable_at_position(12, 0).unwrap().variable_name(), Some("x"));
    assert_eq!(resumed.top().unwrap().origin_op, "ISZERO");
    Ok(())
}

#[test]
fn test_concrete_stack_realigns_the_symbolic_one() -> Result<()> {
    init::init_test_environment();
    info!("Replaying a trace that starts mid-function");

    let trace = TraceBuilder::new().op_with_stack("ADD", &[1, 2, 3]).op("POP").build()?;

    let mut session = DebugSession::default();
    let report = session.replay(&trace, &[]);

    assert_eq!(
        report.diagnostics,
        vec![Diagnostic::DepthMismatch { step: 0, symbolic: 0, concrete: 3 }]
    );
    let stack = session.manager().get_stack_at_step(0);
    assert_eq!(stack.len(), 2);
    assert!(stack.get(0).unwrap().is_unknown());
    assert_eq!(stack.top().unwrap().derived_from, vec![1, 2]);
    assert_eq!(session.manager().stack_depth(1), 1);

    // Without the check the same trace underflows instead
    let mut unchecked = DebugSession::new(EngineConfig::default().with_concrete_depth_check(false));
    let report = unchecked.replay(&trace, &[]);
    let kinds: Vec<_> = report.diagnostics.iter().map(Diagnostic::kind).collect();
    assert_eq!(kinds, ["stack_underflow"]);
    assert!(unchecked.manager().get_stack_at_step(1).is_empty());
    Ok(())
}

#[test]
fn test_every_diagnostic_is_logged_as_a_warning() -> Result<()> {
    info!("Capturing diagnostics from the logs");

    let trace = TraceBuilder::new().ops(&["POP", "FROBNICATE", "PUSH1", "POP"]).build()?;
    let bindings = bindings_from_json(
        &Value::Array(vec![fixtures::binding(2, 0, 1, "t"), fixtures::binding(9, 0, 2, "late")])
            .to_string(),
    )?;

    let (report, capture) = logging::capture_warnings(|| {
        let mut session = DebugSession::default();
        session.replay(&trace, &bindings)
    });

    let kinds: Vec<_> = report.diagnostics.iter().map(Diagnostic::kind).collect();
    assert_eq!(
        kinds,
        ["stack_underflow", "unknown_opcode", "declaration_removed", "out_of_bounds_bind"]
    );
    assert_eq!(report.degraded_steps, 3);
    assert_eq!(capture.kinds(), kinds);

    let warnings = capture.get_warnings();
    assert!(warnings[1].message.contains("FROBNICATE"));
    assert!(warnings[2].message.contains('t'));
    Ok(())
}

#[test]
fn test_config_file_controls_swap_pinning() -> Result<()> {
    init::init_test_environment();
    info!("Loading the engine configuration from a file");

    let trace = Trace::from_ops(["PUSH1", "PUSH1", "SWAP1"]);
    let bindings =
        bindings_from_json(&Value::Array(vec![fixtures::binding(0, 0, 1, "x")]).to_string())?;

    let mut pinned = DebugSession::default();
    assert!(pinned.replay(&trace, &bindings).is_clean());
    let manager = pinned.manager();
    assert_eq!(manager.find_variable_at_position(2, 0).unwrap().variable_name(), Some("x"));
    let placeholder = manager.get_stack_at_step(2).get(1).cloned().unwrap();
    assert_eq!(placeholder.references_variable.unwrap().variable_id, VariableId(1));

    let dir = TempDir::new()?;
    let path = dir.path().join("symstack.toml");
    std::fs::write(&path, "pin_swapped_variables = false\n")?;
    let config = EngineConfig::load(&path)?;
    assert!(!config.pin_swapped_variables);
    assert!(config.track_provenance);

    let mut positional = DebugSession::new(config);
    assert!(positional.replay(&trace, &bindings).is_clean());
    let manager = positional.manager();
    assert!(manager.find_variable_at_position(2, 0).is_none());
    assert_eq!(manager.find_variable_at_position(2, 1).unwrap().variable_name(), Some("x"));
    Ok(())
}

#[test]
fn test_function_scope_from_files() -> Result<()> {
    init::init_test_environment();
    info!("Replaying trace and bindings read from disk");

    let dir = TempDir::new()?;
    let trace_path =
        TraceBuilder::new().ops(&["PUSH1", "PUSH1", "DUP2", "DUP2", "ADD"]).write_to(dir.path())?;
    let bindings_path = fixtures::write_bindings(
        dir.path(),
        vec![
            fixtures::parameter_binding(0, 0, 1, "a", 3),
            fixtures::parameter_binding(1, 1, 2, "b", 3),
        ],
    )?;

    let trace = Trace::from_json_file(&trace_path)?;
    let bindings = bindings_from_json_file(&bindings_path)?;

    let mut session = DebugSession::default();
    let report = session.replay(&trace, &bindings);
    assert!(report.is_clean());

    let scope = ScopeId(3);
    let in_scope = session.manager().get_variables_in_function_scope(4, scope);
    assert_eq!(in_scope.iter().map(|(index, _)| *index).collect::<Vec<_>>(), vec![0, 1]);
    assert!(in_scope.iter().all(|(_, slot)| slot.is_parameter()));

    let destroyed = session.manager_mut().destroy_function_scope(4, scope);
    assert_eq!(destroyed, vec![VariableId(1), VariableId(2)]);

    let manager = session.manager();
    for id in destroyed {
        let location = manager.get_variable_lifecycle(id).unwrap();
        assert_eq!(location.step, 4);
        assert_eq!(location.lifecycle, Lifecycle::Destroyed);
    }
    // Earlier snapshots keep the state they were recorded with
    let lifecycle_at = |step: usize| manager.get_stack_at_step(step).get(0).unwrap().lifecycle();
    assert_eq!(lifecycle_at(1), Some(Lifecycle::Assigned));
    assert_eq!(lifecycle_at(4), Some(Lifecycle::Destroyed));
    Ok(())
}

#[test]
fn test_replay_is_repeatable() -> Result<()> {
    init::init_test_environment();
    info!("Replaying the same trace twice");

    let trace =
        TraceBuilder::new().ops(&["PUSH1", "DUP1", "SWAP2", "MLOAD", "POP", "POP"]).build()?;
    let bindings =
        bindings_from_json(&Value::Array(vec![fixtures::binding(0, 0, 1, "x")]).to_string())?;

    let mut session = DebugSession::default();
    let first = session.replay(&trace, &bindings);
    let first_stacks: Vec<_> = session.manager().iter().map(|(_, stack)| stack.clone()).collect();

    let second = session.replay(&trace, &bindings);
    let second_stacks: Vec<_> = session.manager().iter().map(|(_, stack)| stack.clone()).collect();

    assert_eq!(first, second);
    assert_eq!(first_stacks, second_stacks);
    assert_eq!(session.manager().len(), trace.len());
    Ok(())
}
