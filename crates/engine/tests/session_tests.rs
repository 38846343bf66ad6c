use symstack_common::types::{
    BindingRequest, Lifecycle, ScopeId, Trace, TraceStep, VariableDescriptor, VariableId,
    VariableLocation,
};
use symstack_engine::{DebugSession, Diagnostic, EngineConfig, StackStateManager};
use tracing::info;

/// `uint256 x = a + b;` where `a` and `b` are parameters already on the stack
fn add_trace() -> Trace {
    Trace::from_ops([
        "CALLDATALOAD", // a
        "PUSH1",
        "CALLDATALOAD", // b
        "DUP2",
        "DUP2",
        "ADD", // x
        "SWAP1",
        "POP",
    ])
}

#[test]
fn test_parameters_and_local_through_a_function_body() {
    symstack_common::logging::ensure_test_logging(None);
    info!("Running test");

    let trace = {
        // The first CALLDATALOAD needs an offset below it
        let mut steps = vec![TraceStep::new("PUSH0")];
        steps.extend(add_trace().into_steps());
        Trace::from(steps)
    };
    let bindings = vec![
        BindingRequest::new(1, 0, VariableDescriptor::new(1u64, "a").parameter()).in_scope(5u64),
        BindingRequest::new(3, 1, VariableDescriptor::new(2u64, "b").parameter()).in_scope(5u64),
        BindingRequest::new(6, 2, VariableDescriptor::new(3u64, "x").with_type("uint256"))
            .in_scope(5u64)
            .with_lifecycle(Lifecycle::Assigned),
    ];

    let mut session = DebugSession::default();
    let report = session.replay(&trace, &bindings);
    assert_eq!(report.steps, 9);
    // The closing POP drops the original slot of `b`
    assert_eq!(
        report.diagnostics,
        vec![Diagnostic::DeclarationRemoved {
            step: 8,
            variable_id: VariableId(2),
            variable_name: "b".to_string(),
            stack_index: 2,
        }]
    );

    let manager = session.manager();
    // After DUP2 DUP2 the copies reference a and b
    let copies = manager.get_stack_at_step(5);
    assert_eq!(copies.len(), 4);
    let ids: Vec<_> = copies
        .iter()
        .skip(2)
        .map(|slot| slot.references_variable.as_ref().map(|r| r.variable_id))
        .collect();
    assert_eq!(ids, vec![Some(VariableId(1)), Some(VariableId(2))]);

    let at_add = manager.get_all_variables_at_step(6);
    let names: Vec<_> = at_add.iter().filter_map(|(_, slot)| slot.variable_name()).collect();
    assert_eq!(names, vec!["a", "b", "x"]);

    // SWAP1 exchanges x with parameter b: both are declarations, so the swap is literal
    let swapped = manager.get_stack_at_step(7);
    assert_eq!(swapped.get(1).unwrap().variable_name(), Some("x"));
    assert_eq!(swapped.get(2).unwrap().variable_name(), Some("b"));

    let remaining = manager.get_variables_in_function_scope(8, ScopeId(5));
    assert_eq!(remaining.len(), 2);
    // `b` is gone from step 8, so its entry keeps the slot it was bound to
    let b = manager.get_variable_lifecycle(VariableId(2)).unwrap();
    assert_eq!(b, VariableLocation { step: 3, stack_index: 1, lifecycle: Lifecycle::Destroyed });
    assert_eq!(
        manager.find_variable_at_position(b.step, b.stack_index).unwrap().variable_name(),
        Some("b")
    );
    assert_eq!(
        manager.get_variable_lifecycle(VariableId(3)),
        Some(VariableLocation { step: 6, stack_index: 2, lifecycle: Lifecycle::Assigned })
    );
}

#[test]
fn test_removed_declaration_is_destroyed() {
    symstack_common::logging::ensure_test_logging(None);

    let trace = Trace::from_ops(["PUSH1", "PUSH1", "POP"]);
    let bindings = vec![BindingRequest::new(1, 1, VariableDescriptor::new(4u64, "tmp"))];

    let mut session = DebugSession::new(EngineConfig::default());
    let report = session.replay(&trace, &bindings);

    assert_eq!(report.degraded_steps, 1);
    assert!(matches!(
        report.diagnostics.as_slice(),
        [Diagnostic::DeclarationRemoved { step: 2, stack_index: 1, .. }]
    ));
    assert_eq!(
        session.manager().get_variable_lifecycle(VariableId(4)),
        Some(VariableLocation { step: 1, stack_index: 1, lifecycle: Lifecycle::Destroyed })
    );
}

#[test]
fn test_sessions_are_independent() {
    symstack_common::logging::ensure_test_logging(None);

    let mut first = DebugSession::default();
    let mut second = DebugSession::new(EngineConfig::default().with_swap_pinning(false));
    let trace = Trace::from_ops(["PUSH1", "PUSH1"]);
    let binding = BindingRequest::new(1, 0, VariableDescriptor::new(1u64, "x"));

    first.replay(&trace, std::slice::from_ref(&binding));
    second.replay(&trace, &[]);

    assert!(first.manager().find_variable_at_position(1, 0).is_some());
    assert!(second.manager().find_variable_at_position(1, 0).is_none());

    first.reset();
    assert!(first.manager().is_empty());
    assert!(first.manager().get_variable_lifecycle(VariableId(1)).is_none());
}

#[test]
fn test_manager_can_be_driven_by_hand() {
    symstack_common::logging::ensure_test_logging(None);

    let mut manager = StackStateManager::new();
    let mut previous = manager.get_previous_stack(0);
    for (step, op) in ["PUSH1", "PUSH1", "MSTORE"].into_iter().enumerate() {
        let transition = symstack_engine::advance(&previous, op, step);
        assert!(transition.is_clean());
        previous = transition.into_stack();
        manager.set_stack_at_step(step, previous.clone());
    }

    assert_eq!(manager.len(), 3);
    assert!(manager.get_stack_at_step(2).is_empty());
    assert_eq!(manager.get_previous_stack(2).len(), 2);
}
