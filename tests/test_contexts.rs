//! Context-chain tests: captured variables, parameter copy-in, context
//! save/restore around closure calls and jump unchaining.

mod common;

use common::*;
use text_size::TextSize;
use vela_flowgraph::ast::scope::{LocalVariable, SourceLabel};
use vela_flowgraph::ast::{AstNode, ClosureCallNode, JumpKind, SequenceNode};
use vela_flowgraph::ir::{Computation, Value};
use vela_flowgraph::runtime::Context;
use vela_flowgraph::{build_flow_graph, BuildOptions};

fn no_ssa() -> BuildOptions {
    BuildOptions {
        use_ssa: false,
        ..BuildOptions::default()
    }
}

#[test]
fn test_captured_parameter_is_copied_into_the_context() {
    let mut fixture = FunctionFixture::new("captures_param", 1);
    let p0 = fixture.params[0];
    // The parameter lives in the root context at slot zero.
    fixture.scopes.scope_mut(fixture.root_scope).context_level = 1;
    fixture
        .scopes
        .scope_mut(fixture.root_scope)
        .num_context_variables = 1;
    fixture.scopes.variable_mut(p0).is_captured = true;
    fixture.scopes.variable_mut(p0).index = 0;
    let saved = fixture.stack_local(":saved_context");
    fixture.saved_context_var = Some(saved);
    let saved_name = fixture.scopes.variable(saved).name;

    let (parsed, store) = fixture.finish(vec![ret_null()]);
    let graph = build_flow_graph(&parsed, &store, &no_ssa()).unwrap();
    let comps = chain_computations(&graph);

    // A fresh context is allocated and chained with a null parent; the
    // caller's context goes into the saved-context local.
    assert!(comps.iter().any(|(_, c)| matches!(
        c,
        Computation::AllocateContext {
            num_context_variables: 1,
            ..
        }
    )));
    assert!(comps.iter().any(|(_, c)| matches!(
        c,
        Computation::StoreLocal { local, .. } if local.name == saved_name
    )));
    assert!(comps
        .iter()
        .any(|(_, c)| matches!(c, Computation::ChainContext { .. })));

    // The parameter moves from its frame slot into the context, and the
    // frame slot is overwritten with null.
    let orig_name = store.symbols.intern("p0-orig");
    assert!(comps.iter().any(|(_, c)| matches!(
        c,
        Computation::LoadLocal { local, .. } if local.name == orig_name
    )));
    assert!(comps.iter().any(|(_, c)| matches!(
        c,
        Computation::StoreVmField { offset_in_bytes, .. }
            if *offset_in_bytes == Context::variable_offset(0)
    )));
    let null_into_frame_slot = comps.iter().any(|(_, c)| match c {
        Computation::StoreLocal { local, value, .. } => {
            local.name == orig_name
                && matches!(value, Value::Use(_))
        }
        _ => false,
    });
    assert!(null_into_frame_slot);

    // Every exit restores the caller's context.
    assert!(comps.iter().any(|(_, c)| matches!(
        c,
        Computation::LoadLocal { local, .. } if local.name == saved_name
    )));
}

#[test]
fn test_captured_load_walks_the_parent_chain() {
    let mut fixture = FunctionFixture::new("captures_chain", 0);
    fixture.scopes.scope_mut(fixture.root_scope).context_level = 1;
    fixture
        .scopes
        .scope_mut(fixture.root_scope)
        .num_context_variables = 1;
    let saved = fixture.stack_local(":saved_context");
    fixture.saved_context_var = Some(saved);

    // x is captured at the root context (level 1); y lives in a nested
    // context (level 2). Storing y from x takes one parent hop.
    let x_name = fixture.store.symbols.intern("x");
    let x = fixture.scopes.add_variable(LocalVariable {
        name: x_name,
        index: 0,
        ty: vela_flowgraph::types::AbstractType::Dynamic,
        is_captured: true,
        owner: fixture.root_scope,
        token_pos: TextSize::from(0),
    });
    let inner_scope = fixture.scopes.add_scope(Some(fixture.root_scope), 2, 1);
    let y_name = fixture.store.symbols.intern("y");
    let y = fixture.scopes.add_variable(LocalVariable {
        name: y_name,
        index: 0,
        ty: vela_flowgraph::types::AbstractType::Dynamic,
        is_captured: true,
        owner: inner_scope,
        token_pos: TextSize::from(0),
    });

    let inner = AstNode::Sequence(SequenceNode {
        token_pos: pos(),
        scope: Some(inner_scope),
        nodes: vec![store(y, load(x))],
        label: None,
    });
    let (parsed, store) = fixture.finish(vec![inner, ret_null()]);
    let graph = build_flow_graph(&parsed, &store, &no_ssa()).unwrap();
    let comps = chain_computations(&graph);

    // Two contexts are chained: the root's and the inner scope's.
    let chains = comps
        .iter()
        .filter(|(_, c)| matches!(c, Computation::ChainContext { .. }))
        .count();
    assert_eq!(chains, 2);

    // The load of x hops one parent link, then reads its slot.
    let parent_hop = comps.iter().find_map(|(id, c)| match c {
        Computation::LoadVmField {
            offset_in_bytes, ..
        } if *offset_in_bytes == Context::parent_offset() => Some(*id),
        _ => None,
    });
    let parent_hop = parent_hop.expect("no parent hop emitted");
    let slot_load_through_hop = comps.iter().any(|(_, c)| match c {
        Computation::LoadVmField {
            object: Value::Use(object),
            offset_in_bytes,
            ..
        } => *object == parent_hop && *offset_in_bytes == Context::variable_offset(0),
        _ => false,
    });
    assert!(slot_load_through_hop, "slot load does not go through the hop");

    // The store to y happens at the current level: no hop on its path.
    assert!(comps.iter().any(|(_, c)| matches!(
        c,
        Computation::StoreVmField { offset_in_bytes, .. }
            if *offset_in_bytes == Context::variable_offset(0)
    )));
}

#[test]
fn test_closure_call_saves_and_restores_the_context() {
    let mut fixture = FunctionFixture::new("calls_closure", 1);
    let temp = fixture.with_expression_temp();
    let temp_name = fixture.scopes.variable(temp).name;
    let p0 = fixture.params[0];
    let call = AstNode::ClosureCall(ClosureCallNode {
        token_pos: pos(),
        closure: Box::new(load(p0)),
        arguments: vec![int(1)],
        argument_names: Vec::new(),
    });
    let (parsed, store) = fixture.finish(vec![call, ret_null()]);
    let graph = build_flow_graph(&parsed, &store, &no_ssa()).unwrap();
    let comps = chain_computations(&graph);

    let call_position = comps
        .iter()
        .position(|(_, c)| matches!(c, Computation::ClosureCall { .. }))
        .expect("closure call lowered");

    // Before the call: the current context parked in the scratch cell.
    let saved_before = comps[..call_position].iter().any(|(_, c)| matches!(
        c,
        Computation::StoreLocal { local, .. } if local.name == temp_name
    ));
    assert!(saved_before);

    // After the call: the scratch cell reinstalled as current context.
    let restored_after = comps[call_position + 1..].iter().any(|(_, c)| {
        matches!(c, Computation::StoreContext { .. })
    });
    assert!(restored_after);
}

#[test]
fn test_break_out_of_a_context_scope_unchains() {
    let mut fixture = FunctionFixture::new("unchains", 1);
    let p0 = fixture.params[0];
    let inner_scope = fixture.scopes.add_scope(Some(fixture.root_scope), 1, 1);
    let z_name = fixture.store.symbols.intern("z");
    let z = fixture.scopes.add_variable(LocalVariable {
        name: z_name,
        index: 0,
        ty: vela_flowgraph::types::AbstractType::Dynamic,
        is_captured: true,
        owner: inner_scope,
        token_pos: TextSize::from(0),
    });
    let label_name = fixture.store.symbols.intern("L");
    let label = fixture.scopes.add_label(SourceLabel {
        name: label_name,
        owner: inner_scope,
        is_continue_target: false,
    });

    let labeled = AstNode::Sequence(SequenceNode {
        token_pos: pos(),
        scope: Some(inner_scope),
        nodes: vec![
            if_stmt(load(p0), jump(JumpKind::Break, label), None),
            store(z, int(1)),
        ],
        label: Some(label),
    });
    let (parsed, store) = fixture.finish(vec![labeled, ret_null()]);
    let graph = build_flow_graph(&parsed, &store, &no_ssa()).unwrap();
    let comps = chain_computations(&graph);

    // Both the break path and the normal exit pop the inner context: two
    // parent loads feeding StoreContext.
    let parent_loads = comps
        .iter()
        .filter(|(_, c)| matches!(
            c,
            Computation::LoadVmField { offset_in_bytes, .. }
                if *offset_in_bytes == Context::parent_offset()
        ))
        .count();
    assert_eq!(parent_loads, 2);

    // The break join merges the jump with the fall-through path.
    assert!(join_blocks(&graph)
        .iter()
        .any(|join| graph.block_info(*join).predecessors.len() == 2));
}
