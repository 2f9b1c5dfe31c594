//! CFG construction tests: fragment composition, joins, loops, switches
//! and the boundary shapes of the lowering.

mod common;

use common::*;
use vela_flowgraph::ast::{BinaryOpKind, ComparisonKind, JumpKind};
use vela_flowgraph::ir::printer::print_flow_graph;
use vela_flowgraph::ir::{Computation, InstructionKind};
use vela_flowgraph::{build_flow_graph, BuildOptions};

fn no_ssa() -> BuildOptions {
    BuildOptions {
        use_ssa: false,
        ..BuildOptions::default()
    }
}

#[test]
fn test_empty_function_shape() {
    let fixture = FunctionFixture::new("empty", 0);
    let (parsed, store) = fixture.finish(vec![ret_null()]);
    let graph = build_flow_graph(&parsed, &store, &no_ssa()).unwrap();

    assert_eq!(graph.postorder.len(), 2);
    let entry = graph.graph_entry.unwrap();
    assert!(matches!(
        graph.kind(entry),
        InstructionKind::GraphEntry { .. }
    ));
    assert_eq!(graph.block_info(entry).block_id, Some(0));

    let normal = match graph.kind(entry) {
        InstructionKind::GraphEntry { normal_entry, .. } => *normal_entry,
        _ => unreachable!(),
    };
    assert_eq!(graph.block_info(normal).block_id, Some(1));
    let last = graph.block_info(normal).last_instruction.unwrap();
    assert!(matches!(graph.kind(last), InstructionKind::Return { .. }));
    assert!(phis(&graph).is_empty());
}

#[test]
fn test_if_merges_arms_at_join() {
    let mut fixture = FunctionFixture::new("branches", 1);
    let x = fixture.stack_local("x");
    let p = fixture.params[0];
    let (parsed, store) = fixture.finish(vec![
        if_stmt(load(p), store(x, int(1)), Some(store(x, int(2)))),
        ret(load(x)),
    ]);
    let graph = build_flow_graph(&parsed, &store, &no_ssa()).unwrap();

    let joins = join_blocks(&graph);
    assert_eq!(joins.len(), 1);
    assert_eq!(graph.block_info(joins[0]).predecessors.len(), 2);
}

#[test]
fn test_short_circuit_and_uses_expression_temp() {
    let mut fixture = FunctionFixture::new("logical", 2);
    let b = fixture.stack_local("b");
    let temp = fixture.with_expression_temp();
    let (p0, p1) = (fixture.params[0], fixture.params[1]);
    let temp_name = fixture.scopes.variable(temp).name;
    let (parsed, store) = fixture.finish(vec![
        store(b, binop(BinaryOpKind::And, load(p0), load(p1))),
        ret_null(),
    ]);
    let graph = build_flow_graph(&parsed, &store, &no_ssa()).unwrap();

    // One join where both arms meet; each arm stored the scratch cell.
    assert_eq!(join_blocks(&graph).len(), 1);
    let temp_stores = chain_computations(&graph)
        .into_iter()
        .filter(|(_, comp)| {
            matches!(comp, Computation::StoreLocal { local, .. } if local.name == temp_name)
        })
        .count();
    assert_eq!(temp_stores, 2);
}

#[test]
fn test_short_circuit_and_in_ssa() {
    let mut fixture = FunctionFixture::new("logical_ssa", 2);
    let _b = fixture.stack_local("b");
    let temp = fixture.with_expression_temp();
    let (p0, p1) = (fixture.params[0], fixture.params[1]);
    let temp_bit = fixture.scopes.variable(temp).index;
    let (parsed, store) = fixture.finish(vec![
        store(_b, binop(BinaryOpKind::And, load(p0), load(p1))),
        ret_null(),
    ]);
    let graph = build_flow_graph(&parsed, &store, &BuildOptions::default()).unwrap();

    let all_phis = phis(&graph);
    assert_eq!(all_phis.len(), 1);
    assert_eq!(all_phis[0].1, temp_bit);
    assert_ssa_form(&graph);
}

#[test]
fn test_while_with_break_and_continue() {
    let mut fixture = FunctionFixture::new("loops", 3);
    let x = fixture.stack_local("x");
    let label = fixture.label();
    let (p0, p1, p2) = (fixture.params[0], fixture.params[1], fixture.params[2]);
    let body = seq(vec![
        if_stmt(load(p1), jump(JumpKind::Break, label), None),
        if_stmt(load(p2), jump(JumpKind::Continue, label), None),
        store(x, int(1)),
    ]);
    let (parsed, store) = fixture.finish(vec![
        while_stmt(label, load(p0), body),
        ret_null(),
    ]);
    let graph = build_flow_graph(&parsed, &store, &no_ssa()).unwrap();

    // Loop-top join, a distinct continue join, and a break join; each
    // merges exactly two edges here.
    let joins = join_blocks(&graph);
    assert_eq!(joins.len(), 3);
    for join in &joins {
        assert_eq!(graph.block_info(*join).predecessors.len(), 2);
    }

    // The loop body is guarded against stack overflow.
    assert!(chain_computations(&graph)
        .iter()
        .any(|(_, comp)| matches!(comp, Computation::CheckStackOverflow { .. })));

    // The false successor of the loop condition is the loop exit, which
    // flows into the break join.
    let exit_found = chain_instructions(&graph).iter().any(|(_, id)| {
        if let InstructionKind::Branch {
            false_successor: Some(false_target),
            ..
        } = graph.kind(*id)
        {
            if let Some(next) = graph.instr(*false_target).successor {
                return matches!(graph.kind(next), InstructionKind::JoinEntry { .. })
                    && joins.contains(&next);
            }
        }
        false
    });
    assert!(exit_found, "loop exit does not reach the break join");
}

#[test]
fn test_while_loop_builds_in_ssa() {
    let mut fixture = FunctionFixture::new("loop_ssa", 1);
    let x = fixture.stack_local("x");
    let label = fixture.label();
    let p0 = fixture.params[0];
    let (parsed, store) = fixture.finish(vec![
        store(x, int(0)),
        while_stmt(label, load(p0), seq(vec![store(x, int(1))])),
        ret(load(x)),
    ]);
    let graph = build_flow_graph(&parsed, &store, &BuildOptions::default()).unwrap();
    assert_ssa_form(&graph);
    // The loop-carried variable gets a phi at the loop join.
    assert!(!phis(&graph).is_empty());
}

#[test]
fn test_switch_chains_case_tests() {
    let mut fixture = FunctionFixture::new("switches", 1);
    let x = fixture.stack_local("x");
    let label = fixture.label();
    let p0 = fixture.params[0];
    let case_node = case(
        vec![
            compare(ComparisonKind::Eq, load(p0), int(1)),
            compare(ComparisonKind::Eq, load(p0), int(2)),
        ],
        true,
        seq(vec![store(x, int(1))]),
    );
    let (parsed, store) = fixture.finish(vec![
        switch_stmt(label, seq(vec![case_node])),
        ret_null(),
    ]);
    let graph = build_flow_graph(&parsed, &store, &no_ssa()).unwrap();

    // Two true targets plus the default route converge on the shared
    // statement-entry join.
    let statement_join = join_blocks(&graph)
        .into_iter()
        .find(|join| graph.block_info(*join).predecessors.len() == 3);
    assert!(statement_join.is_some(), "no shared statement-entry join");

    // Both case expressions became equality compares.
    let compares = chain_computations(&graph)
        .iter()
        .filter(|(_, comp)| matches!(comp, Computation::EqualityCompare { .. }))
        .count();
    assert_eq!(compares, 2);
}

#[test]
fn test_conditional_expression_in_value_position() {
    let mut fixture = FunctionFixture::new("conditionals", 1);
    let b = fixture.stack_local("b");
    let temp = fixture.with_expression_temp();
    let p0 = fixture.params[0];
    let temp_name = fixture.scopes.variable(temp).name;
    let (parsed, store) = fixture.finish(vec![
        store(b, conditional(load(p0), int(1), int(2))),
        ret_null(),
    ]);
    let graph = build_flow_graph(&parsed, &store, &no_ssa()).unwrap();

    assert_eq!(join_blocks(&graph).len(), 1);
    let temp_stores = chain_computations(&graph)
        .into_iter()
        .filter(|(_, comp)| {
            matches!(comp, Computation::StoreLocal { local, .. } if local.name == temp_name)
        })
        .count();
    assert_eq!(temp_stores, 2);
}

#[test]
fn test_accessor_selectors_are_mangled() {
    let mut fixture = FunctionFixture::new("accessors", 1);
    let x = fixture.stack_local("x");
    let foo = fixture.intern("foo");
    let p0 = fixture.params[0];
    let (parsed, store) = fixture.finish(vec![
        store(x, instance_getter(load(p0), foo)),
        instance_setter(load(p0), foo, int(1)),
        ret_null(),
    ]);
    let graph = build_flow_graph(&parsed, &store, &no_ssa()).unwrap();

    let comps = chain_computations(&graph);
    assert!(comps.iter().any(|(_, comp)| matches!(
        comp,
        Computation::InstanceCall { name, .. } if store.symbols.name(*name) == "get:foo"
    )));
    assert!(comps.iter().any(|(_, comp)| matches!(
        comp,
        Computation::InstanceSetter { field_name, .. }
            if store.symbols.name(*field_name) == "foo"
    )));
}

#[test]
fn test_binary_operator_lowering() {
    let mut fixture = FunctionFixture::new("operators", 2);
    let (p0, p1) = (fixture.params[0], fixture.params[1]);
    let (parsed, store) = fixture.finish(vec![ret(binop(
        BinaryOpKind::Add,
        load(p0),
        load(p1),
    ))]);
    let graph = build_flow_graph(&parsed, &store, &no_ssa()).unwrap();

    assert!(chain_computations(&graph).iter().any(|(_, comp)| matches!(
        comp,
        Computation::InstanceCall { name, checked_argument_count: 2, .. }
            if store.symbols.name(*name) == "+"
    )));
}

#[test]
fn test_building_twice_is_deterministic() {
    let build = || {
        let mut fixture = FunctionFixture::new("deterministic", 2);
        let x = fixture.stack_local("x");
        let label = fixture.label();
        let (p0, p1) = (fixture.params[0], fixture.params[1]);
        let (parsed, store) = fixture.finish(vec![
            while_stmt(
                label,
                load(p0),
                seq(vec![if_stmt(load(p1), store(x, int(1)), None)]),
            ),
            ret(load(x)),
        ]);
        let graph = build_flow_graph(&parsed, &store, &BuildOptions::default()).unwrap();
        print_flow_graph(&graph, &store)
    };
    assert_eq!(build(), build());
}

#[test]
fn test_rediscovery_reproduces_block_arrays() {
    let mut fixture = FunctionFixture::new("rediscover", 1);
    let x = fixture.stack_local("x");
    let p0 = fixture.params[0];
    let (parsed, store) = fixture.finish(vec![
        if_stmt(load(p0), store(x, int(1)), Some(store(x, int(2)))),
        ret(load(x)),
    ]);
    let mut graph = build_flow_graph(&parsed, &store, &no_ssa()).unwrap();

    let variable_count = store.function(parsed.function).num_fixed_parameters
        + parsed.copied_parameter_count
        + parsed.stack_local_count;
    let preorder = graph.preorder.clone();
    let postorder = graph.postorder.clone();
    graph.discover_blocks(variable_count);
    graph.number_blocks();
    assert_eq!(graph.preorder, preorder);
    assert_eq!(graph.postorder, postorder);
}
