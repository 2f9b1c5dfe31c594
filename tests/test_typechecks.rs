//! Checked-mode tests: assignability asserts, their static elimination,
//! and build-time specialization of type tests.

mod common;

use common::*;
use vela_flowgraph::ast::ComparisonKind;
use vela_flowgraph::ir::{Computation, InstructionKind};
use vela_flowgraph::types::{AbstractType, Literal};
use vela_flowgraph::{build_flow_graph, BuildOptions};

fn checked() -> BuildOptions {
    BuildOptions {
        enable_type_checks: true,
        use_ssa: false,
        ..BuildOptions::default()
    }
}

fn no_ssa() -> BuildOptions {
    BuildOptions {
        use_ssa: false,
        ..BuildOptions::default()
    }
}

fn assert_count(graph: &vela_flowgraph::FlowGraph) -> usize {
    chain_computations(graph)
        .iter()
        .filter(|(_, c)| matches!(c, Computation::AssertAssignable { .. }))
        .count()
}

#[test]
fn test_checked_return_asserts_the_result_type() {
    let mut fixture = FunctionFixture::new("returns_bool", 0);
    let bool_type = AbstractType::class(fixture.store.bool_class);
    fixture.store.function_mut(fixture.function).result_type = bool_type;
    let (parsed, store) = fixture.finish(vec![ret(int(42))]);
    let graph = build_flow_graph(&parsed, &store, &checked()).unwrap();

    assert_eq!(assert_count(&graph), 1);
    let dst_name = chain_computations(&graph)
        .iter()
        .find_map(|(_, c)| match c {
            Computation::AssertAssignable { dst_name, .. } => Some(*dst_name),
            _ => None,
        })
        .unwrap();
    assert_eq!(store.symbols.name(dst_name), "function result");
}

#[test]
fn test_check_skipped_when_statically_more_specific() {
    let mut fixture = FunctionFixture::new("returns_object", 0);
    let object_type = AbstractType::class(fixture.store.object_class);
    fixture.store.function_mut(fixture.function).result_type = object_type;
    let (parsed, store) = fixture.finish(vec![ret(int(42))]);
    let graph = build_flow_graph(&parsed, &store, &checked()).unwrap();
    assert_eq!(assert_count(&graph), 0);
}

#[test]
fn test_checks_disabled_emits_no_asserts() {
    let mut fixture = FunctionFixture::new("unchecked", 0);
    let bool_type = AbstractType::class(fixture.store.bool_class);
    fixture.store.function_mut(fixture.function).result_type = bool_type;
    let (parsed, store) = fixture.finish(vec![ret(int(42))]);
    let graph = build_flow_graph(&parsed, &store, &no_ssa()).unwrap();
    assert_eq!(assert_count(&graph), 0);
}

#[test]
fn test_typed_parameters_are_checked_at_entry() {
    let mut fixture = FunctionFixture::new("typed_params", 1);
    let int_type = AbstractType::class(fixture.store.smi_class);
    let p0 = fixture.params[0];
    fixture.scopes.variable_mut(p0).ty = int_type;
    let (parsed, store) = fixture.finish(vec![ret_null()]);
    let graph = build_flow_graph(&parsed, &store, &checked()).unwrap();

    // One assert for the parameter; the null return is statically fine.
    assert_eq!(assert_count(&graph), 1);
}

#[test]
fn test_checked_store_asserts_the_declared_type() {
    let mut fixture = FunctionFixture::new("typed_store", 1);
    let int_type = AbstractType::class(fixture.store.smi_class);
    let x = fixture.typed_stack_local("x", int_type);
    let p0 = fixture.params[0];
    let (parsed, store) = fixture.finish(vec![store(x, load(p0)), ret_null()]);
    let graph = build_flow_graph(&parsed, &store, &checked()).unwrap();
    assert_eq!(assert_count(&graph), 1);
}

#[test]
fn test_type_test_against_object_folds_to_a_constant() {
    let mut fixture = FunctionFixture::new("is_object", 1);
    let x = fixture.stack_local("x");
    let p0 = fixture.params[0];
    let object_type = AbstractType::class(fixture.store.object_class);
    let (parsed, store) = fixture.finish(vec![
        store(x, type_test(ComparisonKind::Is, load(p0), object_type)),
        ret_null(),
    ]);
    let graph = build_flow_graph(&parsed, &store, &no_ssa()).unwrap();

    let comps = chain_computations(&graph);
    assert!(!comps
        .iter()
        .any(|(_, c)| matches!(c, Computation::InstanceOf { .. })));
    assert!(comps.iter().any(|(_, c)| matches!(
        c,
        Computation::Constant {
            literal: Literal::Bool(true)
        }
    )));
}

#[test]
fn test_type_test_on_literals_folds_at_build_time() {
    let mut fixture = FunctionFixture::new("is_literal", 0);
    let a = fixture.stack_local("a");
    let b = fixture.stack_local("b");
    let c = fixture.stack_local("c");
    let int_type = AbstractType::class(fixture.store.smi_class);
    let bool_type = AbstractType::class(fixture.store.bool_class);
    let (parsed, store) = fixture.finish(vec![
        store(a, type_test(ComparisonKind::Is, int(3), int_type.clone())),
        store(b, type_test(ComparisonKind::Is, int(3), bool_type)),
        store(c, type_test(ComparisonKind::Is, null(), int_type)),
        ret_null(),
    ]);
    let graph = build_flow_graph(&parsed, &store, &no_ssa()).unwrap();

    let comps = chain_computations(&graph);
    assert!(!comps
        .iter()
        .any(|(_, c)| matches!(c, Computation::InstanceOf { .. })));
    let bools: Vec<bool> = comps
        .iter()
        .filter_map(|(_, c)| match c {
            Computation::Constant {
                literal: Literal::Bool(value),
            } => Some(*value),
            _ => None,
        })
        .collect();
    // `3 is int` holds, `3 is bool` does not, `null is int` does not.
    assert_eq!(bools, vec![true, false, false]);
}

#[test]
fn test_type_test_emits_instance_of_otherwise() {
    let mut fixture = FunctionFixture::new("is_dynamic_operand", 1);
    let x = fixture.stack_local("x");
    let p0 = fixture.params[0];
    let int_type = AbstractType::class(fixture.store.smi_class);
    let (parsed, store) = fixture.finish(vec![
        store(x, type_test(ComparisonKind::IsNot, load(p0), int_type)),
        ret_null(),
    ]);
    let graph = build_flow_graph(&parsed, &store, &no_ssa()).unwrap();

    let instance_of = chain_computations(&graph)
        .into_iter()
        .find_map(|(_, c)| match c {
            Computation::InstanceOf { negate, .. } => Some(negate),
            _ => None,
        });
    assert_eq!(instance_of, Some(true));
}

#[test]
fn test_test_position_asserts_boolean_in_checked_mode() {
    let mut fixture = FunctionFixture::new("asserts_boolean", 1);
    let x = fixture.stack_local("x");
    let p0 = fixture.params[0];
    let (parsed, store) = fixture.finish(vec![
        if_stmt(load(p0), store(x, int(1)), None),
        ret_null(),
    ]);
    let graph = build_flow_graph(&parsed, &store, &checked()).unwrap();

    // The condition feeds an AssertBoolean whose result the branch tests.
    let assert_bind = chain_instructions(&graph)
        .into_iter()
        .map(|(_, id)| id)
        .find(|id| {
            matches!(
                graph.instr(*id).computation(),
                Some(Computation::AssertBoolean { .. })
            )
        })
        .expect("no boolean assert emitted");
    let branch_tests_assert = chain_instructions(&graph).into_iter().any(|(_, id)| {
        matches!(
            graph.kind(id),
            InstructionKind::Branch { value, .. }
                if value.as_use() == Some(assert_bind)
        )
    });
    assert!(branch_tests_assert);
}
