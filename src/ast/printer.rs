//! AST pretty-printer for the `print_ast` side channel.

use std::fmt::Write;

use crate::ast::{AstNode, ParsedFunction};
use crate::runtime::ObjectStore;
use crate::types::Literal;

pub fn print_ast(parsed: &ParsedFunction, store: &ObjectStore) -> String {
    let mut out = String::new();
    let name = store.symbols.name(store.function(parsed.function).name);
    let _ = writeln!(out, "function {}", name);
    print_node(&mut out, parsed, store, &parsed.node_sequence, 1);
    out
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn print_node(
    out: &mut String,
    parsed: &ParsedFunction,
    store: &ObjectStore,
    node: &AstNode,
    depth: usize,
) {
    indent(out, depth);
    match node {
        AstNode::Sequence(n) => {
            let _ = writeln!(out, "Sequence");
            for child in &n.nodes {
                print_node(out, parsed, store, child, depth + 1);
            }
        }
        AstNode::Return(n) => {
            let _ = writeln!(out, "Return");
            print_node(out, parsed, store, &n.value, depth + 1);
        }
        AstNode::If(n) => {
            let _ = writeln!(out, "If");
            print_node(out, parsed, store, &n.condition, depth + 1);
            print_node(out, parsed, store, &n.true_branch, depth + 1);
            if let Some(false_branch) = &n.false_branch {
                print_node(out, parsed, store, false_branch, depth + 1);
            }
        }
        AstNode::While(n) => {
            let _ = writeln!(out, "While");
            print_node(out, parsed, store, &n.condition, depth + 1);
            print_node(out, parsed, store, &n.body, depth + 1);
        }
        AstNode::DoWhile(n) => {
            let _ = writeln!(out, "DoWhile");
            print_node(out, parsed, store, &n.body, depth + 1);
            print_node(out, parsed, store, &n.condition, depth + 1);
        }
        AstNode::For(n) => {
            let _ = writeln!(out, "For");
            print_node(out, parsed, store, &n.initializer, depth + 1);
            if let Some(condition) = &n.condition {
                print_node(out, parsed, store, condition, depth + 1);
            }
            print_node(out, parsed, store, &n.increment, depth + 1);
            print_node(out, parsed, store, &n.body, depth + 1);
        }
        AstNode::Switch(n) => {
            let _ = writeln!(out, "Switch");
            print_node(out, parsed, store, &n.body, depth + 1);
        }
        AstNode::Case(n) => {
            let _ = writeln!(out, "Case (default: {})", n.contains_default);
            for expr in &n.case_expressions {
                print_node(out, parsed, store, expr, depth + 1);
            }
            print_node(out, parsed, store, &n.statements, depth + 1);
        }
        AstNode::Jump(n) => {
            let _ = writeln!(out, "Jump ({:?})", n.kind);
        }
        AstNode::TryCatch(n) => {
            let _ = writeln!(out, "TryCatch");
            print_node(out, parsed, store, &n.try_block, depth + 1);
            if let Some(catch_block) = &n.catch_block {
                print_node(out, parsed, store, &catch_block.body, depth + 1);
            }
            if let Some(finally_block) = &n.finally_block {
                print_node(out, parsed, store, finally_block, depth + 1);
            }
        }
        AstNode::Throw(n) => {
            let _ = writeln!(out, "Throw");
            print_node(out, parsed, store, &n.exception, depth + 1);
            if let Some(stacktrace) = &n.stacktrace {
                print_node(out, parsed, store, stacktrace, depth + 1);
            }
        }
        AstNode::InlinedFinally(n) => {
            let _ = writeln!(out, "InlinedFinally");
            print_node(out, parsed, store, &n.finally_block, depth + 1);
        }
        AstNode::Literal(n) => {
            let text = match &n.literal {
                Literal::Null => "null".to_string(),
                Literal::Bool(b) => b.to_string(),
                Literal::Int(i) => i.to_string(),
                Literal::Double(d) => d.to_string(),
                Literal::Str(s) => format!("\"{}\"", s),
                Literal::TypeArgs(_) => "<type args>".to_string(),
            };
            let _ = writeln!(out, "Literal {}", text);
        }
        AstNode::Type(_) => {
            let _ = writeln!(out, "Type");
        }
        AstNode::Assignable(n) => {
            let _ = writeln!(out, "Assignable");
            print_node(out, parsed, store, &n.expr, depth + 1);
        }
        AstNode::BinaryOp(n) => {
            let _ = writeln!(out, "BinaryOp ({:?})", n.kind);
            print_node(out, parsed, store, &n.left, depth + 1);
            print_node(out, parsed, store, &n.right, depth + 1);
        }
        AstNode::UnaryOp(n) => {
            let _ = writeln!(out, "UnaryOp ({:?})", n.kind);
            print_node(out, parsed, store, &n.operand, depth + 1);
        }
        AstNode::Comparison(n) => {
            let _ = writeln!(out, "Comparison ({:?})", n.kind);
            print_node(out, parsed, store, &n.left, depth + 1);
            print_node(out, parsed, store, &n.right, depth + 1);
        }
        AstNode::Conditional(n) => {
            let _ = writeln!(out, "Conditional");
            print_node(out, parsed, store, &n.condition, depth + 1);
            print_node(out, parsed, store, &n.true_expr, depth + 1);
            print_node(out, parsed, store, &n.false_expr, depth + 1);
        }
        AstNode::LoadLocal(n) => {
            let name = store.symbols.name(parsed.scopes.variable(n.local).name);
            let _ = writeln!(out, "LoadLocal {}", name);
        }
        AstNode::StoreLocal(n) => {
            let name = store.symbols.name(parsed.scopes.variable(n.local).name);
            let _ = writeln!(out, "StoreLocal {}", name);
            print_node(out, parsed, store, &n.value, depth + 1);
        }
        AstNode::LoadInstanceField(n) => {
            let _ = writeln!(out, "LoadInstanceField");
            print_node(out, parsed, store, &n.instance, depth + 1);
        }
        AstNode::StoreInstanceField(n) => {
            let _ = writeln!(out, "StoreInstanceField");
            print_node(out, parsed, store, &n.instance, depth + 1);
            print_node(out, parsed, store, &n.value, depth + 1);
        }
        AstNode::LoadStaticField(_) => {
            let _ = writeln!(out, "LoadStaticField");
        }
        AstNode::StoreStaticField(n) => {
            let _ = writeln!(out, "StoreStaticField");
            print_node(out, parsed, store, &n.value, depth + 1);
        }
        AstNode::LoadIndexed(n) => {
            let _ = writeln!(out, "LoadIndexed");
            print_node(out, parsed, store, &n.array, depth + 1);
            print_node(out, parsed, store, &n.index, depth + 1);
        }
        AstNode::StoreIndexed(n) => {
            let _ = writeln!(out, "StoreIndexed");
            print_node(out, parsed, store, &n.array, depth + 1);
            print_node(out, parsed, store, &n.index, depth + 1);
            print_node(out, parsed, store, &n.value, depth + 1);
        }
        AstNode::InstanceCall(n) => {
            let _ = writeln!(out, "InstanceCall {}", store.symbols.name(n.name));
            print_node(out, parsed, store, &n.receiver, depth + 1);
            for argument in &n.arguments {
                print_node(out, parsed, store, argument, depth + 1);
            }
        }
        AstNode::StaticCall(n) => {
            let name = store.symbols.name(store.function(n.function).name);
            let _ = writeln!(out, "StaticCall {}", name);
            for argument in &n.arguments {
                print_node(out, parsed, store, argument, depth + 1);
            }
        }
        AstNode::ClosureCall(n) => {
            let _ = writeln!(out, "ClosureCall");
            print_node(out, parsed, store, &n.closure, depth + 1);
            for argument in &n.arguments {
                print_node(out, parsed, store, argument, depth + 1);
            }
        }
        AstNode::ConstructorCall(n) => {
            let name = store.symbols.name(store.function(n.constructor).name);
            let _ = writeln!(out, "ConstructorCall {}", name);
            for argument in &n.arguments {
                print_node(out, parsed, store, argument, depth + 1);
            }
        }
        AstNode::InstanceGetter(n) => {
            let _ = writeln!(out, "InstanceGetter {}", store.symbols.name(n.field_name));
            print_node(out, parsed, store, &n.receiver, depth + 1);
        }
        AstNode::InstanceSetter(n) => {
            let _ = writeln!(out, "InstanceSetter {}", store.symbols.name(n.field_name));
            print_node(out, parsed, store, &n.receiver, depth + 1);
            print_node(out, parsed, store, &n.value, depth + 1);
        }
        AstNode::StaticGetter(n) => {
            let _ = writeln!(out, "StaticGetter {}", store.symbols.name(n.field_name));
        }
        AstNode::StaticSetter(n) => {
            let _ = writeln!(out, "StaticSetter {}", store.symbols.name(n.field_name));
            print_node(out, parsed, store, &n.value, depth + 1);
        }
        AstNode::Array(n) => {
            let _ = writeln!(out, "Array [{}]", n.elements.len());
            for element in &n.elements {
                print_node(out, parsed, store, element, depth + 1);
            }
        }
        AstNode::Closure(n) => {
            let name = store.symbols.name(store.function(n.function).name);
            let _ = writeln!(out, "Closure {}", name);
        }
        AstNode::Native(n) => {
            let _ = writeln!(out, "Native {}", store.symbols.name(n.name));
        }
        AstNode::CloneContext(_) => {
            let _ = writeln!(out, "CloneContext");
        }
    }
}
