//! Flow graph pretty-printer for the `print_flow_graph` side channel.
//!
//! Blocks are listed in reverse postorder with one instruction per line.
//! Definitions are named `v<n>` once they carry an SSA index and `t<n>`
//! before that.

use std::fmt::Write;

use crate::ir::graph::FlowGraph;
use crate::ir::instruction::{Computation, InstrId, InstructionKind, Value};
use crate::runtime::ObjectStore;
use crate::types::Literal;

pub fn print_flow_graph(graph: &FlowGraph, store: &ObjectStore) -> String {
    let mut out = String::new();
    for &block in graph.postorder.iter().rev() {
        print_block(&mut out, graph, store, block);
    }
    out
}

fn block_name(graph: &FlowGraph, block: InstrId) -> String {
    match graph.block_info(block).block_id {
        Some(id) => format!("B{}", id),
        None => format!("B?{}", block.0),
    }
}

fn def_name(graph: &FlowGraph, id: InstrId) -> String {
    match graph.instr(id).def_info() {
        Some(def) => match (def.ssa_temp_index, def.temp_index) {
            (Some(ssa), _) => format!("v{}", ssa),
            (None, Some(temp)) => format!("t{}", temp),
            (None, None) => format!("i{}", id.0),
        },
        None => format!("i{}", id.0),
    }
}

fn value_name(graph: &FlowGraph, value: &Value) -> String {
    match value {
        Value::Use(id) => def_name(graph, *id),
        Value::Constant(literal) => literal_name(literal),
    }
}

fn literal_name(literal: &Literal) -> String {
    match literal {
        Literal::Null => "#null".to_string(),
        Literal::Bool(b) => format!("#{}", b),
        Literal::Int(i) => format!("#{}", i),
        Literal::Double(d) => format!("#{}", d),
        Literal::Str(s) => format!("#\"{}\"", s),
        Literal::TypeArgs(_) => "#<type args>".to_string(),
    }
}

fn comp_name(graph: &FlowGraph, store: &ObjectStore, comp: &Computation) -> String {
    let inputs = comp
        .inputs()
        .iter()
        .map(|v| value_name(graph, v))
        .collect::<Vec<_>>()
        .join(", ");
    match comp {
        Computation::Constant { literal } => literal_name(literal),
        Computation::LoadLocal { local, .. } => {
            format!("LoadLocal({})", store.symbols.name(local.name))
        }
        Computation::StoreLocal { local, value, .. } => format!(
            "StoreLocal({}, {})",
            store.symbols.name(local.name),
            value_name(graph, value)
        ),
        Computation::InstanceCall { name, .. } => {
            format!("InstanceCall({}, {})", store.symbols.name(*name), inputs)
        }
        Computation::StaticCall { function, .. } => format!(
            "StaticCall({}, {})",
            store.symbols.name(store.function(*function).name),
            inputs
        ),
        Computation::NativeCall { name, .. } => {
            format!("NativeCall({})", store.symbols.name(*name))
        }
        Computation::LoadVmField {
            offset_in_bytes, ..
        } => format!("LoadVMField({}, {})", inputs, offset_in_bytes),
        Computation::StoreVmField {
            offset_in_bytes, ..
        } => format!("StoreVMField({}, {})", inputs, offset_in_bytes),
        other => {
            let tag = computation_tag(other);
            if inputs.is_empty() {
                tag.to_string()
            } else {
                format!("{}({})", tag, inputs)
            }
        }
    }
}

fn computation_tag(comp: &Computation) -> &'static str {
    match comp {
        Computation::Constant { .. } => "Constant",
        Computation::LoadLocal { .. } => "LoadLocal",
        Computation::StoreLocal { .. } => "StoreLocal",
        Computation::LoadVmField { .. } => "LoadVMField",
        Computation::StoreVmField { .. } => "StoreVMField",
        Computation::CurrentContext => "CurrentContext",
        Computation::StoreContext { .. } => "StoreContext",
        Computation::ChainContext { .. } => "ChainContext",
        Computation::CloneContext { .. } => "CloneContext",
        Computation::AllocateContext { .. } => "AllocateContext",
        Computation::AllocateObject { .. } => "AllocateObject",
        Computation::AllocateObjectWithBoundsCheck { .. } => "AllocateObjectWithBoundsCheck",
        Computation::CreateArray { .. } => "CreateArray",
        Computation::CreateClosure { .. } => "CreateClosure",
        Computation::InstanceCall { .. } => "InstanceCall",
        Computation::StaticCall { .. } => "StaticCall",
        Computation::ClosureCall { .. } => "ClosureCall",
        Computation::NativeCall { .. } => "NativeCall",
        Computation::LoadInstanceField { .. } => "LoadInstanceField",
        Computation::StoreInstanceField { .. } => "StoreInstanceField",
        Computation::LoadStaticField { .. } => "LoadStaticField",
        Computation::StoreStaticField { .. } => "StoreStaticField",
        Computation::LoadIndexed { .. } => "LoadIndexed",
        Computation::StoreIndexed { .. } => "StoreIndexed",
        Computation::InstanceSetter { .. } => "InstanceSetter",
        Computation::StaticSetter { .. } => "StaticSetter",
        Computation::StrictCompare { .. } => "StrictCompare",
        Computation::EqualityCompare { .. } => "EqualityCompare",
        Computation::RelationalOp { .. } => "RelationalOp",
        Computation::BooleanNegate { .. } => "BooleanNegate",
        Computation::AssertAssignable { .. } => "AssertAssignable",
        Computation::AssertBoolean { .. } => "AssertBoolean",
        Computation::InstanceOf { .. } => "InstanceOf",
        Computation::InstantiateTypeArguments { .. } => "InstantiateTypeArguments",
        Computation::ExtractConstructorTypeArguments { .. } => "ExtractConstructorTypeArguments",
        Computation::ExtractConstructorInstantiator { .. } => "ExtractConstructorInstantiator",
        Computation::CatchEntry { .. } => "CatchEntry",
        Computation::CheckStackOverflow { .. } => "CheckStackOverflow",
    }
}

fn print_block(out: &mut String, graph: &FlowGraph, store: &ObjectStore, block: InstrId) {
    let info = graph.block_info(block);
    let kind = match graph.kind(block) {
        InstructionKind::GraphEntry { .. } => "graph".to_string(),
        InstructionKind::TargetEntry { try_index, .. } => match try_index {
            Some(index) => format!("target catch {}", index),
            None => "target".to_string(),
        },
        InstructionKind::JoinEntry { .. } => "join".to_string(),
        _ => unreachable!("blocks start at block entries"),
    };
    let preds = info
        .predecessors
        .iter()
        .map(|p| block_name(graph, *p))
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(out, "{}[{}] pred({})", block_name(graph, block), kind, preds);

    if let InstructionKind::JoinEntry { phis, .. } = graph.kind(block) {
        for phi in phis.iter().flatten() {
            if let InstructionKind::Phi { inputs, .. } = graph.kind(*phi) {
                let operands = inputs
                    .iter()
                    .map(|v| match v {
                        Some(value) => value_name(graph, value),
                        None => "_".to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                let _ = writeln!(out, "    {} <- phi({})", def_name(graph, *phi), operands);
            }
        }
    }

    for id in graph.block_instructions(block) {
        let line = match graph.kind(id) {
            InstructionKind::Bind { comp, .. } => {
                format!("{} <- {}", def_name(graph, id), comp_name(graph, store, comp))
            }
            InstructionKind::Do { comp } => comp_name(graph, store, comp),
            InstructionKind::Branch {
                value,
                true_successor,
                false_successor,
            } => format!(
                "if {} goto ({}, {})",
                value_name(graph, value),
                true_successor
                    .map(|t| block_name(graph, t))
                    .unwrap_or_else(|| "?".to_string()),
                false_successor
                    .map(|t| block_name(graph, t))
                    .unwrap_or_else(|| "?".to_string()),
            ),
            InstructionKind::Return { value, .. } => {
                format!("return {}", value_name(graph, value))
            }
            InstructionKind::Throw { exception, .. } => {
                format!("throw {}", value_name(graph, exception))
            }
            InstructionKind::ReThrow {
                exception,
                stack_trace,
                ..
            } => format!(
                "rethrow {}, {}",
                value_name(graph, exception),
                value_name(graph, stack_trace)
            ),
            other => unreachable!("{:?} cannot appear mid-block", other),
        };
        let _ = writeln!(out, "    {}", line);
    }
}
