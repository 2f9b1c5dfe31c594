//! The flow graph builder.
//!
//! Owns the per-function lowering state (current context level, try-index
//! bookkeeping, break/continue joins, the SSA counter) and drives the
//! pipeline: lower the root sequence in effect mode, discover blocks,
//! number them in reverse postorder and, when requested, convert to SSA.

pub mod context;
pub mod expr;
pub mod fragment;
pub mod stmt;
pub mod typecheck;

use crate::ast::scope::LabelId;
use crate::ast::ParsedFunction;
use crate::config::BuildOptions;
use crate::error::BuildResult;
use crate::ir::instruction::BlockInfo;
use crate::ir::{Computation, FlowGraph, InstrId, InstructionKind, TryIndex, Value};
use crate::runtime::{Function, ObjectStore};
use crate::ssa::{self, SsaParams};
use crate::types::Literal;
use fragment::{join_entry_kind, Fragment};

/// Break and continue joins materialized for a source label. Jumps create
/// them on demand; the owning loop or switch adopts them while composing
/// its fragment.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LabelJoins {
    pub break_join: Option<InstrId>,
    pub continue_join: Option<InstrId>,
}

pub struct FlowGraphBuilder<'a> {
    pub(crate) parsed: &'a ParsedFunction,
    pub(crate) store: &'a ObjectStore,
    pub(crate) options: BuildOptions,
    pub(crate) graph: FlowGraph,
    pub(crate) graph_entry: Option<InstrId>,
    pub(crate) context_level: usize,
    pub(crate) try_index: Option<TryIndex>,
    next_try_index: TryIndex,
    pub(crate) current_ssa_temp_index: usize,
    label_joins: Vec<LabelJoins>,
}

impl<'a> FlowGraphBuilder<'a> {
    pub fn new(parsed: &'a ParsedFunction, store: &'a ObjectStore, options: BuildOptions) -> Self {
        let label_count = parsed.scopes.label_count();
        FlowGraphBuilder {
            parsed,
            store,
            options,
            graph: FlowGraph::new(),
            graph_entry: None,
            context_level: 0,
            try_index: None,
            next_try_index: 0,
            current_ssa_temp_index: 0,
            label_joins: vec![LabelJoins::default(); label_count],
        }
    }

    pub(crate) fn function(&self) -> &'a Function {
        self.store.function(self.parsed.function)
    }

    pub(crate) fn function_name(&self) -> String {
        self.store.symbols.name(self.function().name)
    }

    pub(crate) fn variable_count(&self) -> usize {
        self.function().num_fixed_parameters
            + self.parsed.copied_parameter_count
            + self.parsed.stack_local_count
    }

    pub(crate) fn allocate_try_index(&mut self) -> TryIndex {
        let index = self.next_try_index;
        self.next_try_index += 1;
        index
    }

    pub(crate) fn add_catch_entry(&mut self, entry: InstrId) {
        let graph_entry = self.graph_entry.expect("graph entry not built yet");
        self.graph.add_catch_entry(graph_entry, entry);
    }

    pub(crate) fn break_join(&self, label: LabelId) -> Option<InstrId> {
        self.label_joins[label.0 as usize].break_join
    }

    pub(crate) fn continue_join(&self, label: LabelId) -> Option<InstrId> {
        self.label_joins[label.0 as usize].continue_join
    }

    pub(crate) fn ensure_break_join(&mut self, label: LabelId) -> InstrId {
        if let Some(join) = self.label_joins[label.0 as usize].break_join {
            return join;
        }
        let join = self.graph.add(join_entry_kind());
        self.label_joins[label.0 as usize].break_join = Some(join);
        join
    }

    pub(crate) fn ensure_continue_join(&mut self, label: LabelId) -> InstrId {
        if let Some(join) = self.label_joins[label.0 as usize].continue_join {
            return join;
        }
        let join = self.graph.add(join_entry_kind());
        self.label_joins[label.0 as usize].continue_join = Some(join);
        join
    }

    pub(crate) fn build_null_value(&mut self, frag: &mut Fragment) -> Value {
        self.bind(
            frag,
            Computation::Constant {
                literal: Literal::Null,
            },
        )
    }

    /// Splice an already-materialized join behind an open fragment, or
    /// adopt it as the exit of a closed one.
    pub(crate) fn adopt_join(&mut self, frag: &mut Fragment, join: InstrId) {
        if frag.is_open() {
            self.add_instruction(frag, join);
        } else {
            frag.exit = Some(join);
        }
    }

    /// Lower the function and return the (optionally SSA-form) graph.
    pub fn build_graph(mut self, use_ssa: bool) -> BuildResult<FlowGraph> {
        let function_name = self.function_name();
        log::debug!(
            target: "flowgraph",
            "building flow graph for {} (ssa: {})",
            function_name,
            use_ssa
        );
        if self.options.print_ast {
            log::info!(
                target: "flowgraph",
                "{}",
                crate::ast::printer::print_ast(self.parsed, self.store)
            );
        }

        let normal_entry = self.graph.add(InstructionKind::TargetEntry {
            try_index: None,
            block: BlockInfo::default(),
        });
        let graph_entry = self.graph.add(InstructionKind::GraphEntry {
            normal_entry,
            catch_entries: Vec::new(),
            start_env: None,
            block: BlockInfo::default(),
        });
        self.graph.graph_entry = Some(graph_entry);
        self.graph_entry = Some(graph_entry);

        let parsed = self.parsed;
        let mut for_effect = Fragment::new(0);
        self.add_instruction(&mut for_effect, normal_entry);
        self.build_for_effect(&mut for_effect, &parsed.node_sequence)?;
        assert!(!for_effect.is_open(), "flow graph is not terminated");

        let variable_count = self.variable_count();
        let mut discovery = self.graph.discover_blocks(variable_count);
        self.graph.number_blocks();

        if use_ssa {
            let params = SsaParams {
                function_name: &function_name,
                variable_count,
                num_fixed_parameters: self.function().num_fixed_parameters,
                copied_parameter_count: self.parsed.copied_parameter_count,
            };
            ssa::construct(
                &mut self.graph,
                &mut discovery,
                &params,
                &mut self.current_ssa_temp_index,
            )?;
        }

        if self.options.print_flow_graph {
            log::info!(
                target: "flowgraph",
                "{}",
                crate::ir::printer::print_flow_graph(&self.graph, self.store)
            );
        }
        log::debug!(
            target: "flowgraph",
            "built {} blocks for {}",
            self.graph.postorder.len(),
            function_name
        );
        Ok(self.graph)
    }
}
