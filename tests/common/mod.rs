//! Shared fixtures: a builder for `ParsedFunction` inputs and assertion
//! helpers over built graphs.

#![allow(dead_code)]

use text_size::TextSize;

use vela_flowgraph::ast::scope::{
    LabelId, LocalVariable, ScopeId, ScopeTree, SourceLabel, VarId,
};
use vela_flowgraph::ast::{
    AstNode, BinaryOpKind, BinaryOpNode, CaseNode, CatchClauseNode, ComparisonKind,
    ComparisonNode, ConditionalNode, IfNode, InlinedFinallyNode, InstanceCallNode,
    InstanceGetterNode, InstanceSetterNode, JumpKind, JumpNode, LiteralNode, LoadLocalNode,
    ParsedFunction, ReturnNode, SequenceNode, StaticCallNode, StoreLocalNode, SwitchNode,
    ThrowNode, TryCatchNode, TypeNode, WhileNode,
};
use vela_flowgraph::ir::{Computation, FlowGraph, InstrId, InstructionKind};
use vela_flowgraph::runtime::{Function, FunctionId, FunctionKind, ObjectStore, Symbol};
use vela_flowgraph::types::{AbstractType, Literal};

pub fn pos() -> TextSize {
    TextSize::from(0)
}

/// Assembles the front-end output for a single function under test.
pub struct FunctionFixture {
    pub store: ObjectStore,
    pub scopes: ScopeTree,
    pub root_scope: ScopeId,
    pub function: FunctionId,
    pub params: Vec<VarId>,
    pub expression_temp_var: Option<VarId>,
    pub saved_context_var: Option<VarId>,
    pub copied_parameter_count: usize,
    num_params: usize,
    stack_local_count: usize,
}

impl FunctionFixture {
    pub fn new(name: &str, num_params: usize) -> Self {
        let mut store = ObjectStore::new();
        let function_name = store.symbols.intern(name);
        let function = store.add_function(Function {
            name: function_name,
            kind: FunctionKind::Regular,
            is_static: true,
            owner: None,
            result_type: AbstractType::Dynamic,
            num_fixed_parameters: num_params,
            num_params,
            parent_function: None,
            signature_class: None,
        });
        let mut scopes = ScopeTree::new();
        let root_scope = scopes.add_scope(None, 0, 0);
        let mut params = Vec::with_capacity(num_params);
        for i in 0..num_params {
            let param_name = store.symbols.intern(&format!("p{}", i));
            params.push(scopes.add_variable(LocalVariable {
                name: param_name,
                index: i,
                ty: AbstractType::Dynamic,
                is_captured: false,
                owner: root_scope,
                token_pos: pos(),
            }));
        }
        FunctionFixture {
            store,
            scopes,
            root_scope,
            function,
            params,
            expression_temp_var: None,
            saved_context_var: None,
            copied_parameter_count: 0,
            num_params,
            stack_local_count: 0,
        }
    }

    pub fn intern(&self, name: &str) -> Symbol {
        self.store.symbols.intern(name)
    }

    pub fn stack_local(&mut self, name: &str) -> VarId {
        self.typed_stack_local(name, AbstractType::Dynamic)
    }

    pub fn typed_stack_local(&mut self, name: &str, ty: AbstractType) -> VarId {
        let index = self.num_params + self.stack_local_count;
        self.stack_local_count += 1;
        let name = self.store.symbols.intern(name);
        self.scopes.add_variable(LocalVariable {
            name,
            index,
            ty,
            is_captured: false,
            owner: self.root_scope,
            token_pos: pos(),
        })
    }

    /// The scratch cell value-mode control flow converges on.
    pub fn with_expression_temp(&mut self) -> VarId {
        let var = self.stack_local(":expr_temp");
        self.expression_temp_var = Some(var);
        var
    }

    pub fn label(&mut self) -> LabelId {
        let name = self.store.symbols.intern("L");
        self.scopes.add_label(SourceLabel {
            name,
            owner: self.root_scope,
            is_continue_target: false,
        })
    }

    pub fn finish(self, nodes: Vec<AstNode>) -> (ParsedFunction, ObjectStore) {
        let root = AstNode::Sequence(SequenceNode {
            token_pos: pos(),
            scope: Some(self.root_scope),
            nodes,
            label: None,
        });
        self.finish_with_root(root)
    }

    pub fn finish_with_root(self, root: AstNode) -> (ParsedFunction, ObjectStore) {
        let parsed = ParsedFunction {
            function: self.function,
            node_sequence: Box::new(root),
            scopes: self.scopes,
            stack_local_count: self.stack_local_count,
            copied_parameter_count: self.copied_parameter_count,
            expression_temp_var: self.expression_temp_var,
            saved_context_var: self.saved_context_var,
            instantiator: None,
        };
        (parsed, self.store)
    }
}

// Node constructors, all at position zero.

pub fn null() -> AstNode {
    AstNode::Literal(LiteralNode {
        token_pos: pos(),
        literal: Literal::Null,
    })
}

pub fn int(value: i64) -> AstNode {
    AstNode::Literal(LiteralNode {
        token_pos: pos(),
        literal: Literal::Int(value),
    })
}

pub fn boolean(value: bool) -> AstNode {
    AstNode::Literal(LiteralNode {
        token_pos: pos(),
        literal: Literal::Bool(value),
    })
}

pub fn load(var: VarId) -> AstNode {
    AstNode::LoadLocal(LoadLocalNode {
        token_pos: pos(),
        local: var,
        pseudo: None,
    })
}

pub fn store(var: VarId, value: AstNode) -> AstNode {
    AstNode::StoreLocal(StoreLocalNode {
        token_pos: pos(),
        local: var,
        value: Box::new(value),
    })
}

pub fn ret(value: AstNode) -> AstNode {
    AstNode::Return(ReturnNode {
        token_pos: pos(),
        value: Box::new(value),
        inlined_finally: Vec::new(),
    })
}

pub fn ret_with_finally(value: AstNode, inlined_finally: Vec<AstNode>) -> AstNode {
    AstNode::Return(ReturnNode {
        token_pos: pos(),
        value: Box::new(value),
        inlined_finally,
    })
}

pub fn ret_null() -> AstNode {
    ret(null())
}

pub fn seq(nodes: Vec<AstNode>) -> AstNode {
    AstNode::Sequence(SequenceNode {
        token_pos: pos(),
        scope: None,
        nodes,
        label: None,
    })
}

pub fn if_stmt(condition: AstNode, true_branch: AstNode, false_branch: Option<AstNode>) -> AstNode {
    AstNode::If(IfNode {
        token_pos: pos(),
        condition: Box::new(condition),
        true_branch: Box::new(true_branch),
        false_branch: false_branch.map(Box::new),
    })
}

pub fn while_stmt(label: LabelId, condition: AstNode, body: AstNode) -> AstNode {
    AstNode::While(WhileNode {
        token_pos: pos(),
        label,
        condition: Box::new(condition),
        body: Box::new(body),
    })
}

pub fn binop(kind: BinaryOpKind, left: AstNode, right: AstNode) -> AstNode {
    AstNode::BinaryOp(BinaryOpNode {
        token_pos: pos(),
        kind,
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn compare(kind: ComparisonKind, left: AstNode, right: AstNode) -> AstNode {
    AstNode::Comparison(ComparisonNode {
        token_pos: pos(),
        kind,
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn type_test(kind: ComparisonKind, left: AstNode, ty: AbstractType) -> AstNode {
    AstNode::Comparison(ComparisonNode {
        token_pos: pos(),
        kind,
        left: Box::new(left),
        right: Box::new(AstNode::Type(TypeNode {
            token_pos: pos(),
            ty,
        })),
    })
}

pub fn conditional(condition: AstNode, true_expr: AstNode, false_expr: AstNode) -> AstNode {
    AstNode::Conditional(ConditionalNode {
        token_pos: pos(),
        condition: Box::new(condition),
        true_expr: Box::new(true_expr),
        false_expr: Box::new(false_expr),
    })
}

pub fn jump(kind: JumpKind, label: LabelId) -> AstNode {
    AstNode::Jump(JumpNode {
        token_pos: pos(),
        kind,
        label,
        inlined_finally: Vec::new(),
    })
}

pub fn switch_stmt(label: LabelId, body: AstNode) -> AstNode {
    AstNode::Switch(SwitchNode {
        token_pos: pos(),
        label,
        body: Box::new(body),
    })
}

pub fn case(case_expressions: Vec<AstNode>, contains_default: bool, statements: AstNode) -> AstNode {
    AstNode::Case(CaseNode {
        token_pos: pos(),
        label: None,
        case_expressions,
        contains_default,
        statements: Box::new(statements),
    })
}

pub fn throw(exception: AstNode) -> AstNode {
    AstNode::Throw(ThrowNode {
        token_pos: pos(),
        exception: Box::new(exception),
        stacktrace: None,
    })
}

pub fn try_catch(
    try_block: AstNode,
    context_var: VarId,
    catch_block: Option<CatchClauseNode>,
    finally_block: Option<AstNode>,
    end_catch_label: Option<LabelId>,
) -> AstNode {
    AstNode::TryCatch(TryCatchNode {
        token_pos: pos(),
        try_block: Box::new(try_block),
        context_var,
        catch_block,
        finally_block: finally_block.map(Box::new),
        end_catch_label,
    })
}

pub fn catch_clause(exception_var: VarId, stacktrace_var: VarId, body: AstNode) -> CatchClauseNode {
    CatchClauseNode {
        token_pos: pos(),
        exception_var,
        stacktrace_var,
        body: Box::new(body),
    }
}

pub fn inlined_finally(finally_block: AstNode, context_var: VarId) -> AstNode {
    AstNode::InlinedFinally(InlinedFinallyNode {
        token_pos: pos(),
        finally_block: Box::new(finally_block),
        context_var,
    })
}

pub fn instance_call(receiver: AstNode, name: Symbol, arguments: Vec<AstNode>) -> AstNode {
    AstNode::InstanceCall(InstanceCallNode {
        token_pos: pos(),
        receiver: Box::new(receiver),
        name,
        arguments,
        argument_names: Vec::new(),
    })
}

pub fn static_call(function: FunctionId, arguments: Vec<AstNode>) -> AstNode {
    AstNode::StaticCall(StaticCallNode {
        token_pos: pos(),
        function,
        arguments,
        argument_names: Vec::new(),
    })
}

pub fn instance_getter(receiver: AstNode, field_name: Symbol) -> AstNode {
    AstNode::InstanceGetter(InstanceGetterNode {
        token_pos: pos(),
        receiver: Box::new(receiver),
        field_name,
    })
}

pub fn instance_setter(receiver: AstNode, field_name: Symbol, value: AstNode) -> AstNode {
    AstNode::InstanceSetter(InstanceSetterNode {
        token_pos: pos(),
        receiver: Box::new(receiver),
        field_name,
        value: Box::new(value),
    })
}

// Graph inspection helpers.

/// Every (block, instruction) pair in the straight-line chains, in
/// reverse-postorder block order.
pub fn chain_instructions(graph: &FlowGraph) -> Vec<(InstrId, InstrId)> {
    let mut result = Vec::new();
    for &block in graph.postorder.iter().rev() {
        for id in graph.block_instructions(block) {
            result.push((block, id));
        }
    }
    result
}

/// Computations of every Bind/Do in the graph, in block order.
pub fn chain_computations(graph: &FlowGraph) -> Vec<(InstrId, Computation)> {
    chain_instructions(graph)
        .into_iter()
        .filter_map(|(_, id)| match graph.kind(id) {
            InstructionKind::Bind { comp, .. } | InstructionKind::Do { comp } => {
                Some((id, comp.clone()))
            }
            _ => None,
        })
        .collect()
}

pub fn join_blocks(graph: &FlowGraph) -> Vec<InstrId> {
    graph
        .postorder
        .iter()
        .rev()
        .copied()
        .filter(|&b| matches!(graph.kind(b), InstructionKind::JoinEntry { .. }))
        .collect()
}

pub fn target_blocks(graph: &FlowGraph) -> Vec<InstrId> {
    graph
        .postorder
        .iter()
        .rev()
        .copied()
        .filter(|&b| matches!(graph.kind(b), InstructionKind::TargetEntry { .. }))
        .collect()
}

/// All φ instructions of the graph as (join, var_index, phi) triples.
pub fn phis(graph: &FlowGraph) -> Vec<(InstrId, usize, InstrId)> {
    let mut result = Vec::new();
    for join in join_blocks(graph) {
        if let InstructionKind::JoinEntry { phis, .. } = graph.kind(join) {
            for phi in phis.iter().flatten() {
                if let InstructionKind::Phi { var_index, .. } = graph.kind(*phi) {
                    result.push((join, *var_index, *phi));
                }
            }
        }
    }
    result
}

/// Structural SSA invariants: no load/store locals remain, every use
/// names a definition with an SSA index, indices are unique, and every φ
/// has one operand per predecessor.
pub fn assert_ssa_form(graph: &FlowGraph) {
    let mut seen = std::collections::HashSet::new();
    let mut check_def = |id: InstrId| {
        let ssa = graph
            .instr(id)
            .def_info()
            .and_then(|d| d.ssa_temp_index)
            .unwrap_or_else(|| panic!("definition {:?} has no ssa index", id));
        assert!(seen.insert(ssa), "duplicate ssa index {}", ssa);
    };

    for (_, id) in chain_instructions(graph) {
        if let Some(comp) = graph.instr(id).computation() {
            assert!(
                !matches!(
                    comp,
                    Computation::LoadLocal { .. } | Computation::StoreLocal { .. }
                ),
                "load/store local survived renaming"
            );
        }
        if graph.instr(id).is_definition() {
            check_def(id);
        }
        for i in 0..graph.instr(id).input_count() {
            if let Some(def) = graph.instr(id).input_at(i).as_use() {
                assert!(
                    graph
                        .instr(def)
                        .def_info()
                        .and_then(|d| d.ssa_temp_index)
                        .is_some(),
                    "use of a definition without an ssa index"
                );
            }
        }
    }

    for (join, _, phi) in phis(graph) {
        check_def(phi);
        let predecessor_count = graph.block_info(join).predecessors.len();
        if let InstructionKind::Phi { inputs, .. } = graph.kind(phi) {
            assert_eq!(inputs.len(), predecessor_count);
            assert!(inputs.iter().all(Option::is_some), "unfilled phi operand");
        }
    }
}
