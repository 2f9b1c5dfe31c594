//! Statement lowering.
//!
//! Sequences manage context allocation and restoration; loops are tied
//! through `tie_loop` (while), a body-entry join (do-while) or a bottom
//! test (for); switches chain case tests off each other's false
//! successors; jumps run their inlined finallys, unchain contexts down to
//! the target scope's level and close into the label's join.

use crate::ast::scope::LocalVariable;
use crate::ast::{
    AstNode, CaseNode, DoWhileNode, ForNode, IfNode, InlinedFinallyNode, JumpKind, JumpNode,
    ReturnNode, SequenceNode, SwitchNode, ThrowNode, TryCatchNode, WhileNode,
};
use crate::builder::fragment::{join_entry_kind, target_entry_kind, Fragment};
use crate::builder::FlowGraphBuilder;
use crate::error::BuildResult;
use crate::ir::instruction::BlockInfo;
use crate::ir::{Computation, InstrId, InstructionKind};
use crate::types::AbstractType;

impl<'a> FlowGraphBuilder<'a> {
    fn must_save_restore_context(&self, is_root_sequence: bool) -> bool {
        is_root_sequence && self.parsed.saved_context_var.is_some()
    }

    pub(crate) fn visit_sequence(
        &mut self,
        frag: &mut Fragment,
        node: &AstNode,
        n: &SequenceNode,
    ) -> BuildResult<()> {
        let parsed = self.parsed;
        let store = self.store;
        let num_context_variables = n
            .scope
            .map(|scope| parsed.scopes.scope(scope).num_context_variables)
            .unwrap_or(0);
        let previous_context_level = self.context_level;
        let is_root = std::ptr::eq(node, &*parsed.node_sequence);

        if num_context_variables > 0 {
            // The scope declares captured variables: allocate and chain a
            // fresh context.
            let scope = n.scope.expect("captured variables live in a scope");
            let allocated = self.bind(
                frag,
                Computation::AllocateContext {
                    token_pos: n.token_pos,
                    try_index: self.try_index,
                    num_context_variables,
                },
            );

            // The root context of a non-closure function must not chain to
            // the caller's context; save the entry context instead and
            // restore it on every exit.
            if self.must_save_restore_context(is_root) {
                let current = self.bind(frag, Computation::CurrentContext);
                let saved_var = parsed.saved_context_var.unwrap();
                let store_comp = self.build_store_local_by_id(frag, saved_var, current);
                self.perform(frag, store_comp);
                let null_context = self.build_null_value(frag);
                self.perform(
                    frag,
                    Computation::StoreContext {
                        value: null_context,
                    },
                );
            }

            self.perform(frag, Computation::ChainContext { context: allocated });
            self.context_level = parsed.scopes.scope(scope).context_level;

            if is_root {
                assert_eq!(self.context_level, 1, "root context is level one");
                let num_params = self.function().num_params;
                for pos in 0..num_params {
                    let param_id = parsed.scopes.variable_at(scope, pos);
                    let param = parsed.scopes.variable(param_id);
                    if !param.is_captured {
                        continue;
                    }
                    // Copy the captured parameter from its frame slot into
                    // the context, then null the slot so stale reads trip
                    // and the value can be collected.
                    let original_name = format!("{}-orig", store.symbols.name(param.name));
                    let frame_slot = LocalVariable {
                        name: store.symbols.intern(&original_name),
                        index: pos,
                        ty: AbstractType::Dynamic,
                        is_captured: false,
                        owner: scope,
                        token_pos: param.token_pos,
                    };
                    let load_comp = self.build_load_local(frag, &frame_slot);
                    let loaded = self.bind(frag, load_comp);
                    let store_comp = self.build_store_local_by_id(frag, param_id, loaded);
                    self.perform(frag, store_comp);
                    let null_value = self.build_null_value(frag);
                    let store_comp = self.build_store_local(frag, &frame_slot, null_value);
                    self.perform(frag, store_comp);
                }
            }
        }

        if self.options.enable_type_checks && is_root {
            let function = self.function();
            let num_params = function.num_params;
            let root_scope = n.scope.expect("root sequence has a scope");
            // Constructors skip receiver and phase, factories their
            // type-argument vector, instance methods their receiver.
            let mut pos = if function.is_constructor() {
                2
            } else if function.is_factory() || function.is_dynamic_function() {
                1
            } else {
                0
            };
            while pos < num_params {
                let param_id = parsed.scopes.variable_at(root_scope, pos);
                let param = parsed.scopes.variable(param_id);
                if !self.can_skip_type_check(None, &param.ty) {
                    let load_comp = self.build_load_local_by_id(frag, param_id);
                    let loaded = self.bind(frag, load_comp);
                    let assert_comp = self.build_assert_assignable(
                        frag,
                        param.token_pos,
                        loaded,
                        param.ty.clone(),
                        param.name,
                    )?;
                    self.perform(frag, assert_comp);
                }
                pos += 1;
            }
        }

        let mut i = 0;
        while frag.is_open() && i < n.nodes.len() {
            self.build_for_effect(frag, &n.nodes[i])?;
            i += 1;
        }

        if frag.is_open() {
            if self.must_save_restore_context(is_root) {
                assert!(num_context_variables > 0);
                self.build_load_context(frag, parsed.saved_context_var.unwrap());
            } else if num_context_variables > 0 {
                self.unchain_context(frag);
            }
        }

        // A break out of a labeled sequence has already unchained the
        // context on its own path.
        if let Some(label) = n.label {
            assert!(self.continue_join(label).is_none());
            if let Some(break_join) = self.break_join(label) {
                self.adopt_join(frag, break_join);
            }
        }
        self.context_level = previous_context_level;
        Ok(())
    }

    pub(crate) fn visit_return(&mut self, frag: &mut Fragment, n: &ReturnNode) -> BuildResult<()> {
        let parsed = self.parsed;
        let mut return_value = self.build_for_value(frag, &n.value)?;

        for finally in &n.inlined_finally {
            self.build_for_effect(frag, finally)?;
            if !frag.is_open() {
                return Ok(());
            }
        }

        if self.options.enable_type_checks {
            let function = self.function();
            // Implicit getters return a value the field already type
            // checked, unless they compute a static field initializer.
            if function.is_static || !function.is_implicit_getter() {
                let dst_type = function.result_type.clone();
                let dst_name = self.store.symbols.intern("function result");
                return_value = self.build_assignable_value(
                    frag,
                    n.value.token_pos(),
                    return_value,
                    dst_type,
                    dst_name,
                )?;
            }
        }

        if let Some(saved_context) = parsed.saved_context_var {
            // The entry context was saved but never chained.
            self.build_load_context(frag, saved_context);
        } else {
            let mut level = self.context_level;
            while level > 0 {
                self.unchain_context(frag);
                level -= 1;
            }
        }

        let ret = self.graph.add(InstructionKind::Return {
            token_pos: n.token_pos,
            value: return_value,
        });
        self.add_instruction(frag, ret);
        frag.close();
        Ok(())
    }

    pub(crate) fn visit_if(&mut self, frag: &mut Fragment, n: &IfNode) -> BuildResult<()> {
        let test = self.build_for_test(&n.condition, frag.temp_index)?;
        let mut for_true = Fragment::new(frag.temp_index);
        self.build_for_effect(&mut for_true, &n.true_branch)?;
        let mut for_false = Fragment::new(frag.temp_index);
        if let Some(false_branch) = &n.false_branch {
            self.build_for_effect(&mut for_false, false_branch)?;
        }
        self.join(frag, test, for_true, for_false);
        Ok(())
    }

    // The fragment is composed as:
    //   continue-join (optional)
    //   loop-join
    //   [ test ] -> (body-entry-target, loop-exit-target)
    //   body-entry-target [ body ] -> (loop-join)
    //   loop-exit-target
    //   break-join (optional)
    pub(crate) fn visit_while(&mut self, frag: &mut Fragment, n: &WhileNode) -> BuildResult<()> {
        let test = self.build_for_test(&n.condition, frag.temp_index)?;

        let mut for_body = Fragment::new(frag.temp_index);
        self.perform(
            &mut for_body,
            Computation::CheckStackOverflow {
                token_pos: n.token_pos,
                try_index: self.try_index,
            },
        );
        self.build_for_effect(&mut for_body, &n.body)?;

        // Jumps in the body have materialized the joins by now.
        if let Some(continue_join) = self.continue_join(n.label) {
            self.add_instruction(frag, continue_join);
        }
        self.tie_loop(frag, test, for_body);
        if let Some(break_join) = self.break_join(n.label) {
            self.add_instruction(frag, break_join);
        }
        Ok(())
    }

    // The fragment is composed as:
    //   body-entry-join [ body ]
    //   test-entry (continue-join or body-exit-target)
    //   [ test ] -> (back-target, loop-exit-target)
    //   back-target -> (body-entry-join)
    //   loop-exit-target
    //   break-join (optional)
    pub(crate) fn visit_do_while(
        &mut self,
        frag: &mut Fragment,
        n: &DoWhileNode,
    ) -> BuildResult<()> {
        let mut for_body = Fragment::new(frag.temp_index);
        self.perform(
            &mut for_body,
            Computation::CheckStackOverflow {
                token_pos: n.token_pos,
                try_index: self.try_index,
            },
        );
        self.build_for_effect(&mut for_body, &n.body)?;

        let test = self.build_for_test(&n.condition, frag.temp_index)?;
        assert!(frag.is_open());

        let body_entry_join = self.graph.add(join_entry_kind());
        self.add_instruction(frag, body_entry_join);
        let body_exit = self.append_fragment(body_entry_join, for_body);

        let continue_join = self.continue_join(n.label);
        if body_exit.is_some() || continue_join.is_some() {
            let test_entry = match continue_join {
                Some(join) => join,
                None => self.graph.add(target_entry_kind()),
            };
            self.graph.set_successor(test_entry, test.entry);
            if let Some(body_exit) = body_exit {
                self.graph.set_successor(body_exit, test_entry);
            }
        }

        let back_target = self.graph.add(target_entry_kind());
        self.graph
            .set_branch_successor(test.true_successor_slot(), back_target);
        self.graph.set_successor(back_target, body_entry_join);

        let loop_exit = self.graph.add(target_entry_kind());
        self.graph
            .set_branch_successor(test.false_successor_slot(), loop_exit);
        match self.break_join(n.label) {
            None => frag.exit = Some(loop_exit),
            Some(break_join) => {
                self.graph.set_successor(loop_exit, break_join);
                frag.exit = Some(break_join);
            }
        }
        Ok(())
    }

    // The fragment is composed as:
    //   [ initializer ]
    //   loop-join
    //   body-entry-target [ body ]
    //   continue-join (optional) [ increment ] -> (loop-join)
    //   [ test ] -> (body-entry-target, loop-exit-target)
    //   loop-exit-target
    //   break-join (optional)
    // 'break' joins at the loop exit, 'continue' at the increment entry.
    pub(crate) fn visit_for(&mut self, frag: &mut Fragment, n: &ForNode) -> BuildResult<()> {
        self.build_for_effect(frag, &n.initializer)?;
        assert!(frag.is_open());

        let mut for_body = Fragment::new(frag.temp_index);
        let body_entry = self.graph.add(target_entry_kind());
        self.add_instruction(&mut for_body, body_entry);
        self.perform(
            &mut for_body,
            Computation::CheckStackOverflow {
                token_pos: n.token_pos,
                try_index: self.try_index,
            },
        );
        self.build_for_effect(&mut for_body, &n.body)?;
        assert!(!for_body.is_empty());

        let continue_join = self.continue_join(n.label);
        let loop_increment_end: Option<InstrId>;
        if continue_join.is_none() && for_body.is_open() {
            // No extra basic block between body and increment.
            self.build_for_effect(&mut for_body, &n.increment)?;
            loop_increment_end = for_body.exit;
            assert!(loop_increment_end.is_some());
        } else if let Some(continue_join) = continue_join {
            if for_body.is_open() {
                self.graph
                    .set_successor(for_body.exit.unwrap(), continue_join);
            }
            let mut for_increment = Fragment::new(frag.temp_index);
            self.add_instruction(&mut for_increment, continue_join);
            self.build_for_effect(&mut for_increment, &n.increment)?;
            loop_increment_end = for_increment.exit;
            assert!(loop_increment_end.is_some());
        } else {
            // No backward branch exists at all.
            loop_increment_end = None;
            assert!(!for_body.is_open());
        }

        if let Some(increment_end) = loop_increment_end {
            let loop_start = self.graph.add(join_entry_kind());
            self.add_instruction(frag, loop_start);
            self.graph.set_successor(increment_end, loop_start);
        }

        match &n.condition {
            None => {
                // Endless loop.
                self.append(frag, for_body);
                match self.break_join(n.label) {
                    None => frag.close(),
                    Some(break_join) => frag.exit = Some(break_join),
                }
            }
            Some(condition) => {
                let loop_exit = self.graph.add(target_entry_kind());
                let test = self.build_for_test(condition, frag.temp_index)?;
                self.append_test(frag, &test);
                self.graph
                    .set_branch_successor(test.true_successor_slot(), body_entry);
                self.graph
                    .set_branch_successor(test.false_successor_slot(), loop_exit);
                match self.break_join(n.label) {
                    None => frag.exit = Some(loop_exit),
                    Some(break_join) => {
                        self.graph.set_successor(loop_exit, break_join);
                        frag.exit = Some(break_join);
                    }
                }
            }
        }
        Ok(())
    }

    pub(crate) fn visit_switch(&mut self, frag: &mut Fragment, n: &SwitchNode) -> BuildResult<()> {
        self.build_for_effect(frag, &n.body)?;
        if let Some(break_join) = self.break_join(n.label) {
            self.adopt_join(frag, break_join);
        }
        assert!(
            self.continue_join(n.label).is_none(),
            "no continue target on a switch"
        );
        Ok(())
    }

    // A case node holds zero or more case expressions, possibly a default,
    // and the case statements. The tests chain through each other's false
    // successors; every true successor routes to a shared statement-entry
    // join (unless a single route exists), and falling off the statements
    // meets the final false edge at the exit join.
    pub(crate) fn visit_case(&mut self, frag: &mut Fragment, n: &CaseNode) -> BuildResult<()> {
        let parsed = self.parsed;
        let len = n.case_expressions.len();
        let needs_join_at_statement_entry = len > 1 || (len > 0 && n.contains_default);

        let statement_start = match n.label {
            // A labeled continue in another case node targets this one.
            Some(label) if parsed.scopes.label(label).is_continue_target => {
                self.ensure_continue_join(label)
            }
            _ if needs_join_at_statement_entry => self.graph.add(join_entry_kind()),
            _ => self.graph.add(target_entry_kind()),
        };
        let mut for_case_statements = Fragment::new(frag.temp_index);
        self.add_instruction(&mut for_case_statements, statement_start);
        self.build_for_effect(&mut for_case_statements, &n.statements)?;

        if len == 0 {
            assert!(n.contains_default, "case without expressions is a default");
            self.append(frag, for_case_statements);
            return Ok(());
        }

        let mut true_slots = Vec::with_capacity(len);
        let mut false_slots = Vec::with_capacity(len);
        let mut case_entries: Vec<Option<InstrId>> = Vec::with_capacity(len);
        for (i, case_expr) in n.case_expressions.iter().enumerate() {
            if i == 0 {
                // Only the first test is appended; the rest chain off it.
                case_entries.push(None);
                let test = self.build_for_test(case_expr, frag.temp_index)?;
                true_slots.push(test.true_successor_slot());
                false_slots.push(test.false_successor_slot());
                self.append_test(frag, &test);
            } else {
                let case_entry = self.graph.add(target_entry_kind());
                case_entries.push(Some(case_entry));
                let test = self.build_for_test(case_expr, frag.temp_index)?;
                self.graph.set_successor(case_entry, test.entry);
                true_slots.push(test.true_successor_slot());
                false_slots.push(test.false_successor_slot());
            }
        }
        assert!(!frag.is_open());

        // All tests except the last: false chains to the next case, true
        // routes to the shared statement entry.
        for i in 0..len - 1 {
            assert!(needs_join_at_statement_entry);
            self.graph
                .set_branch_successor(false_slots[i], case_entries[i + 1].unwrap());
            let true_target = self.graph.add(target_entry_kind());
            self.graph.set_branch_successor(true_slots[i], true_target);
            self.graph.set_successor(true_target, statement_start);
        }

        let statement_start_is_target = matches!(
            self.graph.kind(statement_start),
            InstructionKind::TargetEntry { .. }
        );
        if statement_start_is_target {
            self.graph
                .set_branch_successor(true_slots[len - 1], statement_start);
        } else {
            let true_target = self.graph.add(target_entry_kind());
            self.graph
                .set_branch_successor(true_slots[len - 1], true_target);
            self.graph.set_successor(true_target, statement_start);
        }

        let false_target = self.graph.add(target_entry_kind());
        self.graph
            .set_branch_successor(false_slots[len - 1], false_target);
        let exit_instruction;
        if n.contains_default {
            // Both the final false edge and the tests route into the body.
            self.graph.set_successor(false_target, statement_start);
            exit_instruction = if for_case_statements.is_open() {
                let exit = self.graph.add(target_entry_kind());
                self.graph
                    .set_successor(for_case_statements.exit.unwrap(), exit);
                Some(exit)
            } else {
                None
            };
        } else {
            let exit = if for_case_statements.is_open() {
                let join = self.graph.add(join_entry_kind());
                self.graph
                    .set_successor(for_case_statements.exit.unwrap(), join);
                join
            } else {
                self.graph.add(target_entry_kind())
            };
            self.graph.set_successor(false_target, exit);
            exit_instruction = Some(exit);
        }
        frag.exit = exit_instruction;
        Ok(())
    }

    pub(crate) fn visit_jump(&mut self, frag: &mut Fragment, n: &JumpNode) -> BuildResult<()> {
        for finally in &n.inlined_finally {
            self.build_for_effect(frag, finally)?;
            if !frag.is_open() {
                return Ok(());
            }
        }

        // Unchain down to the outer context level of the scope holding the
        // target label.
        let parsed = self.parsed;
        let label = parsed.scopes.label(n.label);
        let owner = label.owner;
        let target_context_level = if parsed.scopes.scope(owner).num_context_variables > 0 {
            // The target scope allocates a context; its outer scope is one
            // level below.
            parsed.scopes.scope(owner).context_level - 1
        } else {
            let mut scope = Some(owner);
            while let Some(current) = scope {
                if parsed.scopes.scope(current).num_context_variables > 0 {
                    break;
                }
                scope = parsed.scopes.scope(current).parent;
            }
            scope
                .map(|current| parsed.scopes.scope(current).context_level)
                .unwrap_or(0)
        };
        let mut current_level = self.context_level;
        assert!(current_level >= target_context_level);
        while current_level > target_context_level {
            self.unchain_context(frag);
            current_level -= 1;
        }

        let jump_target = match n.kind {
            JumpKind::Break => self.ensure_break_join(n.label),
            JumpKind::Continue => self.ensure_continue_join(n.label),
        };
        self.add_instruction(frag, jump_target);
        frag.close();
        Ok(())
    }

    pub(crate) fn visit_try_catch(
        &mut self,
        frag: &mut Fragment,
        n: &TryCatchNode,
    ) -> BuildResult<()> {
        let parsed = self.parsed;
        let old_try_index = self.try_index;
        let try_index = self.allocate_try_index();
        self.try_index = Some(try_index);

        // Preserve the current context around the protected region.
        self.build_store_context(frag, n.context_var);
        self.build_for_effect(frag, &n.try_block)?;
        self.try_index = old_try_index;

        if let Some(catch_block) = &n.catch_block {
            let mut for_catch = Fragment::new(frag.temp_index);
            let catch_entry = self.graph.add(InstructionKind::TargetEntry {
                try_index: Some(try_index),
                block: BlockInfo::default(),
            });
            self.add_instruction(&mut for_catch, catch_entry);
            let exception_var = parsed.scopes.variable(catch_block.exception_var).clone();
            let stacktrace_var = parsed.scopes.variable(catch_block.stacktrace_var).clone();
            self.perform(
                &mut for_catch,
                Computation::CatchEntry {
                    exception_var,
                    stacktrace_var,
                },
            );
            self.build_load_context(&mut for_catch, n.context_var);
            self.build_for_effect(&mut for_catch, &catch_block.body)?;
            self.add_catch_entry(catch_entry);
            assert!(!for_catch.is_open(), "catch block must not fall through");

            if let Some(end_catch) = n.end_catch_label {
                if let Some(continue_join) = self.continue_join(end_catch) {
                    self.adopt_join(frag, continue_join);
                }
            }
        }

        if frag.is_open() {
            if let Some(finally_block) = n.finally_block.as_deref() {
                self.build_for_effect(frag, finally_block)?;
            }
        }
        Ok(())
    }

    // Exceptions inside an inlined finally block belong to the enclosing
    // try, not the one being exited.
    pub(crate) fn visit_inlined_finally(
        &mut self,
        frag: &mut Fragment,
        n: &InlinedFinallyNode,
    ) -> BuildResult<()> {
        let saved_try_index = self.try_index;
        if let Some(index) = saved_try_index {
            self.try_index = index.checked_sub(1);
        }
        self.build_load_context(frag, n.context_var);
        self.build_for_effect(frag, &n.finally_block)?;
        self.try_index = saved_try_index;
        Ok(())
    }

    pub(crate) fn build_throw(&mut self, frag: &mut Fragment, n: &ThrowNode) -> BuildResult<()> {
        let exception = self.build_for_value(frag, &n.exception)?;
        let instr = match &n.stacktrace {
            None => self.graph.add(InstructionKind::Throw {
                token_pos: n.token_pos,
                try_index: self.try_index,
                exception,
            }),
            Some(stacktrace) => {
                let stack_trace = self.build_for_value(frag, stacktrace)?;
                self.graph.add(InstructionKind::ReThrow {
                    token_pos: n.token_pos,
                    try_index: self.try_index,
                    exception,
                    stack_trace,
                })
            }
        };
        self.add_instruction(frag, instr);
        Ok(())
    }
}
