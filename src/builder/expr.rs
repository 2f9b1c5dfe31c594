//! Expression lowering under the three result modes.
//!
//! Effect mode evaluates an expression for its side effects and discards
//! the value; value mode additionally yields a [`Value`]; test mode closes
//! its fragment with a branch and exposes the two successor slots. Most
//! expression kinds share one computation-producing translation and differ
//! only in the final wrapper (`Do` vs `Bind`); the rest override a mode:
//! short-circuit operators and conditionals converge their arms through
//! `expression_temp_var`, constructor calls in value position shuttle the
//! allocation through a dedicated local, and a throw in value position
//! stays open by appending a null constant.

use crate::ast::{
    AstNode, BinaryOpKind, BinaryOpNode, ClosureCallNode, ComparisonKind, ConditionalNode,
    ConstructorCallNode, UnaryOpKind,
};
use crate::builder::fragment::{Fragment, TestFragment};
use crate::builder::FlowGraphBuilder;
use crate::error::BuildResult;
use crate::ir::{Computation, InstructionKind, RelationalOpKind, StrictCompareKind, Value};
use crate::runtime::{CTOR_PHASE_ALL, NO_INSTANTIATOR};
use crate::types::Literal;

impl<'a> FlowGraphBuilder<'a> {
    pub(crate) fn build_for_effect(
        &mut self,
        frag: &mut Fragment,
        node: &AstNode,
    ) -> BuildResult<()> {
        match node {
            AstNode::Sequence(n) => self.visit_sequence(frag, node, n),
            AstNode::Return(n) => self.visit_return(frag, n),
            AstNode::If(n) => self.visit_if(frag, n),
            AstNode::While(n) => self.visit_while(frag, n),
            AstNode::DoWhile(n) => self.visit_do_while(frag, n),
            AstNode::For(n) => self.visit_for(frag, n),
            AstNode::Switch(n) => self.visit_switch(frag, n),
            AstNode::Case(n) => self.visit_case(frag, n),
            AstNode::Jump(n) => self.visit_jump(frag, n),
            AstNode::TryCatch(n) => self.visit_try_catch(frag, n),
            AstNode::InlinedFinally(n) => self.visit_inlined_finally(frag, n),
            AstNode::Throw(n) => {
                self.build_throw(frag, n)?;
                frag.close();
                Ok(())
            }
            AstNode::Literal(_) => Ok(()),
            AstNode::Type(_) => unreachable!("type node outside a type test"),
            AstNode::Assignable(_) => unreachable!("assignable node in effect context"),
            AstNode::BinaryOp(n) if n.kind.is_logical() => {
                self.build_logical_op_for_effect(frag, n)
            }
            AstNode::Comparison(n) if n.kind.is_type_test() => {
                self.build_type_test_for_effect(frag, n)
            }
            AstNode::Comparison(n) if n.kind.is_type_cast() => {
                self.build_type_cast_for_effect(frag, n)
            }
            AstNode::Conditional(n) => self.build_conditional_for_effect(frag, n),
            AstNode::LoadLocal(n) => {
                if let Some(pseudo) = &n.pseudo {
                    self.build_for_effect(frag, pseudo)?;
                }
                Ok(())
            }
            AstNode::ClosureCall(n) => {
                let call = self.build_closure_call(frag, n)?;
                self.perform(frag, call);
                self.restore_context_after_call(frag);
                Ok(())
            }
            AstNode::ConstructorCall(n)
                if !self.store.function(n.constructor).is_factory() =>
            {
                let allocated = self.build_object_allocation(frag, n)?;
                self.build_constructor_call(frag, n, allocated)
            }
            _ => {
                let comp = self.translate_expr(frag, node)?;
                self.perform(frag, comp);
                Ok(())
            }
        }
    }

    pub(crate) fn build_for_value(
        &mut self,
        frag: &mut Fragment,
        node: &AstNode,
    ) -> BuildResult<Value> {
        match node {
            AstNode::Literal(n) => Ok(self.bind(
                frag,
                Computation::Constant {
                    literal: n.literal.clone(),
                },
            )),
            AstNode::Assignable(n) => {
                let value = self.build_for_value(frag, &n.expr)?;
                self.build_assignable_value(frag, n.expr.token_pos(), value, n.ty.clone(), n.dst_name)
            }
            AstNode::BinaryOp(n) if n.kind.is_logical() => self.build_logical_op_for_value(frag, n),
            AstNode::Comparison(n) if n.kind.is_type_test() => {
                self.build_type_test_for_value(frag, n)
            }
            AstNode::Comparison(n) if n.kind.is_type_cast() => {
                self.build_type_cast_for_value(frag, n)
            }
            AstNode::Conditional(n) => self.build_conditional_for_value(frag, n),
            AstNode::LoadLocal(n) => {
                if let Some(pseudo) = &n.pseudo {
                    self.build_for_effect(frag, pseudo)?;
                }
                let load = self.build_load_local_by_id(frag, n.local);
                Ok(self.bind(frag, load))
            }
            AstNode::Throw(n) => {
                // The parser may substitute a throw for an expression; a
                // trailing null keeps the fragment open mid-expression.
                self.build_throw(frag, n)?;
                Ok(self.bind(
                    frag,
                    Computation::Constant {
                        literal: Literal::Null,
                    },
                ))
            }
            AstNode::ClosureCall(n) => {
                let call = self.build_closure_call(frag, n)?;
                let result = self.bind(frag, call);
                self.restore_context_after_call(frag);
                Ok(result)
            }
            AstNode::ConstructorCall(n)
                if !self.store.function(n.constructor).is_factory() =>
            {
                self.build_constructor_call_for_value(frag, n)
            }
            AstNode::InstanceSetter(n) => {
                let receiver = self.build_for_value(frag, &n.receiver)?;
                let value = self.build_for_value(frag, &n.value)?;
                let expression_temp = self
                    .parsed
                    .expression_temp_var
                    .expect("expression temp required for setter result");
                let store_comp = self.build_store_local_by_id(frag, expression_temp, value);
                let saved = self.bind(frag, store_comp);
                self.perform(
                    frag,
                    Computation::InstanceSetter {
                        token_pos: n.token_pos,
                        try_index: self.try_index,
                        field_name: n.field_name,
                        receiver,
                        value: saved,
                    },
                );
                let load = self.build_load_local_by_id(frag, expression_temp);
                Ok(self.bind(frag, load))
            }
            AstNode::StoreIndexed(n) => {
                let array = self.build_for_value(frag, &n.array)?;
                let index = self.build_for_value(frag, &n.index)?;
                let value = self.build_for_value(frag, &n.value)?;
                let expression_temp = self
                    .parsed
                    .expression_temp_var
                    .expect("expression temp required for store result");
                let store_comp = self.build_store_local_by_id(frag, expression_temp, value);
                let saved = self.bind(frag, store_comp);
                self.perform(
                    frag,
                    Computation::StoreIndexed {
                        token_pos: n.token_pos,
                        try_index: self.try_index,
                        array,
                        index,
                        value: saved,
                    },
                );
                let load = self.build_load_local_by_id(frag, expression_temp);
                Ok(self.bind(frag, load))
            }
            AstNode::StoreInstanceField(_) => {
                unreachable!("instance field store produces no value")
            }
            AstNode::Sequence(_)
            | AstNode::Return(_)
            | AstNode::If(_)
            | AstNode::While(_)
            | AstNode::DoWhile(_)
            | AstNode::For(_)
            | AstNode::Switch(_)
            | AstNode::Case(_)
            | AstNode::Jump(_)
            | AstNode::TryCatch(_)
            | AstNode::InlinedFinally(_) => unreachable!("statement in value context"),
            AstNode::Type(_) => unreachable!("type node outside a type test"),
            _ => {
                let comp = self.translate_expr(frag, node)?;
                Ok(self.bind(frag, comp))
            }
        }
    }

    /// Evaluate `node` as a boolean and close with a branch whose
    /// successors remain settable.
    pub(crate) fn build_for_test(
        &mut self,
        node: &AstNode,
        temp_index: usize,
    ) -> BuildResult<TestFragment> {
        let mut frag = Fragment::new(temp_index);
        let mut value = self.build_for_value(&mut frag, node)?;
        if self.options.enable_type_checks {
            value = self.bind(
                &mut frag,
                Computation::AssertBoolean {
                    token_pos: node.token_pos(),
                    try_index: self.try_index,
                    value,
                },
            );
        }
        let branch = self.graph.add(InstructionKind::Branch {
            value,
            true_successor: None,
            false_successor: None,
        });
        self.add_instruction(&mut frag, branch);
        frag.close();
        let entry = frag.entry.expect("test fragment is never empty");
        Ok(TestFragment::new(entry, frag.temp_index, branch))
    }

    pub(crate) fn translate_argument_list(
        &mut self,
        frag: &mut Fragment,
        arguments: &[AstNode],
        values: &mut Vec<Value>,
    ) -> BuildResult<()> {
        for argument in arguments {
            let value = self.build_for_value(frag, argument)?;
            values.push(value);
        }
        Ok(())
    }

    /// Shared translation for expression kinds whose effect and value
    /// lowerings differ only in the final wrapper.
    fn translate_expr(&mut self, frag: &mut Fragment, node: &AstNode) -> BuildResult<Computation> {
        let store = self.store;
        match node {
            AstNode::BinaryOp(n) => {
                assert!(!n.kind.is_logical());
                let left = self.build_for_value(frag, &n.left)?;
                let right = self.build_for_value(frag, &n.right)?;
                let name = store.symbols.intern(n.kind.selector());
                Ok(Computation::InstanceCall {
                    token_pos: n.token_pos,
                    try_index: self.try_index,
                    name,
                    arguments: vec![left, right],
                    argument_names: Vec::new(),
                    checked_argument_count: 2,
                })
            }
            AstNode::UnaryOp(n) => match n.kind {
                UnaryOpKind::Not => {
                    let mut value = self.build_for_value(frag, &n.operand)?;
                    if self.options.enable_type_checks {
                        value = self.bind(
                            frag,
                            Computation::AssertBoolean {
                                token_pos: n.operand.token_pos(),
                                try_index: self.try_index,
                                value,
                            },
                        );
                    }
                    Ok(Computation::BooleanNegate { value })
                }
                UnaryOpKind::Negate | UnaryOpKind::BitNot => {
                    let value = self.build_for_value(frag, &n.operand)?;
                    let name = store.symbols.intern(n.kind.selector());
                    Ok(Computation::InstanceCall {
                        token_pos: n.token_pos,
                        try_index: self.try_index,
                        name,
                        arguments: vec![value],
                        argument_names: Vec::new(),
                        checked_argument_count: 1,
                    })
                }
            },
            AstNode::Comparison(n) => {
                assert!(!n.kind.is_type_test() && !n.kind.is_type_cast());
                let left = self.build_for_value(frag, &n.left)?;
                let right = self.build_for_value(frag, &n.right)?;
                match n.kind {
                    ComparisonKind::EqStrict | ComparisonKind::NeStrict => {
                        let kind = if n.kind == ComparisonKind::EqStrict {
                            StrictCompareKind::EqStrict
                        } else {
                            StrictCompareKind::NeStrict
                        };
                        Ok(Computation::StrictCompare { kind, left, right })
                    }
                    ComparisonKind::Eq => Ok(Computation::EqualityCompare {
                        token_pos: n.token_pos,
                        try_index: self.try_index,
                        left,
                        right,
                    }),
                    ComparisonKind::Ne => {
                        let mut equal = self.bind(
                            frag,
                            Computation::EqualityCompare {
                                token_pos: n.token_pos,
                                try_index: self.try_index,
                                left,
                                right,
                            },
                        );
                        if self.options.enable_type_checks {
                            equal = self.bind(
                                frag,
                                Computation::AssertBoolean {
                                    token_pos: n.token_pos,
                                    try_index: self.try_index,
                                    value: equal,
                                },
                            );
                        }
                        Ok(Computation::BooleanNegate { value: equal })
                    }
                    ComparisonKind::Lt
                    | ComparisonKind::Gt
                    | ComparisonKind::LtEq
                    | ComparisonKind::GtEq => {
                        let kind = match n.kind {
                            ComparisonKind::Lt => RelationalOpKind::Lt,
                            ComparisonKind::Gt => RelationalOpKind::Gt,
                            ComparisonKind::LtEq => RelationalOpKind::LtEq,
                            ComparisonKind::GtEq => RelationalOpKind::GtEq,
                            _ => unreachable!(),
                        };
                        Ok(Computation::RelationalOp {
                            token_pos: n.token_pos,
                            try_index: self.try_index,
                            kind,
                            left,
                            right,
                        })
                    }
                    _ => unreachable!(),
                }
            }
            AstNode::InstanceCall(n) => {
                let receiver = self.build_for_value(frag, &n.receiver)?;
                let mut arguments = vec![receiver];
                self.translate_argument_list(frag, &n.arguments, &mut arguments)?;
                Ok(Computation::InstanceCall {
                    token_pos: n.token_pos,
                    try_index: self.try_index,
                    name: n.name,
                    arguments,
                    argument_names: n.argument_names.clone(),
                    checked_argument_count: 1,
                })
            }
            AstNode::StaticCall(n) => {
                let mut arguments = Vec::with_capacity(n.arguments.len());
                self.translate_argument_list(frag, &n.arguments, &mut arguments)?;
                Ok(Computation::StaticCall {
                    token_pos: n.token_pos,
                    try_index: self.try_index,
                    function: n.function,
                    arguments,
                    argument_names: n.argument_names.clone(),
                })
            }
            AstNode::ConstructorCall(n) => {
                assert!(store.function(n.constructor).is_factory());
                self.translate_factory_call(frag, n)
            }
            AstNode::InstanceGetter(n) => {
                let receiver = self.build_for_value(frag, &n.receiver)?;
                let name = store.symbols.getter_name(n.field_name);
                Ok(Computation::InstanceCall {
                    token_pos: n.token_pos,
                    try_index: self.try_index,
                    name,
                    arguments: vec![receiver],
                    argument_names: Vec::new(),
                    checked_argument_count: 1,
                })
            }
            AstNode::StaticGetter(n) => {
                let getter_name = store.symbols.getter_name(n.field_name);
                let getter = store
                    .lookup_static_function(n.class, getter_name)
                    .expect("static getter resolved by the analyzer");
                Ok(Computation::StaticCall {
                    token_pos: n.token_pos,
                    try_index: self.try_index,
                    function: getter,
                    arguments: Vec::new(),
                    argument_names: Vec::new(),
                })
            }
            AstNode::InstanceSetter(n) => {
                let receiver = self.build_for_value(frag, &n.receiver)?;
                let value = self.build_for_value(frag, &n.value)?;
                Ok(Computation::InstanceSetter {
                    token_pos: n.token_pos,
                    try_index: self.try_index,
                    field_name: n.field_name,
                    receiver,
                    value,
                })
            }
            AstNode::StaticSetter(n) => {
                let setter_name = store.symbols.setter_name(n.field_name);
                let setter = store
                    .lookup_static_function(n.class, setter_name)
                    .expect("static setter resolved by the analyzer");
                let value = self.build_for_value(frag, &n.value)?;
                Ok(Computation::StaticSetter {
                    token_pos: n.token_pos,
                    try_index: self.try_index,
                    setter_function: setter,
                    value,
                })
            }
            AstNode::Native(n) => Ok(Computation::NativeCall {
                token_pos: n.token_pos,
                try_index: self.try_index,
                name: n.name,
            }),
            AstNode::StoreLocal(n) => {
                let mut value = self.build_for_value(frag, &n.value)?;
                if self.options.enable_type_checks {
                    let parsed = self.parsed;
                    let local = parsed.scopes.variable(n.local);
                    value = self.build_assignable_value(
                        frag,
                        n.value.token_pos(),
                        value,
                        local.ty.clone(),
                        local.name,
                    )?;
                }
                Ok(self.build_store_local_by_id(frag, n.local, value))
            }
            AstNode::LoadInstanceField(n) => {
                let instance = self.build_for_value(frag, &n.instance)?;
                Ok(Computation::LoadInstanceField {
                    field: n.field,
                    instance,
                })
            }
            AstNode::StoreInstanceField(n) => {
                let instance = self.build_for_value(frag, &n.instance)?;
                let mut value = self.build_for_value(frag, &n.value)?;
                if self.options.enable_type_checks {
                    let field = store.field(n.field);
                    value = self.build_assignable_value(
                        frag,
                        n.value.token_pos(),
                        value,
                        field.ty.clone(),
                        field.name,
                    )?;
                }
                Ok(Computation::StoreInstanceField {
                    field: n.field,
                    instance,
                    value,
                })
            }
            AstNode::LoadStaticField(n) => Ok(Computation::LoadStaticField { field: n.field }),
            AstNode::StoreStaticField(n) => {
                let mut value = self.build_for_value(frag, &n.value)?;
                if self.options.enable_type_checks {
                    let field = store.field(n.field);
                    value = self.build_assignable_value(
                        frag,
                        n.value.token_pos(),
                        value,
                        field.ty.clone(),
                        field.name,
                    )?;
                }
                Ok(Computation::StoreStaticField {
                    field: n.field,
                    value,
                })
            }
            AstNode::LoadIndexed(n) => {
                let array = self.build_for_value(frag, &n.array)?;
                let index = self.build_for_value(frag, &n.index)?;
                Ok(Computation::LoadIndexed {
                    token_pos: n.token_pos,
                    try_index: self.try_index,
                    array,
                    index,
                })
            }
            AstNode::StoreIndexed(n) => {
                let array = self.build_for_value(frag, &n.array)?;
                let index = self.build_for_value(frag, &n.index)?;
                let value = self.build_for_value(frag, &n.value)?;
                Ok(Computation::StoreIndexed {
                    token_pos: n.token_pos,
                    try_index: self.try_index,
                    array,
                    index,
                    value,
                })
            }
            AstNode::Array(n) => {
                let mut elements = Vec::with_capacity(n.elements.len());
                self.translate_argument_list(frag, &n.elements, &mut elements)?;
                let element_type =
                    self.build_instantiated_type_arguments(frag, n.token_pos, &n.type_arguments)?;
                Ok(Computation::CreateArray {
                    token_pos: n.token_pos,
                    try_index: self.try_index,
                    elements,
                    element_type,
                })
            }
            AstNode::Closure(n) => {
                let receiver = match &n.receiver {
                    Some(receiver) => self.build_for_value(frag, receiver)?,
                    None => self.build_null_value(frag),
                };
                let signature_is_generic = store
                    .function(n.function)
                    .signature_class
                    .map(|class| store.class(class).num_type_parameters > 0)
                    .unwrap_or(false);
                let type_arguments = if signature_is_generic {
                    self.build_instantiator_type_arguments(frag, n.token_pos, None)?
                } else {
                    self.build_null_value(frag)
                };
                Ok(Computation::CreateClosure {
                    token_pos: n.token_pos,
                    try_index: self.try_index,
                    function: n.function,
                    type_arguments,
                    receiver,
                })
            }
            AstNode::CloneContext(n) => {
                let context = self.bind(frag, Computation::CurrentContext);
                let clone = self.bind(
                    frag,
                    Computation::CloneContext {
                        token_pos: n.token_pos,
                        try_index: self.try_index,
                        context,
                    },
                );
                Ok(Computation::StoreContext { value: clone })
            }
            _ => unreachable!("node has no computation form"),
        }
    }

    /// Short-circuit `&&`/`||` for effect: the right side runs only on the
    /// path its truth value matters on.
    fn build_logical_op_for_effect(
        &mut self,
        frag: &mut Fragment,
        node: &BinaryOpNode,
    ) -> BuildResult<()> {
        let test = self.build_for_test(&node.left, frag.temp_index)?;
        let mut for_right = Fragment::new(frag.temp_index);
        self.build_for_effect(&mut for_right, &node.right)?;
        let empty = Fragment::new(frag.temp_index);
        if node.kind == BinaryOpKind::And {
            self.join(frag, test, for_right, empty);
        } else {
            self.join(frag, test, empty, for_right);
        }
        Ok(())
    }

    /// Short-circuit `&&`/`||` for value, converging both arms on
    /// `expression_temp_var`:
    /// `a && b` is `a ? b === true : false`, `a || b` is
    /// `a ? true : b === true`.
    fn build_logical_op_for_value(
        &mut self,
        frag: &mut Fragment,
        node: &BinaryOpNode,
    ) -> BuildResult<Value> {
        let expression_temp = self
            .parsed
            .expression_temp_var
            .expect("expression temp required for logical operators");

        let test = self.build_for_test(&node.left, frag.temp_index)?;

        let mut for_right = Fragment::new(frag.temp_index);
        let mut right_value = self.build_for_value(&mut for_right, &node.right)?;
        if self.options.enable_type_checks {
            right_value = self.bind(
                &mut for_right,
                Computation::AssertBoolean {
                    token_pos: node.right.token_pos(),
                    try_index: self.try_index,
                    value: right_value,
                },
            );
        }
        let constant_true = self.bind(
            &mut for_right,
            Computation::Constant {
                literal: Literal::Bool(true),
            },
        );
        let compare = self.bind(
            &mut for_right,
            Computation::StrictCompare {
                kind: StrictCompareKind::EqStrict,
                left: right_value,
                right: constant_true,
            },
        );
        let store_comp = self.build_store_local_by_id(&mut for_right, expression_temp, compare);
        self.perform(&mut for_right, store_comp);

        if node.kind == BinaryOpKind::And {
            let mut for_false = Fragment::new(frag.temp_index);
            let constant_false = self.bind(
                &mut for_false,
                Computation::Constant {
                    literal: Literal::Bool(false),
                },
            );
            let store_comp =
                self.build_store_local_by_id(&mut for_false, expression_temp, constant_false);
            self.perform(&mut for_false, store_comp);
            self.join(frag, test, for_right, for_false);
        } else {
            let mut for_true = Fragment::new(frag.temp_index);
            let constant_true = self.bind(
                &mut for_true,
                Computation::Constant {
                    literal: Literal::Bool(true),
                },
            );
            let store_comp =
                self.build_store_local_by_id(&mut for_true, expression_temp, constant_true);
            self.perform(&mut for_true, store_comp);
            self.join(frag, test, for_true, for_right);
        }
        let load = self.build_load_local_by_id(frag, expression_temp);
        Ok(self.bind(frag, load))
    }

    fn build_conditional_for_effect(
        &mut self,
        frag: &mut Fragment,
        node: &ConditionalNode,
    ) -> BuildResult<()> {
        let test = self.build_for_test(&node.condition, frag.temp_index)?;
        let mut for_true = Fragment::new(frag.temp_index);
        self.build_for_effect(&mut for_true, &node.true_expr)?;
        let mut for_false = Fragment::new(frag.temp_index);
        self.build_for_effect(&mut for_false, &node.false_expr)?;
        self.join(frag, test, for_true, for_false);
        Ok(())
    }

    fn build_conditional_for_value(
        &mut self,
        frag: &mut Fragment,
        node: &ConditionalNode,
    ) -> BuildResult<Value> {
        let expression_temp = self
            .parsed
            .expression_temp_var
            .expect("expression temp required for conditional expressions");
        let test = self.build_for_test(&node.condition, frag.temp_index)?;

        let mut for_true = Fragment::new(frag.temp_index);
        let true_value = self.build_for_value(&mut for_true, &node.true_expr)?;
        assert!(for_true.is_open());
        let store_comp = self.build_store_local_by_id(&mut for_true, expression_temp, true_value);
        self.perform(&mut for_true, store_comp);

        let mut for_false = Fragment::new(frag.temp_index);
        let false_value = self.build_for_value(&mut for_false, &node.false_expr)?;
        assert!(for_false.is_open());
        let store_comp = self.build_store_local_by_id(&mut for_false, expression_temp, false_value);
        self.perform(&mut for_false, store_comp);

        self.join(frag, test, for_true, for_false);
        let load = self.build_load_local_by_id(frag, expression_temp);
        Ok(self.bind(frag, load))
    }

    /// A closure call saves the current context around the call; both
    /// modes restore it afterwards.
    fn build_closure_call(
        &mut self,
        frag: &mut Fragment,
        node: &ClosureCallNode,
    ) -> BuildResult<Computation> {
        let closure = self.build_for_value(frag, &node.closure)?;
        let mut arguments = vec![closure];
        self.translate_argument_list(frag, &node.arguments, &mut arguments)?;
        let expression_temp = self
            .parsed
            .expression_temp_var
            .expect("expression temp required around closure calls");
        self.build_store_context(frag, expression_temp);
        Ok(Computation::ClosureCall {
            token_pos: node.token_pos,
            try_index: self.try_index,
            arguments,
            argument_names: node.argument_names.clone(),
        })
    }

    fn restore_context_after_call(&mut self, frag: &mut Fragment) {
        let expression_temp = self
            .parsed
            .expression_temp_var
            .expect("expression temp required around closure calls");
        self.build_load_context(frag, expression_temp);
    }

    /// Factory constructors are plain static calls taking the instantiated
    /// type-argument vector first.
    fn translate_factory_call(
        &mut self,
        frag: &mut Fragment,
        node: &ConstructorCallNode,
    ) -> BuildResult<Computation> {
        let type_arguments =
            self.build_instantiated_type_arguments(frag, node.token_pos, &node.type_arguments)?;
        let mut arguments = vec![type_arguments];
        self.translate_argument_list(frag, &node.arguments, &mut arguments)?;
        Ok(Computation::StaticCall {
            token_pos: node.token_pos,
            try_index: self.try_index,
            function: node.constructor,
            arguments,
            argument_names: node.argument_names.clone(),
        })
    }

    /// Allocate the object, with a runtime bounds check when checked mode
    /// cannot verify uninstantiated type arguments statically.
    pub(crate) fn build_object_allocation(
        &mut self,
        frag: &mut Fragment,
        node: &ConstructorCallNode,
    ) -> BuildResult<Value> {
        let store = self.store;
        let class = store
            .function(node.constructor)
            .owner
            .expect("constructor has an owning class");
        let requires_type_arguments = store.class(class).num_type_parameters > 0;

        let mut allocate_arguments = Vec::new();
        if requires_type_arguments {
            self.build_constructor_type_arguments(frag, node, &mut allocate_arguments)?;
        }

        let needs_bounds_check = self.options.enable_type_checks
            && requires_type_arguments
            && node
                .type_arguments
                .as_ref()
                .map(|args| !args.is_instantiated() && !args.is_within_bounds_of(class, store))
                .unwrap_or(false);
        let comp = if needs_bounds_check {
            Computation::AllocateObjectWithBoundsCheck {
                token_pos: node.token_pos,
                try_index: self.try_index,
                class,
                type_arguments: node.type_arguments.clone(),
                arguments: allocate_arguments,
            }
        } else {
            Computation::AllocateObject {
                token_pos: node.token_pos,
                try_index: self.try_index,
                class,
                arguments: allocate_arguments,
            }
        };
        Ok(self.bind(frag, comp))
    }

    /// Push the type-argument vector and instantiator operands for an
    /// allocation. The uninstantiated case extracts both through the
    /// scratch locals:
    ///   t1 = InstantiatorTypeArguments()
    ///   t2 = ExtractConstructorTypeArguments(t1)
    ///   t1 = ExtractConstructorInstantiator(t1)
    fn build_constructor_type_arguments(
        &mut self,
        frag: &mut Fragment,
        node: &ConstructorCallNode,
        arguments: &mut Vec<Value>,
    ) -> BuildResult<()> {
        let instantiated = node
            .type_arguments
            .as_ref()
            .map(|args| args.is_instantiated())
            .unwrap_or(true);
        if instantiated {
            let literal = match &node.type_arguments {
                None => Literal::Null,
                Some(args) => Literal::TypeArgs(args.clone()),
            };
            let type_arguments = self.bind(frag, Computation::Constant { literal });
            let no_instantiator = self.bind(
                frag,
                Computation::Constant {
                    literal: Literal::Int(NO_INSTANTIATOR),
                },
            );
            arguments.push(type_arguments);
            arguments.push(no_instantiator);
            return Ok(());
        }

        let type_args = node.type_arguments.clone().expect("uninstantiated vector");
        let t1 = self
            .parsed
            .expression_temp_var
            .expect("expression temp required for constructor type arguments");
        let t2 = node.allocated_object_var;

        let instantiator_type_arguments =
            self.build_instantiator_type_arguments(frag, node.token_pos, None)?;
        assert!(instantiator_type_arguments.is_use());
        let store_comp =
            self.build_store_local_by_id(frag, t1, instantiator_type_arguments);
        let stored_instantiator = self.bind(frag, store_comp);

        let extracted_type_arguments = self.bind(
            frag,
            Computation::ExtractConstructorTypeArguments {
                token_pos: node.token_pos,
                try_index: self.try_index,
                type_arguments: type_args,
                instantiator: stored_instantiator,
            },
        );
        let store_comp = self.build_store_local_by_id(frag, t2, extracted_type_arguments);
        self.perform(frag, store_comp);

        let load_comp = self.build_load_local_by_id(frag, t1);
        let load_instantiator = self.bind(frag, load_comp);
        let extracted_instantiator = self.bind(
            frag,
            Computation::ExtractConstructorInstantiator {
                instantiator: load_instantiator,
            },
        );
        let store_comp = self.build_store_local_by_id(frag, t1, extracted_instantiator);
        self.perform(frag, store_comp);

        let load_comp = self.build_load_local_by_id(frag, t2);
        let type_arguments = self.bind(frag, load_comp);
        let load_comp = self.build_load_local_by_id(frag, t1);
        let instantiator = self.bind(frag, load_comp);
        arguments.push(type_arguments);
        arguments.push(instantiator);
        Ok(())
    }

    /// The constructor itself runs as a static call on the allocation,
    /// after the phase marker.
    pub(crate) fn build_constructor_call(
        &mut self,
        frag: &mut Fragment,
        node: &ConstructorCallNode,
        allocated: Value,
    ) -> BuildResult<()> {
        let phase = self.bind(
            frag,
            Computation::Constant {
                literal: Literal::Int(CTOR_PHASE_ALL),
            },
        );
        let mut arguments = vec![allocated, phase];
        self.translate_argument_list(frag, &node.arguments, &mut arguments)?;
        self.perform(
            frag,
            Computation::StaticCall {
                token_pos: node.token_pos,
                try_index: self.try_index,
                function: node.constructor,
                arguments,
                argument_names: node.argument_names.clone(),
            },
        );
        Ok(())
    }

    /// Value position keeps the allocation observable across the call by
    /// shuttling it through the node's dedicated local.
    fn build_constructor_call_for_value(
        &mut self,
        frag: &mut Fragment,
        node: &ConstructorCallNode,
    ) -> BuildResult<Value> {
        let allocated = self.build_object_allocation(frag, node)?;
        let store_comp = self.build_store_local_by_id(frag, node.allocated_object_var, allocated);
        let allocated = self.bind(frag, store_comp);
        self.build_constructor_call(frag, node, allocated)?;
        let load_comp = self.build_load_local_by_id(frag, node.allocated_object_var);
        Ok(self.bind(frag, load_comp))
    }
}
