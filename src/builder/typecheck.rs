//! Assignability checks, type tests and instantiator plumbing.
//!
//! Checked mode inserts `AssertAssignable` wherever a value flows into a
//! typed location, unless static analysis proves the check redundant.
//! Testing against an uninstantiated type additionally needs the
//! instantiator (the receiver, or null inside a factory) and its
//! type-argument vector at run time.

use text_size::TextSize;

use crate::ast::{ComparisonKind, ComparisonNode};
use crate::builder::fragment::Fragment;
use crate::builder::FlowGraphBuilder;
use crate::error::BuildResult;
use crate::ir::{Computation, InstructionKind, Value};
use crate::runtime::Symbol;
use crate::types::{AbstractType, Literal, TypeArguments};

impl<'a> FlowGraphBuilder<'a> {
    /// Best known compile-time type of a value; `Dynamic` when nothing is
    /// known.
    pub(crate) fn static_type_of(&self, value: &Value) -> AbstractType {
        let store = self.store;
        match value {
            Value::Constant(literal) => literal.static_type(store),
            Value::Use(id) => match self.graph.kind(*id) {
                InstructionKind::Bind { comp, .. } => match comp {
                    Computation::Constant { literal } => literal.static_type(store),
                    Computation::LoadLocal { local, .. } => local.ty.clone(),
                    Computation::AssertAssignable { dst_type, .. } => dst_type.clone(),
                    Computation::AssertBoolean { .. }
                    | Computation::BooleanNegate { .. }
                    | Computation::StrictCompare { .. }
                    | Computation::EqualityCompare { .. }
                    | Computation::RelationalOp { .. }
                    | Computation::InstanceOf { .. } => AbstractType::class(store.bool_class),
                    _ => AbstractType::Dynamic,
                },
                _ => AbstractType::Dynamic,
            },
        }
    }

    /// Whether an assignability check of `value` against `dst_type` can be
    /// omitted. `None` stands for a value nothing is known about, such as
    /// an incoming parameter.
    pub(crate) fn can_skip_type_check(
        &self,
        value: Option<&Value>,
        dst_type: &AbstractType,
    ) -> bool {
        let store = self.store;
        assert!(dst_type.is_finalized());
        if !self.options.eliminate_type_checks {
            return false;
        }

        // Everything is assignable to Dynamic and Object.
        if !dst_type.is_malformed()
            && (dst_type.is_dynamic_type() || dst_type.is_object_type(store))
        {
            return true;
        }

        // Only null reaches a void location and the front end already
        // guarantees it.
        if dst_type.is_void_type() {
            return true;
        }

        let value = match value {
            Some(value) => value,
            None => return false,
        };

        let static_type = self.static_type_of(value);
        assert!(!static_type.is_malformed());

        // A void-typed value must be null, which the runtime test verifies.
        if static_type.is_void_type() {
            return false;
        }

        // Null is assignable everywhere.
        if static_type.is_null_type(store) {
            return true;
        }

        // Subtyping is not transitive, "more specific than" is.
        static_type.is_more_specific_than(dst_type, store)
    }

    pub(crate) fn build_assert_assignable(
        &mut self,
        frag: &mut Fragment,
        token_pos: TextSize,
        value: Value,
        dst_type: AbstractType,
        dst_name: Symbol,
    ) -> BuildResult<Computation> {
        let (instantiator, instantiator_type_arguments) = if dst_type.is_instantiated() {
            (self.build_null_value(frag), self.build_null_value(frag))
        } else {
            self.build_typecheck_arguments(frag, token_pos)?
        };
        Ok(Computation::AssertAssignable {
            token_pos,
            try_index: self.try_index,
            value,
            instantiator,
            instantiator_type_arguments,
            dst_type,
            dst_name,
        })
    }

    /// Used for type casts and checked assignments: returns the value
    /// unchanged when the check is statically redundant.
    pub(crate) fn build_assignable_value(
        &mut self,
        frag: &mut Fragment,
        token_pos: TextSize,
        value: Value,
        dst_type: AbstractType,
        dst_name: Symbol,
    ) -> BuildResult<Value> {
        if self.can_skip_type_check(Some(&value), &dst_type) {
            return Ok(value);
        }
        let assert = self.build_assert_assignable(frag, token_pos, value, dst_type, dst_name)?;
        Ok(self.bind(frag, assert))
    }

    /// Materialize the instantiator and its type-argument vector for a
    /// check against an uninstantiated type.
    pub(crate) fn build_typecheck_arguments(
        &mut self,
        frag: &mut Fragment,
        token_pos: TextSize,
    ) -> BuildResult<(Value, Value)> {
        let store = self.store;
        let instantiator_class = self
            .function()
            .owner
            .expect("uninstantiated type outside a class");
        assert!(store.class(instantiator_class).num_type_parameters > 0);
        match self.build_instantiator(frag)? {
            None => {
                // No instantiator inside a factory.
                let instantiator = self.build_null_value(frag);
                let type_arguments =
                    self.build_instantiator_type_arguments(frag, token_pos, None)?;
                Ok((instantiator, type_arguments))
            }
            Some(instantiator) => {
                // Preserve the instantiator across the second evaluation.
                let expression_temp = self
                    .parsed
                    .expression_temp_var
                    .expect("expression temp required to preserve the instantiator");
                let store_comp = self.build_store_local_by_id(frag, expression_temp, instantiator);
                let instantiator = self.bind(frag, store_comp);
                let load_comp = self.build_load_local_by_id(frag, expression_temp);
                let loaded = self.bind(frag, load_comp);
                let type_arguments =
                    self.build_instantiator_type_arguments(frag, token_pos, Some(loaded))?;
                Ok((instantiator, type_arguments))
            }
        }
    }

    /// The instantiator is the receiver of the enclosing method; none
    /// exists inside a factory or when the owning class is not generic.
    pub(crate) fn build_instantiator(&mut self, frag: &mut Fragment) -> BuildResult<Option<Value>> {
        let store = self.store;
        let parsed = self.parsed;
        let owner_is_generic = matches!(
            self.function().owner,
            Some(class) if store.class(class).num_type_parameters > 0
        );
        if !owner_is_generic {
            return Ok(None);
        }
        let mut outer = self.function();
        while outer.is_local_function() {
            outer = store.function(outer.parent_function.expect("local function has a parent"));
        }
        if outer.is_factory() {
            return Ok(None);
        }
        let node = parsed
            .instantiator
            .as_deref()
            .expect("instantiator expression missing");
        let value = self.build_for_value(frag, node)?;
        Ok(Some(value))
    }

    /// The type-argument vector of the instantiator: a constant for
    /// non-generic owners, the factory's first parameter inside a factory,
    /// or a VM field load off the receiver otherwise.
    pub(crate) fn build_instantiator_type_arguments(
        &mut self,
        frag: &mut Fragment,
        _token_pos: TextSize,
        instantiator: Option<Value>,
    ) -> BuildResult<Value> {
        let store = self.store;
        let parsed = self.parsed;
        let instantiator_class = self
            .function()
            .owner
            .expect("instantiator type arguments outside a class");
        if store.class(instantiator_class).num_type_parameters == 0 {
            // The vector is a compile-time constant.
            return Ok(self.bind(
                frag,
                Computation::Constant {
                    literal: Literal::Null,
                },
            ));
        }
        let mut outer = self.function();
        while outer.is_local_function() {
            outer = store.function(outer.parent_function.expect("local function has a parent"));
        }
        if outer.is_factory() {
            // The first parameter of a factory is already a type-argument
            // vector.
            assert!(instantiator.is_none());
            let node = parsed
                .instantiator
                .as_deref()
                .expect("instantiator expression missing");
            return self.build_for_value(frag, node);
        }
        let instantiator = match instantiator {
            Some(value) => value,
            None => self
                .build_instantiator(frag)?
                .expect("generic instance method has an instantiator"),
        };
        let offset = store
            .class(instantiator_class)
            .type_arguments_field_offset
            .expect("generic class stores its type arguments");
        Ok(self.bind(
            frag,
            Computation::LoadVmField {
                object: instantiator,
                offset_in_bytes: offset,
                ty: None,
            },
        ))
    }

    /// A type-argument vector as a value: constant when instantiated,
    /// instantiated against the receiver's vector otherwise.
    pub(crate) fn build_instantiated_type_arguments(
        &mut self,
        frag: &mut Fragment,
        token_pos: TextSize,
        type_arguments: &Option<TypeArguments>,
    ) -> BuildResult<Value> {
        match type_arguments {
            None => Ok(self.bind(
                frag,
                Computation::Constant {
                    literal: Literal::Null,
                },
            )),
            Some(args) if args.is_instantiated() => Ok(self.bind(
                frag,
                Computation::Constant {
                    literal: Literal::TypeArgs(args.clone()),
                },
            )),
            Some(args) => {
                let instantiator =
                    self.build_instantiator_type_arguments(frag, token_pos, None)?;
                Ok(self.bind(
                    frag,
                    Computation::InstantiateTypeArguments {
                        token_pos,
                        try_index: self.try_index,
                        type_arguments: args.clone(),
                        instantiator,
                    },
                ))
            }
        }
    }

    /// `is` / `is!` in effect position: only the operand's side effects
    /// remain.
    pub(crate) fn build_type_test_for_effect(
        &mut self,
        frag: &mut Fragment,
        node: &ComparisonNode,
    ) -> BuildResult<()> {
        assert!(node.kind.is_type_test());
        self.build_for_effect(frag, &node.left)
    }

    /// `is` / `is!` in value position, specialized at build time where the
    /// outcome is static.
    pub(crate) fn build_type_test_for_value(
        &mut self,
        frag: &mut Fragment,
        node: &ComparisonNode,
    ) -> BuildResult<Value> {
        assert!(node.kind.is_type_test());
        let store = self.store;
        let ty = node.right.as_type().expect("type test against a type").clone();
        assert!(ty.is_finalized() && !ty.is_malformed());
        let negate = node.kind == ComparisonKind::IsNot;

        // Every object is an instance of T when Object <: T.
        let object_type = AbstractType::class(store.object_class);
        if ty.is_instantiated() && object_type.is_subtype_of(&ty, store) {
            self.build_for_effect(frag, &node.left)?;
            return Ok(self.bind(
                frag,
                Computation::Constant {
                    literal: Literal::Bool(!negate),
                },
            ));
        }

        // A literal operand against an instantiated type folds at build
        // time. Null is an instance only of Object and Dynamic, which the
        // case above already answered.
        if let Some(literal) = node.left.as_literal() {
            if ty.is_instantiated() {
                let result = if matches!(literal, Literal::Null) {
                    negate
                } else if literal.is_instance_of(&ty, store) {
                    !negate
                } else {
                    negate
                };
                return Ok(self.bind(
                    frag,
                    Computation::Constant {
                        literal: Literal::Bool(result),
                    },
                ));
            }
        }

        let value = self.build_for_value(frag, &node.left)?;
        let (instantiator, instantiator_type_arguments) = if ty.is_instantiated() {
            (self.build_null_value(frag), self.build_null_value(frag))
        } else {
            self.build_typecheck_arguments(frag, node.token_pos)?
        };
        Ok(self.bind(
            frag,
            Computation::InstanceOf {
                token_pos: node.token_pos,
                try_index: self.try_index,
                value,
                instantiator,
                instantiator_type_arguments,
                ty,
                negate,
            },
        ))
    }

    /// `as` in effect position: the assert is kept only when it can fail.
    pub(crate) fn build_type_cast_for_effect(
        &mut self,
        frag: &mut Fragment,
        node: &ComparisonNode,
    ) -> BuildResult<()> {
        assert!(node.kind.is_type_cast());
        let ty = node.right.as_type().expect("type cast against a type").clone();
        assert!(ty.is_finalized());
        let value = self.build_for_value(frag, &node.left)?;
        let dst_name = self.store.symbols.intern("type cast");
        if !self.can_skip_type_check(Some(&value), &ty) {
            let assert = self.build_assert_assignable(frag, node.token_pos, value, ty, dst_name)?;
            self.perform(frag, assert);
        }
        Ok(())
    }

    /// `as` in value position.
    pub(crate) fn build_type_cast_for_value(
        &mut self,
        frag: &mut Fragment,
        node: &ComparisonNode,
    ) -> BuildResult<Value> {
        assert!(node.kind.is_type_cast());
        let ty = node.right.as_type().expect("type cast against a type").clone();
        assert!(ty.is_finalized());
        let value = self.build_for_value(frag, &node.left)?;
        let dst_name = self.store.symbols.intern("type cast");
        self.build_assignable_value(frag, node.token_pos, value, ty, dst_name)
    }
}
