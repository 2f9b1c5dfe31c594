//! Captured-variable access and context-chain management.
//!
//! A captured local lives in a heap context object. Reaching it takes the
//! current context plus `(current_level - owner_level)` parent hops, then
//! a VM field access at the variable's slot offset. Un-captured locals
//! stay plain frame accesses and are eliminated during SSA renaming.

use crate::ast::scope::{LocalVariable, VarId};
use crate::builder::fragment::Fragment;
use crate::builder::FlowGraphBuilder;
use crate::ir::{Computation, Value};
use crate::runtime::Context;

impl<'a> FlowGraphBuilder<'a> {
    /// Walk the context chain down to the level the variable lives at.
    fn build_context_access(&mut self, frag: &mut Fragment, local: &LocalVariable) -> Value {
        let owner_level = self.parsed.scopes.scope(local.owner).context_level;
        assert!(self.context_level >= owner_level, "variable above current context");
        let delta = self.context_level - owner_level;
        let mut context = self.bind(frag, Computation::CurrentContext);
        for _ in 0..delta {
            context = self.bind(
                frag,
                Computation::LoadVmField {
                    object: context,
                    offset_in_bytes: Context::parent_offset(),
                    ty: None,
                },
            );
        }
        context
    }

    pub(crate) fn build_load_local(
        &mut self,
        frag: &mut Fragment,
        local: &LocalVariable,
    ) -> Computation {
        if local.is_captured {
            let context = self.build_context_access(frag, local);
            Computation::LoadVmField {
                object: context,
                offset_in_bytes: Context::variable_offset(local.index),
                ty: Some(local.ty.clone()),
            }
        } else {
            Computation::LoadLocal {
                local: local.clone(),
                context_level: self.context_level,
            }
        }
    }

    pub(crate) fn build_store_local(
        &mut self,
        frag: &mut Fragment,
        local: &LocalVariable,
        value: Value,
    ) -> Computation {
        if local.is_captured {
            let context = self.build_context_access(frag, local);
            Computation::StoreVmField {
                object: context,
                offset_in_bytes: Context::variable_offset(local.index),
                value,
                ty: Some(local.ty.clone()),
            }
        } else {
            Computation::StoreLocal {
                local: local.clone(),
                value,
                context_level: self.context_level,
            }
        }
    }

    pub(crate) fn build_load_local_by_id(&mut self, frag: &mut Fragment, var: VarId) -> Computation {
        let parsed = self.parsed;
        let local = parsed.scopes.variable(var);
        self.build_load_local(frag, local)
    }

    pub(crate) fn build_store_local_by_id(
        &mut self,
        frag: &mut Fragment,
        var: VarId,
        value: Value,
    ) -> Computation {
        let parsed = self.parsed;
        let local = parsed.scopes.variable(var);
        self.build_store_local(frag, local, value)
    }

    /// Store the current context into `variable`.
    pub(crate) fn build_store_context(&mut self, frag: &mut Fragment, variable: VarId) {
        let context = self.bind(frag, Computation::CurrentContext);
        let store = self.build_store_local_by_id(frag, variable, context);
        self.perform(frag, store);
    }

    /// Reinstall the context saved in `variable` as the current context.
    pub(crate) fn build_load_context(&mut self, frag: &mut Fragment, variable: VarId) {
        let load = self.build_load_local_by_id(frag, variable);
        let saved = self.bind(frag, load);
        self.perform(frag, Computation::StoreContext { value: saved });
    }

    /// Pop one level off the context chain.
    pub(crate) fn unchain_context(&mut self, frag: &mut Fragment) {
        let context = self.bind(frag, Computation::CurrentContext);
        let parent = self.bind(
            frag,
            Computation::LoadVmField {
                object: context,
                offset_in_bytes: Context::parent_offset(),
                ty: None,
            },
        );
        self.perform(frag, Computation::StoreContext { value: parent });
    }
}
