//! Scopes, local variables and jump labels resolved by the semantic
//! analyzer.
//!
//! Scopes form a tree addressed by [`ScopeId`]; variables and labels are
//! owned by the tree and referenced from AST nodes by id, which keeps the
//! input model free of reference cycles.

use text_size::TextSize;

use crate::runtime::Symbol;
use crate::types::AbstractType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(pub u32);

#[derive(Debug, Clone)]
pub struct LocalScope {
    pub parent: Option<ScopeId>,
    /// Static context level of code running in this scope; a scope that
    /// captures variables allocates a context one level above its parent's.
    pub context_level: usize,
    /// Number of captured variables this scope's context holds; zero when
    /// the scope allocates no context.
    pub num_context_variables: usize,
    /// Declared variables in declaration order. For a function's root
    /// scope the parameters come first.
    pub variables: Vec<VarId>,
}

#[derive(Debug, Clone)]
pub struct LocalVariable {
    pub name: Symbol,
    /// Frame bit index for un-captured variables (parameters occupy
    /// `[0, num_params)`, stack locals follow), context slot for captured
    /// ones.
    pub index: usize,
    pub ty: AbstractType,
    pub is_captured: bool,
    pub owner: ScopeId,
    pub token_pos: TextSize,
}

impl LocalVariable {
    /// Position of this variable in block-local assigned-variable sets and
    /// SSA environments. Only meaningful for frame-resident variables.
    pub fn bit_index(&self) -> usize {
        debug_assert!(!self.is_captured);
        self.index
    }
}

/// A break/continue target attached to a loop, switch or labeled statement.
#[derive(Debug, Clone)]
pub struct SourceLabel {
    pub name: Symbol,
    pub owner: ScopeId,
    /// Set on case labels that are the target of a labeled continue.
    pub is_continue_target: bool,
}

#[derive(Debug, Default)]
pub struct ScopeTree {
    scopes: Vec<LocalScope>,
    variables: Vec<LocalVariable>,
    labels: Vec<SourceLabel>,
}

impl ScopeTree {
    pub fn new() -> Self {
        ScopeTree::default()
    }

    pub fn add_scope(
        &mut self,
        parent: Option<ScopeId>,
        context_level: usize,
        num_context_variables: usize,
    ) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(LocalScope {
            parent,
            context_level,
            num_context_variables,
            variables: Vec::new(),
        });
        id
    }

    pub fn scope(&self, id: ScopeId) -> &LocalScope {
        &self.scopes[id.0 as usize]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut LocalScope {
        &mut self.scopes[id.0 as usize]
    }

    pub fn add_variable(&mut self, variable: LocalVariable) -> VarId {
        let owner = variable.owner;
        let id = VarId(self.variables.len() as u32);
        self.variables.push(variable);
        self.scopes[owner.0 as usize].variables.push(id);
        id
    }

    pub fn variable(&self, id: VarId) -> &LocalVariable {
        &self.variables[id.0 as usize]
    }

    pub fn variable_mut(&mut self, id: VarId) -> &mut LocalVariable {
        &mut self.variables[id.0 as usize]
    }

    /// The `pos`-th declared variable of `scope`.
    pub fn variable_at(&self, scope: ScopeId, pos: usize) -> VarId {
        self.scope(scope).variables[pos]
    }

    pub fn add_label(&mut self, label: SourceLabel) -> LabelId {
        let id = LabelId(self.labels.len() as u32);
        self.labels.push(label);
        id
    }

    pub fn label(&self, id: LabelId) -> &SourceLabel {
        &self.labels[id.0 as usize]
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// Context level of the scope a variable lives in.
    pub fn context_level_of(&self, id: VarId) -> usize {
        self.scope(self.variable(id).owner).context_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::SymbolTable;

    #[test]
    fn test_scope_tree_wiring() {
        let symbols = SymbolTable::new();
        let mut scopes = ScopeTree::new();
        let root = scopes.add_scope(None, 0, 0);
        let inner = scopes.add_scope(Some(root), 1, 2);

        let x = scopes.add_variable(LocalVariable {
            name: symbols.intern("x"),
            index: 0,
            ty: AbstractType::Dynamic,
            is_captured: true,
            owner: inner,
            token_pos: TextSize::from(0),
        });

        assert_eq!(scopes.scope(inner).parent, Some(root));
        assert_eq!(scopes.variable_at(inner, 0), x);
        assert_eq!(scopes.context_level_of(x), 1);
    }
}
