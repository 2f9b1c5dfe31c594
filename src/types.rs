//! The abstract type surface the builder queries.
//!
//! The semantic analyzer finalizes every type before the builder runs, so
//! queries here are pure lookups: no unification, no inference. Subtyping
//! is nominal over the single-inheritance chain recorded in the
//! [`ObjectStore`](crate::runtime::ObjectStore).

use crate::runtime::{ClassId, ObjectStore, Symbol};

/// A (possibly uninstantiated) type-argument vector.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeArguments {
    pub types: Vec<AbstractType>,
}

impl TypeArguments {
    pub fn new(types: Vec<AbstractType>) -> Self {
        TypeArguments { types }
    }

    /// Instantiated iff no type parameter occurs anywhere in the vector.
    pub fn is_instantiated(&self) -> bool {
        self.types.iter().all(AbstractType::is_instantiated)
    }

    /// Whether every argument provably satisfies the declared bound of the
    /// corresponding type parameter of `class`.
    pub fn is_within_bounds_of(&self, class: ClassId, store: &ObjectStore) -> bool {
        let bounds = &store.class(class).type_parameter_bounds;
        self.types.iter().enumerate().all(|(i, arg)| {
            match bounds.get(i) {
                None => true,
                Some(bound) if bound.is_dynamic_type() || bound.is_object_type(store) => true,
                Some(bound) => arg.is_more_specific_than(bound, store),
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AbstractType {
    Dynamic,
    Void,
    Class {
        class: ClassId,
        type_arguments: Option<TypeArguments>,
    },
    /// A reference to a type parameter of the enclosing class; never
    /// instantiated.
    Parameter { name: Symbol },
    /// A type the analyzer flagged as malformed; checks against it cannot
    /// be eliminated.
    Malformed,
}

impl AbstractType {
    /// A non-generic class type.
    pub fn class(class: ClassId) -> Self {
        AbstractType::Class {
            class,
            type_arguments: None,
        }
    }

    /// Types are finalized upstream; the builder never sees an unfinalized
    /// one.
    pub fn is_finalized(&self) -> bool {
        true
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, AbstractType::Malformed)
    }

    pub fn is_dynamic_type(&self) -> bool {
        matches!(self, AbstractType::Dynamic)
    }

    pub fn is_void_type(&self) -> bool {
        matches!(self, AbstractType::Void)
    }

    pub fn is_object_type(&self, store: &ObjectStore) -> bool {
        match self {
            AbstractType::Class { class, .. } => *class == store.object_class,
            _ => false,
        }
    }

    pub fn is_null_type(&self, store: &ObjectStore) -> bool {
        match self {
            AbstractType::Class { class, .. } => *class == store.null_class,
            _ => false,
        }
    }

    pub fn is_instantiated(&self) -> bool {
        match self {
            AbstractType::Parameter { .. } => false,
            AbstractType::Class { type_arguments, .. } => type_arguments
                .as_ref()
                .map(TypeArguments::is_instantiated)
                .unwrap_or(true),
            _ => true,
        }
    }

    /// The transitive "more specific than" relation used to eliminate type
    /// checks: a run-time value of a type more specific than `other` is
    /// guaranteed to be a subtype of `other`.
    pub fn is_more_specific_than(&self, other: &AbstractType, store: &ObjectStore) -> bool {
        if self == other {
            return true;
        }
        if other.is_dynamic_type() || other.is_object_type(store) {
            return true;
        }
        if !self.is_instantiated() || !other.is_instantiated() {
            return false;
        }
        self.is_subtype_of(other, store)
    }

    pub fn is_subtype_of(&self, other: &AbstractType, store: &ObjectStore) -> bool {
        if other.is_dynamic_type() || other.is_object_type(store) {
            return true;
        }
        match (self, other) {
            (AbstractType::Malformed, _) | (_, AbstractType::Malformed) => false,
            (AbstractType::Void, AbstractType::Void) => true,
            (AbstractType::Void, _) | (_, AbstractType::Void) => false,
            (AbstractType::Dynamic, _) => false,
            (AbstractType::Parameter { name: a }, AbstractType::Parameter { name: b }) => a == b,
            (AbstractType::Parameter { .. }, _) | (_, AbstractType::Parameter { .. }) => false,
            (
                AbstractType::Class {
                    class: sub,
                    type_arguments: sub_args,
                },
                AbstractType::Class {
                    class: sup,
                    type_arguments: sup_args,
                },
            ) => {
                if *sub == store.null_class {
                    return true;
                }
                let mut current = Some(*sub);
                while let Some(class) = current {
                    if class == *sup {
                        return sup_args.is_none() || sub_args == sup_args;
                    }
                    current = store.class(class).super_class;
                }
                false
            }
            (AbstractType::Class { .. }, AbstractType::Dynamic) => true,
        }
    }
}

/// A compile-time constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    TypeArgs(TypeArguments),
}

impl Literal {
    pub fn class_of(&self, store: &ObjectStore) -> ClassId {
        match self {
            Literal::Null => store.null_class,
            Literal::Bool(_) => store.bool_class,
            Literal::Int(_) => store.smi_class,
            Literal::Double(_) => store.double_class,
            Literal::Str(_) => store.string_class,
            Literal::TypeArgs(_) => store.type_arguments_class,
        }
    }

    pub fn static_type(&self, store: &ObjectStore) -> AbstractType {
        AbstractType::class(self.class_of(store))
    }

    /// Evaluate an instance-of test against an instantiated type at build
    /// time. The null literal is special-cased by the caller.
    pub fn is_instance_of(&self, ty: &AbstractType, store: &ObjectStore) -> bool {
        self.static_type(store).is_subtype_of(ty, store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instantiated() {
        let store = ObjectStore::new();
        let t = store.symbols.intern("T");
        assert!(AbstractType::Dynamic.is_instantiated());
        assert!(AbstractType::class(store.smi_class).is_instantiated());
        assert!(!AbstractType::Parameter { name: t }.is_instantiated());

        let generic = AbstractType::Class {
            class: store.array_class,
            type_arguments: Some(TypeArguments::new(vec![AbstractType::Parameter { name: t }])),
        };
        assert!(!generic.is_instantiated());
    }

    #[test]
    fn test_subtype_chain() {
        let store = ObjectStore::new();
        let int_type = AbstractType::class(store.smi_class);
        let object_type = AbstractType::class(store.object_class);
        let bool_type = AbstractType::class(store.bool_class);

        assert!(int_type.is_subtype_of(&object_type, &store));
        assert!(int_type.is_subtype_of(&AbstractType::Dynamic, &store));
        assert!(!int_type.is_subtype_of(&bool_type, &store));
        assert!(!object_type.is_subtype_of(&int_type, &store));
    }

    #[test]
    fn test_null_is_bottom() {
        let store = ObjectStore::new();
        let null_type = AbstractType::class(store.null_class);
        assert!(null_type.is_subtype_of(&AbstractType::class(store.smi_class), &store));
    }

    #[test]
    fn test_more_specific_requires_instantiation() {
        let store = ObjectStore::new();
        let t = store.symbols.intern("T");
        let param = AbstractType::Parameter { name: t };
        let int_type = AbstractType::class(store.smi_class);

        assert!(param.is_more_specific_than(&AbstractType::Dynamic, &store));
        assert!(!param.is_more_specific_than(&int_type, &store));
        assert!(int_type.is_more_specific_than(&AbstractType::class(store.object_class), &store));
    }

    #[test]
    fn test_literal_instance_of() {
        let store = ObjectStore::new();
        assert!(Literal::Int(3).is_instance_of(&AbstractType::class(store.smi_class), &store));
        assert!(!Literal::Int(3).is_instance_of(&AbstractType::class(store.bool_class), &store));
    }
}
