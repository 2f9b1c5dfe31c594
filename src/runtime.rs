//! Runtime object model: interned symbols, classes, fields, functions and
//! the VM context layout.
//!
//! The builder never inspects real heap objects; everything it needs from
//! the runtime is answered here: symbol interning and accessor-name
//! mangling, class metadata (type parameters, the field offset of the
//! type-argument vector), static function lookup, and the fixed layout of
//! context objects.

use std::cell::RefCell;

use indexmap::{IndexMap, IndexSet};

use crate::types::AbstractType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub u32);

/// Interned string table. Interning is idempotent and iteration order is
/// insertion order, so symbol numbering is deterministic for a fixed input.
#[derive(Debug, Default)]
pub struct SymbolTable {
    names: RefCell<IndexSet<String>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn intern(&self, name: &str) -> Symbol {
        let mut names = self.names.borrow_mut();
        if let Some(index) = names.get_index_of(name) {
            return Symbol(index as u32);
        }
        let (index, _) = names.insert_full(name.to_string());
        Symbol(index as u32)
    }

    pub fn name(&self, symbol: Symbol) -> String {
        self.names
            .borrow()
            .get_index(symbol.0 as usize)
            .expect("unknown symbol")
            .clone()
    }

    /// Mangled selector of the implicit getter for `field`.
    pub fn getter_name(&self, field: Symbol) -> Symbol {
        let name = format!("get:{}", self.name(field));
        self.intern(&name)
    }

    /// Mangled selector of the implicit setter for `field`.
    pub fn setter_name(&self, field: Symbol) -> Symbol {
        let name = format!("set:{}", self.name(field));
        self.intern(&name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Regular,
    Closure,
    ImplicitGetter,
    ConstImplicitGetter,
    Constructor,
    Factory,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: Symbol,
    pub kind: FunctionKind,
    pub is_static: bool,
    pub owner: Option<ClassId>,
    pub result_type: AbstractType,
    /// Fixed (positional, non-optional) parameters.
    pub num_fixed_parameters: usize,
    /// All parameters, fixed and optional.
    pub num_params: usize,
    /// Set for local functions nested inside another function.
    pub parent_function: Option<FunctionId>,
    /// Signature class of a closure function; generic signature classes
    /// require instantiator type arguments at closure creation.
    pub signature_class: Option<ClassId>,
}

impl Function {
    pub fn is_constructor(&self) -> bool {
        self.kind == FunctionKind::Constructor
    }

    pub fn is_factory(&self) -> bool {
        self.kind == FunctionKind::Factory
    }

    pub fn is_implicit_getter(&self) -> bool {
        matches!(
            self.kind,
            FunctionKind::ImplicitGetter | FunctionKind::ConstImplicitGetter
        )
    }

    pub fn is_local_function(&self) -> bool {
        self.parent_function.is_some()
    }

    /// An instance method dispatched on a receiver.
    pub fn is_dynamic_function(&self) -> bool {
        !self.is_static
            && matches!(
                self.kind,
                FunctionKind::Regular
                    | FunctionKind::ImplicitGetter
                    | FunctionKind::ConstImplicitGetter
            )
    }
}

#[derive(Debug, Clone)]
pub struct Class {
    pub name: Symbol,
    pub super_class: Option<ClassId>,
    pub num_type_parameters: usize,
    /// Byte offset of the instance field holding the type-argument vector,
    /// present on instantiated generic classes.
    pub type_arguments_field_offset: Option<u32>,
    /// Declared bounds of the type parameters; an empty vector means all
    /// bounds are unconstrained.
    pub type_parameter_bounds: Vec<AbstractType>,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: Symbol,
    pub owner: ClassId,
    pub ty: AbstractType,
    pub is_static: bool,
}

/// Registry of every class, field and function the compiled function can
/// refer to, plus the core classes literals belong to.
#[derive(Debug)]
pub struct ObjectStore {
    pub symbols: SymbolTable,
    classes: Vec<Class>,
    functions: Vec<Function>,
    fields: Vec<Field>,
    static_functions: IndexMap<(ClassId, Symbol), FunctionId>,
    pub object_class: ClassId,
    pub null_class: ClassId,
    pub bool_class: ClassId,
    pub smi_class: ClassId,
    pub double_class: ClassId,
    pub string_class: ClassId,
    pub array_class: ClassId,
    pub function_class: ClassId,
    pub type_arguments_class: ClassId,
}

impl ObjectStore {
    pub fn new() -> Self {
        let symbols = SymbolTable::new();
        let mut store = ObjectStore {
            symbols,
            classes: Vec::new(),
            functions: Vec::new(),
            fields: Vec::new(),
            static_functions: IndexMap::new(),
            object_class: ClassId(0),
            null_class: ClassId(0),
            bool_class: ClassId(0),
            smi_class: ClassId(0),
            double_class: ClassId(0),
            string_class: ClassId(0),
            array_class: ClassId(0),
            function_class: ClassId(0),
            type_arguments_class: ClassId(0),
        };
        store.object_class = store.add_core_class("Object", None, 0, None);
        let object = store.object_class;
        store.null_class = store.add_core_class("Null", Some(object), 0, None);
        store.bool_class = store.add_core_class("bool", Some(object), 0, None);
        store.smi_class = store.add_core_class("int", Some(object), 0, None);
        store.double_class = store.add_core_class("double", Some(object), 0, None);
        store.string_class = store.add_core_class("String", Some(object), 0, None);
        store.array_class = store.add_core_class("Array", Some(object), 1, Some(8));
        store.function_class = store.add_core_class("Function", Some(object), 0, None);
        store.type_arguments_class =
            store.add_core_class("TypeArguments", Some(object), 0, None);
        store
    }

    fn add_core_class(
        &mut self,
        name: &str,
        super_class: Option<ClassId>,
        num_type_parameters: usize,
        type_arguments_field_offset: Option<u32>,
    ) -> ClassId {
        let name = self.symbols.intern(name);
        self.add_class(Class {
            name,
            super_class,
            num_type_parameters,
            type_arguments_field_offset,
            type_parameter_bounds: Vec::new(),
        })
    }

    pub fn add_class(&mut self, class: Class) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(class);
        id
    }

    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.0 as usize]
    }

    pub fn add_function(&mut self, function: Function) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(function);
        id
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.0 as usize]
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut Function {
        &mut self.functions[id.0 as usize]
    }

    pub fn add_field(&mut self, field: Field) -> FieldId {
        let id = FieldId(self.fields.len() as u32);
        self.fields.push(field);
        id
    }

    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id.0 as usize]
    }

    pub fn register_static_function(
        &mut self,
        class: ClassId,
        name: Symbol,
        function: FunctionId,
    ) {
        self.static_functions.insert((class, name), function);
    }

    pub fn lookup_static_function(&self, class: ClassId, name: Symbol) -> Option<FunctionId> {
        self.static_functions.get(&(class, name)).copied()
    }
}

impl Default for ObjectStore {
    fn default() -> Self {
        ObjectStore::new()
    }
}

/// Fixed layout of a heap context object: header word, parent pointer,
/// variable count, then the captured variable slots.
pub struct Context;

impl Context {
    pub const WORD_SIZE: u32 = 8;

    pub fn parent_offset() -> u32 {
        Context::WORD_SIZE
    }

    pub fn variable_offset(index: usize) -> u32 {
        2 * Context::WORD_SIZE + (index as u32) * Context::WORD_SIZE
    }
}

/// Constructor phase marker: run both the initializer list and the body.
pub const CTOR_PHASE_ALL: i64 = 3;

/// Sentinel passed in place of an instantiator when none is required.
pub const NO_INSTANTIATOR: i64 = 0;
