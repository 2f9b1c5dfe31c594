//! Instruction, computation and value taxonomy.
//!
//! Instructions live in the graph's arena and reference each other by
//! [`InstrId`]; a `Value` is either a constant or a use edge naming the
//! defining instruction. Side effects are explicit: a computation becomes
//! an instruction through the `Bind` wrapper (produces a value on the
//! expression stack) or the `Do` wrapper (effect only).

use smallvec::SmallVec;
use text_size::TextSize;

use crate::ast::scope::LocalVariable;
use crate::runtime::{ClassId, FieldId, FunctionId, Symbol};
use crate::types::{AbstractType, Literal, TypeArguments};

/// Index of an instruction in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstrId(pub u32);

/// Index of a try block; catch entries and call-like computations carry
/// the innermost enclosing one, `None` meaning "not inside a try".
pub type TryIndex = u16;

/// An operand: a constant or a use of a definition. Every stored `Value`
/// is a distinct node so use edges stay one-to-one; constants may be
/// cloned freely.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Constant(Literal),
    Use(InstrId),
}

impl Value {
    pub fn is_use(&self) -> bool {
        matches!(self, Value::Use(_))
    }

    pub fn as_use(&self) -> Option<InstrId> {
        match self {
            Value::Use(id) => Some(*id),
            Value::Constant(_) => None,
        }
    }
}

/// A snapshot of the renaming environment attached to instructions for
/// later deoptimization, and installed as the start environment of the
/// graph entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    pub values: Vec<Value>,
}

impl Environment {
    pub fn new(values: Vec<Value>) -> Self {
        Environment { values }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrictCompareKind {
    EqStrict,
    NeStrict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationalOpKind {
    Lt,
    Gt,
    LtEq,
    GtEq,
}

impl RelationalOpKind {
    pub fn selector(&self) -> &'static str {
        match self {
            RelationalOpKind::Lt => "<",
            RelationalOpKind::Gt => ">",
            RelationalOpKind::LtEq => "<=",
            RelationalOpKind::GtEq => ">=",
        }
    }
}

/// A pure-ish expression kind; wrapped by `Bind` or `Do` to become an
/// instruction.
#[derive(Debug, Clone)]
pub enum Computation {
    Constant {
        literal: Literal,
    },
    LoadLocal {
        local: LocalVariable,
        context_level: usize,
    },
    StoreLocal {
        local: LocalVariable,
        value: Value,
        context_level: usize,
    },
    LoadVmField {
        object: Value,
        offset_in_bytes: u32,
        ty: Option<AbstractType>,
    },
    StoreVmField {
        object: Value,
        offset_in_bytes: u32,
        value: Value,
        ty: Option<AbstractType>,
    },
    CurrentContext,
    StoreContext {
        value: Value,
    },
    ChainContext {
        context: Value,
    },
    CloneContext {
        token_pos: TextSize,
        try_index: Option<TryIndex>,
        context: Value,
    },
    AllocateContext {
        token_pos: TextSize,
        try_index: Option<TryIndex>,
        num_context_variables: usize,
    },
    AllocateObject {
        token_pos: TextSize,
        try_index: Option<TryIndex>,
        class: ClassId,
        arguments: Vec<Value>,
    },
    AllocateObjectWithBoundsCheck {
        token_pos: TextSize,
        try_index: Option<TryIndex>,
        class: ClassId,
        type_arguments: Option<TypeArguments>,
        arguments: Vec<Value>,
    },
    CreateArray {
        token_pos: TextSize,
        try_index: Option<TryIndex>,
        elements: Vec<Value>,
        element_type: Value,
    },
    CreateClosure {
        token_pos: TextSize,
        try_index: Option<TryIndex>,
        function: FunctionId,
        type_arguments: Value,
        receiver: Value,
    },
    InstanceCall {
        token_pos: TextSize,
        try_index: Option<TryIndex>,
        name: Symbol,
        arguments: Vec<Value>,
        argument_names: Vec<Symbol>,
        checked_argument_count: usize,
    },
    StaticCall {
        token_pos: TextSize,
        try_index: Option<TryIndex>,
        function: FunctionId,
        arguments: Vec<Value>,
        argument_names: Vec<Symbol>,
    },
    ClosureCall {
        token_pos: TextSize,
        try_index: Option<TryIndex>,
        arguments: Vec<Value>,
        argument_names: Vec<Symbol>,
    },
    NativeCall {
        token_pos: TextSize,
        try_index: Option<TryIndex>,
        name: Symbol,
    },
    LoadInstanceField {
        field: FieldId,
        instance: Value,
    },
    StoreInstanceField {
        field: FieldId,
        instance: Value,
        value: Value,
    },
    LoadStaticField {
        field: FieldId,
    },
    StoreStaticField {
        field: FieldId,
        value: Value,
    },
    LoadIndexed {
        token_pos: TextSize,
        try_index: Option<TryIndex>,
        array: Value,
        index: Value,
    },
    StoreIndexed {
        token_pos: TextSize,
        try_index: Option<TryIndex>,
        array: Value,
        index: Value,
        value: Value,
    },
    InstanceSetter {
        token_pos: TextSize,
        try_index: Option<TryIndex>,
        field_name: Symbol,
        receiver: Value,
        value: Value,
    },
    StaticSetter {
        token_pos: TextSize,
        try_index: Option<TryIndex>,
        setter_function: FunctionId,
        value: Value,
    },
    StrictCompare {
        kind: StrictCompareKind,
        left: Value,
        right: Value,
    },
    EqualityCompare {
        token_pos: TextSize,
        try_index: Option<TryIndex>,
        left: Value,
        right: Value,
    },
    RelationalOp {
        token_pos: TextSize,
        try_index: Option<TryIndex>,
        kind: RelationalOpKind,
        left: Value,
        right: Value,
    },
    BooleanNegate {
        value: Value,
    },
    AssertAssignable {
        token_pos: TextSize,
        try_index: Option<TryIndex>,
        value: Value,
        instantiator: Value,
        instantiator_type_arguments: Value,
        dst_type: AbstractType,
        dst_name: Symbol,
    },
    AssertBoolean {
        token_pos: TextSize,
        try_index: Option<TryIndex>,
        value: Value,
    },
    InstanceOf {
        token_pos: TextSize,
        try_index: Option<TryIndex>,
        value: Value,
        instantiator: Value,
        instantiator_type_arguments: Value,
        ty: AbstractType,
        negate: bool,
    },
    InstantiateTypeArguments {
        token_pos: TextSize,
        try_index: Option<TryIndex>,
        type_arguments: TypeArguments,
        instantiator: Value,
    },
    ExtractConstructorTypeArguments {
        token_pos: TextSize,
        try_index: Option<TryIndex>,
        type_arguments: TypeArguments,
        instantiator: Value,
    },
    ExtractConstructorInstantiator {
        instantiator: Value,
    },
    CatchEntry {
        exception_var: LocalVariable,
        stacktrace_var: LocalVariable,
    },
    CheckStackOverflow {
        token_pos: TextSize,
        try_index: Option<TryIndex>,
    },
}

impl Computation {
    /// Number of `Value` operands; drives expression-stack accounting.
    pub fn input_count(&self) -> usize {
        self.inputs().len()
    }

    pub fn inputs(&self) -> SmallVec<[&Value; 4]> {
        use Computation::*;
        let mut inputs: SmallVec<[&Value; 4]> = SmallVec::new();
        match self {
            Constant { .. }
            | LoadLocal { .. }
            | CurrentContext
            | AllocateContext { .. }
            | NativeCall { .. }
            | LoadStaticField { .. }
            | CatchEntry { .. }
            | CheckStackOverflow { .. } => {}
            StoreLocal { value, .. }
            | StoreContext { value }
            | StoreStaticField { value, .. }
            | StaticSetter { value, .. }
            | BooleanNegate { value }
            | AssertBoolean { value, .. } => inputs.push(value),
            ChainContext { context } | CloneContext { context, .. } => inputs.push(context),
            LoadVmField { object, .. } => inputs.push(object),
            StoreVmField { object, value, .. } => {
                inputs.push(object);
                inputs.push(value);
            }
            AllocateObject { arguments, .. }
            | AllocateObjectWithBoundsCheck { arguments, .. }
            | StaticCall { arguments, .. }
            | InstanceCall { arguments, .. }
            | ClosureCall { arguments, .. } => inputs.extend(arguments.iter()),
            CreateArray {
                elements,
                element_type,
                ..
            } => {
                inputs.extend(elements.iter());
                inputs.push(element_type);
            }
            CreateClosure {
                type_arguments,
                receiver,
                ..
            } => {
                inputs.push(type_arguments);
                inputs.push(receiver);
            }
            LoadInstanceField { instance, .. } => inputs.push(instance),
            StoreInstanceField {
                instance, value, ..
            } => {
                inputs.push(instance);
                inputs.push(value);
            }
            LoadIndexed { array, index, .. } => {
                inputs.push(array);
                inputs.push(index);
            }
            StoreIndexed {
                array,
                index,
                value,
                ..
            } => {
                inputs.push(array);
                inputs.push(index);
                inputs.push(value);
            }
            InstanceSetter {
                receiver, value, ..
            } => {
                inputs.push(receiver);
                inputs.push(value);
            }
            StrictCompare { left, right, .. }
            | EqualityCompare { left, right, .. }
            | RelationalOp { left, right, .. } => {
                inputs.push(left);
                inputs.push(right);
            }
            AssertAssignable {
                value,
                instantiator,
                instantiator_type_arguments,
                ..
            }
            | InstanceOf {
                value,
                instantiator,
                instantiator_type_arguments,
                ..
            } => {
                inputs.push(value);
                inputs.push(instantiator);
                inputs.push(instantiator_type_arguments);
            }
            InstantiateTypeArguments { instantiator, .. }
            | ExtractConstructorTypeArguments { instantiator, .. }
            | ExtractConstructorInstantiator { instantiator } => inputs.push(instantiator),
        }
        inputs
    }

    pub fn inputs_mut(&mut self) -> SmallVec<[&mut Value; 4]> {
        use Computation::*;
        let mut inputs: SmallVec<[&mut Value; 4]> = SmallVec::new();
        match self {
            Constant { .. }
            | LoadLocal { .. }
            | CurrentContext
            | AllocateContext { .. }
            | NativeCall { .. }
            | LoadStaticField { .. }
            | CatchEntry { .. }
            | CheckStackOverflow { .. } => {}
            StoreLocal { value, .. }
            | StoreContext { value }
            | StoreStaticField { value, .. }
            | StaticSetter { value, .. }
            | BooleanNegate { value }
            | AssertBoolean { value, .. } => inputs.push(value),
            ChainContext { context } | CloneContext { context, .. } => inputs.push(context),
            LoadVmField { object, .. } => inputs.push(object),
            StoreVmField { object, value, .. } => {
                inputs.push(object);
                inputs.push(value);
            }
            AllocateObject { arguments, .. }
            | AllocateObjectWithBoundsCheck { arguments, .. }
            | StaticCall { arguments, .. }
            | InstanceCall { arguments, .. }
            | ClosureCall { arguments, .. } => inputs.extend(arguments.iter_mut()),
            CreateArray {
                elements,
                element_type,
                ..
            } => {
                inputs.extend(elements.iter_mut());
                inputs.push(element_type);
            }
            CreateClosure {
                type_arguments,
                receiver,
                ..
            } => {
                inputs.push(type_arguments);
                inputs.push(receiver);
            }
            LoadInstanceField { instance, .. } => inputs.push(instance),
            StoreInstanceField {
                instance, value, ..
            } => {
                inputs.push(instance);
                inputs.push(value);
            }
            LoadIndexed { array, index, .. } => {
                inputs.push(array);
                inputs.push(index);
            }
            StoreIndexed {
                array,
                index,
                value,
                ..
            } => {
                inputs.push(array);
                inputs.push(index);
                inputs.push(value);
            }
            InstanceSetter {
                receiver, value, ..
            } => {
                inputs.push(receiver);
                inputs.push(value);
            }
            StrictCompare { left, right, .. }
            | EqualityCompare { left, right, .. }
            | RelationalOp { left, right, .. } => {
                inputs.push(left);
                inputs.push(right);
            }
            AssertAssignable {
                value,
                instantiator,
                instantiator_type_arguments,
                ..
            }
            | InstanceOf {
                value,
                instantiator,
                instantiator_type_arguments,
                ..
            } => {
                inputs.push(value);
                inputs.push(instantiator);
                inputs.push(instantiator_type_arguments);
            }
            InstantiateTypeArguments { instantiator, .. }
            | ExtractConstructorTypeArguments { instantiator, .. }
            | ExtractConstructorInstantiator { instantiator } => inputs.push(instantiator),
        }
        inputs
    }

    pub fn as_load_local(&self) -> Option<&LocalVariable> {
        match self {
            Computation::LoadLocal { local, .. } => Some(local),
            _ => None,
        }
    }

    pub fn as_store_local(&self) -> Option<(&LocalVariable, &Value)> {
        match self {
            Computation::StoreLocal { local, value, .. } => Some((local, value)),
            _ => None,
        }
    }
}

/// Common header of definitions: the pre-SSA expression-stack slot and the
/// post-SSA globally unique index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefInfo {
    pub temp_index: Option<usize>,
    pub ssa_temp_index: Option<usize>,
}

/// Common header of block entries, filled in by discovery, numbering and
/// dominator construction.
#[derive(Debug, Clone, Default)]
pub struct BlockInfo {
    pub preorder_number: Option<usize>,
    pub postorder_number: Option<usize>,
    /// Reverse-postorder block number.
    pub block_id: Option<usize>,
    /// Ordered and stable from discovery onward; φ operand order follows
    /// it.
    pub predecessors: SmallVec<[InstrId; 2]>,
    pub dominator: Option<InstrId>,
    pub dominated_blocks: Vec<InstrId>,
    pub last_instruction: Option<InstrId>,
}

#[derive(Debug, Clone)]
pub enum InstructionKind {
    GraphEntry {
        normal_entry: InstrId,
        catch_entries: Vec<InstrId>,
        start_env: Option<Environment>,
        block: BlockInfo,
    },
    TargetEntry {
        /// Set on catch entries to the try block they handle.
        try_index: Option<TryIndex>,
        block: BlockInfo,
    },
    JoinEntry {
        /// φ instructions indexed by variable number; allocated lazily at
        /// φ-insertion time.
        phis: Vec<Option<InstrId>>,
        block: BlockInfo,
    },
    Bind {
        comp: Computation,
        def: DefInfo,
    },
    Do {
        comp: Computation,
    },
    Branch {
        value: Value,
        true_successor: Option<InstrId>,
        false_successor: Option<InstrId>,
    },
    Parameter {
        index: usize,
        def: DefInfo,
    },
    Phi {
        var_index: usize,
        /// One operand per predecessor of the owning join, in predecessor
        /// order; filled during renaming.
        inputs: Vec<Option<Value>>,
        def: DefInfo,
    },
    Return {
        token_pos: TextSize,
        value: Value,
    },
    Throw {
        token_pos: TextSize,
        try_index: Option<TryIndex>,
        exception: Value,
    },
    ReThrow {
        token_pos: TextSize,
        try_index: Option<TryIndex>,
        exception: Value,
        stack_trace: Value,
    },
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub kind: InstructionKind,
    /// Straight-line successor. Unused on terminators and branches.
    pub successor: Option<InstrId>,
    /// Backward link, set by the pre-SSA linking pass.
    pub previous: Option<InstrId>,
    /// Environment snapshot attached during renaming.
    pub env: Option<Environment>,
}

impl Instruction {
    pub fn new(kind: InstructionKind) -> Self {
        Instruction {
            kind,
            successor: None,
            previous: None,
            env: None,
        }
    }

    pub fn is_block_entry(&self) -> bool {
        matches!(
            self.kind,
            InstructionKind::GraphEntry { .. }
                | InstructionKind::TargetEntry { .. }
                | InstructionKind::JoinEntry { .. }
        )
    }

    pub fn is_definition(&self) -> bool {
        self.def_info().is_some()
    }

    pub fn def_info(&self) -> Option<&DefInfo> {
        match &self.kind {
            InstructionKind::Bind { def, .. }
            | InstructionKind::Parameter { def, .. }
            | InstructionKind::Phi { def, .. } => Some(def),
            _ => None,
        }
    }

    pub fn def_info_mut(&mut self) -> Option<&mut DefInfo> {
        match &mut self.kind {
            InstructionKind::Bind { def, .. }
            | InstructionKind::Parameter { def, .. }
            | InstructionKind::Phi { def, .. } => Some(def),
            _ => None,
        }
    }

    pub fn block_info(&self) -> Option<&BlockInfo> {
        match &self.kind {
            InstructionKind::GraphEntry { block, .. }
            | InstructionKind::TargetEntry { block, .. }
            | InstructionKind::JoinEntry { block, .. } => Some(block),
            _ => None,
        }
    }

    pub fn block_info_mut(&mut self) -> Option<&mut BlockInfo> {
        match &mut self.kind {
            InstructionKind::GraphEntry { block, .. }
            | InstructionKind::TargetEntry { block, .. }
            | InstructionKind::JoinEntry { block, .. } => Some(block),
            _ => None,
        }
    }

    pub fn computation(&self) -> Option<&Computation> {
        match &self.kind {
            InstructionKind::Bind { comp, .. } | InstructionKind::Do { comp } => Some(comp),
            _ => None,
        }
    }

    /// Number of `Value` operands of this instruction.
    pub fn input_count(&self) -> usize {
        match &self.kind {
            InstructionKind::Bind { comp, .. } | InstructionKind::Do { comp } => comp.input_count(),
            InstructionKind::Branch { .. }
            | InstructionKind::Return { .. }
            | InstructionKind::Throw { .. } => 1,
            InstructionKind::ReThrow { .. } => 2,
            _ => 0,
        }
    }

    pub fn input_at(&self, index: usize) -> &Value {
        match &self.kind {
            InstructionKind::Bind { comp, .. } | InstructionKind::Do { comp } => {
                let inputs = comp.inputs();
                inputs[index]
            }
            InstructionKind::Branch { value, .. } => {
                assert_eq!(index, 0);
                value
            }
            InstructionKind::Return { value, .. } => {
                assert_eq!(index, 0);
                value
            }
            InstructionKind::Throw { exception, .. } => {
                assert_eq!(index, 0);
                exception
            }
            InstructionKind::ReThrow {
                exception,
                stack_trace,
                ..
            } => match index {
                0 => exception,
                1 => stack_trace,
                _ => unreachable!("rethrow has two inputs"),
            },
            _ => unreachable!("instruction has no inputs"),
        }
    }

    pub fn set_input_at(&mut self, index: usize, new_value: Value) {
        match &mut self.kind {
            InstructionKind::Bind { comp, .. } | InstructionKind::Do { comp } => {
                let mut inputs = comp.inputs_mut();
                *inputs[index] = new_value;
            }
            InstructionKind::Branch { value, .. } => {
                assert_eq!(index, 0);
                *value = new_value;
            }
            InstructionKind::Return { value, .. } => {
                assert_eq!(index, 0);
                *value = new_value;
            }
            InstructionKind::Throw { exception, .. } => {
                assert_eq!(index, 0);
                *exception = new_value;
            }
            InstructionKind::ReThrow {
                exception,
                stack_trace,
                ..
            } => match index {
                0 => *exception = new_value,
                1 => *stack_trace = new_value,
                _ => unreachable!("rethrow has two inputs"),
            },
            _ => unreachable!("instruction has no inputs"),
        }
    }
}
