//! The flow-graph intermediate representation.

pub mod graph;
pub mod instruction;
pub mod printer;

pub use graph::{DiscoveryInfo, FlowGraph, SuccessorSlot};
pub use instruction::{
    BlockInfo, Computation, DefInfo, Environment, InstrId, Instruction, InstructionKind,
    RelationalOpKind, StrictCompareKind, TryIndex, Value,
};
