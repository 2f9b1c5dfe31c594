//! The instruction arena and block discovery.
//!
//! Every instruction is allocated in a per-compilation `Vec` and addressed
//! by [`InstrId`]; graph cycles (loop back edges, dominator links) are
//! plain indices, so there is no ownership to untangle. Discovery performs
//! a depth-first traversal from the graph entry recording preorder and
//! postorder block arrays, the spanning-tree parent of each block and the
//! set of frame variables assigned in it.

use smallvec::SmallVec;

use crate::bitvec::BitVector;
use crate::ir::instruction::{BlockInfo, Computation, InstrId, Instruction, InstructionKind};

/// A settable successor slot of a branch instruction. Branch targets are
/// not known while a test fragment is built, so tests expose these slots
/// for later wiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessorSlot {
    True(InstrId),
    False(InstrId),
}

/// Spanning-tree parents and per-block assigned-variable sets produced by
/// discovery, both indexed by preorder block number.
#[derive(Debug)]
pub struct DiscoveryInfo {
    pub parent: Vec<usize>,
    pub assigned_vars: Vec<BitVector>,
}

#[derive(Debug, Default)]
pub struct FlowGraph {
    instructions: Vec<Instruction>,
    pub graph_entry: Option<InstrId>,
    /// Reachable block entries in preorder; filled by discovery.
    pub preorder: Vec<InstrId>,
    /// Reachable block entries in postorder; filled by discovery.
    pub postorder: Vec<InstrId>,
}

impl FlowGraph {
    pub fn new() -> Self {
        FlowGraph::default()
    }

    pub fn add(&mut self, kind: InstructionKind) -> InstrId {
        let id = InstrId(self.instructions.len() as u32);
        self.instructions.push(Instruction::new(kind));
        id
    }

    pub fn instr(&self, id: InstrId) -> &Instruction {
        &self.instructions[id.0 as usize]
    }

    pub fn instr_mut(&mut self, id: InstrId) -> &mut Instruction {
        &mut self.instructions[id.0 as usize]
    }

    pub fn kind(&self, id: InstrId) -> &InstructionKind {
        &self.instr(id).kind
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    pub fn set_successor(&mut self, from: InstrId, to: InstrId) {
        self.instr_mut(from).successor = Some(to);
    }

    pub fn set_branch_successor(&mut self, slot: SuccessorSlot, target: InstrId) {
        let (branch, which_true) = match slot {
            SuccessorSlot::True(branch) => (branch, true),
            SuccessorSlot::False(branch) => (branch, false),
        };
        match &mut self.instr_mut(branch).kind {
            InstructionKind::Branch {
                true_successor,
                false_successor,
                ..
            } => {
                if which_true {
                    *true_successor = Some(target);
                } else {
                    *false_successor = Some(target);
                }
            }
            _ => unreachable!("successor slot on a non-branch instruction"),
        }
    }

    pub fn block_info(&self, id: InstrId) -> &BlockInfo {
        self.instr(id).block_info().expect("not a block entry")
    }

    pub fn block_info_mut(&mut self, id: InstrId) -> &mut BlockInfo {
        self.instr_mut(id).block_info_mut().expect("not a block entry")
    }

    pub fn add_catch_entry(&mut self, graph_entry: InstrId, target: InstrId) {
        match &mut self.instr_mut(graph_entry).kind {
            InstructionKind::GraphEntry { catch_entries, .. } => catch_entries.push(target),
            _ => unreachable!("catch entries live on the graph entry"),
        }
    }

    pub fn catch_entries(&self, graph_entry: InstrId) -> &[InstrId] {
        match self.kind(graph_entry) {
            InstructionKind::GraphEntry { catch_entries, .. } => catch_entries,
            _ => unreachable!("catch entries live on the graph entry"),
        }
    }

    /// Successor blocks of the block whose last instruction is `last`.
    pub fn block_successors(&self, last: InstrId) -> SmallVec<[InstrId; 2]> {
        let mut successors: SmallVec<[InstrId; 2]> = SmallVec::new();
        match self.kind(last) {
            InstructionKind::GraphEntry {
                normal_entry,
                catch_entries,
                ..
            } => {
                successors.push(*normal_entry);
                successors.extend(catch_entries.iter().copied());
            }
            InstructionKind::Branch {
                true_successor,
                false_successor,
                ..
            } => {
                successors.push(true_successor.expect("unset true successor"));
                successors.push(false_successor.expect("unset false successor"));
            }
            InstructionKind::Return { .. }
            | InstructionKind::Throw { .. }
            | InstructionKind::ReThrow { .. } => {}
            _ => {
                if let Some(next) = self.instr(last).successor {
                    if self.instr(next).is_block_entry() {
                        successors.push(next);
                    }
                }
            }
        }
        successors
    }

    /// Index of `predecessor` in `join`'s ordered predecessor list.
    pub fn which_pred(&self, join: InstrId, predecessor: InstrId) -> usize {
        self.block_info(join)
            .predecessors
            .iter()
            .position(|p| *p == predecessor)
            .expect("predecessor not wired to join")
    }

    /// Walk the straight-line instructions of a block, excluding the entry
    /// itself.
    pub fn block_instructions(&self, block: InstrId) -> Vec<InstrId> {
        let mut result = Vec::new();
        let mut current = self.instr(block).successor;
        while let Some(id) = current {
            if self.instr(id).is_block_entry() {
                break;
            }
            result.push(id);
            current = self.instr(id).successor;
        }
        result
    }

    /// Depth-first block discovery. Rediscovery of an already-discovered
    /// graph resets all derived state first and reproduces the same
    /// arrays.
    pub fn discover_blocks(&mut self, variable_count: usize) -> DiscoveryInfo {
        self.clear_discovery_state();
        let mut info = DiscoveryInfo {
            parent: Vec::new(),
            assigned_vars: Vec::new(),
        };
        let entry = self.graph_entry.expect("graph entry not set");
        self.discover_block(entry, None, variable_count, &mut info);
        info
    }

    fn discover_block(
        &mut self,
        block: InstrId,
        predecessor: Option<InstrId>,
        variable_count: usize,
        info: &mut DiscoveryInfo,
    ) {
        if let Some(pred) = predecessor {
            self.block_info_mut(block).predecessors.push(pred);
        }
        if self.block_info(block).preorder_number.is_some() {
            return;
        }
        let preorder_number = self.preorder.len();
        self.block_info_mut(block).preorder_number = Some(preorder_number);
        self.preorder.push(block);
        let parent_number = predecessor
            .map(|p| self.block_info(p).preorder_number.expect("parent discovered"))
            .unwrap_or(0);
        info.parent.push(parent_number);

        let mut assigned = BitVector::new(variable_count);
        let mut last = block;
        let mut current = self.instr(block).successor;
        while let Some(id) = current {
            if self.instr(id).is_block_entry() {
                break;
            }
            if let Some(comp) = self.instr(id).computation() {
                if let Computation::StoreLocal { local, .. } = comp {
                    if !local.is_captured && local.index < variable_count {
                        assigned.add(local.bit_index());
                    }
                }
            }
            last = id;
            current = self.instr(id).successor;
        }
        self.block_info_mut(block).last_instruction = Some(last);
        info.assigned_vars.push(assigned);

        for successor in self.block_successors(last) {
            self.discover_block(successor, Some(block), variable_count, info);
        }

        let postorder_number = self.postorder.len();
        self.block_info_mut(block).postorder_number = Some(postorder_number);
        self.postorder.push(block);
    }

    fn clear_discovery_state(&mut self) {
        self.preorder.clear();
        self.postorder.clear();
        for instruction in &mut self.instructions {
            if let Some(block) = instruction.block_info_mut() {
                *block = BlockInfo::default();
            }
        }
    }

    /// Number blocks in reverse postorder.
    pub fn number_blocks(&mut self) {
        let count = self.postorder.len();
        for i in 0..count {
            let block = self.postorder[i];
            self.block_info_mut(block).block_id = Some(count - i - 1);
        }
    }

    /// Link instructions backwards inside every block; required before
    /// instructions can be removed during renaming.
    pub fn link_previous(&mut self) {
        for i in 0..self.postorder.len() {
            let block = self.postorder[i];
            let mut prev = block;
            let mut current = self.instr(block).successor;
            while let Some(id) = current {
                if self.instr(id).is_block_entry() {
                    break;
                }
                self.instr_mut(id).previous = Some(prev);
                prev = id;
                current = self.instr(id).successor;
            }
        }
    }

    /// Unlink a straight-line instruction, returning its successor so a
    /// walk can continue.
    pub fn remove_from_graph(&mut self, id: InstrId) -> Option<InstrId> {
        let prev = self.instr(id).previous.expect("instruction not linked");
        let next = self.instr(id).successor;
        self.instr_mut(prev).successor = next;
        if let Some(next_id) = next {
            if !self.instr(next_id).is_block_entry() {
                self.instr_mut(next_id).previous = Some(prev);
            }
        }
        next
    }

}
