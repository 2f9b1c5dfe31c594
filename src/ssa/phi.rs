//! φ insertion by iterated dominance frontier.

use crate::bitvec::BitVector;
use crate::ir::instruction::DefInfo;
use crate::ir::{FlowGraph, InstrId, InstructionKind};

/// Insert a φ for every variable at every block of the iterated dominance
/// frontier of the blocks assigning it. The `has_already` and `work`
/// arrays record the most recent variable each block was processed for,
/// which avoids re-queueing without a per-variable visited set.
pub fn insert_phis(
    graph: &mut FlowGraph,
    assigned_vars: &[BitVector],
    var_count: usize,
    dom_frontier: &[BitVector],
) {
    let block_count = graph.preorder.len();
    let mut has_already = vec![-1isize; block_count];
    let mut work = vec![-1isize; block_count];

    let mut worklist: Vec<InstrId> = Vec::new();
    for var_index in 0..var_count {
        for block_index in 0..block_count {
            if assigned_vars[block_index].contains(var_index) {
                work[block_index] = var_index as isize;
                worklist.push(graph.preorder[block_index]);
            }
        }

        while let Some(current) = worklist.pop() {
            let current_index = graph
                .block_info(current)
                .preorder_number
                .expect("block not discovered");
            for index in dom_frontier[current_index].iter() {
                if has_already[index] < var_index as isize {
                    let block = graph.preorder[index];
                    insert_phi(graph, block, var_index, var_count);
                    has_already[index] = var_index as isize;
                    if work[index] < var_index as isize {
                        work[index] = var_index as isize;
                        worklist.push(block);
                    }
                }
            }
        }
    }
}

fn insert_phi(graph: &mut FlowGraph, join: InstrId, var_index: usize, var_count: usize) {
    let predecessor_count = graph.block_info(join).predecessors.len();
    let phi = graph.add(InstructionKind::Phi {
        var_index,
        inputs: vec![None; predecessor_count],
        def: DefInfo::default(),
    });
    match &mut graph.instr_mut(join).kind {
        InstructionKind::JoinEntry { phis, .. } => {
            if phis.is_empty() {
                phis.resize(var_count, None);
            }
            assert!(phis[var_index].is_none(), "duplicate phi for variable");
            phis[var_index] = Some(phi);
        }
        _ => unreachable!("phi inserted outside a join block"),
    }
}
