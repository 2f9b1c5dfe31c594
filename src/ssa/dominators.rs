//! Immediate dominators via SEMI-NCA and dominance frontiers.
//!
//! SEMI-NCA is a two-pass variant of Lengauer-Tarjan: semidominators are
//! computed from the depth-first spanning tree with a path-compressed
//! link-eval structure, then immediate dominators are found as the nearest
//! common ancestor of the spanning-tree parent and the semidominator. The
//! frontier pass is the predecessor-walk formulation of Ferrante et al.
//!
//! All arrays are maps between preorder basic-block numbers. Path
//! compression mutates the spanning-tree `parent` array in place.

use crate::bitvec::BitVector;
use crate::ir::{FlowGraph, InstrId};

pub fn compute_dominators(graph: &mut FlowGraph, parent: &mut [usize]) -> Vec<BitVector> {
    let size = parent.len();
    assert_eq!(size, graph.preorder.len());

    let mut idom: Vec<usize> = parent.to_vec();
    let mut semi: Vec<usize> = (0..size).collect();
    let mut label: Vec<usize> = (0..size).collect();

    // First pass: semidominators, walking blocks in reverse preorder and
    // ascending the compressed semidominator path from each predecessor.
    for block_index in (1..size).rev() {
        let block = graph.preorder[block_index];
        let predecessors = graph.block_info(block).predecessors.clone();
        for pred in predecessors {
            let pred_index = preorder_number(graph, pred);
            let best = if pred_index > block_index {
                compress_path(block_index, pred_index, parent, &mut label);
                label[pred_index]
            } else {
                pred_index
            };
            semi[block_index] = semi[block_index].min(semi[best]);
        }
        label[block_index] = semi[block_index];
    }

    // Second pass: the immediate dominator is the NCA of the spanning-tree
    // parent and the semidominator.
    for block_index in 1..size {
        let mut dom_index = idom[block_index];
        while dom_index > semi[block_index] {
            dom_index = idom[dom_index];
        }
        idom[block_index] = dom_index;
        let block = graph.preorder[block_index];
        let dom = graph.preorder[dom_index];
        graph.block_info_mut(block).dominator = Some(dom);
        graph.block_info_mut(dom).dominated_blocks.push(block);
    }

    // Dominance frontier: for every merge block, walk each predecessor's
    // idom chain up to the merge's dominator.
    let mut frontier: Vec<BitVector> = (0..size).map(|_| BitVector::new(size)).collect();
    for block_index in 0..size {
        let block = graph.preorder[block_index];
        let predecessors = graph.block_info(block).predecessors.clone();
        if predecessors.len() <= 1 {
            continue;
        }
        let dominator = graph.block_info(block).dominator;
        for pred in predecessors {
            let mut runner = pred;
            while Some(runner) != dominator {
                frontier[preorder_number(graph, runner)].add(block_index);
                runner = graph
                    .block_info(runner)
                    .dominator
                    .expect("dominator not computed");
            }
        }
    }
    frontier
}

fn preorder_number(graph: &FlowGraph, block: InstrId) -> usize {
    graph
        .block_info(block)
        .preorder_number
        .expect("block not discovered")
}

fn compress_path(
    start_index: usize,
    current_index: usize,
    parent: &mut [usize],
    label: &mut [usize],
) {
    let next_index = parent[current_index];
    if next_index > start_index {
        compress_path(start_index, next_index, parent, label);
        label[current_index] = label[current_index].min(label[next_index]);
        parent[current_index] = parent[next_index];
    }
}
