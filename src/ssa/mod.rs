//! SSA construction over a freshly discovered flow graph.
//!
//! The pipeline runs in four steps: backward-link instructions inside each
//! block, compute immediate dominators and dominance frontiers (SEMI-NCA),
//! insert φ instructions by iterated dominance frontier, then rename while
//! eliminating load/store-local instructions. Renaming bails out on
//! constructs the SSA pipeline does not support yet; the caller falls back
//! to the non-SSA graph.

pub mod dominators;
pub mod phi;
pub mod rename;

use crate::error::BuildResult;
use crate::ir::{DiscoveryInfo, FlowGraph};

pub struct SsaParams<'a> {
    pub function_name: &'a str,
    pub variable_count: usize,
    pub num_fixed_parameters: usize,
    pub copied_parameter_count: usize,
}

pub fn construct(
    graph: &mut FlowGraph,
    discovery: &mut DiscoveryInfo,
    params: &SsaParams<'_>,
    next_ssa_index: &mut usize,
) -> BuildResult<()> {
    graph.link_previous();
    let dominance_frontier = dominators::compute_dominators(graph, &mut discovery.parent);
    phi::insert_phis(
        graph,
        &discovery.assigned_vars,
        params.variable_count,
        &dominance_frontier,
    );
    rename::rename(graph, params, next_ssa_index)
}
