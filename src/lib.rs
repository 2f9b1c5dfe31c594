//! # Vela Flow Graph Construction
//!
//! This crate builds the control-flow graph the Vela optimizing compiler
//! works on. Given a type-checked AST for a single function together with
//! its resolved scope information, it lowers the tree to three-address,
//! side-effect-explicit instructions and optionally converts the graph to
//! semi-pruned SSA form.
//!
//! ## Architecture
//!
//! The pipeline:
//! 1. **Input**: [`ParsedFunction`](ast::ParsedFunction) from semantic
//!    analysis, plus the [`ObjectStore`](runtime::ObjectStore) answering
//!    runtime and type queries
//! 2. **Lowering**: a three-mode visitor (effect / value / test) composes
//!    open graph fragments into a CFG rooted at a graph entry
//! 3. **Discovery**: depth-first numbering, predecessor wiring, reverse
//!    postorder block ids
//! 4. **SSA** (optional): SEMI-NCA dominators, dominance-frontier φ
//!    insertion, renaming with local-variable elimination
//! 5. **Output**: a [`FlowGraph`](ir::FlowGraph) ready for the code
//!    generator
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vela_flowgraph::{build_flow_graph, BuildOptions};
//!
//! let graph = build_flow_graph(&parsed, &store, &BuildOptions::default())?;
//! ```

pub mod ast;
pub mod bitvec;
pub mod builder;
pub mod config;
pub mod error;
pub mod ir;
pub mod runtime;
pub mod ssa;
pub mod types;

pub use builder::FlowGraphBuilder;
pub use config::BuildOptions;
pub use error::{BuildError, BuildResult};
pub use ir::FlowGraph;

use ast::ParsedFunction;
use runtime::ObjectStore;

/// Build the flow graph for one function.
///
/// With SSA enabled, a bailout (catch entries or copied parameters reach
/// the renamer) falls back to the non-SSA pipeline, mirroring the
/// compilation driver's retry.
pub fn build_flow_graph(
    parsed: &ParsedFunction,
    store: &ObjectStore,
    options: &BuildOptions,
) -> BuildResult<FlowGraph> {
    let builder = FlowGraphBuilder::new(parsed, store, options.clone());
    match builder.build_graph(options.use_ssa) {
        Ok(graph) => Ok(graph),
        Err(error) if options.use_ssa && error.is_bailout() => {
            log::warn!(target: "flowgraph", "{}; retrying without SSA", error);
            FlowGraphBuilder::new(parsed, store, options.clone()).build_graph(false)
        }
        Err(error) => Err(error),
    }
}
