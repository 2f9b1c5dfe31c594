//! Build flags controlling graph construction

/// Per-compilation options for the flow graph builder.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Eliminate type checks when allowed by static type analysis.
    pub eliminate_type_checks: bool,
    /// Emit runtime type checks (checked mode).
    pub enable_type_checks: bool,
    /// Dump the abstract syntax tree before lowering.
    pub print_ast: bool,
    /// Dump the IR flow graph after construction.
    pub print_flow_graph: bool,
    /// Convert the graph to SSA form.
    pub use_ssa: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            eliminate_type_checks: true,
            enable_type_checks: false,
            print_ast: false,
            print_flow_graph: false,
            use_ssa: true,
        }
    }
}
