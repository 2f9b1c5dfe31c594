//! Builder error types

use thiserror::Error;

/// Errors produced while building a flow graph.
///
/// A bailout is a structured, non-fatal abort of the builder for a single
/// function; the compilation driver retries the function with SSA disabled
/// or reports it to the user. Malformed input (an AST the semantic analyzer
/// should never produce) is a bug and panics instead of returning an error.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("FlowGraphBuilder Bailout: {function} {reason}")]
    Bailout { function: String, reason: String },
}

impl BuildError {
    pub fn bailout(function: impl Into<String>, reason: impl Into<String>) -> Self {
        BuildError::Bailout {
            function: function.into(),
            reason: reason.into(),
        }
    }

    pub fn is_bailout(&self) -> bool {
        matches!(self, BuildError::Bailout { .. })
    }
}

pub type BuildResult<T> = Result<T, BuildError>;
