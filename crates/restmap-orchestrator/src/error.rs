use restmap_compiler::CompilationError;
use restmap_executor::ExecutorError;
use thiserror::Error;

/// Errors raised while building or deploying an orchestration graph.
#[derive(Debug, Error)]
pub enum OrchestrationError {
  /// An edge names a node the graph does not hold.
  #[error("edge {from} -> {to} references missing node '{missing}'")]
  MissingNode {
    from: String,
    to: String,
    missing: String,
  },

  /// Two units map to the same node name or function uid.
  #[error("duplicate orchestration node '{name}'")]
  DuplicateNode { name: String },

  /// Trigger edges that cannot be wired as declared.
  #[error("conflicting wiring in subgraph {subgraph}: {reason}")]
  WiringConflict { subgraph: usize, reason: String },

  #[error(transparent)]
  Compilation(#[from] CompilationError),

  #[error("executor call '{operation}' failed")]
  Executor {
    operation: String,
    #[source]
    source: ExecutorError,
  },

  /// A deployment task ended without reporting.
  #[error("deployment task failed: {message}")]
  Task { message: String },

  #[error("deployment cancelled")]
  Cancelled,
}
