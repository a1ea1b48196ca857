use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while compiling an executable unit.
#[derive(Debug, Error)]
pub enum CompilationError {
  /// A node's configuration cannot produce working code.
  #[error("invalid configuration for '{node}': {reason}")]
  InvalidConfig { node: String, reason: String },

  /// Template lookup or rendering failed.
  #[error("failed to render '{node}' with template '{template}': {message}")]
  RenderFailure {
    node: String,
    template: String,
    message: String,
  },

  #[error("failed to write function code to {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl CompilationError {
  pub fn node(&self) -> Option<&str> {
    match self {
      CompilationError::InvalidConfig { node, .. } | CompilationError::RenderFailure { node, .. } => {
        Some(node)
      }
      CompilationError::Io { .. } => None,
    }
  }
}
