use thiserror::Error;

use crate::construct::ConstructKind;

/// Errors reported by an executor backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
  /// The backend rejected or failed a call.
  #[error("backend failure on '{construct}': {message}")]
  Backend {
    construct: String,
    message: String,
    /// Whether repeating the same call may succeed.
    retryable: bool,
  },

  #[error("{kind} already exists: {name}")]
  AlreadyExists { kind: ConstructKind, name: String },

  #[error("{kind} not found: {name}")]
  NotFound { kind: ConstructKind, name: String },
}

impl ExecutorError {
  pub fn is_retryable(&self) -> bool {
    matches!(self, ExecutorError::Backend { retryable: true, .. })
  }
}
