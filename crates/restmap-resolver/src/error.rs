use thiserror::Error;

/// Errors that can occur while resolving a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
  /// Declaration kind is not one the resolver knows how to build.
  #[error("'{name}' has unsupported kind '{kind}'")]
  UnknownKind { name: String, kind: String },

  /// A reference names something absent from the whole template.
  #[error("'{referrer}' references '{target}', which is not declared")]
  MissingReference { referrer: String, target: String },

  /// A full pass resolved nothing while declarations were still pending.
  #[error("cyclic dependency between: {}", .remaining.join(", "))]
  CyclicDependency { remaining: Vec<String> },

  /// A field required by the declaration's kind is absent.
  #[error("'{name}' is missing required field '{field}'")]
  MissingField { name: String, field: &'static str },

  #[error("'{name}' has unsupported method '{method}'")]
  InvalidMethod { name: String, method: String },
}

impl ResolutionError {
  /// Name of the declaration the error is attached to.
  pub fn node(&self) -> Option<&str> {
    match self {
      ResolutionError::UnknownKind { name, .. }
      | ResolutionError::MissingField { name, .. }
      | ResolutionError::InvalidMethod { name, .. } => Some(name),
      ResolutionError::MissingReference { referrer, .. } => Some(referrer),
      ResolutionError::CyclicDependency { .. } => None,
    }
  }
}
