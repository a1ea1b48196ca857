use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading a template from disk or text.
#[derive(Debug, Error)]
pub enum ParseError {
  #[error("failed to read template {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("malformed YAML template: {0}")]
  Yaml(#[from] serde_yaml::Error),

  #[error("malformed JSON template: {0}")]
  Json(#[from] serde_json::Error),

  #[error("unsupported template format: .{extension}")]
  UnsupportedFormat { extension: String },
}
