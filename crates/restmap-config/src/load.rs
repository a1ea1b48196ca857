use std::path::Path;

use crate::error::ParseError;
use crate::template::TemplateDef;

/// On-disk template encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateFormat {
  Yaml,
  Json,
}

impl TemplateFormat {
  /// Pick a format from a file extension. Files without one are read as YAML.
  pub fn from_path(path: &Path) -> Result<Self, ParseError> {
    match path.extension().and_then(|ext| ext.to_str()) {
      None => Ok(TemplateFormat::Yaml),
      Some(ext) => match ext.to_ascii_lowercase().as_str() {
        "yaml" | "yml" => Ok(TemplateFormat::Yaml),
        "json" => Ok(TemplateFormat::Json),
        other => Err(ParseError::UnsupportedFormat {
          extension: other.to_string(),
        }),
      },
    }
  }

  pub fn parse(self, source: &str) -> Result<TemplateDef, ParseError> {
    match self {
      TemplateFormat::Yaml => TemplateDef::from_yaml_str(source),
      TemplateFormat::Json => TemplateDef::from_json_str(source),
    }
  }
}

/// Read and parse a template file.
pub fn load_template(path: impl AsRef<Path>) -> Result<TemplateDef, ParseError> {
  let path = path.as_ref();
  let format = TemplateFormat::from_path(path)?;
  let source = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  format.parse(&source)
}
