use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::declarations::{EndpointDef, OutputDef, ParamDef, ResolverDef};
use crate::error::ParseError;

/// A template as written by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDef {
  pub version: String,
  pub kind: String,
  #[serde(default)]
  pub metadata: Metadata,
  pub config: ConfigDef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
  #[serde(default)]
  pub name: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub tags: Vec<String>,
}

/// The four name-keyed declaration maps.
///
/// Maps are ordered so that every pass over a template visits declarations
/// in the same order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDef {
  #[serde(default)]
  pub endpoints: BTreeMap<String, EndpointDef>,
  #[serde(default)]
  pub params: BTreeMap<String, ParamDef>,
  #[serde(default)]
  pub resolvers: BTreeMap<String, ResolverDef>,
  #[serde(default)]
  pub outputs: BTreeMap<String, OutputDef>,
}

impl TemplateDef {
  pub fn from_yaml_str(source: &str) -> Result<Self, ParseError> {
    Ok(serde_yaml::from_str(source)?)
  }

  pub fn from_json_str(source: &str) -> Result<Self, ParseError> {
    Ok(serde_json::from_str(source)?)
  }

  /// Name used in logs and generated identifiers.
  pub fn name(&self) -> &str {
    if self.metadata.name.is_empty() {
      &self.kind
    } else {
      &self.metadata.name
    }
  }

  /// Total number of declarations across all categories.
  pub fn declaration_count(&self) -> usize {
    self.config.endpoints.len()
      + self.config.params.len()
      + self.config.resolvers.len()
      + self.config.outputs.len()
  }
}
