use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An endpoint declaration.
///
/// Which fields are required depends on `kind`:
/// - `baseurl` needs `url`
/// - `relativeurl` needs `base` and `relative`, and may list `params`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDef {
  pub kind: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub description: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub base: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub relative: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub params: Vec<ParamRef>,
  /// HTTP method, GET when absent.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub method: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub body: Option<serde_json::Value>,
  /// Outputs the response is loaded into.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub outputs: Vec<String>,
}

impl EndpointDef {
  /// Referenced parameter names in declaration order.
  pub fn param_names(&self) -> Vec<&str> {
    self.params.iter().flat_map(ParamRef::names).collect()
  }
}

/// A parameter reference inside an endpoint.
///
/// Either a bare name (`- scope`) or a single-key map (`- scope: {}`), the
/// latter leaving room for per-use settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamRef {
  Name(String),
  Keyed(BTreeMap<String, serde_json::Value>),
}

impl ParamRef {
  pub fn names(&self) -> Vec<&str> {
    match self {
      ParamRef::Name(name) => vec![name.as_str()],
      ParamRef::Keyed(map) => map.keys().map(String::as_str).collect(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDef {
  #[serde(rename = "type", default = "default_param_type")]
  pub param_type: String,
  pub resolver: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub description: String,
}

fn default_param_type() -> String {
  "string".to_string()
}

/// A resolver declaration.
///
/// - `EndpointResolver` needs `endpoint`, may carry `select`
/// - `DatabaseResolver` needs `connectionstring` and `table`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverDef {
  pub kind: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub description: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub endpoint: Option<String>,
  /// Dotted path into the endpoint response, e.g. `data.scope`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub select: Option<String>,
  #[serde(
    default,
    alias = "connection_string",
    skip_serializing_if = "Option::is_none"
  )]
  pub connectionstring: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub table: Option<String>,
  /// Opaque authentication descriptor, passed through to generated code.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub authentication: Option<serde_json::Value>,
}

/// An output declaration. Every key besides `kind`, `target` and
/// `description` is provider-specific config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDef {
  pub kind: String,
  pub target: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub description: String,
  #[serde(flatten)]
  pub config: serde_json::Map<String, serde_json::Value>,
}
