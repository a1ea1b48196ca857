use std::collections::BTreeMap;
use std::path::PathBuf;

use restmap_graph::SinkKind;
use serde::{Deserialize, Serialize};

/// A compiled, ready-to-register function.
///
/// Created once by the compiler and never modified afterwards; recompiling
/// produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeployment {
  pub uid: String,
  pub code: String,
  pub runtime: String,
  pub requirements: Vec<Requirement>,
  pub handler: String,
  pub code_location: PathBuf,
  pub params: DeploymentParams,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub sinks: Vec<SinkBinding>,
}

/// A third-party library the generated code imports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
  pub library: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
  pub imports: Vec<String>,
}

impl Requirement {
  pub fn new(library: &str, version: &str, imports: &[&str]) -> Self {
    Self {
      library: library.to_string(),
      version: Some(version.to_string()),
      imports: imports.iter().map(|i| i.to_string()).collect(),
    }
  }
}

/// Backend construct a function writes into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkBinding {
  pub name: String,
  pub kind: SinkKind,
  pub target: String,
  #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
  pub config: serde_json::Map<String, serde_json::Value>,
}

/// Resources and runtime settings requested for a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentParams {
  pub min_memory_mb: u32,
  pub max_memory_mb: u32,
  pub timeout_secs: u32,
  pub permissions: Vec<String>,
  pub env_variables: BTreeMap<String, String>,
  pub tags: Vec<String>,
  pub is_monitored: bool,
  pub is_traced: bool,
  pub concurrency: u32,
}

impl Default for DeploymentParams {
  fn default() -> Self {
    Self {
      min_memory_mb: 128,
      max_memory_mb: 256,
      timeout_secs: 300,
      permissions: vec!["table-reader".to_string()],
      env_variables: BTreeMap::new(),
      tags: vec![],
      is_monitored: true,
      is_traced: true,
      concurrency: 10,
    }
  }
}
