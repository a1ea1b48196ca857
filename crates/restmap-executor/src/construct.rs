use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use restmap_compiler::SinkBinding;
use restmap_graph::SinkKind;
use serde::{Deserialize, Serialize};

/// Capability group a construct belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructKind {
  Function,
  Bucket,
  Table,
  Queue,
  Topic,
}

impl ConstructKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ConstructKind::Function => "function",
      ConstructKind::Bucket => "bucket",
      ConstructKind::Table => "table",
      ConstructKind::Queue => "queue",
      ConstructKind::Topic => "topic",
    }
  }
}

impl fmt::Display for ConstructKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl From<SinkKind> for ConstructKind {
  fn from(kind: SinkKind) -> Self {
    match kind {
      SinkKind::Queue => ConstructKind::Queue,
      SinkKind::Bucket => ConstructKind::Bucket,
      SinkKind::Table => ConstructKind::Table,
      SinkKind::Topic => ConstructKind::Topic,
    }
  }
}

/// Result of registering a construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Registration {
  Created,
  /// The construct was already present; nothing changed.
  Existing,
}

/// Outcome of a function invocation, as published on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
  Success,
  Failure,
  Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
  Topic,
  Queue,
}

impl From<TriggerSource> for ConstructKind {
  fn from(source: TriggerSource) -> Self {
    match source {
      TriggerSource::Topic => ConstructKind::Topic,
      TriggerSource::Queue => ConstructKind::Queue,
    }
  }
}

/// Subscription of a function to events delivered by another construct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSpec {
  /// Outcomes that fire the function.
  pub on: Vec<Outcome>,
  pub source: TriggerSource,
  /// Name of the construct delivering events.
  pub name: String,
  /// Event attributes an event must carry, e.g. `source` of the publisher.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub args: BTreeMap<String, String>,
}

/// Publication of a function's outcome under its own identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyParams {
  pub on: Vec<Outcome>,
  pub identity: String,
}

/// A bucket, table or queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSpec {
  pub name: String,
  #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
  pub config: serde_json::Map<String, serde_json::Value>,
}

impl From<&SinkBinding> for StorageSpec {
  fn from(sink: &SinkBinding) -> Self {
    Self {
      name: sink.target.clone(),
      config: sink.config.clone(),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicConfig {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub display_name: Option<String>,
  #[serde(default)]
  pub fifo: bool,
}

/// State of one construct as the backend sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructRecord {
  pub kind: ConstructKind,
  pub name: String,
  pub spec: serde_json::Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub role: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub triggers: Vec<TriggerSpec>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub notifications: Vec<(String, NotifyParams)>,
  #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
  pub publishers: BTreeSet<String>,
}

impl ConstructRecord {
  pub fn new(kind: ConstructKind, name: impl Into<String>, spec: serde_json::Value) -> Self {
    Self {
      kind,
      name: name.into(),
      spec,
      role: None,
      triggers: vec![],
      notifications: vec![],
      publishers: BTreeSet::new(),
    }
  }

  /// Key used in stack manifests, e.g. `function/users`.
  pub fn key(&self) -> String {
    format!("{}/{}", self.kind, self.name)
  }
}

/// Synthesized description of every construct in a stack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackManifest {
  pub constructs: BTreeMap<String, ConstructRecord>,
}

impl StackManifest {
  pub fn from_records(records: impl IntoIterator<Item = ConstructRecord>) -> Self {
    Self {
      constructs: records.into_iter().map(|r| (r.key(), r)).collect(),
    }
  }

  /// Changes needed to go from this manifest to `update`.
  pub fn diff(&self, update: &StackManifest) -> StackDiff {
    let mut diff = StackDiff::default();
    for (key, record) in &update.constructs {
      match self.constructs.get(key) {
        None => diff.added.push(key.clone()),
        Some(current) if current != record => diff.changed.push(key.clone()),
        Some(_) => {}
      }
    }
    for key in self.constructs.keys() {
      if !update.constructs.contains_key(key) {
        diff.removed.push(key.clone());
      }
    }
    diff
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDiff {
  pub added: Vec<String>,
  pub removed: Vec<String>,
  pub changed: Vec<String>,
}

impl StackDiff {
  pub fn is_empty(&self) -> bool {
    self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_manifest_diff() {
    let current = StackManifest::from_records([
      ConstructRecord::new(ConstructKind::Function, "users", json!({"code": "v1"})),
      ConstructRecord::new(ConstructKind::Queue, "users-in", json!({})),
    ]);
    let update = StackManifest::from_records([
      ConstructRecord::new(ConstructKind::Function, "users", json!({"code": "v2"})),
      ConstructRecord::new(ConstructKind::Topic, "restmap-completion", json!({})),
    ]);

    let diff = current.diff(&update);
    assert_eq!(diff.added, vec!["topic/restmap-completion"]);
    assert_eq!(diff.removed, vec!["queue/users-in"]);
    assert_eq!(diff.changed, vec!["function/users"]);
    assert!(current.diff(&current).is_empty());
  }

  #[test]
  fn test_sink_kind_maps_to_construct_kind() {
    assert_eq!(ConstructKind::from(SinkKind::Bucket), ConstructKind::Bucket);
    assert_eq!(ConstructKind::from(SinkKind::Topic).to_string(), "topic");
  }
}
