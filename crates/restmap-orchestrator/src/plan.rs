//! Deployment planning.
//!
//! A plan lists, per subgraph, every backend call the deployment cascade
//! will make. Dry runs stop here.

use std::collections::{BTreeMap, BTreeSet};

use restmap_executor::{NotifyParams, Outcome, StorageSpec, TriggerSource, TriggerSpec};
use restmap_graph::SinkKind;
use serde::Serialize;

use crate::error::OrchestrationError;
use crate::graph::OrchestrationGraph;

/// Event attribute a subscription filters the completion channel on.
pub const SOURCE_ATTRIBUTE: &str = "source";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentPlan {
  /// Completion channel shared by every subgraph.
  pub channel: String,
  pub subgraphs: Vec<SubgraphPlan>,
}

impl DeploymentPlan {
  pub fn function_count(&self) -> usize {
    self.subgraphs.iter().map(|s| s.functions.len()).sum()
  }

  pub fn step_count(&self) -> usize {
    self.subgraphs.iter().map(|s| s.steps.len()).sum()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SinkPlan {
  pub kind: SinkKind,
  pub spec: StorageSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubgraphPlan {
  pub index: usize,
  /// Node names, in name order.
  pub nodes: Vec<String>,
  pub sinks: Vec<SinkPlan>,
  /// Function uids to register.
  pub functions: Vec<String>,
  /// Wiring applied after registration, in order.
  pub steps: Vec<WiringStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum WiringStep {
  EnsureChannel {
    channel: String,
  },
  GrantPublish {
    channel: String,
    function: String,
  },
  Notify {
    function: String,
    channel: String,
    params: NotifyParams,
  },
  Subscribe {
    function: String,
    trigger: TriggerSpec,
  },
}

impl SubgraphPlan {
  pub fn build(
    index: usize,
    subgraph: &OrchestrationGraph,
    channel: &str,
  ) -> Result<Self, OrchestrationError> {
    let uid = |from: &str, to: &str, name: &str| {
      subgraph
        .node(name)
        .map(|node| node.uid().to_string())
        .ok_or_else(|| OrchestrationError::MissingNode {
          from: from.to_string(),
          to: to.to_string(),
          missing: name.to_string(),
        })
    };

    // (start uid, target uid, outcomes) per triggering edge
    let mut triggering = Vec::new();
    for (from, to, params) in subgraph.edges() {
      let start = uid(from, to, from)?;
      let target = uid(from, to, to)?;
      if !params.triggers {
        continue;
      }
      if !subgraph.is_directed() {
        return Err(conflict(index, format!("undirected edge {from} - {to} cannot trigger")));
      }
      if params.on.is_empty() {
        return Err(conflict(index, format!("edge {from} -> {to} triggers on no outcome")));
      }
      triggering.push((start, target, params.on.clone()));
    }

    if let Some(node) = trigger_cycle(subgraph) {
      return Err(conflict(index, format!("trigger edges loop through '{node}'")));
    }

    let mut sinks = Vec::new();
    let mut seen = BTreeSet::new();
    for node in subgraph.nodes() {
      for sink in &node.deployment.sinks {
        if seen.insert((sink.kind, sink.target.clone())) {
          sinks.push(SinkPlan {
            kind: sink.kind,
            spec: StorageSpec::from(sink),
          });
        }
      }
    }

    Ok(Self {
      index,
      nodes: subgraph.names().map(str::to_string).collect(),
      sinks,
      functions: subgraph.nodes().map(|n| n.uid().to_string()).collect(),
      steps: wiring(channel, &triggering),
    })
  }
}

fn conflict(subgraph: usize, reason: String) -> OrchestrationError {
  OrchestrationError::WiringConflict { subgraph, reason }
}

fn wiring(channel: &str, triggering: &[(String, String, Vec<Outcome>)]) -> Vec<WiringStep> {
  if triggering.is_empty() {
    return vec![];
  }

  let mut publishers: BTreeMap<&str, BTreeSet<Outcome>> = BTreeMap::new();
  for (start, _, on) in triggering {
    publishers.entry(start.as_str()).or_default().extend(on.iter().copied());
  }

  let mut steps = vec![WiringStep::EnsureChannel {
    channel: channel.to_string(),
  }];
  for (start, outcomes) in publishers {
    steps.push(WiringStep::GrantPublish {
      channel: channel.to_string(),
      function: start.to_string(),
    });
    steps.push(WiringStep::Notify {
      function: start.to_string(),
      channel: channel.to_string(),
      params: NotifyParams {
        on: outcomes.into_iter().collect(),
        identity: start.to_string(),
      },
    });
  }
  for (start, target, on) in triggering {
    steps.push(WiringStep::Subscribe {
      function: target.clone(),
      trigger: TriggerSpec {
        on: on.clone(),
        source: TriggerSource::Topic,
        name: channel.to_string(),
        args: BTreeMap::from([(SOURCE_ATTRIBUTE.to_string(), start.clone())]),
      },
    });
  }
  steps
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
  Unvisited,
  InProgress,
  Done,
}

/// First node found on a loop of triggering edges, if any.
fn trigger_cycle(graph: &OrchestrationGraph) -> Option<String> {
  let mut adjacency: BTreeMap<&str, Vec<&str>> = graph.names().map(|n| (n, vec![])).collect();
  for (from, to, params) in graph.edges() {
    if !params.triggers {
      continue;
    }
    if let Some(targets) = adjacency.get_mut(from) {
      targets.push(to);
    }
  }

  fn visit<'a>(
    node: &'a str,
    adjacency: &BTreeMap<&'a str, Vec<&'a str>>,
    marks: &mut BTreeMap<&'a str, Mark>,
  ) -> Option<&'a str> {
    marks.insert(node, Mark::InProgress);
    for &next in adjacency.get(node).into_iter().flatten() {
      match marks.get(next).copied().unwrap_or(Mark::Unvisited) {
        Mark::InProgress => return Some(next),
        Mark::Unvisited => {
          if let Some(found) = visit(next, adjacency, marks) {
            return Some(found);
          }
        }
        Mark::Done => {}
      }
    }
    marks.insert(node, Mark::Done);
    None
  }

  let mut marks = BTreeMap::new();
  for &node in adjacency.keys() {
    if marks.contains_key(node) {
      continue;
    }
    if let Some(found) = visit(node, &adjacency, &mut marks) {
      return Some(found.to_string());
    }
  }
  None
}
