use std::collections::{BTreeMap, BTreeSet};

use restmap_compiler::FunctionDeployment;
use restmap_executor::Outcome;
use serde::{Deserialize, Serialize};

use crate::error::OrchestrationError;
use crate::subgraphs::Subgraphs;

/// A compiled unit placed in the orchestration graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrchestrationNode {
  pub name: String,
  pub deployment: FunctionDeployment,
}

impl OrchestrationNode {
  pub fn new(name: impl Into<String>, deployment: FunctionDeployment) -> Self {
    Self {
      name: name.into(),
      deployment,
    }
  }

  /// Function uid the node is deployed under.
  pub fn uid(&self) -> &str {
    &self.deployment.uid
  }
}

/// How an edge is wired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeParams {
  /// Whether the upstream outcome triggers the downstream function.
  pub triggers: bool,
  /// Upstream outcomes that qualify.
  pub on: Vec<Outcome>,
}

impl Default for EdgeParams {
  fn default() -> Self {
    Self {
      triggers: true,
      on: vec![Outcome::Success],
    }
  }
}

impl EdgeParams {
  /// Take `triggers` from `update` and add any new outcomes.
  pub fn merge(&mut self, update: EdgeParams) {
    self.triggers = update.triggers;
    for outcome in update.on {
      if !self.on.contains(&outcome) {
        self.on.push(outcome);
      }
    }
  }
}

/// Execution dependencies between compiled units.
///
/// Every edge endpoint is a node of the graph. Adjacency is kept in both
/// directions so upstream and downstream lookups are constant time.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestrationGraph {
  nodes: BTreeMap<String, OrchestrationNode>,
  edges: BTreeMap<(String, String), EdgeParams>,
  /// node -> downstream nodes
  adjacency: BTreeMap<String, BTreeSet<String>>,
  /// node -> upstream nodes
  reverse_adjacency: BTreeMap<String, BTreeSet<String>>,
  is_directed: bool,
}

impl Default for OrchestrationGraph {
  fn default() -> Self {
    Self::new(true)
  }
}

impl OrchestrationGraph {
  pub fn new(is_directed: bool) -> Self {
    Self {
      nodes: BTreeMap::new(),
      edges: BTreeMap::new(),
      adjacency: BTreeMap::new(),
      reverse_adjacency: BTreeMap::new(),
      is_directed,
    }
  }

  pub fn is_directed(&self) -> bool {
    self.is_directed
  }

  /// Insert a node. Returns false, leaving the graph unchanged, if a node
  /// with the same name is already present.
  pub fn insert(&mut self, node: OrchestrationNode) -> bool {
    if self.nodes.contains_key(&node.name) {
      return false;
    }
    self.adjacency.entry(node.name.clone()).or_default();
    self.reverse_adjacency.entry(node.name.clone()).or_default();
    self.nodes.insert(node.name.clone(), node);
    true
  }

  /// Remove a node and every edge touching it.
  pub fn remove(&mut self, name: &str) -> Option<OrchestrationNode> {
    let node = self.nodes.remove(name)?;

    self.edges.retain(|(from, to), _| from != name && to != name);
    self.adjacency.remove(name);
    self.reverse_adjacency.remove(name);
    for targets in self.adjacency.values_mut() {
      targets.remove(name);
    }
    for sources in self.reverse_adjacency.values_mut() {
      sources.remove(name);
    }

    Some(node)
  }

  pub fn node(&self, name: &str) -> Option<&OrchestrationNode> {
    self.nodes.get(name)
  }

  /// Nodes in name order.
  pub fn nodes(&self) -> impl Iterator<Item = &OrchestrationNode> {
    self.nodes.values()
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.nodes.keys().map(|k| k.as_str())
  }

  pub fn contains(&self, name: &str) -> bool {
    self.nodes.contains_key(name)
  }

  /// Add an edge, replacing the parameters of an existing one.
  pub fn add_edge(
    &mut self,
    from: &str,
    to: &str,
    params: EdgeParams,
  ) -> Result<(), OrchestrationError> {
    self.check_endpoints(from, to)?;
    let key = self.key(from, to);
    self.edges.insert(key, params);
    self.link(from, to);
    Ok(())
  }

  /// Merge `params` into an edge, creating it if absent.
  pub fn update_edge(
    &mut self,
    from: &str,
    to: &str,
    params: EdgeParams,
  ) -> Result<(), OrchestrationError> {
    self.check_endpoints(from, to)?;
    let key = self.key(from, to);
    match self.edges.get_mut(&key) {
      Some(existing) => existing.merge(params),
      None => {
        self.edges.insert(key, params);
        self.link(from, to);
      }
    }
    Ok(())
  }

  pub fn edge(&self, from: &str, to: &str) -> Option<&EdgeParams> {
    self.edges.get(&self.key(from, to))
  }

  /// Edges in `(from, to)` order.
  pub fn edges(&self) -> impl Iterator<Item = (&str, &str, &EdgeParams)> {
    self
      .edges
      .iter()
      .map(|((from, to), params)| (from.as_str(), to.as_str(), params))
  }

  pub fn edge_count(&self) -> usize {
    self.edges.len()
  }

  pub fn remove_edge(&mut self, from: &str, to: &str) -> Option<EdgeParams> {
    let key = self.key(from, to);
    let params = self.edges.remove(&key)?;
    self.unlink(from, to);
    Some(params)
  }

  /// Nodes without an incoming edge, in name order.
  pub fn roots(&self) -> Vec<&str> {
    self
      .nodes
      .keys()
      .filter(|name| self.reverse_adjacency.get(*name).is_none_or(|s| s.is_empty()))
      .map(|name| name.as_str())
      .collect()
  }

  pub fn upstream(&self, name: &str) -> impl Iterator<Item = &str> {
    self
      .reverse_adjacency
      .get(name)
      .into_iter()
      .flatten()
      .map(|n| n.as_str())
  }

  pub fn downstream(&self, name: &str) -> impl Iterator<Item = &str> {
    self
      .adjacency
      .get(name)
      .into_iter()
      .flatten()
      .map(|n| n.as_str())
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Weakly connected components, computed lazily.
  pub fn subgraphs(&self) -> Subgraphs<'_> {
    Subgraphs::new(self)
  }

  /// The subgraph made of `names` and the edges strictly between them.
  pub fn induced(&self, names: &BTreeSet<String>) -> OrchestrationGraph {
    let mut graph = OrchestrationGraph::new(self.is_directed);
    for node in self.nodes.values().filter(|n| names.contains(&n.name)) {
      graph.insert(node.clone());
    }
    for ((from, to), params) in &self.edges {
      if names.contains(from) && names.contains(to) {
        graph.edges.insert((from.clone(), to.clone()), params.clone());
        graph.link(from, to);
      }
    }
    graph
  }

  fn check_endpoints(&self, from: &str, to: &str) -> Result<(), OrchestrationError> {
    for name in [from, to] {
      if !self.nodes.contains_key(name) {
        return Err(OrchestrationError::MissingNode {
          from: from.to_string(),
          to: to.to_string(),
          missing: name.to_string(),
        });
      }
    }
    Ok(())
  }

  /// Storage key of an edge. Undirected edges are stored once, under the
  /// ordered pair.
  fn key(&self, from: &str, to: &str) -> (String, String) {
    if !self.is_directed && to < from {
      (to.to_string(), from.to_string())
    } else {
      (from.to_string(), to.to_string())
    }
  }

  fn link(&mut self, from: &str, to: &str) {
    self
      .adjacency
      .entry(from.to_string())
      .or_default()
      .insert(to.to_string());
    self
      .reverse_adjacency
      .entry(to.to_string())
      .or_default()
      .insert(from.to_string());
    if !self.is_directed {
      self
        .adjacency
        .entry(to.to_string())
        .or_default()
        .insert(from.to_string());
      self
        .reverse_adjacency
        .entry(from.to_string())
        .or_default()
        .insert(to.to_string());
    }
  }

  fn unlink(&mut self, from: &str, to: &str) {
    let pairs = if self.is_directed {
      vec![(from, to)]
    } else {
      vec![(from, to), (to, from)]
    };
    for (a, b) in pairs {
      if let Some(targets) = self.adjacency.get_mut(a) {
        targets.remove(b);
      }
      if let Some(sources) = self.reverse_adjacency.get_mut(b) {
        sources.remove(a);
      }
    }
  }
}
