use std::collections::BTreeMap;
use std::sync::Arc;

use crate::nodes::{Endpoint, Output, Param, ResolverNode};

/// Typed, fully cross-linked view of a template.
///
/// Nodes are only ever added after everything they reference is present, so
/// the graph is acyclic. Adding a node whose name is already taken returns
/// the stored instance and leaves the graph unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolutionGraph {
  endpoints: BTreeMap<String, Arc<Endpoint>>,
  params: BTreeMap<String, Arc<Param>>,
  resolvers: BTreeMap<String, Arc<ResolverNode>>,
  outputs: BTreeMap<String, Arc<Output>>,
}

impl ResolutionGraph {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_endpoint(&mut self, endpoint: Endpoint) -> Arc<Endpoint> {
    Self::place(&mut self.endpoints, endpoint.name.clone(), endpoint)
  }

  pub fn add_param(&mut self, param: Param) -> Arc<Param> {
    Self::place(&mut self.params, param.name.clone(), param)
  }

  pub fn add_resolver(&mut self, resolver: ResolverNode) -> Arc<ResolverNode> {
    Self::place(&mut self.resolvers, resolver.name.clone(), resolver)
  }

  pub fn add_output(&mut self, output: Output) -> Arc<Output> {
    Self::place(&mut self.outputs, output.name.clone(), output)
  }

  fn place<T>(map: &mut BTreeMap<String, Arc<T>>, name: String, node: T) -> Arc<T> {
    map.entry(name).or_insert_with(|| Arc::new(node)).clone()
  }

  pub fn endpoint(&self, name: &str) -> Option<&Arc<Endpoint>> {
    self.endpoints.get(name)
  }

  pub fn param(&self, name: &str) -> Option<&Arc<Param>> {
    self.params.get(name)
  }

  pub fn resolver(&self, name: &str) -> Option<&Arc<ResolverNode>> {
    self.resolvers.get(name)
  }

  pub fn output(&self, name: &str) -> Option<&Arc<Output>> {
    self.outputs.get(name)
  }

  pub fn endpoints(&self) -> impl Iterator<Item = &Arc<Endpoint>> {
    self.endpoints.values()
  }

  pub fn params(&self) -> impl Iterator<Item = &Arc<Param>> {
    self.params.values()
  }

  pub fn resolvers(&self) -> impl Iterator<Item = &Arc<ResolverNode>> {
    self.resolvers.values()
  }

  pub fn outputs(&self) -> impl Iterator<Item = &Arc<Output>> {
    self.outputs.values()
  }

  /// Resolvers feeding the parameters of an endpoint, deduplicated, in
  /// parameter order.
  pub fn resolvers_feeding(&self, endpoint: &Endpoint) -> Vec<Arc<ResolverNode>> {
    let mut feeding: Vec<Arc<ResolverNode>> = Vec::new();
    for param in endpoint.params() {
      if !feeding.iter().any(|r| r.name == param.resolver.name) {
        feeding.push(param.resolver.clone());
      }
    }
    feeding
  }

  /// Endpoint resolvers that read from the named endpoint.
  pub fn resolvers_reading(&self, endpoint: &str) -> Vec<Arc<ResolverNode>> {
    self
      .resolvers
      .values()
      .filter(|r| r.endpoint().is_some_and(|e| e.name == endpoint))
      .cloned()
      .collect()
  }

  /// Node counts as (endpoints, params, resolvers, outputs).
  pub fn counts(&self) -> (usize, usize, usize, usize) {
    (
      self.endpoints.len(),
      self.params.len(),
      self.resolvers.len(),
      self.outputs.len(),
    )
  }

  pub fn len(&self) -> usize {
    self.endpoints.len() + self.params.len() + self.resolvers.len() + self.outputs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::nodes::{EndpointKind, Method, ResolverKind};

  fn database_resolver(name: &str) -> ResolverNode {
    ResolverNode {
      name: name.to_string(),
      description: String::new(),
      authentication: None,
      kind: ResolverKind::Database {
        connection_string: "postgres://db".to_string(),
        table: "scopes".to_string(),
      },
    }
  }

  fn base_endpoint(name: &str) -> Endpoint {
    Endpoint {
      name: name.to_string(),
      description: String::new(),
      method: Method::Get,
      body: None,
      outputs: vec![],
      kind: EndpointKind::BaseUrl {
        url: "https://svc.example.com".to_string(),
      },
    }
  }

  #[test]
  fn test_add_returns_cached_instance() {
    let mut graph = ResolutionGraph::new();
    let first = graph.add_resolver(database_resolver("scopes"));

    let mut changed = database_resolver("scopes");
    changed.description = "replacement".to_string();
    let second = graph.add_resolver(changed);

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.description, "");
    assert_eq!(graph.len(), 1);
  }

  #[test]
  fn test_resolvers_feeding_deduplicates() {
    let mut graph = ResolutionGraph::new();
    let resolver = graph.add_resolver(database_resolver("scopes"));
    let base = graph.add_endpoint(base_endpoint("api"));

    let mut params = Vec::new();
    for name in ["scope", "region"] {
      params.push(graph.add_param(Param {
        name: name.to_string(),
        description: String::new(),
        param_type: "string".to_string(),
        resolver: resolver.clone(),
      }));
    }

    let users = graph.add_endpoint(Endpoint {
      kind: EndpointKind::RelativeUrl {
        relative: "/users/{scope}/{region}".to_string(),
        base,
        params,
      },
      ..base_endpoint("users")
    });

    let feeding = graph.resolvers_feeding(&users);
    assert_eq!(feeding.len(), 1);
    assert_eq!(feeding[0].name, "scopes");
    assert_eq!(graph.counts(), (2, 2, 1, 0));
  }

  #[test]
  fn test_resolvers_reading() {
    let mut graph = ResolutionGraph::new();
    let lookup = graph.add_endpoint(base_endpoint("lookup"));
    graph.add_resolver(ResolverNode {
      kind: ResolverKind::Endpoint {
        endpoint: lookup,
        select: None,
      },
      ..database_resolver("scope_resolver")
    });
    graph.add_resolver(database_resolver("other"));

    let reading = graph.resolvers_reading("lookup");
    assert_eq!(reading.len(), 1);
    assert_eq!(reading[0].name, "scope_resolver");
    assert!(graph.resolvers_reading("api").is_empty());
  }
}
