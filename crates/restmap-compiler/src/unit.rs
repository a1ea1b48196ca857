use std::collections::BTreeSet;
use std::sync::Arc;

use restmap_graph::{Endpoint, EndpointKind, ResolutionGraph, ResolverNode};

/// Something that becomes exactly one function deployment.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutableUnit {
  /// An endpoint call, together with the resolvers feeding its parameters.
  Endpoint {
    endpoint: Arc<Endpoint>,
    resolvers: Vec<Arc<ResolverNode>>,
    /// Distinct descriptors carried by the resolvers reading this endpoint,
    /// in resolver name order. More than one cannot be compiled.
    authentication: Vec<serde_json::Value>,
  },
  /// A resolver turning an upstream result or a table into parameter values.
  ///
  /// An endpoint resolver's descriptor authenticates the endpoint it reads
  /// and is compiled into that endpoint's unit. A database resolver's
  /// descriptor authenticates its own table read.
  Resolver {
    resolver: Arc<ResolverNode>,
    /// Parameters this resolver supplies.
    feeds: Vec<String>,
  },
}

impl ExecutableUnit {
  pub fn name(&self) -> &str {
    match self {
      ExecutableUnit::Endpoint { endpoint, .. } => &endpoint.name,
      ExecutableUnit::Resolver { resolver, .. } => &resolver.name,
    }
  }

  /// Declaration category of the unit.
  pub fn category(&self) -> &'static str {
    match self {
      ExecutableUnit::Endpoint { .. } => "endpoint",
      ExecutableUnit::Resolver { .. } => "resolver",
    }
  }

  /// Name qualified by category, e.g. `resolver:regions`.
  ///
  /// Names are only unique within a category, so an endpoint and a resolver
  /// may share one; the qualified name never collides.
  pub fn qualified_name(&self) -> String {
    Self::qualify(self.category(), self.name())
  }

  pub fn qualify(category: &str, name: &str) -> String {
    format!("{category}:{name}")
  }

  /// Collect every executable unit of a graph, endpoints first, each group in
  /// name order.
  ///
  /// A base URL endpoint that only serves as the base of relative endpoints
  /// is not called on its own and produces no unit.
  pub fn collect(graph: &ResolutionGraph) -> Vec<ExecutableUnit> {
    let bases: BTreeSet<&str> = graph
      .endpoints()
      .filter_map(|endpoint| match &endpoint.kind {
        EndpointKind::RelativeUrl { base, .. } => Some(base.name.as_str()),
        EndpointKind::BaseUrl { .. } => None,
      })
      .collect();

    let mut units = Vec::new();

    for endpoint in graph.endpoints() {
      let readers = graph.resolvers_reading(&endpoint.name);
      let base_only = !endpoint.is_relative()
        && bases.contains(endpoint.name.as_str())
        && readers.is_empty()
        && endpoint.outputs.is_empty();
      if base_only {
        continue;
      }

      units.push(ExecutableUnit::Endpoint {
        endpoint: endpoint.clone(),
        resolvers: graph.resolvers_feeding(endpoint),
        authentication: distinct_descriptors(&readers),
      });
    }

    for resolver in graph.resolvers() {
      let feeds = graph
        .params()
        .filter(|param| param.resolver.name == resolver.name)
        .map(|param| param.name.clone())
        .collect();

      units.push(ExecutableUnit::Resolver {
        resolver: resolver.clone(),
        feeds,
      });
    }

    units
  }
}

fn distinct_descriptors(readers: &[Arc<ResolverNode>]) -> Vec<serde_json::Value> {
  let mut descriptors: Vec<serde_json::Value> = Vec::new();
  for descriptor in readers.iter().filter_map(|r| r.authentication.as_ref()) {
    if !descriptors.contains(descriptor) {
      descriptors.push(descriptor.clone());
    }
  }
  descriptors
}
