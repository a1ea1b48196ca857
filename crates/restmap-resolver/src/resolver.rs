use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use restmap_config::{ConfigDef, TemplateDef};
use restmap_graph::{
  Endpoint, EndpointKind, Output, Param, ResolutionGraph, ResolverKind, ResolverNode,
};
use tracing::{debug, info, instrument};

use crate::declaration::{
  Category, EndpointDecl, EndpointShape, Reference, ResolverShape, output_kind,
};
use crate::error::ResolutionError;

/// Resolver transforms a template into a resolution graph.
pub trait Resolver: Send + Sync {
  /// Resolve a template into a fully cross-linked graph.
  ///
  /// This process:
  /// 1. Checks every declaration's kind and required fields
  /// 2. Checks that every reference names a declared node
  /// 3. Places nodes once everything they reference has been placed
  fn resolve(&self, template: &TemplateDef) -> Result<ResolutionGraph, ResolutionError>;
}

/// Pass-based fixpoint resolver.
///
/// Keeps one unresolved-name set per category and sweeps all four until they
/// are empty. A sweep that places nothing means the remaining declarations
/// reference each other in a cycle.
#[derive(Debug, Clone, Default)]
pub struct StandardResolver;

type ReferenceMap<'a> = BTreeMap<Reference<'a>, Vec<Reference<'a>>>;

impl StandardResolver {
  pub fn new() -> Self {
    Self
  }

  /// Resolve and also report how many passes were needed.
  #[instrument(skip_all, fields(template = %template.name()))]
  pub fn resolve_with_passes(
    &self,
    template: &TemplateDef,
  ) -> Result<(ResolutionGraph, usize), ResolutionError> {
    let config = &template.config;
    let references = collect_references(config)?;
    check_references(config, &references)?;

    let mut unresolved: BTreeMap<Category, BTreeSet<&str>> = Category::ALL
      .iter()
      .map(|category| (*category, category.names(config).into_iter().collect()))
      .collect();
    let mut graph = ResolutionGraph::new();
    let mut passes = 0;

    while unresolved.values().any(|names| !names.is_empty()) {
      passes += 1;
      let mut placed = 0;

      for category in Category::ALL {
        let candidates: Vec<&str> = unresolved[&category].iter().copied().collect();
        for name in candidates {
          let ready = references[&(category, name)]
            .iter()
            .all(|(dep_category, dep)| !unresolved[dep_category].contains(dep));
          if !ready {
            continue;
          }

          place(config, category, name, &mut graph)?;
          if let Some(names) = unresolved.get_mut(&category) {
            names.remove(name);
          }
          placed += 1;
        }
      }

      debug!(pass = passes, placed, "resolution pass finished");

      if placed == 0 {
        let remaining = unresolved
          .iter()
          .flat_map(|(category, names)| names.iter().map(move |name| format!("{category}:{name}")))
          .collect();
        return Err(ResolutionError::CyclicDependency { remaining });
      }
    }

    let (endpoints, params, resolvers, outputs) = graph.counts();
    info!(
      passes,
      endpoints, params, resolvers, outputs, "template resolved"
    );

    Ok((graph, passes))
  }
}

impl Resolver for StandardResolver {
  fn resolve(&self, template: &TemplateDef) -> Result<ResolutionGraph, ResolutionError> {
    self.resolve_with_passes(template).map(|(graph, _)| graph)
  }
}

/// Classify every declaration and collect its outgoing references.
fn collect_references(config: &ConfigDef) -> Result<ReferenceMap<'_>, ResolutionError> {
  let mut references = BTreeMap::new();

  for (name, def) in &config.endpoints {
    let decl = EndpointDecl::classify(name, def)?;
    references.insert((Category::Endpoint, name.as_str()), decl.references(def));
  }

  for (name, def) in &config.params {
    references.insert(
      (Category::Param, name.as_str()),
      vec![(Category::Resolver, def.resolver.as_str())],
    );
  }

  for (name, def) in &config.resolvers {
    let shape = ResolverShape::classify(name, def)?;
    references.insert((Category::Resolver, name.as_str()), shape.references());
  }

  for (name, def) in &config.outputs {
    output_kind(name, def)?;
    references.insert((Category::Output, name.as_str()), vec![]);
  }

  Ok(references)
}

/// Fail on the first reference to a name the template never declares.
fn check_references(config: &ConfigDef, references: &ReferenceMap<'_>) -> Result<(), ResolutionError> {
  for ((_, referrer), targets) in references {
    for (category, target) in targets {
      if !category.declares(config, target) {
        return Err(ResolutionError::MissingReference {
          referrer: referrer.to_string(),
          target: target.to_string(),
        });
      }
    }
  }
  Ok(())
}

/// Build one declaration's node and add it to the graph.
///
/// Every reference must already be placed. A name that is already in the
/// graph is left as is.
fn place(
  config: &ConfigDef,
  category: Category,
  name: &str,
  graph: &mut ResolutionGraph,
) -> Result<(), ResolutionError> {
  match category {
    Category::Endpoint => {
      if graph.endpoint(name).is_some() {
        return Ok(());
      }
      let def = &config.endpoints[name];
      let decl = EndpointDecl::classify(name, def)?;

      let outputs = def
        .outputs
        .iter()
        .map(|output| lookup(graph.output(output), name, output))
        .collect::<Result<Vec<_>, _>>()?;

      let kind = match decl.shape {
        EndpointShape::Base { url } => EndpointKind::BaseUrl {
          url: url.to_string(),
        },
        EndpointShape::Relative {
          base,
          relative,
          params,
        } => EndpointKind::RelativeUrl {
          relative: relative.to_string(),
          base: lookup(graph.endpoint(base), name, base)?,
          params: params
            .iter()
            .map(|param| lookup(graph.param(param), name, param))
            .collect::<Result<Vec<_>, _>>()?,
        },
      };

      graph.add_endpoint(Endpoint {
        name: name.to_string(),
        description: def.description.clone(),
        method: decl.method,
        body: def.body.clone(),
        outputs,
        kind,
      });
    }
    Category::Param => {
      if graph.param(name).is_some() {
        return Ok(());
      }
      let def = &config.params[name];
      let resolver = lookup(graph.resolver(&def.resolver), name, &def.resolver)?;

      graph.add_param(Param {
        name: name.to_string(),
        description: def.description.clone(),
        param_type: def.param_type.clone(),
        resolver,
      });
    }
    Category::Resolver => {
      if graph.resolver(name).is_some() {
        return Ok(());
      }
      let def = &config.resolvers[name];

      let kind = match ResolverShape::classify(name, def)? {
        ResolverShape::Endpoint { endpoint } => ResolverKind::Endpoint {
          endpoint: lookup(graph.endpoint(endpoint), name, endpoint)?,
          select: def.select.clone(),
        },
        ResolverShape::Database {
          connection_string,
          table,
        } => ResolverKind::Database {
          connection_string: connection_string.to_string(),
          table: table.to_string(),
        },
      };

      graph.add_resolver(ResolverNode {
        name: name.to_string(),
        description: def.description.clone(),
        authentication: def.authentication.clone(),
        kind,
      });
    }
    Category::Output => {
      if graph.output(name).is_some() {
        return Ok(());
      }
      let def = &config.outputs[name];

      graph.add_output(Output {
        name: name.to_string(),
        description: def.description.clone(),
        kind: output_kind(name, def)?,
        target: def.target.clone(),
        config: def.config.clone(),
      });
    }
  }

  Ok(())
}

fn lookup<T>(found: Option<&Arc<T>>, referrer: &str, target: &str) -> Result<Arc<T>, ResolutionError> {
  found.cloned().ok_or_else(|| ResolutionError::MissingReference {
    referrer: referrer.to_string(),
    target: target.to_string(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn template(config: &str) -> TemplateDef {
    let source = format!("version: '1'\nkind: restmap\nconfig:\n{config}");
    TemplateDef::from_yaml_str(&source).unwrap()
  }

  #[test]
  fn test_resolve_base_endpoint() {
    let template = template(
      r#"
  endpoints:
    api:
      kind: baseurl
      url: https://svc.example.com
"#,
    );

    let (graph, passes) = StandardResolver::new().resolve_with_passes(&template).unwrap();
    assert_eq!(passes, 1);
    assert_eq!(graph.counts(), (1, 0, 0, 0));
    assert_eq!(graph.endpoint("api").unwrap().url(), "https://svc.example.com");
  }

  #[test]
  fn test_unknown_endpoint_kind() {
    let template = template(
      r#"
  endpoints:
    api:
      kind: graphql
"#,
    );

    let err = StandardResolver::new().resolve(&template).unwrap_err();
    assert_eq!(
      err,
      ResolutionError::UnknownKind {
        name: "api".to_string(),
        kind: "graphql".to_string(),
      }
    );
    assert_eq!(err.node(), Some("api"));
  }

  #[test]
  fn test_unknown_output_kind() {
    let template = template(
      r#"
  outputs:
    archive:
      kind: ftp
      target: incoming
"#,
    );

    let err = StandardResolver::new().resolve(&template).unwrap_err();
    assert!(matches!(err, ResolutionError::UnknownKind { kind, .. } if kind == "ftp"));
  }

  #[test]
  fn test_missing_required_field() {
    let template = template(
      r#"
  endpoints:
    users:
      kind: relativeurl
      relative: /users
"#,
    );

    let err = StandardResolver::new().resolve(&template).unwrap_err();
    assert_eq!(
      err,
      ResolutionError::MissingField {
        name: "users".to_string(),
        field: "base",
      }
    );
  }

  #[test]
  fn test_invalid_method() {
    let template = template(
      r#"
  endpoints:
    api:
      kind: baseurl
      url: https://svc.example.com
      method: FETCH
"#,
    );

    let err = StandardResolver::new().resolve(&template).unwrap_err();
    assert!(matches!(err, ResolutionError::InvalidMethod { method, .. } if method == "FETCH"));
  }

  #[test]
  fn test_self_referencing_base_is_cyclic() {
    let template = template(
      r#"
  endpoints:
    users:
      kind: relativeurl
      base: users
      relative: /users
"#,
    );

    let err = StandardResolver::new().resolve(&template).unwrap_err();
    assert_eq!(
      err,
      ResolutionError::CyclicDependency {
        remaining: vec!["endpoint:users".to_string()],
      }
    );
  }

  #[test]
  fn test_passes_bounded_by_node_count() {
    // Declared in reverse dependency order so each pass places one endpoint.
    let template = template(
      r#"
  endpoints:
    a:
      kind: relativeurl
      base: b
      relative: /a
    b:
      kind: relativeurl
      base: c
      relative: /b
    c:
      kind: baseurl
      url: https://svc.example.com
"#,
    );

    let (graph, passes) = StandardResolver::new().resolve_with_passes(&template).unwrap();
    assert_eq!(passes, 3);
    assert!(passes <= template.declaration_count());
    assert_eq!(graph.endpoint("a").unwrap().url(), "https://svc.example.com/b/a");
  }

  #[test]
  fn test_references_share_placed_instances() {
    let template = template(
      r#"
  endpoints:
    api:
      kind: baseurl
      url: https://svc.example.com
    users:
      kind: relativeurl
      base: api
      relative: /users/{scope}
      params: [scope]
      outputs: [archive]
  params:
    scope:
      resolver: scopes
  resolvers:
    scopes:
      kind: DatabaseResolver
      connectionstring: postgres://db
      table: scopes
  outputs:
    archive:
      kind: blob
      target: raw-users
"#,
    );

    let graph = StandardResolver::new().resolve(&template).unwrap();
    let users = graph.endpoint("users").unwrap();

    let scope = &users.params()[0];
    assert!(Arc::ptr_eq(scope, graph.param("scope").unwrap()));
    assert!(Arc::ptr_eq(&scope.resolver, graph.resolver("scopes").unwrap()));
    assert!(Arc::ptr_eq(&users.outputs[0], graph.output("archive").unwrap()));
    assert_eq!(scope.param_type, "string");
  }
}
