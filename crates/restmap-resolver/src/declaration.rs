//! Kind checking for raw declarations.
//!
//! Every declaration is classified once, up front, into a shape whose
//! references are still plain names. The fixpoint loop only ever looks at
//! those references; building the typed node happens when they are all
//! placed.

use std::fmt;

use restmap_config::{ConfigDef, EndpointDef, OutputDef, ResolverDef};
use restmap_graph::{Method, OutputKind};

use crate::error::ResolutionError;

/// Declaration category. Names are unique within a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
  Endpoint,
  Param,
  Resolver,
  Output,
}

impl Category {
  pub const ALL: [Category; 4] = [
    Category::Endpoint,
    Category::Param,
    Category::Resolver,
    Category::Output,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Category::Endpoint => "endpoint",
      Category::Param => "param",
      Category::Resolver => "resolver",
      Category::Output => "output",
    }
  }

  /// Whether the template declares `name` in this category.
  pub(crate) fn declares(&self, config: &ConfigDef, name: &str) -> bool {
    match self {
      Category::Endpoint => config.endpoints.contains_key(name),
      Category::Param => config.params.contains_key(name),
      Category::Resolver => config.resolvers.contains_key(name),
      Category::Output => config.outputs.contains_key(name),
    }
  }

  /// Declared names in this category, in name order.
  pub(crate) fn names<'a>(&self, config: &'a ConfigDef) -> Vec<&'a str> {
    match self {
      Category::Endpoint => config.endpoints.keys().map(String::as_str).collect(),
      Category::Param => config.params.keys().map(String::as_str).collect(),
      Category::Resolver => config.resolvers.keys().map(String::as_str).collect(),
      Category::Output => config.outputs.keys().map(String::as_str).collect(),
    }
  }
}

impl fmt::Display for Category {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A reference from one declaration to another.
pub(crate) type Reference<'a> = (Category, &'a str);

pub(crate) enum EndpointShape<'a> {
  Base {
    url: &'a str,
  },
  Relative {
    base: &'a str,
    relative: &'a str,
    params: Vec<&'a str>,
  },
}

pub(crate) struct EndpointDecl<'a> {
  pub shape: EndpointShape<'a>,
  pub method: Method,
}

impl<'a> EndpointDecl<'a> {
  pub fn classify(name: &str, def: &'a EndpointDef) -> Result<Self, ResolutionError> {
    let shape = match def.kind.as_str() {
      "baseurl" => EndpointShape::Base {
        url: required(name, "url", def.url.as_deref())?,
      },
      "relativeurl" => EndpointShape::Relative {
        base: required(name, "base", def.base.as_deref())?,
        relative: required(name, "relative", def.relative.as_deref())?,
        params: def.param_names(),
      },
      other => return Err(unknown_kind(name, other)),
    };

    let method = match def.method.as_deref() {
      None => Method::default(),
      Some(method) => Method::parse(method).ok_or_else(|| ResolutionError::InvalidMethod {
        name: name.to_string(),
        method: method.to_string(),
      })?,
    };

    Ok(Self { shape, method })
  }

  pub fn references(&self, def: &'a EndpointDef) -> Vec<Reference<'a>> {
    let mut refs = Vec::new();
    if let EndpointShape::Relative { base, params, .. } = &self.shape {
      refs.push((Category::Endpoint, *base));
      refs.extend(params.iter().map(|p| (Category::Param, *p)));
    }
    refs.extend(def.outputs.iter().map(|o| (Category::Output, o.as_str())));
    refs
  }
}

pub(crate) enum ResolverShape<'a> {
  Endpoint {
    endpoint: &'a str,
  },
  Database {
    connection_string: &'a str,
    table: &'a str,
  },
}

impl<'a> ResolverShape<'a> {
  pub fn classify(name: &str, def: &'a ResolverDef) -> Result<Self, ResolutionError> {
    match def.kind.as_str() {
      "EndpointResolver" => Ok(ResolverShape::Endpoint {
        endpoint: required(name, "endpoint", def.endpoint.as_deref())?,
      }),
      "DatabaseResolver" => Ok(ResolverShape::Database {
        connection_string: required(name, "connectionstring", def.connectionstring.as_deref())?,
        table: required(name, "table", def.table.as_deref())?,
      }),
      other => Err(unknown_kind(name, other)),
    }
  }

  pub fn references(&self) -> Vec<Reference<'a>> {
    match self {
      ResolverShape::Endpoint { endpoint } => vec![(Category::Endpoint, *endpoint)],
      ResolverShape::Database { .. } => vec![],
    }
  }
}

pub(crate) fn output_kind(name: &str, def: &OutputDef) -> Result<OutputKind, ResolutionError> {
  OutputKind::parse(&def.kind).ok_or_else(|| unknown_kind(name, &def.kind))
}

fn required<'a>(
  name: &str,
  field: &'static str,
  value: Option<&'a str>,
) -> Result<&'a str, ResolutionError> {
  value.ok_or_else(|| ResolutionError::MissingField {
    name: name.to_string(),
    field,
  })
}

fn unknown_kind(name: &str, kind: &str) -> ResolutionError {
  ResolutionError::UnknownKind {
    name: name.to_string(),
    kind: kind.to_string(),
  }
}
