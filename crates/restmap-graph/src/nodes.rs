use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// HTTP method used to call an endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
  #[default]
  Get,
  Put,
  Post,
  Patch,
  Delete,
}

impl Method {
  /// Parse a method name, case-insensitively.
  pub fn parse(value: &str) -> Option<Self> {
    match value.to_ascii_uppercase().as_str() {
      "GET" => Some(Method::Get),
      "PUT" => Some(Method::Put),
      "POST" => Some(Method::Post),
      "PATCH" => Some(Method::Patch),
      "DELETE" => Some(Method::Delete),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Put => "PUT",
      Method::Post => "POST",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
    }
  }

  /// Methods that send a request body.
  pub fn requires_body(&self) -> bool {
    matches!(self, Method::Post | Method::Put | Method::Patch)
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
  pub name: String,
  pub description: String,
  pub method: Method,
  pub body: Option<serde_json::Value>,
  pub outputs: Vec<Arc<Output>>,
  pub kind: EndpointKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EndpointKind {
  BaseUrl {
    url: String,
  },
  RelativeUrl {
    relative: String,
    base: Arc<Endpoint>,
    params: Vec<Arc<Param>>,
  },
}

impl Endpoint {
  /// Full URL template, with `{param}` placeholders left in place.
  pub fn url(&self) -> String {
    match &self.kind {
      EndpointKind::BaseUrl { url } => url.clone(),
      EndpointKind::RelativeUrl { relative, base, .. } => {
        let base = base.url();
        format!(
          "{}/{}",
          base.trim_end_matches('/'),
          relative.trim_start_matches('/')
        )
      }
    }
  }

  pub fn params(&self) -> &[Arc<Param>] {
    match &self.kind {
      EndpointKind::BaseUrl { .. } => &[],
      EndpointKind::RelativeUrl { params, .. } => params,
    }
  }

  pub fn is_relative(&self) -> bool {
    matches!(self.kind, EndpointKind::RelativeUrl { .. })
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
  pub name: String,
  pub description: String,
  pub param_type: String,
  pub resolver: Arc<ResolverNode>,
}

/// A declaration that supplies a runtime value to parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverNode {
  pub name: String,
  pub description: String,
  pub authentication: Option<serde_json::Value>,
  pub kind: ResolverKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolverKind {
  Endpoint {
    endpoint: Arc<Endpoint>,
    select: Option<String>,
  },
  Database {
    connection_string: String,
    table: String,
  },
}

impl ResolverNode {
  /// The endpoint this resolver reads from, if any.
  pub fn endpoint(&self) -> Option<&Arc<Endpoint>> {
    match &self.kind {
      ResolverKind::Endpoint { endpoint, .. } => Some(endpoint),
      ResolverKind::Database { .. } => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
  Blob,
  Table,
  Queue,
  Database,
}

impl OutputKind {
  pub fn parse(value: &str) -> Option<Self> {
    match value.to_ascii_lowercase().as_str() {
      "blob" => Some(OutputKind::Blob),
      "table" => Some(OutputKind::Table),
      "queue" => Some(OutputKind::Queue),
      "database" => Some(OutputKind::Database),
      _ => None,
    }
  }

  pub fn sink_kind(&self) -> SinkKind {
    match self {
      OutputKind::Blob => SinkKind::Bucket,
      OutputKind::Table | OutputKind::Database => SinkKind::Table,
      OutputKind::Queue => SinkKind::Queue,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Output {
  pub name: String,
  pub description: String,
  pub kind: OutputKind,
  pub target: String,
  pub config: serde_json::Map<String, serde_json::Value>,
}

/// Backend construct a function writes its results into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
  Queue,
  Bucket,
  Table,
  Topic,
}

impl SinkKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      SinkKind::Queue => "queue",
      SinkKind::Bucket => "bucket",
      SinkKind::Table => "table",
      SinkKind::Topic => "topic",
    }
  }
}

impl fmt::Display for SinkKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
