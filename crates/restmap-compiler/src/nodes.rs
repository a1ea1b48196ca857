//! Code-generating node kinds.
//!
//! Each node owns the attributes its template sees. Attributes are plain
//! serializable structs so the same values show up in templates, in debug
//! output and in tests.

use restmap_graph::{Method, SinkKind};
use serde::Serialize;

use crate::error::CompilationError;

pub const HEADER_TEMPLATE: &str = "functions/aws/header.jinja";
pub const AUTHENTICATOR_TEMPLATE: &str = "functions/aws/authenticator.jinja";
pub const HANDLER_TEMPLATE: &str = "functions/aws/handler.jinja";
pub const REQUEST_HANDLER_TEMPLATE: &str = "functions/aws/request_handler.jinja";
pub const BODY_PARSER_TEMPLATE: &str = "functions/aws/body_parser.jinja";
pub const TABLE_READER_TEMPLATE: &str = "functions/aws/table_reader.jinja";
pub const LOADER_TEMPLATE: &str = "functions/aws/loader.jinja";
pub const RESPONSE_HANDLER_TEMPLATE: &str = "functions/aws/response_handler.jinja";

/// Module-level imports and default request headers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Header {
  pub imports: Vec<String>,
  pub user_agent: String,
  pub accept: String,
  pub accept_language: String,
  pub cache_control: String,
}

impl Header {
  pub fn new(imports: Vec<String>, user_agent: impl Into<String>) -> Self {
    Self {
      imports,
      user_agent: user_agent.into(),
      accept: "text/html, application/json".to_string(),
      accept_language: "en-US".to_string(),
      cache_control: "max-age=0".to_string(),
    }
  }
}

/// Applies an authentication descriptor to outgoing request headers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Authenticator {
  /// The descriptor as JSON text, embedded verbatim in generated code.
  pub descriptor: String,
}

/// Function entry point. Encloses the per-invocation steps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Handler {
  pub name: String,
  pub error_code: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestHandler {
  pub method: Method,
  pub url: String,
  pub authenticated: bool,
  pub response_type: ResponseType,
  pub response_variable: String,
  pub response_status: u16,
  /// JSON text of the request body.
  pub request_body: Option<String>,
  pub timeout_ms: u64,
  pub retries: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
  #[default]
  Json,
  Text,
}

impl ResponseType {
  pub fn content_type(&self) -> &'static str {
    match self {
      ResponseType::Json => "application/json",
      ResponseType::Text => "text/plain",
    }
  }
}

/// Extracts a value from a payload, optionally walking a dotted path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BodyParser {
  /// Python expression producing the payload.
  pub source: String,
  pub variable: String,
  pub select: Vec<String>,
}

impl BodyParser {
  pub fn new(source: impl Into<String>, variable: impl Into<String>, select: Option<&str>) -> Self {
    Self {
      source: source.into(),
      variable: variable.into(),
      select: select
        .map(|path| {
          path
            .split('.')
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .collect()
        })
        .unwrap_or_default(),
    }
  }
}

/// Reads resolver values from a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableReader {
  pub connection_string: String,
  pub table: String,
  pub variable: String,
  /// Whether the read uses the module's authenticator.
  pub authenticated: bool,
}

/// Writes a value into a sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Loader {
  pub target: String,
  pub sink: SinkKind,
  pub source_variable: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseHandler {
  pub success_code: u16,
  pub error_code: u16,
  pub return_type: ResponseType,
  pub return_variable: String,
  pub content_type: String,
  /// Parameters the returned value is published under.
  pub params: Vec<String>,
}

impl ResponseHandler {
  pub fn new(return_type: ResponseType, return_variable: impl Into<String>) -> Self {
    Self {
      success_code: 200,
      error_code: 500,
      return_type,
      return_variable: return_variable.into(),
      content_type: return_type.content_type().to_string(),
      params: vec![],
    }
  }
}

/// A node in the compiler tree.
#[derive(Debug, Clone, PartialEq)]
pub enum CompilerNode {
  /// Root container; its compiled text is its children's text in order.
  Module,
  Header(Header),
  Authenticator(Authenticator),
  Handler(Handler),
  RequestHandler(RequestHandler),
  BodyParser(BodyParser),
  TableReader(TableReader),
  Loader(Loader),
  ResponseHandler(ResponseHandler),
}

impl CompilerNode {
  pub fn template_id(&self) -> Option<&'static str> {
    match self {
      CompilerNode::Module => None,
      CompilerNode::Header(_) => Some(HEADER_TEMPLATE),
      CompilerNode::Authenticator(_) => Some(AUTHENTICATOR_TEMPLATE),
      CompilerNode::Handler(_) => Some(HANDLER_TEMPLATE),
      CompilerNode::RequestHandler(_) => Some(REQUEST_HANDLER_TEMPLATE),
      CompilerNode::BodyParser(_) => Some(BODY_PARSER_TEMPLATE),
      CompilerNode::TableReader(_) => Some(TABLE_READER_TEMPLATE),
      CompilerNode::Loader(_) => Some(LOADER_TEMPLATE),
      CompilerNode::ResponseHandler(_) => Some(RESPONSE_HANDLER_TEMPLATE),
    }
  }

  /// Template variables for this node.
  pub fn attributes(&self) -> Result<serde_json::Value, serde_json::Error> {
    match self {
      CompilerNode::Module => Ok(serde_json::Value::Object(Default::default())),
      CompilerNode::Header(node) => serde_json::to_value(node),
      CompilerNode::Authenticator(node) => serde_json::to_value(node),
      CompilerNode::Handler(node) => serde_json::to_value(node),
      CompilerNode::RequestHandler(node) => serde_json::to_value(node),
      CompilerNode::BodyParser(node) => serde_json::to_value(node),
      CompilerNode::TableReader(node) => serde_json::to_value(node),
      CompilerNode::Loader(node) => serde_json::to_value(node),
      CompilerNode::ResponseHandler(node) => serde_json::to_value(node),
    }
  }

  /// Check the node's configuration contract before rendering.
  pub fn validate(&self, path: &str, child_count: usize) -> Result<(), CompilationError> {
    let invalid = |reason: String| CompilationError::InvalidConfig {
      node: path.to_string(),
      reason,
    };

    match self {
      CompilerNode::RequestHandler(node) => {
        if node.method.requires_body() && node.request_body.is_none() {
          return Err(invalid(format!("{} requires a request body", node.method)));
        }
        if node.retries == 0 {
          return Err(invalid("retries must be at least 1".to_string()));
        }
      }
      CompilerNode::Handler(_) if child_count == 0 => {
        return Err(invalid("entry point has no steps".to_string()));
      }
      CompilerNode::Loader(node) if node.target.trim().is_empty() => {
        return Err(invalid("loader target is empty".to_string()));
      }
      _ => {}
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn request(method: Method, body: Option<&str>) -> CompilerNode {
    CompilerNode::RequestHandler(RequestHandler {
      method,
      url: "https://svc.example.com/orders".to_string(),
      authenticated: false,
      response_type: ResponseType::Json,
      response_variable: "response".to_string(),
      response_status: 200,
      request_body: body.map(str::to_string),
      timeout_ms: 500,
      retries: 3,
    })
  }

  #[test]
  fn test_post_without_body_is_invalid() {
    let err = request(Method::Post, None)
      .validate("orders/handler/request", 0)
      .unwrap_err();

    match err {
      CompilationError::InvalidConfig { node, reason } => {
        assert_eq!(node, "orders/handler/request");
        assert_eq!(reason, "POST requires a request body");
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn test_post_with_body_is_valid() {
    assert!(request(Method::Post, Some("{}")).validate("orders", 0).is_ok());
    assert!(request(Method::Get, None).validate("orders", 0).is_ok());
  }

  #[test]
  fn test_empty_handler_is_invalid() {
    let handler = CompilerNode::Handler(Handler {
      name: "handler".to_string(),
      error_code: 500,
    });
    assert!(handler.validate("users/handler", 0).is_err());
    assert!(handler.validate("users/handler", 2).is_ok());
  }

  #[test]
  fn test_body_parser_select_path() {
    let parser = BodyParser::new("response.json()", "payload", Some("data..scope"));
    assert_eq!(parser.select, vec!["data", "scope"]);

    let attributes = CompilerNode::BodyParser(parser).attributes().unwrap();
    assert_eq!(attributes["source"], "response.json()");
  }

  #[test]
  fn test_module_has_no_template() {
    assert_eq!(CompilerNode::Module.template_id(), None);
    assert_eq!(request(Method::Get, None).template_id(), Some(REQUEST_HANDLER_TEMPLATE));
  }
}
