//! Template set used to render compiler nodes.
//!
//! Templates are embedded at build time and addressed by path-like ids such
//! as `functions/aws/header.jinja`.

use minijinja::Environment;

use crate::error::CompilationError;
use crate::nodes;

const EMBEDDED: &[(&str, &str)] = &[
  (
    nodes::HEADER_TEMPLATE,
    include_str!("../templates/functions/aws/header.jinja"),
  ),
  (
    nodes::AUTHENTICATOR_TEMPLATE,
    include_str!("../templates/functions/aws/authenticator.jinja"),
  ),
  (
    nodes::HANDLER_TEMPLATE,
    include_str!("../templates/functions/aws/handler.jinja"),
  ),
  (
    nodes::REQUEST_HANDLER_TEMPLATE,
    include_str!("../templates/functions/aws/request_handler.jinja"),
  ),
  (
    nodes::BODY_PARSER_TEMPLATE,
    include_str!("../templates/functions/aws/body_parser.jinja"),
  ),
  (
    nodes::TABLE_READER_TEMPLATE,
    include_str!("../templates/functions/aws/table_reader.jinja"),
  ),
  (
    nodes::LOADER_TEMPLATE,
    include_str!("../templates/functions/aws/loader.jinja"),
  ),
  (
    nodes::RESPONSE_HANDLER_TEMPLATE,
    include_str!("../templates/functions/aws/response_handler.jinja"),
  ),
];

pub struct TemplateSet {
  env: Environment<'static>,
}

impl TemplateSet {
  /// An empty set. Rendering any node fails until templates are added.
  pub fn empty() -> Self {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    Self { env }
  }

  /// The embedded AWS function templates.
  pub fn aws() -> Result<Self, CompilationError> {
    let mut set = Self::empty();
    for &(id, source) in EMBEDDED {
      set.add_template(id, source)?;
    }
    Ok(set)
  }

  /// Add or replace a template.
  pub fn add_template(
    &mut self,
    id: &'static str,
    source: &'static str,
  ) -> Result<(), CompilationError> {
    self
      .env
      .add_template(id, source)
      .map_err(|e| CompilationError::RenderFailure {
        node: id.to_string(),
        template: id.to_string(),
        message: e.to_string(),
      })
  }

  pub fn contains(&self, id: &str) -> bool {
    self.env.get_template(id).is_ok()
  }

  /// Render a template with a node's attributes, the rendered children and
  /// explicit overrides. Overrides win over attributes of the same name.
  pub fn render(
    &self,
    node: &str,
    template_id: &str,
    attributes: serde_json::Value,
    children: &[String],
    overrides: &serde_json::Map<String, serde_json::Value>,
  ) -> Result<String, CompilationError> {
    let failure = |message: String| CompilationError::RenderFailure {
      node: node.to_string(),
      template: template_id.to_string(),
      message,
    };

    let mut context = match attributes {
      serde_json::Value::Object(map) => map,
      other => {
        let mut map = serde_json::Map::new();
        map.insert("value".to_string(), other);
        map
      }
    };
    context.insert("children".to_string(), serde_json::json!(children));
    for (key, value) in overrides {
      context.insert(key.clone(), value.clone());
    }

    let template = self
      .env
      .get_template(template_id)
      .map_err(|e| failure(e.to_string()))?;
    let rendered = template
      .render(&context)
      .map_err(|e| failure(e.to_string()))?;

    Ok(rendered.trim_end().to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_all_embedded_templates_load() {
    let set = TemplateSet::aws().unwrap();
    for &(id, _) in EMBEDDED {
      assert!(set.contains(id), "missing {id}");
    }
  }

  #[test]
  fn test_render_with_overrides() {
    let set = TemplateSet::aws().unwrap();
    let attributes = json!({
      "imports": ["json"],
      "user_agent": "restmap",
      "accept": "application/json",
      "accept_language": "en-US",
      "cache_control": "max-age=0",
    });
    let mut overrides = serde_json::Map::new();
    overrides.insert("user_agent".to_string(), json!("restmap-test/1.0"));

    let rendered = set
      .render("header", nodes::HEADER_TEMPLATE, attributes, &[], &overrides)
      .unwrap();

    assert!(rendered.starts_with("import json\n"));
    assert!(rendered.contains(r#""User-Agent": "restmap-test/1.0","#));
  }

  #[test]
  fn test_unknown_template_is_render_failure() {
    let set = TemplateSet::empty();
    let err = set
      .render(
        "users/header",
        nodes::HEADER_TEMPLATE,
        json!({}),
        &[],
        &serde_json::Map::new(),
      )
      .unwrap_err();

    assert!(matches!(
      err,
      CompilationError::RenderFailure { node, template, .. }
        if node == "users/header" && template == nodes::HEADER_TEMPLATE
    ));
  }

  #[test]
  fn test_add_template_rejects_bad_syntax() {
    let mut set = TemplateSet::empty();
    assert!(set.add_template("broken.jinja", "{% if %}").is_err());
  }
}
