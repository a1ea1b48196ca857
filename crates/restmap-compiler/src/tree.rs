//! Arena-backed compiler tree.
//!
//! All nodes of one compilation live in a single vector. Children are kept as
//! ordered index lists and parents as optional indices, used only to name a
//! node in diagnostics. Compiling never changes the tree.

use crate::error::CompilationError;
use crate::nodes::CompilerNode;
use crate::templates::TemplateSet;

/// Separator between top-level blocks of generated code.
pub const MODULE_SEPARATOR: &str = "\n\n\n";

/// Index of a node inside its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq)]
struct TreeNode {
  label: String,
  node: CompilerNode,
  parent: Option<NodeId>,
  children: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompilerTree {
  nodes: Vec<TreeNode>,
}

impl CompilerTree {
  /// Create a tree with a root node.
  pub fn new(label: impl Into<String>, root: CompilerNode) -> Self {
    Self {
      nodes: vec![TreeNode {
        label: label.into(),
        node: root,
        parent: None,
        children: vec![],
      }],
    }
  }

  pub fn root(&self) -> NodeId {
    NodeId(0)
  }

  /// Attach a node as the last child of `parent`.
  pub fn attach(&mut self, parent: NodeId, label: impl Into<String>, node: CompilerNode) -> NodeId {
    let id = NodeId(self.nodes.len());
    self.nodes.push(TreeNode {
      label: label.into(),
      node,
      parent: Some(parent),
      children: vec![],
    });
    self.nodes[parent.0].children.push(id);
    id
  }

  pub fn node(&self, id: NodeId) -> &CompilerNode {
    &self.nodes[id.0].node
  }

  pub fn children(&self, id: NodeId) -> &[NodeId] {
    &self.nodes[id.0].children
  }

  pub fn parent(&self, id: NodeId) -> Option<NodeId> {
    self.nodes[id.0].parent
  }

  pub fn is_enclosing(&self, id: NodeId) -> bool {
    !self.nodes[id.0].children.is_empty()
  }

  /// Slash-separated labels from the root, e.g. `users/handler/request`.
  pub fn path(&self, id: NodeId) -> String {
    let mut labels = vec![self.nodes[id.0].label.as_str()];
    let mut current = self.parent(id);
    while let Some(parent) = current {
      labels.push(self.nodes[parent.0].label.as_str());
      current = self.parent(parent);
    }
    labels.reverse();
    labels.join("/")
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// All nodes in attachment order.
  pub fn iter(&self) -> impl Iterator<Item = &CompilerNode> {
    self.nodes.iter().map(|n| &n.node)
  }

  /// Compile every child of `id`, in attachment order.
  pub fn compile_children(
    &self,
    id: NodeId,
    templates: &TemplateSet,
    overrides: &serde_json::Map<String, serde_json::Value>,
  ) -> Result<Vec<String>, CompilationError> {
    self
      .children(id)
      .iter()
      .map(|child| self.compile(*child, templates, overrides))
      .collect()
  }

  /// Compile a node: validate it, compile each child once, then render the
  /// node's own template with the children's text.
  pub fn compile(
    &self,
    id: NodeId,
    templates: &TemplateSet,
    overrides: &serde_json::Map<String, serde_json::Value>,
  ) -> Result<String, CompilationError> {
    let entry = &self.nodes[id.0];
    let path = self.path(id);
    entry.node.validate(&path, entry.children.len())?;

    let children = self.compile_children(id, templates, overrides)?;

    let Some(template_id) = entry.node.template_id() else {
      return Ok(children.join(MODULE_SEPARATOR));
    };

    let attributes = entry
      .node
      .attributes()
      .map_err(|e| CompilationError::RenderFailure {
        node: path.clone(),
        template: template_id.to_string(),
        message: e.to_string(),
      })?;

    templates.render(&path, template_id, attributes, &children, overrides)
  }
}
