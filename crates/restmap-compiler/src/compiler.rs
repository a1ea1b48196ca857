use std::path::{Path, PathBuf};
use std::sync::Arc;

use restmap_graph::ResolverKind;
use tracing::{debug, info, instrument};

use crate::deployment::{FunctionDeployment, Requirement, SinkBinding};
use crate::error::CompilationError;
use crate::estimator::{FixedEstimator, ResourceEstimator};
use crate::nodes::{
  Authenticator, BodyParser, CompilerNode, Handler, Header, Loader, RequestHandler,
  ResponseHandler, ResponseType, TableReader,
};
use crate::templates::TemplateSet;
use crate::tree::{CompilerTree, MODULE_SEPARATOR, NodeId};
use crate::unit::ExecutableUnit;

const CODE_FILE: &str = "handler.py";
const BASE_IMPORTS: [&str; 2] = ["json", "os"];

/// Compiler settings.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
  /// Directory generated code is written under, one subdirectory per uid.
  pub code_root: PathBuf,
  pub runtime: String,
  /// Name of the generated entry point function.
  pub handler_name: String,
  pub user_agent: String,
  pub request_timeout_ms: u64,
  pub request_retries: u32,
  /// Template variables applied to every node, overriding its attributes.
  pub overrides: serde_json::Map<String, serde_json::Value>,
}

impl CompilerConfig {
  pub fn new(code_root: impl Into<PathBuf>) -> Self {
    Self {
      code_root: code_root.into(),
      runtime: "python3.12".to_string(),
      handler_name: "handler".to_string(),
      user_agent: "restmap/0.0.1".to_string(),
      request_timeout_ms: 500,
      request_retries: 3,
      overrides: serde_json::Map::new(),
    }
  }
}

/// Turns executable units into function deployments.
pub struct Compiler {
  config: CompilerConfig,
  templates: TemplateSet,
  estimator: Arc<dyn ResourceEstimator>,
}

impl Compiler {
  /// Create a compiler using the embedded templates and fixed resources.
  pub fn new(config: CompilerConfig) -> Result<Self, CompilationError> {
    Ok(Self {
      config,
      templates: TemplateSet::aws()?,
      estimator: Arc::new(FixedEstimator::default()),
    })
  }

  pub fn with_estimator(mut self, estimator: impl ResourceEstimator + 'static) -> Self {
    self.estimator = Arc::new(estimator);
    self
  }

  pub fn with_templates(mut self, templates: TemplateSet) -> Self {
    self.templates = templates;
    self
  }

  pub fn config(&self) -> &CompilerConfig {
    &self.config
  }

  /// Deterministic location of a function's code.
  pub fn code_location(&self, uid: &str) -> PathBuf {
    self.config.code_root.join(uid).join(CODE_FILE)
  }

  /// Build the compiler tree for a unit.
  pub fn build(&self, unit: &ExecutableUnit) -> Result<CompilerTree, CompilationError> {
    let mut tree = CompilerTree::new(unit.name(), CompilerNode::Module);
    let root = tree.root();

    tree.attach(
      root,
      "header",
      CompilerNode::Header(Header::new(imports(unit), &self.config.user_agent)),
    );

    let authentication = match unit {
      ExecutableUnit::Endpoint { authentication, .. } => match authentication.as_slice() {
        [] => None,
        [descriptor] => Some(descriptor),
        _ => {
          return Err(CompilationError::InvalidConfig {
            node: unit.name().to_string(),
            reason: format!(
              "resolvers reading this endpoint carry {} different authentication descriptors",
              authentication.len()
            ),
          });
        }
      },
      ExecutableUnit::Resolver { resolver, .. } => match resolver.kind {
        ResolverKind::Database { .. } => resolver.authentication.as_ref(),
        ResolverKind::Endpoint { .. } => None,
      },
    };
    if let Some(descriptor) = authentication {
      tree.attach(
        root,
        "authenticator",
        CompilerNode::Authenticator(Authenticator {
          descriptor: to_json(unit.name(), descriptor)?,
        }),
      );
    }

    let handler = tree.attach(
      root,
      "handler",
      CompilerNode::Handler(Handler {
        name: self.config.handler_name.clone(),
        error_code: 500,
      }),
    );

    match unit {
      ExecutableUnit::Endpoint { endpoint, .. } => {
        let request_body = endpoint
          .body
          .as_ref()
          .map(|body| to_json(&endpoint.name, body))
          .transpose()?;

        tree.attach(
          handler,
          "request",
          CompilerNode::RequestHandler(RequestHandler {
            method: endpoint.method,
            url: endpoint.url(),
            authenticated: authentication.is_some(),
            response_type: ResponseType::Json,
            response_variable: "response".to_string(),
            response_status: 200,
            request_body,
            timeout_ms: self.config.request_timeout_ms,
            retries: self.config.request_retries,
          }),
        );
        tree.attach(
          handler,
          "body",
          CompilerNode::BodyParser(BodyParser::new("response.json()", "payload", None)),
        );
        for output in &endpoint.outputs {
          tree.attach(
            handler,
            format!("loader:{}", output.name),
            CompilerNode::Loader(Loader {
              target: output.target.clone(),
              sink: output.kind.sink_kind(),
              source_variable: "payload".to_string(),
            }),
          );
        }
        attach_response(&mut tree, handler, "payload", vec![]);
      }
      ExecutableUnit::Resolver { resolver, feeds } => {
        match &resolver.kind {
          ResolverKind::Endpoint { select, .. } => {
            tree.attach(
              handler,
              "body",
              CompilerNode::BodyParser(BodyParser::new(
                "event.get(\"body\", {})",
                "value",
                select.as_deref(),
              )),
            );
          }
          ResolverKind::Database {
            connection_string,
            table,
          } => {
            tree.attach(
              handler,
              "read",
              CompilerNode::TableReader(TableReader {
                connection_string: connection_string.clone(),
                table: table.clone(),
                variable: "value".to_string(),
                authenticated: authentication.is_some(),
              }),
            );
          }
        }
        attach_response(&mut tree, handler, "value", feeds.clone());
      }
    }

    Ok(tree)
  }

  /// Compile a unit without touching the filesystem.
  #[instrument(skip_all, fields(unit = %unit.name()))]
  pub fn render(&self, unit: &ExecutableUnit) -> Result<FunctionDeployment, CompilationError> {
    let tree = self.build(unit)?;
    let uid = uid_for(&unit.qualified_name());

    let code = tree
      .compile_children(tree.root(), &self.templates, &self.config.overrides)?
      .join(MODULE_SEPARATOR);
    let params = self.estimator.estimate(unit, &tree);

    debug!(uid = %uid, nodes = tree.len(), bytes = code.len(), "rendered function");

    Ok(FunctionDeployment {
      code_location: self.code_location(&uid),
      uid,
      code,
      runtime: self.config.runtime.clone(),
      requirements: requirements(unit),
      handler: format!("handler.{}", self.config.handler_name),
      params,
      sinks: sinks(unit),
    })
  }

  /// Compile a unit and write its code to the deployment's code location.
  pub fn compile(&self, unit: &ExecutableUnit) -> Result<FunctionDeployment, CompilationError> {
    let deployment = self.render(unit)?;
    persist(&deployment.code_location, &deployment.code)?;
    info!(
      uid = %deployment.uid,
      location = %deployment.code_location.display(),
      "compiled function"
    );
    Ok(deployment)
  }
}

fn attach_response(tree: &mut CompilerTree, handler: NodeId, variable: &str, params: Vec<String>) {
  let mut response = ResponseHandler::new(ResponseType::Json, variable);
  response.params = params;
  tree.attach(handler, "response", CompilerNode::ResponseHandler(response));
}

fn persist(path: &Path, code: &str) -> Result<(), CompilationError> {
  let io_error = |source| CompilationError::Io {
    path: path.to_path_buf(),
    source,
  };
  if let Some(dir) = path.parent() {
    std::fs::create_dir_all(dir).map_err(io_error)?;
  }
  std::fs::write(path, code).map_err(io_error)
}

/// Function identifier derived from a qualified unit name: lowercase, with
/// anything outside `[a-z0-9-]` replaced by `-`.
pub fn uid_for(name: &str) -> String {
  name
    .chars()
    .map(|c| {
      let c = c.to_ascii_lowercase();
      if c.is_ascii_alphanumeric() || c == '-' {
        c
      } else {
        '-'
      }
    })
    .collect()
}

fn requirements(unit: &ExecutableUnit) -> Vec<Requirement> {
  let requests = || Requirement::new("requests", "2.32.3", &["requests"]);
  let boto3 = || Requirement::new("boto3", "1.35.0", &["boto3"]);

  match unit {
    ExecutableUnit::Endpoint { endpoint, .. } if endpoint.outputs.is_empty() => vec![requests()],
    ExecutableUnit::Endpoint { .. } => vec![requests(), boto3()],
    ExecutableUnit::Resolver { resolver, .. } => match resolver.kind {
      ResolverKind::Endpoint { .. } => vec![],
      ResolverKind::Database { .. } => vec![boto3()],
    },
  }
}

fn imports(unit: &ExecutableUnit) -> Vec<String> {
  let mut imports: Vec<String> = BASE_IMPORTS.iter().map(|i| i.to_string()).collect();
  for requirement in requirements(unit) {
    for import in requirement.imports {
      if !imports.contains(&import) {
        imports.push(import);
      }
    }
  }
  imports
}

fn sinks(unit: &ExecutableUnit) -> Vec<SinkBinding> {
  match unit {
    ExecutableUnit::Endpoint { endpoint, .. } => endpoint
      .outputs
      .iter()
      .map(|output| SinkBinding {
        name: output.name.clone(),
        kind: output.kind.sink_kind(),
        target: output.target.clone(),
        config: output.config.clone(),
      })
      .collect(),
    ExecutableUnit::Resolver { .. } => vec![],
  }
}

fn to_json(node: &str, value: &serde_json::Value) -> Result<String, CompilationError> {
  serde_json::to_string(value).map_err(|e| CompilationError::InvalidConfig {
    node: node.to_string(),
    reason: e.to_string(),
  })
}
