//! Restmap Compiler
//!
//! Turns one executable unit (an endpoint call or a resolver) into a
//! [`FunctionDeployment`]: the unit is expanded into an arena-backed tree of
//! code-generating nodes, the tree is reduced bottom-up through minijinja
//! templates, and the resulting code is written to a per-function location.

mod compiler;
mod deployment;
mod error;
mod estimator;
mod nodes;
mod templates;
mod tree;
mod unit;

pub use compiler::{Compiler, CompilerConfig, uid_for};
pub use deployment::{DeploymentParams, FunctionDeployment, Requirement, SinkBinding};
pub use error::CompilationError;
pub use estimator::{FixedEstimator, ResourceEstimator};
pub use nodes::{
  Authenticator, BodyParser, CompilerNode, Handler, Header, Loader, RequestHandler,
  ResponseHandler, ResponseType, TableReader,
};
pub use templates::TemplateSet;
pub use tree::{CompilerTree, MODULE_SEPARATOR, NodeId};
pub use unit::ExecutableUnit;
