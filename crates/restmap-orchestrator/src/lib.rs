//! Restmap Orchestrator
//!
//! Derives execution dependencies between compiled units, partitions them
//! into independently deployable subgraphs and deploys each subgraph through
//! an [`restmap_executor::Executor`] with an event cascade: every function
//! publishes its outcome to a shared completion channel and downstream
//! functions subscribe to it, filtered on the upstream function's identity.

mod error;
mod events;
mod graph;
mod orchestrator;
mod plan;
mod retry;
mod subgraphs;

pub use error::OrchestrationError;
pub use events::{ChannelNotifier, DeploymentEvent, DeploymentNotifier, NoopNotifier};
pub use graph::{EdgeParams, OrchestrationGraph, OrchestrationNode};
pub use orchestrator::{
  DeployOptions, DeploymentReport, Orchestrator, OrchestratorConfig, SubgraphReport,
  SubgraphStatus,
};
pub use plan::{DeploymentPlan, SOURCE_ATTRIBUTE, SinkPlan, SubgraphPlan, WiringStep};
pub use retry::{RetryPolicy, with_retry};
pub use subgraphs::Subgraphs;
