//! Deployment events and notifiers for observability.
//!
//! The orchestrator emits events while a deployment runs so callers can
//! follow progress, persist it or stream it elsewhere.

use restmap_executor::{ConstructKind, Registration};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted during a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeploymentEvent {
  DeploymentStarted {
    deployment_id: String,
    subgraphs: usize,
    dry_run: bool,
  },

  SubgraphStarted {
    deployment_id: String,
    index: usize,
  },

  /// A construct was registered, or found already present.
  ConstructRegistered {
    deployment_id: String,
    kind: ConstructKind,
    name: String,
    registration: Registration,
  },

  /// A function was subscribed to an upstream function's completion.
  EdgeWired {
    deployment_id: String,
    from: String,
    to: String,
  },

  SubgraphCompleted {
    deployment_id: String,
    index: usize,
  },

  SubgraphFailed {
    deployment_id: String,
    index: usize,
    error: String,
  },

  SubgraphCancelled {
    deployment_id: String,
    index: usize,
  },

  DeploymentCompleted {
    deployment_id: String,
    failed: usize,
  },
}

/// Receives deployment events.
pub trait DeploymentNotifier: Send + Sync {
  fn notify(&self, event: DeploymentEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl DeploymentNotifier for NoopNotifier {
  fn notify(&self, _event: DeploymentEvent) {}
}

/// Forwards events to an unbounded channel.
///
/// Unbounded so a slow consumer never holds up a deployment; volume is a
/// handful of events per construct.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<DeploymentEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<DeploymentEvent>) -> Self {
    Self { sender }
  }
}

impl DeploymentNotifier for ChannelNotifier {
  fn notify(&self, event: DeploymentEvent) {
    // receiver may be gone
    let _ = self.sender.send(event);
  }
}
