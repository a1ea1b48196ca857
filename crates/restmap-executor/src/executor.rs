use async_trait::async_trait;
use restmap_graph::SinkKind;

use crate::construct::{StackDiff, StackManifest};
use crate::error::ExecutorError;
use crate::provider::{FunctionProvider, StorageProvider, TopicProvider};

/// A deployment backend.
///
/// Constructs are reached through capability groups. Stack-level calls act
/// on everything registered so far.
#[async_trait]
pub trait Executor: Send + Sync {
  fn functions(&self) -> &dyn FunctionProvider;

  fn buckets(&self) -> &dyn StorageProvider;

  fn tables(&self) -> &dyn StorageProvider;

  fn queues(&self) -> &dyn StorageProvider;

  fn topics(&self) -> &dyn TopicProvider;

  /// Storage group for a sink kind. Topics have their own group.
  fn storage(&self, kind: SinkKind) -> Option<&dyn StorageProvider> {
    match kind {
      SinkKind::Queue => Some(self.queues()),
      SinkKind::Bucket => Some(self.buckets()),
      SinkKind::Table => Some(self.tables()),
      SinkKind::Topic => None,
    }
  }

  /// Synthesize a manifest of the registered constructs.
  async fn compile(&self) -> Result<StackManifest, ExecutorError>;

  /// Apply the registered constructs and return what was applied.
  async fn deploy(&self) -> Result<StackManifest, ExecutorError>;

  /// Changes between the registered stack and `update`.
  async fn diff(&self, update: &StackManifest) -> Result<StackDiff, ExecutorError>;

  async fn tear_down(&self) -> Result<(), ExecutorError>;
}
