//! Capability groups exposed by an executor.
//!
//! Every call names its target construct explicitly. Scoped handles from
//! `using` bind that name once for a sequence of calls.

use async_trait::async_trait;
use restmap_compiler::FunctionDeployment;
use tracing::info;

use crate::construct::{
  ConstructKind, NotifyParams, Registration, StorageSpec, TopicConfig, TriggerSpec,
};
use crate::error::ExecutorError;

/// Turn the result of a create call into a registration, treating an
/// existing construct as a no-op.
pub fn registered(
  kind: ConstructKind,
  name: &str,
  result: Result<(), ExecutorError>,
) -> Result<Registration, ExecutorError> {
  match result {
    Ok(()) => Ok(Registration::Created),
    Err(ExecutorError::AlreadyExists { .. }) => {
      info!(%kind, name, "construct already exists, skipping");
      Ok(Registration::Existing)
    }
    Err(e) => Err(e),
  }
}

#[async_trait]
pub trait FunctionProvider: Send + Sync {
  /// Create a function. Fails with `AlreadyExists` if the uid is taken.
  async fn create(&self, function: &FunctionDeployment) -> Result<(), ExecutorError>;

  async fn with_role(&self, name: &str, role: &str) -> Result<(), ExecutorError>;

  /// Subscribe a function to events.
  async fn trigger(&self, name: &str, trigger: TriggerSpec) -> Result<(), ExecutorError>;

  /// Make a function publish its outcome to a topic.
  async fn notify(&self, name: &str, topic: &str, params: NotifyParams) -> Result<(), ExecutorError>;

  async fn register(&self, function: &FunctionDeployment) -> Result<Registration, ExecutorError> {
    registered(
      ConstructKind::Function,
      &function.uid,
      self.create(function).await,
    )
  }

  async fn register_all(
    &self,
    functions: &[FunctionDeployment],
  ) -> Result<Vec<Registration>, ExecutorError> {
    let mut registrations = Vec::with_capacity(functions.len());
    for function in functions {
      registrations.push(self.register(function).await?);
    }
    Ok(registrations)
  }
}

/// Buckets, tables and queues.
#[async_trait]
pub trait StorageProvider: Send + Sync {
  fn kind(&self) -> ConstructKind;

  async fn create(&self, spec: &StorageSpec) -> Result<(), ExecutorError>;

  async fn with_role(&self, name: &str, role: &str) -> Result<(), ExecutorError>;

  async fn register(&self, spec: &StorageSpec) -> Result<Registration, ExecutorError> {
    registered(self.kind(), &spec.name, self.create(spec).await)
  }

  async fn register_all(&self, specs: &[StorageSpec]) -> Result<Vec<Registration>, ExecutorError> {
    let mut registrations = Vec::with_capacity(specs.len());
    for spec in specs {
      registrations.push(self.register(spec).await?);
    }
    Ok(registrations)
  }
}

#[async_trait]
pub trait TopicProvider: Send + Sync {
  async fn create(&self, name: &str, config: &TopicConfig) -> Result<(), ExecutorError>;

  /// Create the topic unless it exists, as one atomic step.
  async fn get_or_create(
    &self,
    name: &str,
    config: &TopicConfig,
  ) -> Result<Registration, ExecutorError>;

  async fn with_role(&self, name: &str, role: &str) -> Result<(), ExecutorError>;

  /// Allow `target` to publish to the topic.
  async fn grant_publish(&self, topic: &str, target: &str) -> Result<(), ExecutorError>;

  async fn register(&self, name: &str, config: &TopicConfig) -> Result<Registration, ExecutorError> {
    registered(ConstructKind::Topic, name, self.create(name, config).await)
  }
}
