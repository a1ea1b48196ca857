//! In-memory executor.
//!
//! Keeps every construct in a shared registry and records each backend call,
//! so deployments can be planned and inspected without a cloud account.
//! Failures can be injected per construct name.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use restmap_compiler::FunctionDeployment;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::construct::{
  ConstructKind, ConstructRecord, NotifyParams, Registration, StackDiff, StackManifest,
  StorageSpec, TopicConfig, TriggerSpec,
};
use crate::error::ExecutorError;
use crate::executor::Executor;
use crate::provider::{FunctionProvider, StorageProvider, TopicProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
  Create,
  GetOrCreate,
  WithRole,
  Trigger,
  Notify,
  GrantPublish,
  Compile,
  Deploy,
  Diff,
  TearDown,
}

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutorCall {
  pub operation: Operation,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub kind: Option<ConstructKind>,
  pub name: String,
}

#[derive(Debug)]
struct InjectedFailure {
  construct: String,
  /// `None` fails forever.
  remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct Registry {
  constructs: BTreeMap<(ConstructKind, String), ConstructRecord>,
  calls: Vec<ExecutorCall>,
  failures: Vec<InjectedFailure>,
  deployed: Option<StackManifest>,
}

impl Registry {
  fn record(
    &mut self,
    operation: Operation,
    kind: Option<ConstructKind>,
    name: &str,
  ) -> Result<(), ExecutorError> {
    debug!(?operation, ?kind, name, "executor call");
    self.calls.push(ExecutorCall {
      operation,
      kind,
      name: name.to_string(),
    });
    self.injected(name)
  }

  fn injected(&mut self, name: &str) -> Result<(), ExecutorError> {
    let Some(failure) = self
      .failures
      .iter_mut()
      .find(|f| f.construct == name && f.remaining != Some(0))
    else {
      return Ok(());
    };

    let retryable = failure.remaining.is_some();
    if let Some(remaining) = failure.remaining.as_mut() {
      *remaining -= 1;
    }
    Err(ExecutorError::Backend {
      construct: name.to_string(),
      message: "injected failure".to_string(),
      retryable,
    })
  }

  fn create(&mut self, record: ConstructRecord) -> Result<(), ExecutorError> {
    self.record(Operation::Create, Some(record.kind), &record.name)?;
    let key = (record.kind, record.name.clone());
    if self.constructs.contains_key(&key) {
      return Err(ExecutorError::AlreadyExists {
        kind: record.kind,
        name: record.name,
      });
    }
    self.constructs.insert(key, record);
    Ok(())
  }

  fn get_mut(
    &mut self,
    kind: ConstructKind,
    name: &str,
  ) -> Result<&mut ConstructRecord, ExecutorError> {
    self
      .constructs
      .get_mut(&(kind, name.to_string()))
      .ok_or_else(|| ExecutorError::NotFound {
        kind,
        name: name.to_string(),
      })
  }

  fn exists(&self, kind: ConstructKind, name: &str) -> Result<(), ExecutorError> {
    if self.constructs.contains_key(&(kind, name.to_string())) {
      Ok(())
    } else {
      Err(ExecutorError::NotFound {
        kind,
        name: name.to_string(),
      })
    }
  }

  fn with_role(&mut self, kind: ConstructKind, name: &str, role: &str) -> Result<(), ExecutorError> {
    self.record(Operation::WithRole, Some(kind), name)?;
    self.get_mut(kind, name)?.role = Some(role.to_string());
    Ok(())
  }

  fn manifest(&self) -> StackManifest {
    StackManifest::from_records(self.constructs.values().cloned())
  }
}

type Shared = Arc<Mutex<Registry>>;

fn to_spec<T: Serialize>(name: &str, value: &T) -> Result<serde_json::Value, ExecutorError> {
  serde_json::to_value(value).map_err(|e| ExecutorError::Backend {
    construct: name.to_string(),
    message: format!("failed to encode construct: {e}"),
    retryable: false,
  })
}

struct MemoryFunctions {
  registry: Shared,
}

#[async_trait]
impl FunctionProvider for MemoryFunctions {
  async fn create(&self, function: &FunctionDeployment) -> Result<(), ExecutorError> {
    let spec = to_spec(&function.uid, function)?;
    let mut registry = self.registry.lock().await;
    registry.create(ConstructRecord::new(
      ConstructKind::Function,
      &function.uid,
      spec,
    ))
  }

  async fn with_role(&self, name: &str, role: &str) -> Result<(), ExecutorError> {
    let mut registry = self.registry.lock().await;
    registry.with_role(ConstructKind::Function, name, role)
  }

  async fn trigger(&self, name: &str, trigger: TriggerSpec) -> Result<(), ExecutorError> {
    let mut registry = self.registry.lock().await;
    registry.record(Operation::Trigger, Some(ConstructKind::Function), name)?;
    let source_kind = ConstructKind::from(trigger.source);
    registry.exists(source_kind, &trigger.name)?;

    let function = registry.get_mut(ConstructKind::Function, name)?;
    if !function.triggers.contains(&trigger) {
      function.triggers.push(trigger);
    }
    Ok(())
  }

  async fn notify(&self, name: &str, topic: &str, params: NotifyParams) -> Result<(), ExecutorError> {
    let mut registry = self.registry.lock().await;
    registry.record(Operation::Notify, Some(ConstructKind::Function), name)?;
    registry.exists(ConstructKind::Topic, topic)?;

    let function = registry.get_mut(ConstructKind::Function, name)?;
    let notification = (topic.to_string(), params);
    if !function.notifications.contains(&notification) {
      function.notifications.push(notification);
    }
    Ok(())
  }
}

struct MemoryStorage {
  kind: ConstructKind,
  registry: Shared,
}

#[async_trait]
impl StorageProvider for MemoryStorage {
  fn kind(&self) -> ConstructKind {
    self.kind
  }

  async fn create(&self, spec: &StorageSpec) -> Result<(), ExecutorError> {
    let value = to_spec(&spec.name, spec)?;
    let mut registry = self.registry.lock().await;
    registry.create(ConstructRecord::new(self.kind, &spec.name, value))
  }

  async fn with_role(&self, name: &str, role: &str) -> Result<(), ExecutorError> {
    let mut registry = self.registry.lock().await;
    registry.with_role(self.kind, name, role)
  }
}

struct MemoryTopics {
  registry: Shared,
}

#[async_trait]
impl TopicProvider for MemoryTopics {
  async fn create(&self, name: &str, config: &TopicConfig) -> Result<(), ExecutorError> {
    let spec = to_spec(name, config)?;
    let mut registry = self.registry.lock().await;
    registry.create(ConstructRecord::new(ConstructKind::Topic, name, spec))
  }

  async fn get_or_create(
    &self,
    name: &str,
    config: &TopicConfig,
  ) -> Result<Registration, ExecutorError> {
    let spec = to_spec(name, config)?;
    let mut registry = self.registry.lock().await;
    registry.record(Operation::GetOrCreate, Some(ConstructKind::Topic), name)?;

    let key = (ConstructKind::Topic, name.to_string());
    if registry.constructs.contains_key(&key) {
      return Ok(Registration::Existing);
    }
    registry
      .constructs
      .insert(key, ConstructRecord::new(ConstructKind::Topic, name, spec));
    Ok(Registration::Created)
  }

  async fn with_role(&self, name: &str, role: &str) -> Result<(), ExecutorError> {
    let mut registry = self.registry.lock().await;
    registry.with_role(ConstructKind::Topic, name, role)
  }

  async fn grant_publish(&self, topic: &str, target: &str) -> Result<(), ExecutorError> {
    let mut registry = self.registry.lock().await;
    registry.record(Operation::GrantPublish, Some(ConstructKind::Topic), topic)?;
    registry.exists(ConstructKind::Function, target)?;
    registry
      .get_mut(ConstructKind::Topic, topic)?
      .publishers
      .insert(target.to_string());
    Ok(())
  }
}

/// Executor that keeps the stack in memory.
pub struct MemoryExecutor {
  registry: Shared,
  functions: MemoryFunctions,
  buckets: MemoryStorage,
  tables: MemoryStorage,
  queues: MemoryStorage,
  topics: MemoryTopics,
}

impl MemoryExecutor {
  pub fn new() -> Self {
    let registry: Shared = Arc::new(Mutex::new(Registry::default()));
    let storage = |kind| MemoryStorage {
      kind,
      registry: Arc::clone(&registry),
    };
    Self {
      functions: MemoryFunctions {
        registry: Arc::clone(&registry),
      },
      buckets: storage(ConstructKind::Bucket),
      tables: storage(ConstructKind::Table),
      queues: storage(ConstructKind::Queue),
      topics: MemoryTopics {
        registry: Arc::clone(&registry),
      },
      registry,
    }
  }

  /// Make every call naming `construct` fail with a non-retryable error.
  pub async fn fail_permanently(&self, construct: impl Into<String>) {
    self.registry.lock().await.failures.push(InjectedFailure {
      construct: construct.into(),
      remaining: None,
    });
  }

  /// Make the next `times` calls naming `construct` fail with a retryable error.
  pub async fn fail_transiently(&self, construct: impl Into<String>, times: u32) {
    self.registry.lock().await.failures.push(InjectedFailure {
      construct: construct.into(),
      remaining: Some(times),
    });
  }

  /// Every call made so far, in order.
  pub async fn calls(&self) -> Vec<ExecutorCall> {
    self.registry.lock().await.calls.clone()
  }

  pub async fn construct(&self, kind: ConstructKind, name: &str) -> Option<ConstructRecord> {
    self
      .registry
      .lock()
      .await
      .constructs
      .get(&(kind, name.to_string()))
      .cloned()
  }

  pub async fn count(&self, kind: ConstructKind) -> usize {
    self
      .registry
      .lock()
      .await
      .constructs
      .keys()
      .filter(|(k, _)| *k == kind)
      .count()
  }

  /// Manifest applied by the last `deploy`, if any.
  pub async fn deployed(&self) -> Option<StackManifest> {
    self.registry.lock().await.deployed.clone()
  }
}

impl Default for MemoryExecutor {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Executor for MemoryExecutor {
  fn functions(&self) -> &dyn FunctionProvider {
    &self.functions
  }

  fn buckets(&self) -> &dyn StorageProvider {
    &self.buckets
  }

  fn tables(&self) -> &dyn StorageProvider {
    &self.tables
  }

  fn queues(&self) -> &dyn StorageProvider {
    &self.queues
  }

  fn topics(&self) -> &dyn TopicProvider {
    &self.topics
  }

  async fn compile(&self) -> Result<StackManifest, ExecutorError> {
    let mut registry = self.registry.lock().await;
    registry.record(Operation::Compile, None, "stack")?;
    Ok(registry.manifest())
  }

  async fn deploy(&self) -> Result<StackManifest, ExecutorError> {
    let mut registry = self.registry.lock().await;
    registry.record(Operation::Deploy, None, "stack")?;
    let manifest = registry.manifest();
    registry.deployed = Some(manifest.clone());
    Ok(manifest)
  }

  async fn diff(&self, update: &StackManifest) -> Result<StackDiff, ExecutorError> {
    let mut registry = self.registry.lock().await;
    registry.record(Operation::Diff, None, "stack")?;
    Ok(registry.manifest().diff(update))
  }

  async fn tear_down(&self) -> Result<(), ExecutorError> {
    let mut registry = self.registry.lock().await;
    registry.record(Operation::TearDown, None, "stack")?;
    registry.constructs.clear();
    registry.deployed = None;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::construct::{Outcome, TriggerSource};
  use restmap_compiler::DeploymentParams;

  fn function(uid: &str) -> FunctionDeployment {
    FunctionDeployment {
      uid: uid.to_string(),
      code: format!("# {uid}"),
      runtime: "python3.12".to_string(),
      requirements: vec![],
      handler: "handler.handler".to_string(),
      code_location: format!("/tmp/{uid}/handler.py").into(),
      params: DeploymentParams::default(),
      sinks: vec![],
    }
  }

  #[tokio::test]
  async fn test_register_twice_is_noop() {
    let executor = MemoryExecutor::new();
    let users = function("users");

    let first = executor.functions().register(&users).await.unwrap();
    let second = executor.functions().register(&users).await.unwrap();

    assert_eq!(first, Registration::Created);
    assert_eq!(second, Registration::Existing);
    assert_eq!(executor.count(ConstructKind::Function).await, 1);
  }

  #[tokio::test]
  async fn test_create_twice_reports_already_exists() {
    let executor = MemoryExecutor::new();
    let spec = StorageSpec {
      name: "users-in".to_string(),
      config: Default::default(),
    };

    executor.queues().create(&spec).await.unwrap();
    let err = executor.queues().create(&spec).await.unwrap_err();

    assert_eq!(
      err,
      ExecutorError::AlreadyExists {
        kind: ConstructKind::Queue,
        name: "users-in".to_string(),
      }
    );
  }

  #[tokio::test]
  async fn test_concurrent_get_or_create_creates_once() {
    let executor = Arc::new(MemoryExecutor::new());
    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..8 {
      let executor = Arc::clone(&executor);
      tasks.spawn(async move {
        executor
          .topics()
          .get_or_create("restmap-completion", &TopicConfig::default())
          .await
          .unwrap()
      });
    }

    let mut created = 0;
    while let Some(result) = tasks.join_next().await {
      if result.unwrap() == Registration::Created {
        created += 1;
      }
    }

    assert_eq!(created, 1);
    assert_eq!(executor.count(ConstructKind::Topic).await, 1);
  }

  #[tokio::test]
  async fn test_scoped_handles_wire_functions() {
    let executor = MemoryExecutor::new();
    executor.functions().register(&function("lookup")).await.unwrap();
    executor.functions().register(&function("users")).await.unwrap();
    executor
      .topics()
      .get_or_create("restmap-completion", &TopicConfig::default())
      .await
      .unwrap();

    let topic = executor.topics().using("restmap-completion");
    topic.grant_publish("lookup").await.unwrap();

    let lookup = executor.functions().using("lookup");
    lookup
      .notify(
        "restmap-completion",
        NotifyParams {
          on: vec![Outcome::Success],
          identity: "lookup".to_string(),
        },
      )
      .await
      .unwrap();

    let trigger = TriggerSpec {
      on: vec![Outcome::Success],
      source: TriggerSource::Topic,
      name: "restmap-completion".to_string(),
      args: [("source".to_string(), "lookup".to_string())].into(),
    };
    let users = executor.functions().using("users");
    users.trigger(trigger.clone()).await.unwrap();
    users.trigger(trigger).await.unwrap();

    let topic = executor
      .construct(ConstructKind::Topic, "restmap-completion")
      .await
      .unwrap();
    assert!(topic.publishers.contains("lookup"));

    let users = executor.construct(ConstructKind::Function, "users").await.unwrap();
    assert_eq!(users.triggers.len(), 1);
  }

  #[tokio::test]
  async fn test_wiring_unknown_construct_fails() {
    let executor = MemoryExecutor::new();
    executor.functions().register(&function("users")).await.unwrap();

    let err = executor
      .topics()
      .grant_publish("missing", "users")
      .await
      .unwrap_err();

    assert!(matches!(err, ExecutorError::NotFound { kind: ConstructKind::Topic, .. }));
  }

  #[tokio::test]
  async fn test_injected_failures() {
    let executor = MemoryExecutor::new();
    executor.fail_transiently("flaky", 1).await;
    executor.fail_permanently("broken").await;

    let err = executor.functions().register(&function("flaky")).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(
      executor.functions().register(&function("flaky")).await.unwrap(),
      Registration::Created
    );

    let err = executor.functions().register(&function("broken")).await.unwrap_err();
    assert!(!err.is_retryable());
    let err = executor.functions().register(&function("broken")).await.unwrap_err();
    assert!(!err.is_retryable());
  }

  #[tokio::test]
  async fn test_deploy_diff_and_tear_down() {
    let executor = MemoryExecutor::new();
    executor.functions().register(&function("users")).await.unwrap();

    let deployed = executor.deploy().await.unwrap();
    assert_eq!(executor.deployed().await, Some(deployed.clone()));
    assert!(executor.diff(&deployed).await.unwrap().is_empty());

    let mut update = deployed.clone();
    update.constructs.clear();
    let diff = executor.diff(&update).await.unwrap();
    assert_eq!(diff.removed, vec!["function/users"]);

    executor.tear_down().await.unwrap();
    assert_eq!(executor.count(ConstructKind::Function).await, 0);
    assert!(executor.compile().await.unwrap().constructs.is_empty());
  }

  #[tokio::test]
  async fn test_calls_are_recorded_in_order() {
    let executor = MemoryExecutor::new();
    executor.functions().register(&function("users")).await.unwrap();
    executor.functions().using("users").with_role("reader").await.unwrap();

    let operations: Vec<Operation> = executor.calls().await.iter().map(|c| c.operation).collect();
    assert_eq!(operations, vec![Operation::Create, Operation::WithRole]);
  }
}
