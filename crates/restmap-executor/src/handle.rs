use crate::construct::{NotifyParams, TriggerSpec};
use crate::error::ExecutorError;
use crate::provider::{FunctionProvider, StorageProvider, TopicProvider};

/// A function provider bound to one function.
pub struct FunctionHandle<'a> {
  provider: &'a dyn FunctionProvider,
  name: String,
}

impl FunctionHandle<'_> {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub async fn with_role(&self, role: &str) -> Result<(), ExecutorError> {
    self.provider.with_role(&self.name, role).await
  }

  pub async fn trigger(&self, trigger: TriggerSpec) -> Result<(), ExecutorError> {
    self.provider.trigger(&self.name, trigger).await
  }

  pub async fn notify(&self, topic: &str, params: NotifyParams) -> Result<(), ExecutorError> {
    self.provider.notify(&self.name, topic, params).await
  }
}

impl<'a> dyn FunctionProvider + 'a {
  pub fn using(&self, name: impl Into<String>) -> FunctionHandle<'_> {
    FunctionHandle {
      provider: self,
      name: name.into(),
    }
  }
}

/// A storage provider bound to one bucket, table or queue.
pub struct StorageHandle<'a> {
  provider: &'a dyn StorageProvider,
  name: String,
}

impl StorageHandle<'_> {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub async fn with_role(&self, role: &str) -> Result<(), ExecutorError> {
    self.provider.with_role(&self.name, role).await
  }
}

impl<'a> dyn StorageProvider + 'a {
  pub fn using(&self, name: impl Into<String>) -> StorageHandle<'_> {
    StorageHandle {
      provider: self,
      name: name.into(),
    }
  }
}

/// A topic provider bound to one topic.
pub struct TopicHandle<'a> {
  provider: &'a dyn TopicProvider,
  name: String,
}

impl TopicHandle<'_> {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub async fn with_role(&self, role: &str) -> Result<(), ExecutorError> {
    self.provider.with_role(&self.name, role).await
  }

  pub async fn grant_publish(&self, target: &str) -> Result<(), ExecutorError> {
    self.provider.grant_publish(&self.name, target).await
  }
}

impl<'a> dyn TopicProvider + 'a {
  pub fn using(&self, name: impl Into<String>) -> TopicHandle<'_> {
    TopicHandle {
      provider: self,
      name: name.into(),
    }
  }
}
