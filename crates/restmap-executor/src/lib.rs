//! Restmap Executor
//!
//! The backend surface functions are deployed through. An [`Executor`]
//! exposes capability groups (functions, buckets, tables, queues, topics)
//! plus stack-level operations. Registration is idempotent: registering a
//! construct that already exists is a logged no-op.

mod construct;
mod error;
mod executor;
mod handle;
mod memory;
mod provider;

pub use construct::{
  ConstructKind, ConstructRecord, NotifyParams, Outcome, Registration, StackDiff, StackManifest,
  StorageSpec, TopicConfig, TriggerSource, TriggerSpec,
};
pub use error::ExecutorError;
pub use executor::Executor;
pub use handle::{FunctionHandle, StorageHandle, TopicHandle};
pub use memory::{ExecutorCall, MemoryExecutor, Operation};
pub use provider::{FunctionProvider, StorageProvider, TopicProvider, registered};
