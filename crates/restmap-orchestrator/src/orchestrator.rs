use std::collections::BTreeSet;
use std::sync::Arc;

use restmap_compiler::{Compiler, ExecutableUnit, uid_for};
use restmap_executor::{ConstructKind, Executor, Registration, TopicConfig};
use restmap_graph::ResolutionGraph;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::OrchestrationError;
use crate::events::{DeploymentEvent, DeploymentNotifier, NoopNotifier};
use crate::graph::{EdgeParams, OrchestrationGraph, OrchestrationNode};
use crate::plan::{DeploymentPlan, SOURCE_ATTRIBUTE, SinkPlan, SubgraphPlan, WiringStep};
use crate::retry::{RetryPolicy, with_retry};
use crate::subgraphs::Subgraphs;

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
  /// Prefix of the completion channel name.
  pub channel_prefix: String,
  pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
  fn default() -> Self {
    Self {
      channel_prefix: "restmap".to_string(),
      retry: RetryPolicy::default(),
    }
  }
}

impl OrchestratorConfig {
  /// Name of the topic functions publish their outcomes to.
  pub fn channel(&self) -> String {
    format!("{}-completion", self.channel_prefix)
  }
}

#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
  /// Plan everything but make no backend call.
  pub dry_run: bool,
  pub cancel: CancellationToken,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubgraphStatus {
  Planned,
  Deployed,
  Failed { error: String },
  Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubgraphReport {
  pub index: usize,
  /// Absent when the subgraph could not be planned.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub plan: Option<SubgraphPlan>,
  #[serde(flatten)]
  pub status: SubgraphStatus,
}

/// Result of a deployment, one entry per subgraph in subgraph order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentReport {
  pub deployment_id: String,
  pub dry_run: bool,
  pub channel: String,
  pub subgraphs: Vec<SubgraphReport>,
}

impl DeploymentReport {
  /// Subgraphs that failed or were cancelled.
  pub fn unfinished(&self) -> impl Iterator<Item = &SubgraphReport> {
    self.subgraphs.iter().filter(|s| {
      matches!(
        s.status,
        SubgraphStatus::Failed { .. } | SubgraphStatus::Cancelled
      )
    })
  }

  pub fn is_success(&self) -> bool {
    self.unfinished().next().is_none()
  }
}

/// Turns a resolution graph into deployed, wired functions.
pub struct Orchestrator {
  compiler: Compiler,
  executor: Arc<dyn Executor>,
  config: OrchestratorConfig,
  notifier: Arc<dyn DeploymentNotifier>,
}

impl Orchestrator {
  pub fn new(compiler: Compiler, executor: Arc<dyn Executor>) -> Self {
    Self {
      compiler,
      executor,
      config: OrchestratorConfig::default(),
      notifier: Arc::new(NoopNotifier),
    }
  }

  pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
    self.config = config;
    self
  }

  pub fn with_notifier(mut self, notifier: impl DeploymentNotifier + 'static) -> Self {
    self.notifier = Arc::new(notifier);
    self
  }

  pub fn config(&self) -> &OrchestratorConfig {
    &self.config
  }

  pub fn executor(&self) -> &Arc<dyn Executor> {
    &self.executor
  }

  /// Compile every executable unit and derive the edges between them.
  ///
  /// Nodes are named by category, `endpoint:users` or
  /// `resolver:scope_resolver`. An endpoint read by a resolver runs before
  /// that resolver, and a resolver runs before every relative endpoint whose
  /// parameters it supplies.
  #[instrument(skip_all, fields(endpoints = graph.endpoints().count(), resolvers = graph.resolvers().count()))]
  pub fn orchestrate(&self, graph: &ResolutionGraph) -> Result<OrchestrationGraph, OrchestrationError> {
    let mut orchestration = OrchestrationGraph::default();
    let mut uids = BTreeSet::new();

    for unit in ExecutableUnit::collect(graph) {
      let name = unit.qualified_name();
      if orchestration.contains(&name) || !uids.insert(uid_for(&name)) {
        return Err(OrchestrationError::DuplicateNode { name });
      }
      let deployment = self.compiler.compile(&unit)?;
      orchestration.insert(OrchestrationNode::new(name, deployment));
    }

    let endpoint = |name: &str| ExecutableUnit::qualify("endpoint", name);
    let resolver = |name: &str| ExecutableUnit::qualify("resolver", name);
    for reader in graph.resolvers() {
      if let Some(source) = reader.endpoint() {
        orchestration.add_edge(&endpoint(&source.name), &resolver(&reader.name), EdgeParams::default())?;
      }
    }
    for target in graph.endpoints().filter(|e| e.is_relative()) {
      for feeding in graph.resolvers_feeding(target) {
        orchestration.add_edge(&resolver(&feeding.name), &endpoint(&target.name), EdgeParams::default())?;
      }
    }

    info!(
      nodes = orchestration.len(),
      edges = orchestration.edge_count(),
      "orchestrated"
    );
    Ok(orchestration)
  }

  pub fn subgraphs<'g>(&self, graph: &'g OrchestrationGraph) -> Subgraphs<'g> {
    graph.subgraphs()
  }

  /// Every call a deployment of `graph` would make, per subgraph.
  pub fn plan(&self, graph: &OrchestrationGraph) -> Result<DeploymentPlan, OrchestrationError> {
    let channel = self.config.channel();
    let subgraphs = self
      .subgraphs(graph)
      .enumerate()
      .map(|(index, subgraph)| SubgraphPlan::build(index, &subgraph, &channel))
      .collect::<Result<Vec<_>, _>>()?;
    Ok(DeploymentPlan { channel, subgraphs })
  }

  /// Deploy every subgraph concurrently.
  ///
  /// Each subgraph is planned on its own. One that cannot be planned, or
  /// whose deployment fails, is reported in its entry and leaves its
  /// siblings untouched; nothing is rolled back. Dry runs report the same
  /// planning failures.
  #[instrument(skip_all, fields(dry_run = options.dry_run))]
  pub async fn deploy(
    &self,
    graph: &OrchestrationGraph,
    options: DeployOptions,
  ) -> Result<DeploymentReport, OrchestrationError> {
    let deployment_id = uuid::Uuid::new_v4().to_string();
    let channel = self.config.channel();
    let planned: Vec<_> = self
      .subgraphs(graph)
      .enumerate()
      .map(|(index, subgraph)| {
        let plan = SubgraphPlan::build(index, &subgraph, &channel);
        (index, subgraph, plan)
      })
      .collect();

    info!(
      deployment_id = %deployment_id,
      subgraphs = planned.len(),
      nodes = graph.len(),
      "deployment_started"
    );
    self.notifier.notify(DeploymentEvent::DeploymentStarted {
      deployment_id: deployment_id.clone(),
      subgraphs: planned.len(),
      dry_run: options.dry_run,
    });

    let mut reports = Vec::with_capacity(planned.len());
    let mut handles = Vec::new();
    for (index, subgraph, plan) in planned {
      let plan = match plan {
        Ok(plan) => plan,
        Err(e) => {
          reports.push(self.failed(&deployment_id, index, None, &e));
          continue;
        }
      };
      if options.dry_run {
        reports.push(SubgraphReport {
          index,
          plan: Some(plan),
          status: SubgraphStatus::Planned,
        });
        continue;
      }

      let cascade = Cascade {
        deployment_id: deployment_id.clone(),
        executor: Arc::clone(&self.executor),
        notifier: Arc::clone(&self.notifier),
        retry: self.config.retry.clone(),
        cancel: options.cancel.clone(),
      };
      handles.push((plan.clone(), tokio::spawn(cascade.run(subgraph, plan))));
    }

    let (plans, tasks): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
    for (plan, joined) in plans.into_iter().zip(futures::future::join_all(tasks).await) {
      let report = match joined {
        Ok(report) => report,
        Err(e) => {
          let error = OrchestrationError::Task {
            message: format!("subgraph join error: {e}"),
          };
          self.failed(&deployment_id, plan.index, Some(plan), &error)
        }
      };
      reports.push(report);
    }
    reports.sort_by_key(|r| r.index);

    let report = DeploymentReport {
      deployment_id,
      dry_run: options.dry_run,
      channel,
      subgraphs: reports,
    };
    let failed = report.unfinished().count();
    info!(deployment_id = %report.deployment_id, failed, "deployment_completed");
    self.notifier.notify(DeploymentEvent::DeploymentCompleted {
      deployment_id: report.deployment_id.clone(),
      failed,
    });
    Ok(report)
  }

  fn failed(
    &self,
    deployment_id: &str,
    index: usize,
    plan: Option<SubgraphPlan>,
    error: &OrchestrationError,
  ) -> SubgraphReport {
    error!(index, error = %error, "subgraph deployment failed");
    self.notifier.notify(DeploymentEvent::SubgraphFailed {
      deployment_id: deployment_id.to_string(),
      index,
      error: error.to_string(),
    });
    SubgraphReport {
      index,
      plan,
      status: SubgraphStatus::Failed {
        error: error.to_string(),
      },
    }
  }
}

/// Deployment of one subgraph, run as its own task.
struct Cascade {
  deployment_id: String,
  executor: Arc<dyn Executor>,
  notifier: Arc<dyn DeploymentNotifier>,
  retry: RetryPolicy,
  cancel: CancellationToken,
}

impl Cascade {
  async fn run(self, subgraph: OrchestrationGraph, plan: SubgraphPlan) -> SubgraphReport {
    let index = plan.index;
    self.notifier.notify(DeploymentEvent::SubgraphStarted {
      deployment_id: self.deployment_id.clone(),
      index,
    });

    let status = match self.apply(&subgraph, &plan).await {
      Ok(()) => {
        info!(index, functions = plan.functions.len(), "subgraph deployed");
        self.notifier.notify(DeploymentEvent::SubgraphCompleted {
          deployment_id: self.deployment_id.clone(),
          index,
        });
        SubgraphStatus::Deployed
      }
      Err(OrchestrationError::Cancelled) => {
        warn!(index, "subgraph deployment cancelled");
        self.notifier.notify(DeploymentEvent::SubgraphCancelled {
          deployment_id: self.deployment_id.clone(),
          index,
        });
        SubgraphStatus::Cancelled
      }
      Err(e) => {
        error!(index, error = %e, "subgraph deployment failed");
        self.notifier.notify(DeploymentEvent::SubgraphFailed {
          deployment_id: self.deployment_id.clone(),
          index,
          error: e.to_string(),
        });
        SubgraphStatus::Failed {
          error: e.to_string(),
        }
      }
    };

    SubgraphReport {
      index,
      plan: Some(plan),
      status,
    }
  }

  async fn apply(
    &self,
    subgraph: &OrchestrationGraph,
    plan: &SubgraphPlan,
  ) -> Result<(), OrchestrationError> {
    futures::future::try_join_all(plan.sinks.iter().map(|sink| self.register_sink(sink))).await?;

    let functions = self.executor.functions();
    for node in subgraph.nodes() {
      let deployment = &node.deployment;
      let registration = with_retry(&self.retry, &self.cancel, "register function", || {
        functions.register(deployment)
      })
      .await?;
      self.registered(ConstructKind::Function, node.uid(), registration);
    }

    for step in &plan.steps {
      self.wire(step).await?;
    }
    Ok(())
  }

  async fn register_sink(&self, sink: &SinkPlan) -> Result<(), OrchestrationError> {
    let spec = &sink.spec;
    let registration = match self.executor.storage(sink.kind) {
      Some(storage) => {
        with_retry(&self.retry, &self.cancel, "register sink", || {
          storage.register(spec)
        })
        .await?
      }
      None => {
        let topics = self.executor.topics();
        let config = TopicConfig::default();
        with_retry(&self.retry, &self.cancel, "register sink", || {
          topics.register(&spec.name, &config)
        })
        .await?
      }
    };
    self.registered(sink.kind.into(), &spec.name, registration);
    Ok(())
  }

  async fn wire(&self, step: &WiringStep) -> Result<(), OrchestrationError> {
    let functions = self.executor.functions();
    let topics = self.executor.topics();

    match step {
      WiringStep::EnsureChannel { channel } => {
        let config = TopicConfig::default();
        let registration = with_retry(&self.retry, &self.cancel, "ensure channel", || {
          topics.get_or_create(channel, &config)
        })
        .await?;
        self.registered(ConstructKind::Topic, channel, registration);
      }
      WiringStep::GrantPublish { channel, function } => {
        with_retry(&self.retry, &self.cancel, "grant publish", || async move {
          topics.using(channel.as_str()).grant_publish(function).await
        })
        .await?;
        debug!(channel = %channel, function = %function, "granted publish");
      }
      WiringStep::Notify {
        function,
        channel,
        params,
      } => {
        with_retry(&self.retry, &self.cancel, "notify", || async move {
          functions
            .using(function.as_str())
            .notify(channel, params.clone())
            .await
        })
        .await?;
        debug!(function = %function, channel = %channel, "configured completion notice");
      }
      WiringStep::Subscribe { function, trigger } => {
        with_retry(&self.retry, &self.cancel, "subscribe", || async move {
          functions
            .using(function.as_str())
            .trigger(trigger.clone())
            .await
        })
        .await?;

        let from = trigger
          .args
          .get(SOURCE_ATTRIBUTE)
          .cloned()
          .unwrap_or_default();
        debug!(from = %from, to = %function, "edge wired");
        self.notifier.notify(DeploymentEvent::EdgeWired {
          deployment_id: self.deployment_id.clone(),
          from,
          to: function.clone(),
        });
      }
    }
    Ok(())
  }

  fn registered(&self, kind: ConstructKind, name: &str, registration: Registration) {
    debug!(%kind, name, ?registration, "construct registered");
    self.notifier.notify(DeploymentEvent::ConstructRegistered {
      deployment_id: self.deployment_id.clone(),
      kind,
      name: name.to_string(),
      registration,
    });
  }
}
