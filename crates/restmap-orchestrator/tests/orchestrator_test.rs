//! Orchestrating and deploying resolved templates against the in-memory
//! executor.

use std::sync::Arc;
use std::time::Duration;

use restmap_compiler::{Compiler, CompilerConfig};
use restmap_config::TemplateDef;
use restmap_executor::{
  ConstructKind, Executor, MemoryExecutor, Outcome, Registration, TriggerSource,
};
use restmap_graph::ResolutionGraph;
use restmap_orchestrator::{
  ChannelNotifier, DeployOptions, DeploymentEvent, DeploymentNotifier, EdgeParams,
  OrchestrationError, Orchestrator, OrchestratorConfig, RetryPolicy, SOURCE_ATTRIBUTE,
  SubgraphStatus, WiringStep,
};
use restmap_resolver::{Resolver, StandardResolver};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const USERS_TEMPLATE: &str = r#"
version: "1"
kind: restmap
metadata:
  name: users-sync
config:
  endpoints:
    api:
      kind: baseurl
      url: https://svc.example.com
    users:
      kind: relativeurl
      base: api
      relative: /users/{scope}
      params: [scope]
      outputs: [user_queue]
    lookup:
      kind: relativeurl
      base: api
      relative: /scopes/current
  params:
    scope:
      type: string
      resolver: scope_resolver
  resolvers:
    scope_resolver:
      kind: EndpointResolver
      endpoint: lookup
      select: data.scope
  outputs:
    user_queue:
      kind: queue
      target: users-in
"#;

const SHOP_TEMPLATE: &str = r#"
version: "1"
kind: restmap
config:
  endpoints:
    orders:
      kind: baseurl
      url: https://shop.example.com/orders
    stock:
      kind: baseurl
      url: https://shop.example.com/stock
"#;

const TWO_CHAINS_TEMPLATE: &str = r#"
version: "1"
kind: restmap
config:
  endpoints:
    api:
      kind: baseurl
      url: https://svc.example.com
    users:
      kind: relativeurl
      base: api
      relative: /users/{scope}
      params: [scope]
    lookup:
      kind: relativeurl
      base: api
      relative: /scopes/current
    prices:
      kind: relativeurl
      base: api
      relative: /prices/{region}
      params: [region]
    regions:
      kind: relativeurl
      base: api
      relative: /regions
  params:
    scope:
      resolver: scope_resolver
    region:
      resolver: region_resolver
  resolvers:
    scope_resolver:
      kind: EndpointResolver
      endpoint: lookup
    region_resolver:
      kind: EndpointResolver
      endpoint: regions
"#;

fn resolve(source: &str) -> ResolutionGraph {
  let template = TemplateDef::from_yaml_str(source).unwrap();
  StandardResolver::new().resolve(&template).unwrap()
}

fn fast_retry() -> OrchestratorConfig {
  OrchestratorConfig {
    retry: RetryPolicy {
      max_attempts: 3,
      base_delay: Duration::from_millis(1),
      max_delay: Duration::from_millis(5),
    },
    ..OrchestratorConfig::default()
  }
}

fn setup() -> (TempDir, Arc<MemoryExecutor>, Orchestrator) {
  let dir = tempfile::tempdir().unwrap();
  let compiler = Compiler::new(CompilerConfig::new(dir.path().join("functions"))).unwrap();
  let executor = Arc::new(MemoryExecutor::new());
  let orchestrator = Orchestrator::new(compiler, executor.clone()).with_config(fast_retry());
  (dir, executor, orchestrator)
}

#[test]
fn test_orchestrate_derives_resolution_edges() {
  let (dir, _executor, orchestrator) = setup();

  let graph = orchestrator.orchestrate(&resolve(USERS_TEMPLATE)).unwrap();

  let names: Vec<&str> = graph.names().collect();
  assert_eq!(
    names,
    vec!["endpoint:lookup", "endpoint:users", "resolver:scope_resolver"]
  );
  assert_eq!(graph.edge_count(), 2);
  assert!(
    graph
      .edge("endpoint:lookup", "resolver:scope_resolver")
      .unwrap()
      .triggers
  );
  assert_eq!(
    graph
      .edge("resolver:scope_resolver", "endpoint:users")
      .unwrap()
      .on,
    vec![Outcome::Success]
  );

  let users = graph.node("endpoint:users").unwrap();
  assert_eq!(users.uid(), "endpoint-users");
  assert!(users.deployment.code_location.starts_with(dir.path()));
  assert!(users.deployment.code_location.exists());
  assert_eq!(
    graph.node("resolver:scope_resolver").unwrap().uid(),
    "resolver-scope-resolver"
  );
}

#[test]
fn test_unrelated_endpoints_form_singleton_subgraphs() {
  let (_dir, _executor, orchestrator) = setup();
  let graph = orchestrator.orchestrate(&resolve(SHOP_TEMPLATE)).unwrap();

  let subgraphs: Vec<_> = orchestrator.subgraphs(&graph).collect();

  assert_eq!(subgraphs.len(), 2);
  assert!(subgraphs.iter().all(|s| s.len() == 1 && s.edge_count() == 0));
  assert_eq!(subgraphs[0].names().collect::<Vec<_>>(), vec!["endpoint:orders"]);
  assert_eq!(subgraphs[1].names().collect::<Vec<_>>(), vec!["endpoint:stock"]);
}

#[test]
fn test_plan_uses_completion_channel() {
  let (_dir, _executor, orchestrator) = setup();
  let graph = orchestrator.orchestrate(&resolve(USERS_TEMPLATE)).unwrap();

  let plan = orchestrator.plan(&graph).unwrap();

  assert_eq!(plan.channel, "restmap-completion");
  assert_eq!(plan.subgraphs.len(), 1);
  let subgraph = &plan.subgraphs[0];
  assert_eq!(
    subgraph.functions,
    vec!["endpoint-lookup", "endpoint-users", "resolver-scope-resolver"]
  );
  assert_eq!(subgraph.sinks.len(), 1);
  assert_eq!(subgraph.sinks[0].spec.name, "users-in");

  let subscribe = subgraph
    .steps
    .iter()
    .find_map(|step| match step {
      WiringStep::Subscribe { function, trigger } if function == "endpoint-users" => Some(trigger),
      _ => None,
    })
    .unwrap();
  assert_eq!(subscribe.source, TriggerSource::Topic);
  assert_eq!(subscribe.name, "restmap-completion");
  assert_eq!(subscribe.args[SOURCE_ATTRIBUTE], "resolver-scope-resolver");
}

#[tokio::test]
async fn test_deploy_registers_and_wires() {
  let (_dir, executor, orchestrator) = setup();
  let graph = orchestrator.orchestrate(&resolve(USERS_TEMPLATE)).unwrap();

  let report = orchestrator
    .deploy(&graph, DeployOptions::default())
    .await
    .unwrap();

  assert!(report.is_success());
  assert_eq!(report.subgraphs[0].status, SubgraphStatus::Deployed);
  assert_eq!(executor.count(ConstructKind::Function).await, 3);
  assert_eq!(executor.count(ConstructKind::Queue).await, 1);

  let channel = executor
    .construct(ConstructKind::Topic, "restmap-completion")
    .await
    .unwrap();
  let publishers: Vec<&str> = channel.publishers.iter().map(|p| p.as_str()).collect();
  assert_eq!(publishers, vec!["endpoint-lookup", "resolver-scope-resolver"]);

  let users = executor
    .construct(ConstructKind::Function, "endpoint-users")
    .await
    .unwrap();
  assert_eq!(users.triggers.len(), 1);
  assert_eq!(users.triggers[0].args[SOURCE_ATTRIBUTE], "resolver-scope-resolver");

  let lookup = executor
    .construct(ConstructKind::Function, "endpoint-lookup")
    .await
    .unwrap();
  assert_eq!(lookup.notifications.len(), 1);
  assert_eq!(lookup.notifications[0].0, "restmap-completion");
  assert!(lookup.triggers.is_empty());
}

#[tokio::test]
async fn test_dry_run_makes_no_calls() {
  let (_dir, executor, orchestrator) = setup();
  let graph = orchestrator.orchestrate(&resolve(USERS_TEMPLATE)).unwrap();

  let report = orchestrator
    .deploy(
      &graph,
      DeployOptions {
        dry_run: true,
        ..DeployOptions::default()
      },
    )
    .await
    .unwrap();

  assert!(report.dry_run);
  assert_eq!(report.subgraphs.len(), 1);
  assert_eq!(report.subgraphs[0].status, SubgraphStatus::Planned);
  assert!(!report.subgraphs[0].plan.as_ref().unwrap().steps.is_empty());
  assert!(executor.calls().await.is_empty());
}

#[tokio::test]
async fn test_redeploy_reuses_constructs() {
  let (_dir, executor, orchestrator) = setup();
  let graph = orchestrator.orchestrate(&resolve(USERS_TEMPLATE)).unwrap();

  orchestrator
    .deploy(&graph, DeployOptions::default())
    .await
    .unwrap();
  let first = executor.compile().await.unwrap();

  let (sender, mut receiver) = mpsc::unbounded_channel();
  let code_root = tempfile::tempdir().unwrap();
  let orchestrator = Orchestrator::new(
    Compiler::new(CompilerConfig::new(code_root.path())).unwrap(),
    executor.clone(),
  )
  .with_notifier(ChannelNotifier::new(sender));

  let report = orchestrator
    .deploy(&graph, DeployOptions::default())
    .await
    .unwrap();

  assert!(report.is_success());
  assert_eq!(executor.compile().await.unwrap(), first);

  let mut reused = 0;
  while let Ok(event) = receiver.try_recv() {
    if let DeploymentEvent::ConstructRegistered { registration, .. } = event {
      assert_eq!(registration, Registration::Existing);
      reused += 1;
    }
  }
  // queue, three functions, channel
  assert_eq!(reused, 5);
}

#[tokio::test]
async fn test_failing_subgraph_leaves_siblings_deployed() {
  let (_dir, executor, orchestrator) = setup();
  let graph = orchestrator.orchestrate(&resolve(SHOP_TEMPLATE)).unwrap();
  executor.fail_permanently("endpoint-orders").await;

  let report = orchestrator
    .deploy(&graph, DeployOptions::default())
    .await
    .unwrap();

  assert!(!report.is_success());
  match &report.subgraphs[0].status {
    SubgraphStatus::Failed { error } => assert!(error.contains("register function")),
    other => panic!("expected failure, got {other:?}"),
  }
  assert_eq!(report.subgraphs[1].status, SubgraphStatus::Deployed);
  assert!(
    executor
      .construct(ConstructKind::Function, "endpoint-stock")
      .await
      .is_some()
  );
  assert!(
    executor
      .construct(ConstructKind::Function, "endpoint-orders")
      .await
      .is_none()
  );
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
  let (_dir, executor, orchestrator) = setup();
  let graph = orchestrator.orchestrate(&resolve(USERS_TEMPLATE)).unwrap();
  executor.fail_transiently("endpoint-users", 2).await;

  let report = orchestrator
    .deploy(&graph, DeployOptions::default())
    .await
    .unwrap();

  assert!(report.is_success());
  assert!(
    executor
      .construct(ConstructKind::Function, "endpoint-users")
      .await
      .is_some()
  );
}

#[tokio::test]
async fn test_cancelled_deployment_makes_no_calls() {
  let (_dir, executor, orchestrator) = setup();
  let graph = orchestrator.orchestrate(&resolve(SHOP_TEMPLATE)).unwrap();
  let cancel = CancellationToken::new();
  cancel.cancel();

  let report = orchestrator
    .deploy(
      &graph,
      DeployOptions {
        dry_run: false,
        cancel,
      },
    )
    .await
    .unwrap();

  assert!(
    report
      .subgraphs
      .iter()
      .all(|s| s.status == SubgraphStatus::Cancelled)
  );
  assert!(executor.calls().await.is_empty());
}

#[tokio::test]
async fn test_concurrent_subgraphs_share_one_channel() {
  let (_dir, executor, orchestrator) = setup();
  let graph = orchestrator.orchestrate(&resolve(TWO_CHAINS_TEMPLATE)).unwrap();
  assert_eq!(orchestrator.subgraphs(&graph).count(), 2);

  let report = orchestrator
    .deploy(&graph, DeployOptions::default())
    .await
    .unwrap();

  assert!(report.is_success());
  assert_eq!(executor.count(ConstructKind::Topic).await, 1);
  let channel = executor
    .construct(ConstructKind::Topic, "restmap-completion")
    .await
    .unwrap();
  assert_eq!(channel.publishers.len(), 4);
}

#[test]
fn test_colliding_uids_are_rejected() {
  let source = r#"
version: "1"
kind: restmap
config:
  endpoints:
    user_list:
      kind: baseurl
      url: https://svc.example.com/a
    user-list:
      kind: baseurl
      url: https://svc.example.com/b
"#;
  let (_dir, _executor, orchestrator) = setup();

  let err = orchestrator.orchestrate(&resolve(source)).unwrap_err();

  match err {
    OrchestrationError::DuplicateNode { name } => assert_eq!(name, "endpoint:user_list"),
    other => panic!("unexpected error: {other}"),
  }
}

#[test]
fn test_endpoint_and_resolver_may_share_a_name() {
  let source = r#"
version: "1"
kind: restmap
config:
  endpoints:
    api:
      kind: baseurl
      url: https://svc.example.com
    regions:
      kind: relativeurl
      base: api
      relative: /regions
    prices:
      kind: relativeurl
      base: api
      relative: /prices/{region}
      params: [region]
  params:
    region:
      resolver: regions
  resolvers:
    regions:
      kind: EndpointResolver
      endpoint: regions
"#;
  let (_dir, _executor, orchestrator) = setup();

  let graph = orchestrator.orchestrate(&resolve(source)).unwrap();

  assert_eq!(graph.node("endpoint:regions").unwrap().uid(), "endpoint-regions");
  assert_eq!(graph.node("resolver:regions").unwrap().uid(), "resolver-regions");
  assert!(graph.edge("endpoint:regions", "resolver:regions").is_some());
  assert!(graph.edge("resolver:regions", "endpoint:prices").is_some());
}

/// Graph of two chains where the first loops back on itself.
fn looping_chains(orchestrator: &Orchestrator) -> restmap_orchestrator::OrchestrationGraph {
  let mut graph = orchestrator.orchestrate(&resolve(TWO_CHAINS_TEMPLATE)).unwrap();
  graph
    .add_edge("endpoint:users", "endpoint:lookup", EdgeParams::default())
    .unwrap();
  graph
}

#[tokio::test]
async fn test_unplannable_subgraph_leaves_siblings_deployed() {
  let (_dir, executor, orchestrator) = setup();
  let graph = looping_chains(&orchestrator);
  assert!(orchestrator.plan(&graph).is_err());

  let report = orchestrator
    .deploy(&graph, DeployOptions::default())
    .await
    .unwrap();

  assert_eq!(report.subgraphs.len(), 2);
  let failed: Vec<_> = report.unfinished().collect();
  assert_eq!(failed.len(), 1);
  assert!(failed[0].plan.is_none());
  match &failed[0].status {
    SubgraphStatus::Failed { error } => assert!(error.contains("loop")),
    other => panic!("expected failure, got {other:?}"),
  }
  assert!(
    report
      .subgraphs
      .iter()
      .any(|s| s.status == SubgraphStatus::Deployed)
  );
  assert!(
    executor
      .construct(ConstructKind::Function, "endpoint-prices")
      .await
      .is_some()
  );
  assert!(
    executor
      .construct(ConstructKind::Function, "endpoint-lookup")
      .await
      .is_none()
  );
}

#[tokio::test]
async fn test_dry_run_reports_unplannable_subgraph() {
  let (_dir, executor, orchestrator) = setup();
  let graph = looping_chains(&orchestrator);

  let report = orchestrator
    .deploy(
      &graph,
      DeployOptions {
        dry_run: true,
        ..DeployOptions::default()
      },
    )
    .await
    .unwrap();

  let statuses: Vec<_> = report.subgraphs.iter().map(|s| &s.status).collect();
  assert_eq!(
    statuses
      .iter()
      .filter(|s| matches!(s, SubgraphStatus::Failed { .. }))
      .count(),
    1
  );
  assert_eq!(
    statuses
      .iter()
      .filter(|s| ***s == SubgraphStatus::Planned)
      .count(),
    1
  );
  assert!(executor.calls().await.is_empty());
}

/// Panics inside the deployment task of one subgraph.
struct PanicOnStart(usize);

impl DeploymentNotifier for PanicOnStart {
  fn notify(&self, event: DeploymentEvent) {
    if let DeploymentEvent::SubgraphStarted { index, .. } = event {
      if index == self.0 {
        panic!("notifier gave up on subgraph {index}");
      }
    }
  }
}

#[tokio::test]
async fn test_panicking_task_is_reported_as_failed() {
  let dir = tempfile::tempdir().unwrap();
  let compiler = Compiler::new(CompilerConfig::new(dir.path())).unwrap();
  let executor = Arc::new(MemoryExecutor::new());
  let orchestrator = Orchestrator::new(compiler, executor.clone())
    .with_config(fast_retry())
    .with_notifier(PanicOnStart(0));
  let graph = orchestrator.orchestrate(&resolve(SHOP_TEMPLATE)).unwrap();

  let report = orchestrator
    .deploy(&graph, DeployOptions::default())
    .await
    .unwrap();

  assert_eq!(report.subgraphs.len(), 2);
  assert_eq!(report.subgraphs[0].index, 0);
  match &report.subgraphs[0].status {
    SubgraphStatus::Failed { error } => assert!(error.contains("join error")),
    other => panic!("expected failure, got {other:?}"),
  }
  assert!(report.subgraphs[0].plan.is_some());
  assert_eq!(report.subgraphs[1].status, SubgraphStatus::Deployed);
  assert!(
    executor
      .construct(ConstructKind::Function, "endpoint-stock")
      .await
      .is_some()
  );
}
