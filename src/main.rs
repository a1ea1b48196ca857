mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use restmap_compiler::{Compiler, CompilerConfig, ExecutableUnit};
use restmap_config::{TemplateDef, load_template};
use restmap_executor::{Executor, MemoryExecutor};
use restmap_graph::ResolutionGraph;
use restmap_orchestrator::{DeployOptions, Orchestrator};
use restmap_resolver::{Resolver, StandardResolver};

/// Restmap - turn REST API templates into event-wired serverless functions
#[derive(Parser)]
#[command(name = "restmap")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.restmap)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Log level used when RUST_LOG is not set
  #[arg(long, global = true, default_value = "info")]
  log_level: String,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Parse and resolve a template
  Validate {
    /// Path to the template file (YAML or JSON)
    template: PathBuf,
  },

  /// Compile a template and print its deployment plan
  Plan {
    /// Path to the template file (YAML or JSON)
    template: PathBuf,
  },

  /// Compile and deploy a template
  Deploy {
    /// Path to the template file (YAML or JSON)
    template: PathBuf,

    /// Compute the full plan without calling the backend
    #[arg(long)]
    dry_run: bool,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  logging::init(&cli.log_level);

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".restmap"),
  };
  debug!(data_dir = %data_dir.display(), "using data directory");

  match cli.command {
    Some(Commands::Validate { template }) => validate(&template),
    Some(Commands::Plan { template }) => plan(&template, &data_dir),
    Some(Commands::Deploy { template, dry_run }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(deploy(&template, &data_dir, dry_run))
    }
    None => {
      println!("restmap - use --help to see available commands");
      Ok(())
    }
  }
}

fn load(path: &Path) -> Result<(TemplateDef, ResolutionGraph)> {
  let template = load_template(path)
    .with_context(|| format!("failed to load template: {}", path.display()))?;
  let graph = StandardResolver::new()
    .resolve(&template)
    .with_context(|| format!("failed to resolve template '{}'", template.name()))?;
  Ok((template, graph))
}

fn orchestrator(data_dir: &Path, executor: Arc<dyn Executor>) -> Result<Orchestrator> {
  let compiler = Compiler::new(CompilerConfig::new(data_dir.join("functions")))
    .context("failed to load compiler templates")?;
  Ok(Orchestrator::new(compiler, executor))
}

fn validate(path: &Path) -> Result<()> {
  let (template, graph) = load(path)?;
  let (endpoints, params, resolvers, outputs) = graph.counts();
  let units: Vec<String> = ExecutableUnit::collect(&graph)
    .iter()
    .map(|u| u.qualified_name())
    .collect();

  eprintln!("Template '{}' is valid", template.name());
  let summary = serde_json::json!({
    "name": template.name(),
    "endpoints": endpoints,
    "params": params,
    "resolvers": resolvers,
    "outputs": outputs,
    "units": units,
  });
  println!("{}", serde_json::to_string_pretty(&summary)?);
  Ok(())
}

fn plan(path: &Path, data_dir: &Path) -> Result<()> {
  let (template, graph) = load(path)?;
  let orchestrator = orchestrator(data_dir, Arc::new(MemoryExecutor::new()))?;

  let orchestration = orchestrator
    .orchestrate(&graph)
    .context("failed to compile template")?;
  let plan = orchestrator
    .plan(&orchestration)
    .context("failed to plan deployment")?;

  eprintln!(
    "Planned '{}': {} functions in {} subgraphs",
    template.name(),
    plan.function_count(),
    plan.subgraphs.len()
  );
  println!("{}", serde_json::to_string_pretty(&plan)?);
  Ok(())
}

async fn deploy(path: &Path, data_dir: &Path, dry_run: bool) -> Result<()> {
  let (template, graph) = load(path)?;
  let executor = Arc::new(MemoryExecutor::new());
  let orchestrator = orchestrator(data_dir, executor.clone())?;

  let orchestration = orchestrator
    .orchestrate(&graph)
    .context("failed to compile template")?;

  let cancel = CancellationToken::new();
  let on_interrupt = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      on_interrupt.cancel();
    }
  });

  let report = orchestrator
    .deploy(&orchestration, DeployOptions { dry_run, cancel })
    .await
    .context("deployment failed")?;

  println!("{}", serde_json::to_string_pretty(&report)?);

  let unfinished = report.unfinished().count();
  if unfinished > 0 {
    bail!(
      "{unfinished} of {} subgraphs of '{}' did not deploy",
      report.subgraphs.len(),
      template.name()
    );
  }

  if !dry_run {
    let manifest = executor.deploy().await.context("failed to apply stack")?;
    eprintln!(
      "Deployed '{}': {} constructs",
      template.name(),
      manifest.constructs.len()
    );
  }
  Ok(())
}
