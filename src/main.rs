use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use inkflow_ai::EchoClient;
use inkflow_config::{RuntimeConfig, WorkflowDef};
use inkflow_engine::{
  RunEvent, RunRequest, Setting, SettingPrompt, SettingsRenderer, TemplateSettingsRenderer,
  WorkflowEngine,
};
use inkflow_store::{ExecutionStatus, MemoryStore, SqliteStore, Store};

/// Inkflow - run AI writing workflows from the command line
#[derive(Parser)]
#[command(name = "inkflow")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.inkflow)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Keep execution records in memory instead of the data directory
  #[arg(long, global = true)]
  memory: bool,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Check that a workflow's block markers nest and print its outline
  Validate {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },

  /// Run a workflow
  Run {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,

    /// Initial input (default: stdin when piped)
    #[arg(long)]
    input: Option<String>,

    /// Settings file bound to {{settings}}: {"settings": [...], "prompts": [...]}
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Global loop ceiling, used when the workflow sets none
    #[arg(long)]
    max_loop_count: Option<u32>,

    /// Global timeout in seconds, used when the workflow sets none (0 disables)
    #[arg(long)]
    timeout: Option<u64>,
  },

  /// List past executions of a workflow
  History {
    workflow_id: String,

    /// Also print node results
    #[arg(long)]
    nodes: bool,
  },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
  settings: Vec<Setting>,
  prompts: Vec<SettingPrompt>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".inkflow"),
  };

  let rt = tokio::runtime::Runtime::new()?;
  match cli.command {
    Some(Commands::Validate { workflow_file }) => validate(&workflow_file)?,
    Some(Commands::Run {
      workflow_file,
      input,
      settings,
      max_loop_count,
      timeout,
    }) => {
      let mut defaults = RuntimeConfig::default();
      if let Some(max_loop_count) = max_loop_count {
        defaults.max_loop_count = max_loop_count;
      }
      if let Some(timeout) = timeout {
        defaults.timeout_seconds = timeout;
      }
      let status = rt.block_on(async {
        let store = open_store(&data_dir, cli.memory).await?;
        run_workflow(store, &workflow_file, input, settings.as_deref(), defaults).await
      })?;
      if status != ExecutionStatus::Completed {
        std::process::exit(1);
      }
    }
    Some(Commands::History { workflow_id, nodes }) => rt.block_on(async {
      let store = open_store(&data_dir, cli.memory).await?;
      print_history(store.as_ref(), &workflow_id, nodes).await
    })?,
    None => {
      println!("inkflow - use --help to see available commands");
    }
  }

  Ok(())
}

async fn open_store(data_dir: &Path, memory: bool) -> Result<Arc<dyn Store>> {
  if memory {
    return Ok(Arc::new(MemoryStore::new()));
  }
  tokio::fs::create_dir_all(data_dir)
    .await
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;
  let path = data_dir.join("inkflow.db");
  let store = SqliteStore::open(&path)
    .await
    .with_context(|| format!("failed to open database: {}", path.display()))?;
  Ok(Arc::new(store))
}

fn load_workflow(workflow_file: &Path) -> Result<WorkflowDef> {
  let content = std::fs::read_to_string(workflow_file)
    .with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse workflow file: {}", workflow_file.display()))
}

fn validate(workflow_file: &Path) -> Result<()> {
  let workflow = load_workflow(workflow_file)?;
  let plan = inkflow_workflow::resolve(&workflow.nodes)
    .with_context(|| format!("workflow '{}' is invalid", workflow.id))?;

  eprintln!(
    "Workflow '{}' is valid: {} executable nodes",
    workflow.name,
    plan.node_count()
  );
  println!("{}", plan.outline());
  Ok(())
}

async fn run_workflow(
  store: Arc<dyn Store>,
  workflow_file: &Path,
  input: Option<String>,
  settings_file: Option<&Path>,
  defaults: RuntimeConfig,
) -> Result<ExecutionStatus> {
  let workflow = load_workflow(workflow_file)?;
  eprintln!("Loaded workflow: {}", workflow.name);

  let input = match input {
    Some(input) => input,
    None => read_input_from_stdin()?,
  };

  let mut request = RunRequest::from_workflow(&workflow, &defaults, input);
  if let Some(path) = settings_file {
    request = request.with_settings(render_settings(path)?);
  }

  let engine = WorkflowEngine::new(store, Arc::new(EchoClient::new()));
  let mut handle = engine.start(request);

  let control = handle.control().clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      control.cancel();
    }
  });

  while let Some(event) = handle.next_event().await {
    print_event(&event);
  }

  let outcome = handle.wait().await.context("workflow execution failed")?;
  eprintln!("Execution {}: {}", outcome.execution_id, outcome.status);
  eprintln!("Nodes executed: {}", outcome.node_results.len());
  if let Some(error) = &outcome.error {
    eprintln!("Error: {error}");
  }
  if let Some(output) = &outcome.final_output {
    println!("{output}");
  }

  Ok(outcome.status)
}

fn render_settings(path: &Path) -> Result<String> {
  let content = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read settings file: {}", path.display()))?;
  let file: SettingsFile = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse settings file: {}", path.display()))?;
  let rendered = TemplateSettingsRenderer::new()
    .render(&file.settings, &file.prompts)
    .context("failed to render settings")?;
  Ok(rendered)
}

fn print_event(event: &RunEvent) {
  match event {
    RunEvent::ExecutionStarted { execution_id, .. } => eprintln!("Started execution {execution_id}"),
    RunEvent::NodeProgress {
      node_name,
      iteration,
      is_running,
      is_streaming,
      error,
      ..
    } => {
      if *is_streaming {
        return;
      }
      match error {
        Some(error) => eprintln!("  [failed] {node_name} (#{iteration}): {error}"),
        None => {
          let state = if *is_running { "running" } else { "done" };
          eprintln!("  [{state}] {node_name} (#{iteration})");
        }
      }
    }
    RunEvent::Paused { .. } => eprintln!("Paused"),
    RunEvent::Resumed { .. } => eprintln!("Resumed"),
    RunEvent::Finished { status, .. } => eprintln!("Finished: {status}"),
  }
}

async fn print_history(store: &dyn Store, workflow_id: &str, with_nodes: bool) -> Result<()> {
  let executions = store
    .list_executions(workflow_id)
    .await
    .context("failed to list executions")?;
  if executions.is_empty() {
    eprintln!("No executions for workflow '{workflow_id}'");
    return Ok(());
  }

  for execution in executions {
    // A run that never reached a terminal status was interrupted.
    let marker = if execution.status.is_terminal() { "" } else { " (unfinished)" };
    println!(
      "{}  {}{}  {}",
      execution.started_at.to_rfc3339(),
      execution.status,
      marker,
      execution.id
    );
    if !with_nodes {
      continue;
    }
    let results = store
      .list_node_results(&execution.id)
      .await
      .with_context(|| format!("failed to list node results for {}", execution.id))?;
    for result in results {
      let output = result.output.as_deref().unwrap_or_default();
      println!(
        "    {} #{} {:?}: {}",
        result.node_id, result.iteration, result.status, output
      );
    }
  }
  Ok(())
}

fn read_input_from_stdin() -> Result<String> {
  if io::stdin().is_terminal() {
    return Ok(String::new());
  }
  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read input from stdin")?;
  Ok(input.trim_end().to_string())
}
