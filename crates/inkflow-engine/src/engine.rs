//! Workflow execution engine.
//!
//! The `WorkflowEngine` resolves a node list into a plan, creates the
//! execution record and drives the plan to a terminal state.

use std::collections::HashMap;
use std::sync::Arc;

use inkflow_ai::AiClient;
use inkflow_config::{NodeDef, RuntimeConfig, WorkflowDef};
use inkflow_store::{Execution, ExecutionStatus, NodeResult, Store};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::context::{ContextSnapshot, ExecutionContext};
use crate::control::RunControl;
use crate::error::EngineError;
use crate::events::{ChannelNotifier, ExecutionNotifier, RunEvent};
use crate::interpreter::Interpreter;
use crate::reporter::Reporter;

/// Variable that rendered settings are bound to.
pub const SETTINGS_VAR: &str = "settings";

/// Everything needed to start one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
  pub workflow_id: String,
  pub nodes: Vec<NodeDef>,
  pub config: RuntimeConfig,
  pub input: String,
  /// Variables set before the first node runs.
  pub variables: HashMap<String, String>,
}

impl RunRequest {
  pub fn new(workflow_id: impl Into<String>, nodes: Vec<NodeDef>, input: impl Into<String>) -> Self {
    Self {
      workflow_id: workflow_id.into(),
      nodes,
      config: RuntimeConfig::default(),
      input: input.into(),
      variables: HashMap::new(),
    }
  }

  /// A request for a workflow definition, applying its limits over `defaults`.
  pub fn from_workflow(
    workflow: &WorkflowDef,
    defaults: &RuntimeConfig,
    input: impl Into<String>,
  ) -> Self {
    Self {
      config: workflow.runtime_config(defaults),
      ..Self::new(workflow.id.clone(), workflow.nodes.clone(), input)
    }
  }

  pub fn with_config(mut self, config: RuntimeConfig) -> Self {
    self.config = config;
    self
  }

  pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.variables.insert(name.into(), value.into());
    self
  }

  /// Bind rendered settings text to `{{settings}}`.
  pub fn with_settings(self, rendered: impl Into<String>) -> Self {
    self.with_variable(SETTINGS_VAR, rendered)
  }
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
  pub execution_id: String,
  pub status: ExecutionStatus,
  pub final_output: Option<String>,
  pub error: Option<String>,
  pub snapshot: ContextSnapshot,
  /// Every node result of the run, in start order.
  pub node_results: Vec<NodeResult>,
}

/// The workflow execution engine.
#[derive(Clone)]
pub struct WorkflowEngine {
  store: Arc<dyn Store>,
  ai: Arc<dyn AiClient>,
}

impl WorkflowEngine {
  pub fn new(store: Arc<dyn Store>, ai: Arc<dyn AiClient>) -> Self {
    Self { store, ai }
  }

  pub fn store(&self) -> &Arc<dyn Store> {
    &self.store
  }

  /// Start a run on a background task.
  ///
  /// Events arrive through [`RunHandle::next_event`]; the run stops at the
  /// next boundary when paused or cancelled through the handle.
  pub fn start(&self, request: RunRequest) -> RunHandle {
    let (sender, events) = mpsc::unbounded_channel();
    let control = RunControl::new();
    let execution_id = uuid::Uuid::new_v4().to_string();

    let engine = self.clone();
    let task_control = control.clone();
    let task_execution_id = execution_id.clone();
    let task = tokio::spawn(async move {
      let notifier: Arc<dyn ExecutionNotifier> = Arc::new(ChannelNotifier::new(sender));
      engine
        .execute(task_execution_id, request, task_control, notifier)
        .await
    });

    RunHandle {
      execution_id,
      control,
      events,
      task,
    }
  }

  /// Run to completion on the current task.
  pub async fn run(
    &self,
    request: RunRequest,
    control: RunControl,
    notifier: Arc<dyn ExecutionNotifier>,
  ) -> Result<RunOutcome, EngineError> {
    let execution_id = uuid::Uuid::new_v4().to_string();
    self.execute(execution_id, request, control, notifier).await
  }

  /// Resolve, persist and drive one run.
  ///
  /// Validation errors are returned before any record is written. Every other
  /// failure ends in a persisted terminal status and an `Ok` outcome.
  #[instrument(skip_all, fields(execution_id = %execution_id, workflow_id = %request.workflow_id))]
  async fn execute(
    &self,
    execution_id: String,
    request: RunRequest,
    control: RunControl,
    notifier: Arc<dyn ExecutionNotifier>,
  ) -> Result<RunOutcome, EngineError> {
    let plan = inkflow_workflow::resolve(&request.nodes).inspect_err(|e| {
      warn!(error = %e, node_id = e.node_id().unwrap_or_default(), "workflow_invalid");
    })?;

    let execution = Execution {
      id: execution_id.clone(),
      ..Execution::start(request.workflow_id.clone(), request.input.clone())
    };
    let reporter = Reporter::new(self.store.clone(), notifier, execution_id.clone());
    reporter.execution_started(&execution).await?;

    let mut ctx = ExecutionContext::new(request.input, request.config);
    for (name, value) in request.variables {
      ctx.set_variable(name, value);
    }

    let interpreter = Interpreter::new(self.ai.clone(), reporter, control);
    let result = interpreter.run_steps(&plan.steps, &mut ctx, true).await;

    let (status, error) = match result {
      Ok(()) => {
        info!(elapsed_secs = ctx.elapsed_seconds(), "workflow_completed");
        (ExecutionStatus::Completed, None)
      }
      Err(EngineError::Cancelled) => {
        info!("workflow_cancelled");
        (ExecutionStatus::Cancelled, None)
      }
      Err(e @ EngineError::Timeout { .. }) => {
        warn!(error = %e, "workflow_timeout");
        (ExecutionStatus::Timeout, Some(e.to_string()))
      }
      Err(e) => {
        error!(error = %e, "workflow_failed");
        (ExecutionStatus::Failed, Some(e.to_string()))
      }
    };

    let final_output = (status == ExecutionStatus::Completed).then(|| {
      ctx
        .final_output()
        .unwrap_or(ctx.previous_output())
        .to_string()
    });
    let snapshot = ctx.create_snapshot();
    interpreter
      .reporter()
      .finished(
        status,
        final_output.clone(),
        error.clone(),
        serde_json::to_value(&snapshot)?,
      )
      .await?;

    let node_results = self.store.list_node_results(&execution_id).await?;
    Ok(RunOutcome {
      execution_id,
      status,
      final_output,
      error,
      snapshot,
      node_results,
    })
  }
}

/// Handle to a run started with [`WorkflowEngine::start`].
pub struct RunHandle {
  execution_id: String,
  control: RunControl,
  events: mpsc::UnboundedReceiver<RunEvent>,
  task: JoinHandle<Result<RunOutcome, EngineError>>,
}

impl RunHandle {
  pub fn execution_id(&self) -> &str {
    &self.execution_id
  }

  pub fn pause(&self) {
    self.control.pause();
  }

  pub fn resume(&self) {
    self.control.resume();
  }

  pub fn cancel(&self) {
    self.control.cancel();
  }

  pub fn control(&self) -> &RunControl {
    &self.control
  }

  /// Next event, or `None` once the run has finished and all events were read.
  pub async fn next_event(&mut self) -> Option<RunEvent> {
    self.events.recv().await
  }

  /// Wait for the run to finish.
  pub async fn wait(self) -> Result<RunOutcome, EngineError> {
    self.task.await?
  }
}
