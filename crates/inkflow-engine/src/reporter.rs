//! Progress reporting to the subscriber and the store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use inkflow_config::NodeDef;
use inkflow_store::{
  Execution, ExecutionStatus, ExecutionUpdate, NodeResult, NodeResultUpdate, Store,
};
use tracing::{error, info};

use crate::context::NodeOutcome;
use crate::error::EngineError;
use crate::events::{ExecutionNotifier, RunEvent};

/// Fans run transitions out to the notifier and the store.
///
/// Every start and finish is written to the store as it happens. Streaming
/// chunks only go to the notifier.
pub(crate) struct Reporter {
  store: Arc<dyn Store>,
  notifier: Arc<dyn ExecutionNotifier>,
  execution_id: String,
  paused: AtomicBool,
}

impl Reporter {
  pub(crate) fn new(
    store: Arc<dyn Store>,
    notifier: Arc<dyn ExecutionNotifier>,
    execution_id: String,
  ) -> Self {
    Self {
      store,
      notifier,
      execution_id,
      paused: AtomicBool::new(false),
    }
  }

  pub(crate) async fn execution_started(&self, execution: &Execution) -> Result<(), EngineError> {
    self.store.create_execution(execution).await?;
    info!(
      execution_id = %execution.id,
      workflow_id = %execution.workflow_id,
      "workflow_started"
    );
    self.notifier.notify(RunEvent::ExecutionStarted {
      execution_id: execution.id.clone(),
      workflow_id: execution.workflow_id.clone(),
    });
    Ok(())
  }

  /// Create the `running` result for a node. Returns the result id.
  pub(crate) async fn node_started(
    &self,
    node: &NodeDef,
    iteration: i64,
  ) -> Result<String, EngineError> {
    let result = NodeResult::start(&self.execution_id, &node.id, iteration);
    self.store.create_node_result(&result).await?;
    info!(
      execution_id = %self.execution_id,
      node_id = %node.id,
      node_type = %node.kind,
      iteration,
      "node_started"
    );
    self.progress(node, iteration, String::new(), true, false, None);
    Ok(result.id)
  }

  pub(crate) fn node_streaming(&self, node: &NodeDef, iteration: i64, output: &str) {
    self.progress(node, iteration, output.to_string(), true, true, None);
  }

  pub(crate) async fn node_completed(
    &self,
    result_id: &str,
    node: &NodeDef,
    iteration: i64,
    outcome: &NodeOutcome,
  ) -> Result<(), EngineError> {
    let update = NodeResultUpdate {
      input: Some(outcome.input.clone()),
      resolved_config: outcome.resolved_config.clone(),
      ..NodeResultUpdate::completed(outcome.output.clone())
    };
    self.store.update_node_result(result_id, update).await?;
    info!(
      execution_id = %self.execution_id,
      node_id = %node.id,
      iteration,
      output_len = outcome.output.len(),
      "node_completed"
    );
    self.progress(node, iteration, outcome.output.clone(), false, false, None);
    Ok(())
  }

  pub(crate) async fn node_failed(
    &self,
    result_id: &str,
    node: &NodeDef,
    iteration: i64,
    message: &str,
  ) -> Result<(), EngineError> {
    self
      .store
      .update_node_result(result_id, NodeResultUpdate::failed(message))
      .await?;
    error!(
      execution_id = %self.execution_id,
      node_id = %node.id,
      iteration,
      error = %message,
      "node_failed"
    );
    self.progress(
      node,
      iteration,
      String::new(),
      false,
      false,
      Some(message.to_string()),
    );
    Ok(())
  }

  /// Report a pause once, however many parallel instances hit the boundary.
  pub(crate) async fn paused(&self) -> Result<(), EngineError> {
    if self.paused.swap(true, Ordering::SeqCst) {
      return Ok(());
    }
    self
      .store
      .update_execution(&self.execution_id, ExecutionUpdate::status(ExecutionStatus::Paused))
      .await?;
    info!(execution_id = %self.execution_id, "workflow_paused");
    self.notifier.notify(RunEvent::Paused {
      execution_id: self.execution_id.clone(),
    });
    Ok(())
  }

  pub(crate) async fn resumed(&self) -> Result<(), EngineError> {
    if !self.paused.swap(false, Ordering::SeqCst) {
      return Ok(());
    }
    self
      .store
      .update_execution(&self.execution_id, ExecutionUpdate::status(ExecutionStatus::Running))
      .await?;
    info!(execution_id = %self.execution_id, "workflow_resumed");
    self.notifier.notify(RunEvent::Resumed {
      execution_id: self.execution_id.clone(),
    });
    Ok(())
  }

  /// Write the terminal state, snapshot and final output.
  pub(crate) async fn finished(
    &self,
    status: ExecutionStatus,
    final_output: Option<String>,
    error: Option<String>,
    snapshot: serde_json::Value,
  ) -> Result<(), EngineError> {
    let update = ExecutionUpdate {
      status: Some(status),
      final_output: final_output.clone(),
      variables_snapshot: Some(snapshot),
      finished_at: Some(Utc::now()),
    };
    self.store.update_execution(&self.execution_id, update).await?;
    self.notifier.notify(RunEvent::Finished {
      execution_id: self.execution_id.clone(),
      status,
      final_output,
      error,
    });
    Ok(())
  }

  fn progress(
    &self,
    node: &NodeDef,
    iteration: i64,
    output: String,
    is_running: bool,
    is_streaming: bool,
    error: Option<String>,
  ) {
    self.notifier.notify(RunEvent::NodeProgress {
      execution_id: self.execution_id.clone(),
      node_id: node.id.clone(),
      node_name: node.name.clone(),
      iteration,
      output,
      is_running,
      is_streaming,
      error,
    });
  }
}
