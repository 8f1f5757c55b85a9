use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use sqlx::types::Json;

use crate::{Error, Execution, ExecutionUpdate, NodeResult, NodeResultUpdate, Store};

/// In-process store, used by tests and `--memory` runs.
#[derive(Default)]
pub struct MemoryStore {
  executions: Mutex<HashMap<String, Execution>>,
  node_results: Mutex<Vec<NodeResult>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Store for MemoryStore {
  async fn create_execution(&self, execution: &Execution) -> Result<(), Error> {
    lock(&self.executions).insert(execution.id.clone(), execution.clone());
    Ok(())
  }

  async fn get_execution(&self, execution_id: &str) -> Result<Execution, Error> {
    lock(&self.executions)
      .get(execution_id)
      .cloned()
      .ok_or_else(|| Error::NotFound(execution_id.to_string()))
  }

  async fn update_execution(
    &self,
    execution_id: &str,
    update: ExecutionUpdate,
  ) -> Result<(), Error> {
    let mut executions = lock(&self.executions);
    let execution = executions
      .get_mut(execution_id)
      .ok_or_else(|| Error::NotFound(execution_id.to_string()))?;

    if let Some(status) = update.status {
      execution.status = status;
    }
    if let Some(final_output) = update.final_output {
      execution.final_output = Some(final_output);
    }
    if let Some(snapshot) = update.variables_snapshot {
      execution.variables_snapshot = Some(Json(snapshot));
    }
    if let Some(finished_at) = update.finished_at {
      execution.finished_at = Some(finished_at);
    }
    Ok(())
  }

  async fn list_executions(&self, workflow_id: &str) -> Result<Vec<Execution>, Error> {
    let mut executions: Vec<Execution> = lock(&self.executions)
      .values()
      .filter(|e| e.workflow_id == workflow_id)
      .cloned()
      .collect();
    executions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    Ok(executions)
  }

  async fn create_node_result(&self, result: &NodeResult) -> Result<(), Error> {
    lock(&self.node_results).push(result.clone());
    Ok(())
  }

  async fn update_node_result(
    &self,
    result_id: &str,
    update: NodeResultUpdate,
  ) -> Result<(), Error> {
    let mut results = lock(&self.node_results);
    let result = results
      .iter_mut()
      .find(|r| r.id == result_id)
      .ok_or_else(|| Error::NotFound(result_id.to_string()))?;

    if let Some(status) = update.status {
      result.status = status;
    }
    if let Some(input) = update.input {
      result.input = Some(input);
    }
    if let Some(output) = update.output {
      result.output = Some(output);
    }
    if let Some(config) = update.resolved_config {
      result.resolved_config = Some(Json(config));
    }
    if let Some(error) = update.error {
      result.error = Some(error);
    }
    if let Some(finished_at) = update.finished_at {
      result.finished_at = Some(finished_at);
    }
    Ok(())
  }

  async fn list_node_results(&self, execution_id: &str) -> Result<Vec<NodeResult>, Error> {
    // Insertion order is start order.
    Ok(
      lock(&self.node_results)
        .iter()
        .filter(|r| r.execution_id == execution_id)
        .cloned()
        .collect(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{ExecutionStatus, NodeResultStatus};

  #[tokio::test]
  async fn test_partial_update_keeps_fields() {
    let store = MemoryStore::new();
    let execution = Execution::start("wf", "seed");
    store.create_execution(&execution).await.unwrap();

    store
      .update_execution(
        &execution.id,
        ExecutionUpdate {
          final_output: Some("done".to_string()),
          ..Default::default()
        },
      )
      .await
      .unwrap();
    store
      .update_execution(&execution.id, ExecutionUpdate::status(ExecutionStatus::Completed))
      .await
      .unwrap();

    let stored = store.get_execution(&execution.id).await.unwrap();
    assert_eq!(stored.status, ExecutionStatus::Completed);
    assert_eq!(stored.final_output.as_deref(), Some("done"));
    assert_eq!(stored.input, "seed");
  }

  #[tokio::test]
  async fn test_node_results_in_start_order() {
    let store = MemoryStore::new();
    let execution = Execution::start("wf", "");
    store.create_execution(&execution).await.unwrap();

    for node in ["a", "b", "c"] {
      let result = NodeResult::start(&execution.id, node, 1);
      store.create_node_result(&result).await.unwrap();
      store
        .update_node_result(&result.id, NodeResultUpdate::completed(node))
        .await
        .unwrap();
    }

    let results = store.list_node_results(&execution.id).await.unwrap();
    let nodes: Vec<&str> = results.iter().map(|r| r.node_id.as_str()).collect();
    assert_eq!(nodes, vec!["a", "b", "c"]);
    assert!(results.iter().all(|r| r.status == NodeResultStatus::Completed));
  }

  #[tokio::test]
  async fn test_missing_records() {
    let store = MemoryStore::new();
    assert!(matches!(store.get_execution("nope").await, Err(Error::NotFound(_))));
    assert!(matches!(
      store
        .update_node_result("nope", NodeResultUpdate::failed("x"))
        .await,
      Err(Error::NotFound(_))
    ));
  }
}
