use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

/// Status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ExecutionStatus {
  Running,
  Paused,
  Completed,
  Failed,
  Cancelled,
  Timeout,
}

impl ExecutionStatus {
  pub fn is_terminal(self) -> bool {
    !matches!(self, ExecutionStatus::Running | ExecutionStatus::Paused)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      ExecutionStatus::Running => "running",
      ExecutionStatus::Paused => "paused",
      ExecutionStatus::Completed => "completed",
      ExecutionStatus::Failed => "failed",
      ExecutionStatus::Cancelled => "cancelled",
      ExecutionStatus::Timeout => "timeout",
    }
  }
}

impl std::fmt::Display for ExecutionStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Status of a single node result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum NodeResultStatus {
  Running,
  Completed,
  Failed,
}

/// An execution as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Execution {
  pub id: String,
  pub workflow_id: String,
  pub status: ExecutionStatus,
  pub input: String,
  pub final_output: Option<String>,
  pub variables_snapshot: Option<Json<serde_json::Value>>,
  pub started_at: DateTime<Utc>,
  pub finished_at: Option<DateTime<Utc>>,
}

impl Execution {
  /// A new `running` execution with a fresh id.
  pub fn start(workflow_id: impl Into<String>, input: impl Into<String>) -> Self {
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      workflow_id: workflow_id.into(),
      status: ExecutionStatus::Running,
      input: input.into(),
      final_output: None,
      variables_snapshot: None,
      started_at: Utc::now(),
      finished_at: None,
    }
  }
}

/// One executed node instance. Loops and parallel blocks produce several per
/// node, distinguished by `iteration`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct NodeResult {
  pub id: String,
  pub execution_id: String,
  pub node_id: String,
  pub iteration: i64,
  pub status: NodeResultStatus,
  pub input: Option<String>,
  pub output: Option<String>,
  pub resolved_config: Option<Json<serde_json::Value>>,
  pub error: Option<String>,
  pub started_at: DateTime<Utc>,
  pub finished_at: Option<DateTime<Utc>>,
}

impl NodeResult {
  /// A new `running` result with a fresh id.
  pub fn start(
    execution_id: impl Into<String>,
    node_id: impl Into<String>,
    iteration: i64,
  ) -> Self {
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      execution_id: execution_id.into(),
      node_id: node_id.into(),
      iteration,
      status: NodeResultStatus::Running,
      input: None,
      output: None,
      resolved_config: None,
      error: None,
      started_at: Utc::now(),
      finished_at: None,
    }
  }
}

/// Partial update of an [`Execution`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionUpdate {
  pub status: Option<ExecutionStatus>,
  pub final_output: Option<String>,
  pub variables_snapshot: Option<serde_json::Value>,
  pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionUpdate {
  pub fn status(status: ExecutionStatus) -> Self {
    Self {
      status: Some(status),
      ..Default::default()
    }
  }
}

/// Partial update of a [`NodeResult`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeResultUpdate {
  pub status: Option<NodeResultStatus>,
  pub input: Option<String>,
  pub output: Option<String>,
  pub resolved_config: Option<serde_json::Value>,
  pub error: Option<String>,
  pub finished_at: Option<DateTime<Utc>>,
}

impl NodeResultUpdate {
  /// Mark the result completed now.
  pub fn completed(output: impl Into<String>) -> Self {
    Self {
      status: Some(NodeResultStatus::Completed),
      output: Some(output.into()),
      finished_at: Some(Utc::now()),
      ..Default::default()
    }
  }

  /// Mark the result failed now.
  pub fn failed(error: impl Into<String>) -> Self {
    Self {
      status: Some(NodeResultStatus::Failed),
      error: Some(error.into()),
      finished_at: Some(Utc::now()),
      ..Default::default()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_terminal_statuses() {
    assert!(!ExecutionStatus::Running.is_terminal());
    assert!(!ExecutionStatus::Paused.is_terminal());
    assert!(ExecutionStatus::Completed.is_terminal());
    assert!(ExecutionStatus::Cancelled.is_terminal());
    assert!(ExecutionStatus::Timeout.is_terminal());
  }

  #[test]
  fn test_status_round_trips_through_serde_name() {
    let status: ExecutionStatus = serde_json::from_str("\"timeout\"").unwrap();
    assert_eq!(status, ExecutionStatus::Timeout);
    assert_eq!(status.to_string(), "timeout");
  }
}
