use inkflow_store::{
  Error, Execution, ExecutionStatus, ExecutionUpdate, NodeResult, NodeResultStatus,
  NodeResultUpdate, SqliteStore, Store,
};
use serde_json::json;

#[tokio::test]
async fn test_execution_lifecycle() {
  let store = SqliteStore::in_memory().await.unwrap();
  let execution = Execution::start("wf-1", "a dragon story");
  store.create_execution(&execution).await.unwrap();

  let stored = store.get_execution(&execution.id).await.unwrap();
  assert_eq!(stored.status, ExecutionStatus::Running);
  assert_eq!(stored.input, "a dragon story");
  assert!(stored.finished_at.is_none());

  store
    .update_execution(
      &execution.id,
      ExecutionUpdate {
        status: Some(ExecutionStatus::Completed),
        final_output: Some("the end".to_string()),
        variables_snapshot: Some(json!({ "variables": { "x": "hi" } })),
        finished_at: Some(chrono::Utc::now()),
      },
    )
    .await
    .unwrap();

  let stored = store.get_execution(&execution.id).await.unwrap();
  assert_eq!(stored.status, ExecutionStatus::Completed);
  assert_eq!(stored.final_output.as_deref(), Some("the end"));
  assert_eq!(
    stored.variables_snapshot.map(|j| j.0),
    Some(json!({ "variables": { "x": "hi" } }))
  );
  assert!(stored.finished_at.is_some());
}

#[tokio::test]
async fn test_partial_update_keeps_stored_values() {
  let store = SqliteStore::in_memory().await.unwrap();
  let execution = Execution::start("wf-1", "");
  store.create_execution(&execution).await.unwrap();

  let result = NodeResult::start(&execution.id, "ai", 2);
  store.create_node_result(&result).await.unwrap();
  store
    .update_node_result(
      &result.id,
      NodeResultUpdate {
        input: Some("prompt".to_string()),
        resolved_config: Some(json!({ "model": "m" })),
        ..Default::default()
      },
    )
    .await
    .unwrap();
  store
    .update_node_result(&result.id, NodeResultUpdate::failed("provider unavailable"))
    .await
    .unwrap();

  let results = store.list_node_results(&execution.id).await.unwrap();
  assert_eq!(results.len(), 1);
  let stored = &results[0];
  assert_eq!(stored.status, NodeResultStatus::Failed);
  assert_eq!(stored.iteration, 2);
  assert_eq!(stored.input.as_deref(), Some("prompt"));
  assert_eq!(stored.error.as_deref(), Some("provider unavailable"));
  assert!(stored.output.is_none());
}

#[tokio::test]
async fn test_list_executions_newest_first() {
  let store = SqliteStore::in_memory().await.unwrap();

  let mut older = Execution::start("wf", "1");
  older.started_at = chrono::Utc::now() - chrono::Duration::minutes(5);
  let newer = Execution::start("wf", "2");
  let other = Execution::start("other", "3");
  for execution in [&older, &newer, &other] {
    store.create_execution(execution).await.unwrap();
  }

  let listed = store.list_executions("wf").await.unwrap();
  let inputs: Vec<&str> = listed.iter().map(|e| e.input.as_str()).collect();
  assert_eq!(inputs, vec!["2", "1"]);
}

#[tokio::test]
async fn test_update_missing_execution() {
  let store = SqliteStore::in_memory().await.unwrap();
  let result = store
    .update_execution("missing", ExecutionUpdate::status(ExecutionStatus::Failed))
    .await;
  assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_open_file_database() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("inkflow.db");

  let execution = Execution::start("wf", "persisted");
  {
    let store = SqliteStore::open(&path).await.unwrap();
    store.create_execution(&execution).await.unwrap();
  }

  let store = SqliteStore::open(&path).await.unwrap();
  let stored = store.get_execution(&execution.id).await.unwrap();
  assert_eq!(stored.input, "persisted");
}
