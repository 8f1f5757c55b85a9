use std::path::Path;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::Json;

use crate::{Error, Execution, ExecutionUpdate, NodeResult, NodeResultUpdate, Store};

/// SQLite-based store implementation.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if needed) a database file and apply migrations.
  pub async fn open(path: &Path) -> Result<Self, Error> {
    let options = SqliteConnectOptions::new()
      .filename(path)
      .create_if_missing(true)
      .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
      .max_connections(5)
      .connect_with(options)
      .await?;

    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// A migrated in-memory database. Limited to one connection so every query
  /// sees the same database.
  pub async fn in_memory() -> Result<Self, Error> {
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .connect("sqlite::memory:")
      .await?;

    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), Error> {
    sqlx::migrate!("../../migrations").run(&self.pool).await?;
    Ok(())
  }
}

#[async_trait]
impl Store for SqliteStore {
  async fn create_execution(&self, execution: &Execution) -> Result<(), Error> {
    sqlx::query(
      r#"
            INSERT INTO executions (id, workflow_id, status, input, final_output, variables_snapshot, started_at, finished_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&execution.id)
    .bind(&execution.workflow_id)
    .bind(execution.status)
    .bind(&execution.input)
    .bind(&execution.final_output)
    .bind(&execution.variables_snapshot)
    .bind(execution.started_at)
    .bind(execution.finished_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_execution(&self, execution_id: &str) -> Result<Execution, Error> {
    sqlx::query_as(
      r#"
            SELECT id, workflow_id, status, input, final_output, variables_snapshot, started_at, finished_at
            FROM executions
            WHERE id = ?
            "#,
    )
    .bind(execution_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(execution_id.to_string()))
  }

  async fn update_execution(
    &self,
    execution_id: &str,
    update: ExecutionUpdate,
  ) -> Result<(), Error> {
    let result = sqlx::query(
      r#"
            UPDATE executions
            SET status = COALESCE(?, status),
                final_output = COALESCE(?, final_output),
                variables_snapshot = COALESCE(?, variables_snapshot),
                finished_at = COALESCE(?, finished_at)
            WHERE id = ?
            "#,
    )
    .bind(update.status)
    .bind(update.final_output)
    .bind(update.variables_snapshot.map(Json))
    .bind(update.finished_at)
    .bind(execution_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(execution_id.to_string()));
    }
    Ok(())
  }

  async fn list_executions(&self, workflow_id: &str) -> Result<Vec<Execution>, Error> {
    let executions = sqlx::query_as(
      r#"
            SELECT id, workflow_id, status, input, final_output, variables_snapshot, started_at, finished_at
            FROM executions
            WHERE workflow_id = ?
            ORDER BY started_at DESC
            "#,
    )
    .bind(workflow_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(executions)
  }

  async fn create_node_result(&self, result: &NodeResult) -> Result<(), Error> {
    sqlx::query(
      r#"
            INSERT INTO node_results (id, execution_id, node_id, iteration, status, input, output, resolved_config, error, started_at, finished_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&result.id)
    .bind(&result.execution_id)
    .bind(&result.node_id)
    .bind(result.iteration)
    .bind(result.status)
    .bind(&result.input)
    .bind(&result.output)
    .bind(&result.resolved_config)
    .bind(&result.error)
    .bind(result.started_at)
    .bind(result.finished_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn update_node_result(
    &self,
    result_id: &str,
    update: NodeResultUpdate,
  ) -> Result<(), Error> {
    let result = sqlx::query(
      r#"
            UPDATE node_results
            SET status = COALESCE(?, status),
                input = COALESCE(?, input),
                output = COALESCE(?, output),
                resolved_config = COALESCE(?, resolved_config),
                error = COALESCE(?, error),
                finished_at = COALESCE(?, finished_at)
            WHERE id = ?
            "#,
    )
    .bind(update.status)
    .bind(update.input)
    .bind(update.output)
    .bind(update.resolved_config.map(Json))
    .bind(update.error)
    .bind(update.finished_at)
    .bind(result_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(result_id.to_string()));
    }
    Ok(())
  }

  async fn list_node_results(&self, execution_id: &str) -> Result<Vec<NodeResult>, Error> {
    let results = sqlx::query_as(
      r#"
            SELECT id, execution_id, node_id, iteration, status, input, output, resolved_config, error, started_at, finished_at
            FROM node_results
            WHERE execution_id = ?
            ORDER BY rowid ASC
            "#,
    )
    .bind(execution_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(results)
  }
}
