//! Inkflow Store
//!
//! This crate provides the storage trait and implementations for workflow
//! executions and their per-node results.
//!
//! The [`Store`] trait defines operations for:
//! - Creating and updating executions
//! - Creating and updating node results as nodes start and finish
//! - Querying execution history
//!
//! Records are written as soon as a transition happens, so a run that is killed
//! midway still leaves an inspectable partial history.

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::{
  Execution, ExecutionStatus, ExecutionUpdate, NodeResult, NodeResultStatus, NodeResultUpdate,
};

use async_trait::async_trait;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// Applying migrations failed.
  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Storage trait for executions and node results.
#[async_trait]
pub trait Store: Send + Sync {
  /// Persist a new execution.
  async fn create_execution(&self, execution: &Execution) -> Result<(), Error>;

  /// Get an execution by ID.
  async fn get_execution(&self, execution_id: &str) -> Result<Execution, Error>;

  /// Apply a partial update; fields left as `None` keep their stored value.
  async fn update_execution(&self, execution_id: &str, update: ExecutionUpdate)
  -> Result<(), Error>;

  /// List executions for a workflow, newest first.
  async fn list_executions(&self, workflow_id: &str) -> Result<Vec<Execution>, Error>;

  /// Persist a new node result.
  async fn create_node_result(&self, result: &NodeResult) -> Result<(), Error>;

  /// Apply a partial update; fields left as `None` keep their stored value.
  async fn update_node_result(&self, result_id: &str, update: NodeResultUpdate)
  -> Result<(), Error>;

  /// List node results for an execution in the order they were started.
  async fn list_node_results(&self, execution_id: &str) -> Result<Vec<NodeResult>, Error>;
}
