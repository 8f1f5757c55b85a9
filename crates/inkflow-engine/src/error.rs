use inkflow_ai::AiError;
use inkflow_config::NodeKind;
use inkflow_workflow::PlanError;
use thiserror::Error;

/// A failure inside a single node executor.
#[derive(Debug, Error)]
pub enum NodeError {
  #[error("invalid {kind} config: {source}")]
  Config {
    kind: NodeKind,
    #[source]
    source: serde_json::Error,
  },

  #[error("missing required field: {0}")]
  MissingField(&'static str),

  #[error("ai request failed: {0}")]
  Ai(#[from] AiError),

  #[error("failed to encode resolved config: {0}")]
  Encode(#[source] serde_json::Error),

  #[error("{0} nodes are block markers and cannot be executed directly")]
  NotExecutable(NodeKind),
}

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum EngineError {
  /// The node list could not be nested into a plan. No execution was created.
  #[error("invalid workflow: {0}")]
  Validation(#[from] PlanError),

  #[error("node '{node_id}' failed: {message}")]
  NodeExecution { node_id: String, message: String },

  #[error("workflow timed out after {elapsed_secs}s")]
  Timeout { elapsed_secs: u64 },

  #[error("workflow cancelled")]
  Cancelled,

  #[error("store error: {0}")]
  Store(#[from] inkflow_store::Error),

  #[error("failed to serialize context snapshot: {0}")]
  Snapshot(#[from] serde_json::Error),

  #[error("run task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

impl EngineError {
  pub(crate) fn node(node_id: &str, error: NodeError) -> Self {
    EngineError::NodeExecution {
      node_id: node_id.to_string(),
      message: error.to_string(),
    }
  }
}
