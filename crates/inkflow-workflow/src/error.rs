use inkflow_config::{BlockKind, NodeKind};
use thiserror::Error;

/// Errors found while nesting a node list into a plan.
///
/// Every variant carries the id of the node the problem was detected at, so
/// the caller can point the user at it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
  #[error("workflow has no start node")]
  MissingStart,

  #[error("start node '{node_id}' must be the first node")]
  StartNotFirst { node_id: String },

  #[error("duplicate start node: {node_id}")]
  DuplicateStart { node_id: String },

  #[error("duplicate node id: {node_id}")]
  DuplicateNodeId { node_id: String },

  #[error("block marker '{node_id}' ({kind}) has no block id")]
  MissingBlockId { node_id: String, kind: NodeKind },

  #[error("block end '{node_id}' has no open block")]
  DanglingEnd { node_id: String },

  #[error("block end '{node_id}' closes block '{found}' but '{expected}' is open")]
  UnbalancedEnd {
    node_id: String,
    expected: String,
    found: String,
  },

  #[error("block end '{node_id}' closes a {found} block but a {expected} block is open")]
  KindMismatch {
    node_id: String,
    expected: BlockKind,
    found: BlockKind,
  },

  #[error("block '{block_id}' opened at '{node_id}' is never closed")]
  UnterminatedBlock { node_id: String, block_id: String },

  #[error("else marker '{node_id}' is not inside a condition block")]
  MisplacedElse { node_id: String },

  #[error("condition block already has an else branch: {node_id}")]
  DuplicateElse { node_id: String },
}

impl PlanError {
  /// The node the error was reported at, if any.
  pub fn node_id(&self) -> Option<&str> {
    match self {
      PlanError::MissingStart => None,
      PlanError::StartNotFirst { node_id }
      | PlanError::DuplicateStart { node_id }
      | PlanError::DuplicateNodeId { node_id }
      | PlanError::MissingBlockId { node_id, .. }
      | PlanError::DanglingEnd { node_id }
      | PlanError::UnbalancedEnd { node_id, .. }
      | PlanError::KindMismatch { node_id, .. }
      | PlanError::UnterminatedBlock { node_id, .. }
      | PlanError::MisplacedElse { node_id }
      | PlanError::DuplicateElse { node_id } => Some(node_id),
    }
  }
}
