use serde::{Deserialize, Serialize};

/// A single node as persisted in a workflow's flat node list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  pub id: String,
  #[serde(rename = "type")]
  pub kind: NodeKind,
  pub name: String,
  #[serde(default)]
  pub order_index: i64,
  /// Per-type configuration, deserialized into a [`crate::node_config`] struct at run time.
  #[serde(default)]
  pub config: serde_json::Value,
  /// Links a block-start node to its else/end markers.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub block_id: Option<String>,
}

impl NodeDef {
  /// Create a node with an empty config.
  pub fn new(id: impl Into<String>, kind: NodeKind, name: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      kind,
      name: name.into(),
      order_index: 0,
      config: serde_json::Value::Null,
      block_id: None,
    }
  }

  pub fn with_config(mut self, config: serde_json::Value) -> Self {
    self.config = config;
    self
  }

  pub fn with_block(mut self, block_id: impl Into<String>) -> Self {
    self.block_id = Some(block_id.into());
    self
  }

  pub fn with_order(mut self, order_index: i64) -> Self {
    self.order_index = order_index;
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
  Start,
  Output,
  AiChat,
  TextExtract,
  TextConcat,
  VarSet,
  VarGet,
  LoopStart,
  LoopEnd,
  ParallelStart,
  ParallelEnd,
  ConditionIf,
  ConditionElse,
  ConditionEnd,
}

/// The control-flow structure a pair of block markers expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
  Loop,
  Parallel,
  Condition,
}

impl NodeKind {
  /// The block this node opens, if it is a block-start marker.
  pub fn opens_block(self) -> Option<BlockKind> {
    match self {
      NodeKind::LoopStart => Some(BlockKind::Loop),
      NodeKind::ParallelStart => Some(BlockKind::Parallel),
      NodeKind::ConditionIf => Some(BlockKind::Condition),
      _ => None,
    }
  }

  /// The block this node closes, if it is a block-end marker.
  pub fn closes_block(self) -> Option<BlockKind> {
    match self {
      NodeKind::LoopEnd => Some(BlockKind::Loop),
      NodeKind::ParallelEnd => Some(BlockKind::Parallel),
      NodeKind::ConditionEnd => Some(BlockKind::Condition),
      _ => None,
    }
  }

  /// Whether the node is any kind of block marker (start, else or end).
  pub fn is_marker(self) -> bool {
    self.opens_block().is_some() || self.closes_block().is_some() || self == NodeKind::ConditionElse
  }

  pub fn as_str(self) -> &'static str {
    match self {
      NodeKind::Start => "start",
      NodeKind::Output => "output",
      NodeKind::AiChat => "ai_chat",
      NodeKind::TextExtract => "text_extract",
      NodeKind::TextConcat => "text_concat",
      NodeKind::VarSet => "var_set",
      NodeKind::VarGet => "var_get",
      NodeKind::LoopStart => "loop_start",
      NodeKind::LoopEnd => "loop_end",
      NodeKind::ParallelStart => "parallel_start",
      NodeKind::ParallelEnd => "parallel_end",
      NodeKind::ConditionIf => "condition_if",
      NodeKind::ConditionElse => "condition_else",
      NodeKind::ConditionEnd => "condition_end",
    }
  }
}

impl std::fmt::Display for NodeKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::fmt::Display for BlockKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      BlockKind::Loop => "loop",
      BlockKind::Parallel => "parallel",
      BlockKind::Condition => "condition",
    };
    f.write_str(name)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_deserialize_node_from_store_row() {
    let node: NodeDef = serde_json::from_value(json!({
      "id": "n1",
      "type": "loop_start",
      "name": "Polish loop",
      "order_index": 3,
      "config": { "loop_type": "count", "max_iterations": 2 },
      "block_id": "b1"
    }))
    .unwrap();

    assert_eq!(node.kind, NodeKind::LoopStart);
    assert_eq!(node.kind.opens_block(), Some(BlockKind::Loop));
    assert_eq!(node.block_id.as_deref(), Some("b1"));
    assert_eq!(node.order_index, 3);
  }

  #[test]
  fn test_missing_config_defaults_to_null() {
    let node: NodeDef =
      serde_json::from_value(json!({ "id": "o", "type": "output", "name": "Output" })).unwrap();

    assert!(node.config.is_null());
    assert!(node.block_id.is_none());
    assert!(!node.kind.is_marker());
  }

  #[test]
  fn test_marker_kinds() {
    assert!(NodeKind::ConditionElse.is_marker());
    assert_eq!(NodeKind::ParallelEnd.closes_block(), Some(BlockKind::Parallel));
    assert_eq!(NodeKind::AiChat.opens_block(), None);
    assert_eq!(NodeKind::TextConcat.to_string(), "text_concat");
  }
}
