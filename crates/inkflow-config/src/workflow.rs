use serde::{Deserialize, Serialize};

use crate::node::NodeDef;
use crate::runtime::RuntimeConfig;

/// A workflow definition: metadata plus its flat node list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
  pub id: String,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub loop_max_count: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_seconds: Option<u64>,
  #[serde(default)]
  pub nodes: Vec<NodeDef>,
}

impl WorkflowDef {
  /// Runtime limits for this workflow, falling back to `defaults` where unset.
  pub fn runtime_config(&self, defaults: &RuntimeConfig) -> RuntimeConfig {
    RuntimeConfig {
      max_loop_count: self.loop_max_count.unwrap_or(defaults.max_loop_count),
      timeout_seconds: self.timeout_seconds.unwrap_or(defaults.timeout_seconds),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_workflow_limits_override_defaults() {
    let workflow: WorkflowDef = serde_json::from_value(json!({
      "id": "wf",
      "name": "Chapter draft",
      "loop_max_count": 3,
      "nodes": []
    }))
    .unwrap();

    let config = workflow.runtime_config(&RuntimeConfig::default());
    assert_eq!(config.max_loop_count, 3);
    assert_eq!(config.timeout_seconds, 300);
  }
}
