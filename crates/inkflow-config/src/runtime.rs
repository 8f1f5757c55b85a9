use serde::{Deserialize, Serialize};

/// Limits applied to a single workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
  /// Hard ceiling on iterations of any one loop block.
  pub max_loop_count: u32,
  /// Wall-clock budget for the whole run. Zero disables the timeout.
  pub timeout_seconds: u64,
}

impl Default for RuntimeConfig {
  fn default() -> Self {
    Self {
      max_loop_count: 10,
      timeout_seconds: 300,
    }
  }
}
