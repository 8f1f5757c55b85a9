//! Input selection for nodes that consume text.
//!
//! Most nodes read the previous node's output. A node can instead read a named
//! variable, or a custom template that is interpolated against the execution
//! context at run time.
//!
//! # Examples
//!
//! ```json
//! { "input_source": "previous" }
//! { "input_source": "variable", "input_variable": "outline" }
//! { "input_source": "custom", "custom_input": "Rewrite: {{previous}}" }
//! ```

use serde::{Deserialize, Serialize};

/// Where a node takes its input text from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
  /// The output of the last executed node.
  #[default]
  Previous,
  /// A named variable from the execution context.
  Variable,
  /// A custom template, interpolated before use.
  Custom,
}

/// Input selection shared by node configs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSpec {
  pub input_source: InputSource,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub input_variable: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub custom_input: Option<String>,
}

impl InputSpec {
  /// Input taken from a custom template.
  pub fn custom(template: impl Into<String>) -> Self {
    Self {
      input_source: InputSource::Custom,
      input_variable: None,
      custom_input: Some(template.into()),
    }
  }

  /// Input taken from a named variable.
  pub fn variable(name: impl Into<String>) -> Self {
    Self {
      input_source: InputSource::Variable,
      input_variable: Some(name.into()),
      custom_input: None,
    }
  }
}
