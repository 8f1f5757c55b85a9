//! Typed per-node configuration.
//!
//! [`NodeDef::config`](crate::NodeDef) is an untyped JSON blob. Each node kind
//! has a struct here that the engine deserializes with [`parse`] right before
//! the node runs. All fields are optional in JSON; missing fields take their
//! defaults.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::condition::ConditionSpec;
use crate::input::{InputSource, InputSpec};

/// Deserialize a node's config, treating `null` as an empty object.
pub fn parse<T>(config: &serde_json::Value) -> Result<T, serde_json::Error>
where
  T: DeserializeOwned + Default,
{
  if config.is_null() {
    return Ok(T::default());
  }
  T::deserialize(config)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartConfig {
  /// Used as the initial input when the run was started without one.
  pub default_value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiChatConfig {
  pub provider: String,
  pub model: String,
  pub system_prompt: Option<String>,
  #[serde(flatten)]
  pub input: InputSpec,
  pub enable_history: bool,
  /// Number of past exchanges replayed when history is enabled.
  pub history_limit: Option<usize>,
  pub temperature: Option<f32>,
  pub max_tokens: Option<u32>,
  pub top_p: Option<f32>,
  pub enable_thinking: bool,
  pub thinking_budget: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractMode {
  #[default]
  Regex,
  StartEnd,
  JsonPath,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextExtractConfig {
  #[serde(flatten)]
  pub input: InputSpec,
  pub extract_mode: ExtractMode,
  pub regex_pattern: String,
  pub start_marker: String,
  pub end_marker: String,
  pub json_path: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcatSourceKind {
  Variable,
  #[default]
  Custom,
}

/// One piece of a `text_concat` node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcatSource {
  #[serde(rename = "type")]
  pub kind: ConcatSourceKind,
  /// A variable name for `variable`, or a template for `custom`.
  pub value: String,
}

impl ConcatSource {
  pub fn custom(value: impl Into<String>) -> Self {
    Self {
      kind: ConcatSourceKind::Custom,
      value: value.into(),
    }
  }

  pub fn variable(name: impl Into<String>) -> Self {
    Self {
      kind: ConcatSourceKind::Variable,
      value: name.into(),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConcatConfig {
  pub sources: Vec<ConcatSource>,
  /// Raw separator; `"\n"`/`"newline"` and `""`/`"none"` are recognized.
  pub separator: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VarSetConfig {
  pub variable_name: String,
  pub input_source: InputSource,
  pub input_variable: Option<String>,
  #[serde(alias = "value")]
  pub custom_input: Option<String>,
}

impl Default for VarSetConfig {
  fn default() -> Self {
    Self {
      variable_name: String::new(),
      input_source: InputSource::Custom,
      input_variable: None,
      custom_input: None,
    }
  }
}

impl VarSetConfig {
  pub fn input_spec(&self) -> InputSpec {
    InputSpec {
      input_source: self.input_source,
      input_variable: self.input_variable.clone(),
      custom_input: self.custom_input.clone(),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VarGetConfig {
  pub variable_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopType {
  #[default]
  Count,
  Condition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopStartConfig {
  pub loop_type: LoopType,
  pub max_iterations: u32,
  /// Subject of the loop predicate in condition mode.
  pub condition_variable: Option<String>,
  #[serde(flatten)]
  pub condition: ConditionSpec,
}

impl Default for LoopStartConfig {
  fn default() -> Self {
    Self {
      loop_type: LoopType::Count,
      max_iterations: 1,
      condition_variable: None,
      condition: ConditionSpec::default(),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionIfConfig {
  /// Subject of the predicate; empty means the previous output.
  pub input_variable: Option<String>,
  #[serde(flatten)]
  pub condition: ConditionSpec,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
  Array,
  #[default]
  #[serde(other)]
  Concat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelStartConfig {
  /// Maximum number of instances running at once.
  pub concurrency: usize,
  /// Total instances to run; defaults to `concurrency`.
  pub instance_count: Option<usize>,
  pub output_mode: OutputMode,
  pub separator: String,
}

impl Default for ParallelStartConfig {
  fn default() -> Self {
    Self {
      concurrency: 3,
      instance_count: None,
      output_mode: OutputMode::Concat,
      separator: String::new(),
    }
  }
}

impl ParallelStartConfig {
  /// Number of instances to run; always at least one, like the concurrency bound.
  pub fn instances(&self) -> usize {
    self.instance_count.unwrap_or(self.concurrency).max(1)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{ConditionType, KeywordMode};
  use serde_json::json;

  #[test]
  fn test_ai_chat_flattened_input() {
    let config: AiChatConfig = parse(&json!({
      "provider": "openai",
      "model": "gpt-4o",
      "input_source": "custom",
      "custom_input": "Polish: {{previous}}",
      "enable_history": true,
      "temperature": 0.7
    }))
    .unwrap();

    assert_eq!(config.input.input_source, InputSource::Custom);
    assert_eq!(config.input.custom_input.as_deref(), Some("Polish: {{previous}}"));
    assert!(config.enable_history);
    assert_eq!(config.temperature, Some(0.7));
  }

  #[test]
  fn test_var_set_defaults_to_custom_value() {
    let config: VarSetConfig = parse(&json!({ "variable_name": "x", "value": "hi" })).unwrap();
    let spec = config.input_spec();

    assert_eq!(spec.input_source, InputSource::Custom);
    assert_eq!(spec.custom_input.as_deref(), Some("hi"));
  }

  #[test]
  fn test_loop_condition_fields() {
    let config: LoopStartConfig = parse(&json!({
      "loop_type": "condition",
      "max_iterations": 5,
      "condition_variable": "draft",
      "condition_type": "keyword",
      "keywords": ["TODO"],
      "keyword_mode": "none"
    }))
    .unwrap();

    assert_eq!(config.loop_type, LoopType::Condition);
    assert_eq!(config.max_iterations, 5);
    assert_eq!(config.condition.condition_type, ConditionType::Keyword);
    assert_eq!(config.condition.keyword_mode, KeywordMode::None);
  }

  #[test]
  fn test_null_config_uses_defaults() {
    let config: LoopStartConfig = parse(&serde_json::Value::Null).unwrap();
    assert_eq!(config.max_iterations, 1);

    let parallel: ParallelStartConfig = parse(&json!({})).unwrap();
    assert_eq!(parallel.concurrency, 3);
    assert_eq!(parallel.instances(), 3);
  }

  #[test]
  fn test_unknown_output_mode_concatenates() {
    let config: ParallelStartConfig =
      parse(&json!({ "output_mode": "text", "instance_count": 2 })).unwrap();

    assert_eq!(config.output_mode, OutputMode::Concat);
    assert_eq!(config.instances(), 2);
  }

  #[test]
  fn test_zero_concurrency_still_runs_one_instance() {
    let config: ParallelStartConfig = parse(&json!({ "concurrency": 0 })).unwrap();
    assert_eq!(config.instances(), 1);

    let config: ParallelStartConfig = parse(&json!({ "instance_count": 0 })).unwrap();
    assert_eq!(config.instances(), 1);
  }

  #[test]
  fn test_concat_sources_default_to_custom() {
    let config: TextConcatConfig = parse(&json!({
      "sources": [{ "value": "{{x}}" }, { "type": "variable", "value": "outline" }],
      "separator": "newline"
    }))
    .unwrap();

    assert_eq!(
      config.sources,
      vec![ConcatSource::custom("{{x}}"), ConcatSource::variable("outline")]
    );
  }

  #[test]
  fn test_text_extract_flattened_input() {
    let config: TextExtractConfig = parse(&json!({
      "input_source": "variable",
      "input_variable": "draft",
      "extract_mode": "start_end"
    }))
    .unwrap();

    assert_eq!(config.input, InputSpec::variable("draft"));
  }

  #[test]
  fn test_var_set_custom_template() {
    let config: VarSetConfig = parse(&json!({
      "variable_name": "copy",
      "input_source": "custom",
      "custom_input": "{{previous}}!"
    }))
    .unwrap();

    assert_eq!(config.input_spec(), InputSpec::custom("{{previous}}!"));
  }

  #[test]
  fn test_malformed_config_is_an_error() {
    let result: Result<LoopStartConfig, _> = parse(&json!({ "max_iterations": "many" }));
    assert!(result.is_err());
  }
}
