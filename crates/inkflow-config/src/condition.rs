use serde::{Deserialize, Serialize};

/// Predicate configuration shared by condition-mode loops and `condition_if` nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionSpec {
  pub condition_type: ConditionType,
  pub keywords: Vec<String>,
  pub keyword_mode: KeywordMode,
  pub length_operator: LengthOperator,
  /// Compared against the subject's character count.
  pub length_value: usize,
  pub regex_pattern: String,
  pub ai_provider: String,
  pub ai_model: String,
  pub ai_prompt: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
  #[default]
  Keyword,
  Length,
  Regex,
  AiJudge,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordMode {
  #[default]
  Any,
  All,
  None,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LengthOperator {
  #[serde(rename = "gt", alias = ">")]
  Gt,
  #[default]
  #[serde(rename = "gte", alias = ">=")]
  Gte,
  #[serde(rename = "lt", alias = "<")]
  Lt,
  #[serde(rename = "lte", alias = "<=")]
  Lte,
  #[serde(rename = "eq", alias = "=", alias = "==")]
  Eq,
}

impl LengthOperator {
  pub fn compare(self, actual: usize, expected: usize) -> bool {
    match self {
      LengthOperator::Gt => actual > expected,
      LengthOperator::Gte => actual >= expected,
      LengthOperator::Lt => actual < expected,
      LengthOperator::Lte => actual <= expected,
      LengthOperator::Eq => actual == expected,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_length_operator_symbols() {
    let spec: ConditionSpec = serde_json::from_value(json!({
      "condition_type": "length",
      "length_operator": "<",
      "length_value": 10
    }))
    .unwrap();

    assert_eq!(spec.condition_type, ConditionType::Length);
    assert_eq!(spec.length_operator, LengthOperator::Lt);
    assert!(spec.length_operator.compare(3, 10));
    assert!(!spec.length_operator.compare(10, 10));
  }

  #[test]
  fn test_defaults() {
    let spec: ConditionSpec = serde_json::from_value(json!({})).unwrap();
    assert_eq!(spec.condition_type, ConditionType::Keyword);
    assert_eq!(spec.keyword_mode, KeywordMode::Any);
    assert!(spec.keywords.is_empty());
  }
}
