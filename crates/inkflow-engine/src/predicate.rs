//! Predicates for condition-mode loops and `condition_if` blocks.
//!
//! Evaluation never fails: a bad pattern or a failed AI call counts as false.

use inkflow_ai::{AiClient, ChatMessage, ChatRequest};
use inkflow_config::{ConditionSpec, ConditionType, KeywordMode};
use regex::Regex;
use tracing::warn;

const JUDGE_SYSTEM_PROMPT: &str =
  "You judge whether a text satisfies a condition. Reply with only true or false.";

pub(crate) async fn evaluate(spec: &ConditionSpec, subject: &str, ai: &dyn AiClient) -> bool {
  match spec.condition_type {
    ConditionType::Keyword => keyword_match(spec, subject),
    ConditionType::Length => spec
      .length_operator
      .compare(subject.chars().count(), spec.length_value),
    ConditionType::Regex => regex_match(&spec.regex_pattern, subject),
    ConditionType::AiJudge => ai_judge(spec, subject, ai).await,
  }
}

fn keyword_match(spec: &ConditionSpec, subject: &str) -> bool {
  let keywords: Vec<&str> = spec
    .keywords
    .iter()
    .map(|k| k.trim())
    .filter(|k| !k.is_empty())
    .collect();

  match spec.keyword_mode {
    KeywordMode::Any => keywords.iter().any(|k| subject.contains(k)),
    KeywordMode::All => keywords.iter().all(|k| subject.contains(k)),
    KeywordMode::None => !keywords.iter().any(|k| subject.contains(k)),
  }
}

fn regex_match(pattern: &str, subject: &str) -> bool {
  match Regex::new(pattern) {
    Ok(re) => re.is_match(subject),
    Err(e) => {
      warn!(pattern = %pattern, error = %e, "condition_regex_invalid");
      false
    }
  }
}

async fn ai_judge(spec: &ConditionSpec, subject: &str, ai: &dyn AiClient) -> bool {
  let prompt = if spec.ai_prompt.trim().is_empty() {
    "Does the following text satisfy the condition?".to_string()
  } else {
    spec.ai_prompt.clone()
  };
  let request = ChatRequest::new(
    spec.ai_provider.clone(),
    spec.ai_model.clone(),
    vec![
      ChatMessage::system(JUDGE_SYSTEM_PROMPT),
      ChatMessage::user(format!("{prompt}\n\n{subject}")),
    ],
  );

  match ai.chat(&request).await {
    Ok(response) => parse_verdict(&response.content),
    Err(e) => {
      warn!(provider = %spec.ai_provider, error = %e, "condition_ai_judge_failed");
      false
    }
  }
}

/// Whether a judge reply means yes.
pub(crate) fn parse_verdict(reply: &str) -> bool {
  let reply = reply.trim().to_lowercase();
  ["true", "yes", "y", "1", "是"]
    .iter()
    .any(|word| reply.starts_with(word))
}

#[cfg(test)]
mod tests {
  use super::*;
  use inkflow_ai::EchoClient;
  use inkflow_config::LengthOperator;

  fn keywords(mode: KeywordMode, words: &[&str]) -> ConditionSpec {
    ConditionSpec {
      condition_type: ConditionType::Keyword,
      keywords: words.iter().map(|w| w.to_string()).collect(),
      keyword_mode: mode,
      ..Default::default()
    }
  }

  #[tokio::test]
  async fn test_keyword_modes() {
    let ai = EchoClient::new();
    let text = "the dragon sleeps";

    assert!(evaluate(&keywords(KeywordMode::Any, &["cat", "dragon"]), text, &ai).await);
    assert!(!evaluate(&keywords(KeywordMode::All, &["cat", "dragon"]), text, &ai).await);
    assert!(evaluate(&keywords(KeywordMode::None, &["cat"]), text, &ai).await);
    assert!(!evaluate(&keywords(KeywordMode::Any, &[]), text, &ai).await);
  }

  #[tokio::test]
  async fn test_length_counts_characters() {
    let ai = EchoClient::new();
    let spec = ConditionSpec {
      condition_type: ConditionType::Length,
      length_operator: LengthOperator::Eq,
      length_value: 3,
      ..Default::default()
    };

    assert!(evaluate(&spec, "龙之歌", &ai).await);
    assert!(!evaluate(&spec, "ab", &ai).await);
  }

  #[tokio::test]
  async fn test_invalid_regex_is_false() {
    let ai = EchoClient::new();
    let spec = ConditionSpec {
      condition_type: ConditionType::Regex,
      regex_pattern: "([unclosed".to_string(),
      ..Default::default()
    };

    assert!(!evaluate(&spec, "anything", &ai).await);
  }

  #[tokio::test]
  async fn test_ai_judge_uses_reply() {
    // The echo client replies with the user message, which starts with the prompt.
    let ai = EchoClient::new();
    let yes = ConditionSpec {
      condition_type: ConditionType::AiJudge,
      ai_prompt: "yes please".to_string(),
      ..Default::default()
    };
    let no = ConditionSpec {
      ai_prompt: "nope".to_string(),
      ..yes.clone()
    };

    assert!(evaluate(&yes, "text", &ai).await);
    assert!(!evaluate(&no, "text", &ai).await);
  }

  #[test]
  fn test_parse_verdict() {
    assert!(parse_verdict(" True."));
    assert!(parse_verdict("是的"));
    assert!(parse_verdict("Y"));
    assert!(!parse_verdict("false"));
    assert!(!parse_verdict("no"));
  }
}
