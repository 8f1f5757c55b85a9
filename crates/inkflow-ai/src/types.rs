use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  System,
  User,
  Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
  pub role: Role,
  pub content: String,
}

impl ChatMessage {
  pub fn system(content: impl Into<String>) -> Self {
    Self {
      role: Role::System,
      content: content.into(),
    }
  }

  pub fn user(content: impl Into<String>) -> Self {
    Self {
      role: Role::User,
      content: content.into(),
    }
  }

  pub fn assistant(content: impl Into<String>) -> Self {
    Self {
      role: Role::Assistant,
      content: content.into(),
    }
  }
}

/// Extended reasoning settings for providers that support it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingConfig {
  pub enabled: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub budget_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
  pub provider: String,
  pub model: String,
  pub messages: Vec<ChatMessage>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub temperature: Option<f32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_tokens: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub top_p: Option<f32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub thinking: Option<ThinkingConfig>,
}

impl ChatRequest {
  pub fn new(
    provider: impl Into<String>,
    model: impl Into<String>,
    messages: Vec<ChatMessage>,
  ) -> Self {
    Self {
      provider: provider.into(),
      model: model.into(),
      messages,
      temperature: None,
      max_tokens: None,
      top_p: None,
      thinking: None,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
  pub prompt_tokens: u32,
  pub completion_tokens: u32,
  pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
  pub content: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub usage: Option<Usage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
  pub content: String,
  pub done: bool,
}

impl StreamChunk {
  pub fn content(content: impl Into<String>) -> Self {
    Self {
      content: content.into(),
      done: false,
    }
  }

  pub fn done() -> Self {
    Self {
      content: String::new(),
      done: true,
    }
  }
}
