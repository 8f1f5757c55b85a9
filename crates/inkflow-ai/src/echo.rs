use async_trait::async_trait;

use crate::{AiClient, AiError, ChatRequest, ChatResponse, Role, StreamChunk, Usage};

/// Offline client that answers with the last user message.
///
/// Replies stream word by word, which is enough to exercise chunk handling
/// without a network provider.
#[derive(Debug, Clone, Default)]
pub struct EchoClient;

impl EchoClient {
  pub fn new() -> Self {
    Self
  }

  fn reply(request: &ChatRequest) -> Result<String, AiError> {
    request
      .messages
      .iter()
      .rev()
      .find(|m| m.role == Role::User)
      .map(|m| m.content.clone())
      .ok_or_else(|| AiError::InvalidRequest("no user message".to_string()))
  }
}

#[async_trait]
impl AiClient for EchoClient {
  async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AiError> {
    let content = Self::reply(request)?;
    let words = content.split_whitespace().count() as u32;
    Ok(ChatResponse {
      content,
      usage: Some(Usage {
        prompt_tokens: words,
        completion_tokens: words,
        total_tokens: words * 2,
      }),
    })
  }

  async fn chat_stream(
    &self,
    request: &ChatRequest,
    on_chunk: &mut (dyn FnMut(StreamChunk) + Send),
  ) -> Result<(), AiError> {
    let content = Self::reply(request)?;
    for piece in content.split_inclusive(' ') {
      on_chunk(StreamChunk::content(piece));
    }
    on_chunk(StreamChunk::done());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ChatMessage;

  fn make_request(messages: Vec<ChatMessage>) -> ChatRequest {
    ChatRequest::new("echo", "echo-1", messages)
  }

  #[tokio::test]
  async fn test_stream_reassembles_last_user_message() {
    let request = make_request(vec![
      ChatMessage::system("be brief"),
      ChatMessage::user("first"),
      ChatMessage::assistant("ok"),
      ChatMessage::user("once upon a time"),
    ]);

    let mut chunks = Vec::new();
    EchoClient::new()
      .chat_stream(&request, &mut |chunk: StreamChunk| chunks.push(chunk))
      .await
      .unwrap();

    assert!(chunks.last().unwrap().done);
    let text: String = chunks.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(text, "once upon a time");
    assert_eq!(chunks.len(), 5);
  }

  #[tokio::test]
  async fn test_requires_user_message() {
    let request = make_request(vec![ChatMessage::system("only system")]);
    let result = EchoClient::new().chat(&request).await;
    assert!(matches!(result, Err(AiError::InvalidRequest(_))));
  }
}
