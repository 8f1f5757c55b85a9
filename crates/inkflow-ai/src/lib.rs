//! Inkflow AI
//!
//! The chat capability the engine calls into. Provider selection, credentials
//! and transport live behind [`AiClient`]; the engine only builds a
//! [`ChatRequest`] and consumes text.

mod echo;
mod types;

pub use echo::EchoClient;
pub use types::{ChatMessage, ChatRequest, ChatResponse, Role, StreamChunk, ThinkingConfig, Usage};

use async_trait::async_trait;

/// Errors returned by an AI provider.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
  #[error("provider '{0}' is not configured")]
  UnknownProvider(String),

  #[error("request rejected: {0}")]
  InvalidRequest(String),

  #[error("provider error: {0}")]
  Provider(String),

  #[error("stream interrupted: {0}")]
  Stream(String),
}

/// A provider-agnostic chat client.
#[async_trait]
pub trait AiClient: Send + Sync {
  /// Send a request and wait for the whole reply.
  async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AiError>;

  /// Send a request and deliver the reply in chunks.
  ///
  /// `on_chunk` is called for every piece of content and once more with
  /// `done = true` when the reply is complete.
  async fn chat_stream(
    &self,
    request: &ChatRequest,
    on_chunk: &mut (dyn FnMut(StreamChunk) + Send),
  ) -> Result<(), AiError>;
}
