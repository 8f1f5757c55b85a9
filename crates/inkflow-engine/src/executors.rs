//! Node executors, one per executable node kind.
//!
//! Executors read the context and return a [`NodeOutcome`] describing the
//! output and the mutations to apply; the interpreter applies them. Only
//! `ai_chat` performs I/O.

use inkflow_ai::{AiClient, ChatMessage, ChatRequest, StreamChunk, ThinkingConfig};
use inkflow_config::node_config::{
  self, AiChatConfig, ConcatSourceKind, StartConfig, TextConcatConfig, TextExtractConfig,
  VarGetConfig, VarSetConfig,
};
use inkflow_config::{InputSource, InputSpec, NodeDef, NodeKind};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::context::{ContextMutation, ExecutionContext, NodeOutcome, USER_QUESTION_VAR};
use crate::error::NodeError;
use crate::extract;

/// Deserialize a node's typed config.
pub(crate) fn parse_config<T>(node: &NodeDef) -> Result<T, NodeError>
where
  T: DeserializeOwned + Default,
{
  node_config::parse(&node.config).map_err(|source| NodeError::Config {
    kind: node.kind,
    source,
  })
}

/// Run one executable node.
///
/// `on_chunk` receives streamed AI output as it arrives.
pub(crate) async fn execute(
  node: &NodeDef,
  ctx: &ExecutionContext,
  ai: &dyn AiClient,
  on_chunk: &mut (dyn FnMut(&str) + Send),
) -> Result<NodeOutcome, NodeError> {
  match node.kind {
    NodeKind::Start => Ok(start(ctx, parse_config(node)?)),
    NodeKind::Output => Ok(output(ctx)),
    NodeKind::AiChat => ai_chat(node, ctx, parse_config(node)?, ai, on_chunk).await,
    NodeKind::TextExtract => Ok(text_extract(ctx, parse_config(node)?)),
    NodeKind::TextConcat => Ok(text_concat(ctx, parse_config(node)?)),
    NodeKind::VarSet => var_set(ctx, parse_config(node)?),
    NodeKind::VarGet => var_get(ctx, parse_config(node)?),
    kind => Err(NodeError::NotExecutable(kind)),
  }
}

/// Resolve the text a node consumes.
pub(crate) fn resolve_input(ctx: &ExecutionContext, spec: &InputSpec) -> String {
  match spec.input_source {
    InputSource::Previous => ctx.previous_output().to_string(),
    InputSource::Variable => match spec.input_variable.as_deref().map(str::trim) {
      Some(name) if !name.is_empty() => ctx.resolve_name(name).unwrap_or_default(),
      _ => ctx.previous_output().to_string(),
    },
    InputSource::Custom => ctx.interpolate(spec.custom_input.as_deref().unwrap_or_default()),
  }
}

/// Decode a configured separator.
pub(crate) fn decode_separator(raw: &str) -> String {
  match raw {
    "" | "none" => String::new(),
    "\\n" | "newline" => "\n".to_string(),
    other => other.replace("\\n", "\n").replace("\\t", "\t"),
  }
}

fn start(ctx: &ExecutionContext, config: StartConfig) -> NodeOutcome {
  let supplied = ctx.initial_input();
  let fallback = config
    .default_value
    .filter(|d| supplied.trim().is_empty() && !d.is_empty())
    .map(|d| ctx.interpolate(&d));

  let outcome = match fallback {
    Some(value) => NodeOutcome::new(supplied, value.clone())
      .with_mutation(ContextMutation::SetInitialInput(value)),
    None => NodeOutcome::new(supplied, supplied),
  };
  let value = outcome.output.clone();
  outcome.with_mutation(ContextMutation::SetVariable {
    name: USER_QUESTION_VAR.to_string(),
    value,
  })
}

fn output(ctx: &ExecutionContext) -> NodeOutcome {
  let value = ctx.previous_output().to_string();
  NodeOutcome::new(value.clone(), value.clone()).with_mutation(ContextMutation::SetFinalOutput(value))
}

async fn ai_chat(
  node: &NodeDef,
  ctx: &ExecutionContext,
  config: AiChatConfig,
  ai: &dyn AiClient,
  on_chunk: &mut (dyn FnMut(&str) + Send),
) -> Result<NodeOutcome, NodeError> {
  if config.provider.trim().is_empty() {
    return Err(NodeError::MissingField("provider"));
  }
  if config.model.trim().is_empty() {
    return Err(NodeError::MissingField("model"));
  }

  let input = resolve_input(ctx, &config.input);
  let history_key = ctx.scoped_key(&node.id);

  let mut messages = Vec::new();
  if let Some(system) = config.system_prompt.as_deref().filter(|s| !s.trim().is_empty()) {
    messages.push(ChatMessage::system(ctx.interpolate(system)));
  }
  if config.enable_history {
    let history = ctx.history(&history_key);
    let keep = config
      .history_limit
      .map_or(history.len(), |limit| limit.saturating_mul(2));
    let skip = history.len().saturating_sub(keep);
    messages.extend(history[skip..].iter().cloned());
  }
  messages.push(ChatMessage::user(input.clone()));

  let mut request = ChatRequest::new(config.provider, config.model, messages);
  request.temperature = config.temperature;
  request.max_tokens = config.max_tokens;
  request.top_p = config.top_p;
  if config.enable_thinking {
    request.thinking = Some(ThinkingConfig {
      enabled: true,
      budget_tokens: config.thinking_budget,
    });
  }
  let resolved = serde_json::to_value(&request).map_err(NodeError::Encode)?;

  let mut reply = String::new();
  ai.chat_stream(&request, &mut |chunk: StreamChunk| {
    if !chunk.content.is_empty() {
      reply.push_str(&chunk.content);
      on_chunk(&chunk.content);
    }
  })
  .await?;

  let mut outcome = NodeOutcome::new(input.clone(), reply.clone()).with_mutation(
    ContextMutation::AppendHistory {
      key: history_key,
      user: input,
      assistant: reply,
    },
  );
  outcome.resolved_config = Some(resolved);
  Ok(outcome)
}

fn text_extract(ctx: &ExecutionContext, config: TextExtractConfig) -> NodeOutcome {
  let input = resolve_input(ctx, &config.input);
  let output = extract::extract(&config, &input);
  NodeOutcome::new(input, output)
}

fn text_concat(ctx: &ExecutionContext, config: TextConcatConfig) -> NodeOutcome {
  let parts: Vec<String> = config
    .sources
    .iter()
    .map(|source| match source.kind {
      ConcatSourceKind::Variable => ctx.resolve_name(source.value.trim()).unwrap_or_default(),
      ConcatSourceKind::Custom => ctx.interpolate(&source.value),
    })
    .collect();
  let output = parts.join(&decode_separator(&config.separator));
  NodeOutcome::new(ctx.previous_output(), output)
}

fn var_set(ctx: &ExecutionContext, config: VarSetConfig) -> Result<NodeOutcome, NodeError> {
  let name = config.variable_name.trim();
  if name.is_empty() {
    return Err(NodeError::MissingField("variable_name"));
  }
  let value = resolve_input(ctx, &config.input_spec());
  Ok(
    NodeOutcome::new(value.clone(), value.clone()).with_mutation(ContextMutation::SetVariable {
      name: name.to_string(),
      value,
    }),
  )
}

fn var_get(ctx: &ExecutionContext, config: VarGetConfig) -> Result<NodeOutcome, NodeError> {
  let name = config.variable_name.trim();
  if name.is_empty() {
    return Err(NodeError::MissingField("variable_name"));
  }
  let value = match ctx.variable(name) {
    Some(value) => value.to_string(),
    None => {
      warn!(variable = %name, "variable_not_found");
      String::new()
    }
  };
  Ok(NodeOutcome::new(name, value))
}

#[cfg(test)]
mod tests {
  use super::*;
  use inkflow_ai::EchoClient;
  use inkflow_config::RuntimeConfig;
  use serde_json::json;

  fn make_context(input: &str) -> ExecutionContext {
    ExecutionContext::new(input, RuntimeConfig::default())
  }

  fn make_node(kind: NodeKind, config: serde_json::Value) -> NodeDef {
    NodeDef::new("n", kind, "node").with_config(config)
  }

  async fn run(node: &NodeDef, ctx: &ExecutionContext) -> Result<NodeOutcome, NodeError> {
    execute(node, ctx, &EchoClient::new(), &mut |_: &str| {}).await
  }

  #[tokio::test]
  async fn test_start_uses_default_when_input_empty() {
    let ctx = make_context("  ");
    let node = make_node(NodeKind::Start, json!({ "default_value": "a lighthouse" }));

    let outcome = run(&node, &ctx).await.unwrap();
    assert_eq!(outcome.output, "a lighthouse");
    assert!(outcome.mutations.contains(&ContextMutation::SetVariable {
      name: USER_QUESTION_VAR.to_string(),
      value: "a lighthouse".to_string(),
    }));
    assert!(
      outcome
        .mutations
        .contains(&ContextMutation::SetInitialInput("a lighthouse".to_string()))
    );
  }

  #[tokio::test]
  async fn test_text_concat_separators() {
    let mut ctx = make_context("");
    ctx.set_variable("x", "hi");
    let node = make_node(
      NodeKind::TextConcat,
      json!({
        "sources": [{ "type": "variable", "value": "x" }, { "type": "custom", "value": "{{x}} again" }],
        "separator": "\\n"
      }),
    );

    assert_eq!(run(&node, &ctx).await.unwrap().output, "hi\nhi again");

    let node = make_node(
      NodeKind::TextConcat,
      json!({ "sources": [{ "value": "a" }, { "value": "b" }], "separator": "none" }),
    );
    assert_eq!(run(&node, &ctx).await.unwrap().output, "ab");
  }

  #[tokio::test]
  async fn test_var_get_missing_is_empty() {
    let ctx = make_context("");
    let node = make_node(NodeKind::VarGet, json!({ "variable_name": "nothing" }));
    assert_eq!(run(&node, &ctx).await.unwrap().output, "");
  }

  #[tokio::test]
  async fn test_var_set_requires_name() {
    let ctx = make_context("");
    let node = make_node(NodeKind::VarSet, json!({ "value": "x" }));
    let err = run(&node, &ctx).await.unwrap_err();
    assert!(matches!(err, NodeError::MissingField("variable_name")));
  }

  #[tokio::test]
  async fn test_ai_chat_builds_request_with_history() {
    let mut ctx = make_context("");
    ctx.apply(
      "prior",
      NodeOutcome::new("", "draft one").with_mutation(ContextMutation::AppendHistory {
        key: "n".to_string(),
        user: "write".to_string(),
        assistant: "draft one".to_string(),
      }),
    );
    let node = make_node(
      NodeKind::AiChat,
      json!({
        "provider": "echo",
        "model": "m",
        "system_prompt": "You are an editor.",
        "enable_history": true,
        "input_source": "custom",
        "custom_input": "improve {{previous}}"
      }),
    );

    let mut chunks = Vec::new();
    let outcome = execute(&node, &ctx, &EchoClient::new(), &mut |c: &str| {
      chunks.push(c.to_string())
    })
    .await
    .unwrap();

    assert_eq!(outcome.output, "improve draft one");
    assert_eq!(chunks.concat(), "improve draft one");
    let messages = &outcome.resolved_config.unwrap()["messages"];
    assert_eq!(messages.as_array().unwrap().len(), 4);
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[1]["content"], "write");
  }

  #[tokio::test]
  async fn test_ai_chat_requires_model() {
    let ctx = make_context("");
    let node = make_node(NodeKind::AiChat, json!({ "provider": "echo" }));
    let err = run(&node, &ctx).await.unwrap_err();
    assert!(matches!(err, NodeError::MissingField("model")));
  }

  #[tokio::test]
  async fn test_markers_are_not_executable() {
    let ctx = make_context("");
    let node = make_node(NodeKind::LoopEnd, serde_json::Value::Null);
    let err = run(&node, &ctx).await.unwrap_err();
    assert!(matches!(err, NodeError::NotExecutable(NodeKind::LoopEnd)));
  }
}
