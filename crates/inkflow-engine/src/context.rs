//! Run-scoped execution state and variable interpolation.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use inkflow_ai::ChatMessage;
use inkflow_config::RuntimeConfig;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Variable written by the `start` node.
pub const USER_QUESTION_VAR: &str = "用户问题";
/// 1-based iteration of the innermost loop.
pub const LOOP_INDEX_VAR: &str = "loop_index";
/// 1-based instance number inside a parallel block.
pub const PARALLEL_INDEX_VAR: &str = "parallel_index";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
  Pending,
  Running,
  Completed,
  Failed,
  Skipped,
}

/// The latest state of one node within the current scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
  pub status: NodeStatus,
  pub input: Option<String>,
  pub output: Option<String>,
  pub started_at: Option<DateTime<Utc>>,
  pub finished_at: Option<DateTime<Utc>>,
  pub error: Option<String>,
}

impl NodeState {
  fn new(status: NodeStatus) -> Self {
    Self {
      status,
      input: None,
      output: None,
      started_at: None,
      finished_at: None,
      error: None,
    }
  }
}

/// A change an executor asks the context to make.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextMutation {
  SetVariable { name: String, value: String },
  SetInitialInput(String),
  /// Append one user/assistant exchange to a node's rolling history.
  AppendHistory {
    key: String,
    user: String,
    assistant: String,
  },
  SetFinalOutput(String),
}

/// What a node executor produced.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutcome {
  /// The resolved text the node consumed.
  pub input: String,
  pub output: String,
  pub resolved_config: Option<serde_json::Value>,
  pub mutations: Vec<ContextMutation>,
}

impl NodeOutcome {
  pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
    Self {
      input: input.into(),
      output: output.into(),
      resolved_config: None,
      mutations: Vec::new(),
    }
  }

  pub fn with_mutation(mut self, mutation: ContextMutation) -> Self {
    self.mutations.push(mutation);
    self
  }
}

/// Serializable copy of a context, written to the execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
  pub variables: HashMap<String, String>,
  pub conversation_history: HashMap<String, Vec<ChatMessage>>,
  pub previous_output: String,
  pub initial_input: String,
  pub node_states: HashMap<String, NodeState>,
  pub loop_counters: HashMap<String, u32>,
  pub final_output: Option<String>,
  pub elapsed_seconds: u64,
}

/// Mutable state for one run.
///
/// Per-node and per-block state is keyed by a scope path: the ids of the
/// enclosing blocks joined with `/`, where parallel instances add a
/// `block_id#index` segment. Top-level keys are plain node or block ids.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
  variables: HashMap<String, String>,
  conversation_history: HashMap<String, Vec<ChatMessage>>,
  previous_output: String,
  initial_input: String,
  node_states: HashMap<String, NodeState>,
  loop_counters: HashMap<String, u32>,
  scope: Vec<String>,
  max_loop_count: u32,
  timeout_seconds: u64,
  started_at: Instant,
  final_output: Option<String>,
}

fn placeholder() -> &'static Regex {
  static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
  PLACEHOLDER.get_or_init(|| Regex::new(r"\{\{([^{}]*)\}\}").expect("placeholder pattern is valid"))
}

impl ExecutionContext {
  pub fn new(initial_input: impl Into<String>, config: RuntimeConfig) -> Self {
    let initial_input = initial_input.into();
    Self {
      variables: HashMap::new(),
      conversation_history: HashMap::new(),
      previous_output: initial_input.clone(),
      initial_input,
      node_states: HashMap::new(),
      loop_counters: HashMap::new(),
      scope: Vec::new(),
      max_loop_count: config.max_loop_count,
      timeout_seconds: config.timeout_seconds,
      started_at: Instant::now(),
      final_output: None,
    }
  }

  /// Rebuild a context from a snapshot. The clock resumes from the recorded
  /// elapsed time.
  pub fn restore(snapshot: ContextSnapshot, config: RuntimeConfig) -> Self {
    let now = Instant::now();
    let started_at = now
      .checked_sub(Duration::from_secs(snapshot.elapsed_seconds))
      .unwrap_or(now);
    Self {
      variables: snapshot.variables,
      conversation_history: snapshot.conversation_history,
      previous_output: snapshot.previous_output,
      initial_input: snapshot.initial_input,
      node_states: snapshot.node_states,
      loop_counters: snapshot.loop_counters,
      scope: Vec::new(),
      max_loop_count: config.max_loop_count,
      timeout_seconds: config.timeout_seconds,
      started_at,
      final_output: snapshot.final_output,
    }
  }

  pub fn create_snapshot(&self) -> ContextSnapshot {
    ContextSnapshot {
      variables: self.variables.clone(),
      conversation_history: self.conversation_history.clone(),
      previous_output: self.previous_output.clone(),
      initial_input: self.initial_input.clone(),
      node_states: self.node_states.clone(),
      loop_counters: self.loop_counters.clone(),
      final_output: self.final_output.clone(),
      elapsed_seconds: self.elapsed_seconds(),
    }
  }

  pub fn variable(&self, name: &str) -> Option<&str> {
    self.variables.get(name).map(String::as_str)
  }

  pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
    self.variables.insert(name.into(), value.into());
  }

  pub fn variables(&self) -> &HashMap<String, String> {
    &self.variables
  }

  pub fn previous_output(&self) -> &str {
    &self.previous_output
  }

  pub fn set_previous_output(&mut self, output: impl Into<String>) {
    self.previous_output = output.into();
  }

  pub fn initial_input(&self) -> &str {
    &self.initial_input
  }

  pub fn final_output(&self) -> Option<&str> {
    self.final_output.as_deref()
  }

  pub fn max_loop_count(&self) -> u32 {
    self.max_loop_count
  }

  pub fn elapsed_seconds(&self) -> u64 {
    self.started_at.elapsed().as_secs()
  }

  /// Whether the run has used up its time budget. A zero budget never expires.
  pub fn is_timed_out(&self) -> bool {
    self.timeout_seconds > 0 && self.elapsed_seconds() >= self.timeout_seconds
  }

  /// Resolve a placeholder name without the braces.
  pub fn resolve_name(&self, name: &str) -> Option<String> {
    match name {
      "input" | "输入" => Some(self.initial_input.clone()),
      "previous" | "上一个输出" => Some(self.previous_output.clone()),
      _ => self.variables.get(name).cloned(),
    }
  }

  /// Replace every `{{name}}` in `template`. Unknown names are left as written.
  pub fn interpolate(&self, template: &str) -> String {
    placeholder()
      .replace_all(template, |caps: &Captures<'_>| {
        self
          .resolve_name(caps[1].trim())
          .unwrap_or_else(|| caps[0].to_string())
      })
      .into_owned()
  }

  /// Resolve the subject text of a predicate.
  ///
  /// An empty name means the previous output, a name containing a placeholder
  /// is interpolated and any other name is looked up, missing names giving an
  /// empty string.
  pub fn condition_subject(&self, name: Option<&str>) -> String {
    let name = name.map(str::trim).unwrap_or_default();
    if name.is_empty() {
      self.previous_output.clone()
    } else if name.contains("{{") {
      self.interpolate(name)
    } else {
      self.resolve_name(name).unwrap_or_default()
    }
  }

  /// Key for per-node or per-block state in the current scope.
  pub fn scoped_key(&self, id: &str) -> String {
    if self.scope.is_empty() {
      id.to_string()
    } else {
      format!("{}/{}", self.scope.join("/"), id)
    }
  }

  pub(crate) fn enter_scope(&mut self, segment: impl Into<String>) {
    self.scope.push(segment.into());
  }

  pub(crate) fn exit_scope(&mut self) {
    self.scope.pop();
  }

  pub fn history(&self, key: &str) -> &[ChatMessage] {
    self
      .conversation_history
      .get(key)
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }

  pub fn loop_count(&self, key: &str) -> u32 {
    self.loop_counters.get(key).copied().unwrap_or(0)
  }

  pub(crate) fn reset_loop(&mut self, key: &str) {
    self.loop_counters.insert(key.to_string(), 0);
  }

  /// Increment a loop counter and return the new 1-based iteration.
  pub(crate) fn increment_loop(&mut self, key: &str) -> u32 {
    let counter = self.loop_counters.entry(key.to_string()).or_insert(0);
    *counter += 1;
    *counter
  }

  pub fn node_state(&self, key: &str) -> Option<&NodeState> {
    self.node_states.get(key)
  }

  pub(crate) fn mark_running(&mut self, node_id: &str) {
    let mut state = NodeState::new(NodeStatus::Running);
    state.started_at = Some(Utc::now());
    self.node_states.insert(self.scoped_key(node_id), state);
  }

  pub(crate) fn mark_failed(&mut self, node_id: &str, error: &str) {
    let key = self.scoped_key(node_id);
    let state = self
      .node_states
      .entry(key)
      .or_insert_with(|| NodeState::new(NodeStatus::Running));
    state.status = NodeStatus::Failed;
    state.error = Some(error.to_string());
    state.finished_at = Some(Utc::now());
  }

  pub(crate) fn mark_skipped(&mut self, node_id: &str) {
    self
      .node_states
      .insert(self.scoped_key(node_id), NodeState::new(NodeStatus::Skipped));
  }

  /// Record a finished node: its output becomes `{{previous}}` and its
  /// mutations are applied in order.
  pub fn apply(&mut self, node_id: &str, outcome: NodeOutcome) {
    let key = self.scoped_key(node_id);
    let state = self
      .node_states
      .entry(key)
      .or_insert_with(|| NodeState::new(NodeStatus::Running));
    state.status = NodeStatus::Completed;
    state.input = Some(outcome.input);
    state.output = Some(outcome.output.clone());
    state.finished_at = Some(Utc::now());

    for mutation in outcome.mutations {
      match mutation {
        ContextMutation::SetVariable { name, value } => {
          self.variables.insert(name, value);
        }
        ContextMutation::SetInitialInput(input) => self.initial_input = input,
        ContextMutation::AppendHistory {
          key,
          user,
          assistant,
        } => {
          let history = self.conversation_history.entry(key).or_default();
          history.push(ChatMessage::user(user));
          history.push(ChatMessage::assistant(assistant));
        }
        ContextMutation::SetFinalOutput(output) => self.final_output = Some(output),
      }
    }

    self.previous_output = outcome.output;
  }

  /// A private copy for one parallel instance.
  pub(crate) fn fork_instance(&self, block_id: &str, index: usize) -> Self {
    let mut fork = self.clone();
    fork.enter_scope(format!("{block_id}#{index}"));
    fork.set_variable(PARALLEL_INDEX_VAR, index.to_string());
    fork
  }

  /// Take back per-node state from a finished parallel instance. Variables
  /// written inside the instance are discarded.
  pub(crate) fn absorb(&mut self, fork: ExecutionContext) {
    self.node_states.extend(fork.node_states);
    self.conversation_history.extend(fork.conversation_history);
    self.loop_counters.extend(fork.loop_counters);
    if fork.final_output.is_some() {
      self.final_output = fork.final_output;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn make_context(input: &str) -> ExecutionContext {
    ExecutionContext::new(input, RuntimeConfig::default())
  }

  #[test]
  fn test_interpolate_variable() {
    let mut ctx = make_context("");
    ctx.set_variable("x", "v");
    assert_eq!(ctx.interpolate("{{x}}"), "v");
    assert_eq!(ctx.interpolate("a {{ x }} b"), "a v b");
  }

  #[test]
  fn test_interpolate_missing_is_left_untouched() {
    let ctx = make_context("");
    assert_eq!(ctx.interpolate("{{missing}}"), "{{missing}}");
    assert_eq!(ctx.interpolate("{{}}"), "{{}}");
  }

  #[test]
  fn test_interpolate_builtin_names() {
    let mut ctx = make_context("seed");
    ctx.set_previous_output("last");
    assert_eq!(ctx.interpolate("{{input}}/{{输入}}"), "seed/seed");
    assert_eq!(ctx.interpolate("{{previous}}/{{上一个输出}}"), "last/last");
  }

  #[test]
  fn test_apply_updates_previous_and_variables() {
    let mut ctx = make_context("");
    let outcome = NodeOutcome::new("in", "out").with_mutation(ContextMutation::SetVariable {
      name: "x".to_string(),
      value: "hi".to_string(),
    });
    ctx.apply("n1", outcome);

    assert_eq!(ctx.interpolate("{{previous}} {{x}}"), "out hi");
    let state = ctx.node_state("n1").unwrap();
    assert_eq!(state.status, NodeStatus::Completed);
    assert_eq!(state.input.as_deref(), Some("in"));
  }

  #[test]
  fn test_condition_subject_resolution() {
    let mut ctx = make_context("");
    ctx.set_previous_output("prev");
    ctx.set_variable("draft", "text");

    assert_eq!(ctx.condition_subject(None), "prev");
    assert_eq!(ctx.condition_subject(Some("  ")), "prev");
    assert_eq!(ctx.condition_subject(Some("draft")), "text");
    assert_eq!(ctx.condition_subject(Some("{{draft}}!")), "text!");
    assert_eq!(ctx.condition_subject(Some("unknown")), "");
  }

  #[test]
  fn test_fork_scopes_state_and_discards_variables() {
    let mut ctx = make_context("");
    let mut fork = ctx.fork_instance("p", 2);
    assert_eq!(fork.variable(PARALLEL_INDEX_VAR), Some("2"));
    assert_eq!(fork.scoped_key("ai"), "p#2/ai");

    fork.apply(
      "ai",
      NodeOutcome::new("", "draft").with_mutation(ContextMutation::SetVariable {
        name: "leak".to_string(),
        value: "no".to_string(),
      }),
    );
    ctx.absorb(fork);

    assert!(ctx.node_state("p#2/ai").is_some());
    assert_eq!(ctx.variable("leak"), None);
  }

  #[test]
  fn test_snapshot_restore() {
    let mut ctx = make_context("seed");
    ctx.set_variable("x", "1");
    ctx.apply(
      "ai",
      NodeOutcome::new("q", "a").with_mutation(ContextMutation::AppendHistory {
        key: "ai".to_string(),
        user: "q".to_string(),
        assistant: "a".to_string(),
      }),
    );

    let json = serde_json::to_value(ctx.create_snapshot()).unwrap();
    let snapshot: ContextSnapshot = serde_json::from_value(json).unwrap();
    let restored = ExecutionContext::restore(snapshot, RuntimeConfig::default());

    assert_eq!(restored.variable("x"), Some("1"));
    assert_eq!(restored.previous_output(), "a");
    assert_eq!(restored.history("ai").len(), 2);
  }

  #[test]
  fn test_zero_timeout_never_expires() {
    let ctx = ExecutionContext::new(
      "",
      RuntimeConfig {
        max_loop_count: 10,
        timeout_seconds: 0,
      },
    );
    assert!(!ctx.is_timed_out());
  }
}
