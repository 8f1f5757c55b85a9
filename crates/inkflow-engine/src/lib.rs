//! Inkflow Workflow Engine
//!
//! This crate runs inkflow workflows: it nests the flat node list into a plan,
//! executes it against an [`ExecutionContext`], and reports progress to a
//! subscriber and to the store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkflowEngine                         │
//! │  - start(request) → RunHandle (pause / resume / cancel)     │
//! │  - resolves the plan, creates the execution record          │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Interpreter                           │
//! │  - walks steps depth-first: loops, conditions, parallel     │
//! │  - checks pause / cancel / timeout at node boundaries       │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Node executors + Reporter                   │
//! │  - one executor per node type, returning context mutations  │
//! │  - node results to the store, progress to the notifier      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use inkflow_engine::{RunRequest, WorkflowEngine};
//!
//! let engine = WorkflowEngine::new(store, ai);
//! let mut handle = engine.start(RunRequest::new("wf", nodes, "a lighthouse keeper"));
//!
//! while let Some(event) = handle.next_event().await {
//!     println!("{event:?}");
//! }
//! let outcome = handle.wait().await?;
//! ```

mod context;
mod control;
mod engine;
mod error;
mod events;
mod executors;
mod extract;
mod interpreter;
mod predicate;
mod reporter;
mod settings;

pub use context::{
  ContextMutation, ContextSnapshot, ExecutionContext, LOOP_INDEX_VAR, NodeOutcome, NodeState,
  NodeStatus, PARALLEL_INDEX_VAR, USER_QUESTION_VAR,
};
pub use control::RunControl;
pub use engine::{RunHandle, RunOutcome, RunRequest, SETTINGS_VAR, WorkflowEngine};
pub use error::{EngineError, NodeError};
pub use events::{ChannelNotifier, ExecutionNotifier, NoopNotifier, RunEvent};
pub use settings::{Setting, SettingPrompt, SettingsError, SettingsRenderer, TemplateSettingsRenderer};
