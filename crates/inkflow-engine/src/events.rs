//! Run events and notifiers for subscribers.
//!
//! Events are pushed to a subscriber (typically a UI) as the run progresses.
//! Streaming AI output produces one `NodeProgress` per chunk carrying the text
//! accumulated so far; the store only sees start and finish transitions.

use inkflow_store::ExecutionStatus;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted during a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RunEvent {
  /// The execution record was created and the first step is about to run.
  ExecutionStarted {
    execution_id: String,
    workflow_id: String,
  },

  /// A node started, streamed more output or finished.
  NodeProgress {
    execution_id: String,
    node_id: String,
    node_name: String,
    iteration: i64,
    output: String,
    is_running: bool,
    is_streaming: bool,
    /// Set when the node failed.
    error: Option<String>,
  },

  /// The run stopped at a boundary and is waiting to be resumed.
  Paused { execution_id: String },

  Resumed { execution_id: String },

  /// Terminal event; nothing follows it.
  Finished {
    execution_id: String,
    status: ExecutionStatus,
    final_output: Option<String>,
    error: Option<String>,
  },
}

/// Trait for receiving run events.
///
/// `notify` is called inline from the interpreter and from inside AI stream
/// callbacks, so implementations must not block.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: RunEvent);
}

/// A notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: RunEvent) {}
}

/// A notifier that sends events to an unbounded channel.
///
/// Unbounded so a slow subscriber never stalls the run. Chunk events are the
/// bulk of the volume and each carries the full text so far, so a subscriber
/// that falls behind only needs the latest one per node.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<RunEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: RunEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
