use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Caller-side controls for a running workflow.
///
/// Cloning shares the same run. Requests are only observed at node boundaries:
/// before a top-level step, before a loop iteration and before a parallel
/// instance is dispatched.
#[derive(Debug, Clone)]
pub struct RunControl {
  cancel: CancellationToken,
  pause: Arc<watch::Sender<bool>>,
}

impl RunControl {
  pub fn new() -> Self {
    let (pause, _) = watch::channel(false);
    Self {
      cancel: CancellationToken::new(),
      pause: Arc::new(pause),
    }
  }

  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  pub fn pause(&self) {
    self.pause.send_replace(true);
  }

  pub fn resume(&self) {
    self.pause.send_replace(false);
  }

  pub fn is_paused(&self) -> bool {
    *self.pause.borrow()
  }

  /// Wait until the run is resumed or cancelled. Returns `false` if cancelled.
  pub(crate) async fn wait_while_paused(&self) -> bool {
    let mut paused = self.pause.subscribe();
    loop {
      let still_paused = *paused.borrow_and_update();
      if !still_paused {
        return true;
      }
      tokio::select! {
        _ = self.cancel.cancelled() => return false,
        changed = paused.changed() => {
          if changed.is_err() {
            return !self.cancel.is_cancelled();
          }
        }
      }
    }
  }
}

impl Default for RunControl {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[tokio::test]
  async fn test_resume_releases_waiter() {
    let control = RunControl::new();
    control.pause();

    let waiter = control.clone();
    let handle = tokio::spawn(async move { waiter.wait_while_paused().await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!handle.is_finished());

    control.resume();
    assert!(handle.await.unwrap());
  }

  #[tokio::test]
  async fn test_cancel_releases_waiter() {
    let control = RunControl::new();
    control.pause();

    let waiter = control.clone();
    let handle = tokio::spawn(async move { waiter.wait_while_paused().await });

    control.cancel();
    assert!(!handle.await.unwrap());
  }
}
