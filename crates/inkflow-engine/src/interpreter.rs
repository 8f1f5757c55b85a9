//! Step interpreter: walks a plan depth-first and applies control flow.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use inkflow_ai::AiClient;
use inkflow_config::node_config::{
  ConditionIfConfig, LoopStartConfig, LoopType, OutputMode, ParallelStartConfig,
};
use inkflow_config::{BlockKind, NodeDef};
use inkflow_workflow::{Block, Step};
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument};

use crate::context::{ExecutionContext, LOOP_INDEX_VAR};
use crate::control::RunControl;
use crate::error::EngineError;
use crate::executors::{self, decode_separator, parse_config};
use crate::predicate;
use crate::reporter::Reporter;

/// Hands out per-node iteration numbers for node results.
#[derive(Default)]
struct IterationCounter {
  counts: Mutex<HashMap<String, i64>>,
}

impl IterationCounter {
  fn next(&self, node_id: &str) -> i64 {
    let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
    let count = counts.entry(node_id.to_string()).or_insert(0);
    *count += 1;
    *count
  }
}

pub(crate) struct Interpreter {
  ai: Arc<dyn AiClient>,
  reporter: Reporter,
  control: RunControl,
  iterations: IterationCounter,
}

impl Interpreter {
  pub(crate) fn new(ai: Arc<dyn AiClient>, reporter: Reporter, control: RunControl) -> Self {
    Self {
      ai,
      reporter,
      control,
      iterations: IterationCounter::default(),
    }
  }

  pub(crate) fn reporter(&self) -> &Reporter {
    &self.reporter
  }

  /// Run a sequence of steps. Top-level sequences check pause, cancel and
  /// timeout before every step.
  pub(crate) fn run_steps<'a>(
    &'a self,
    steps: &'a [Step],
    ctx: &'a mut ExecutionContext,
    top_level: bool,
  ) -> BoxFuture<'a, Result<(), EngineError>> {
    async move {
      for step in steps {
        if top_level {
          self.checkpoint(ctx).await?;
        }
        match step {
          Step::Node(node) => self.run_node(node, ctx).await?,
          Step::Block(block) => match block.kind {
            BlockKind::Loop => self.run_loop(block, ctx).await?,
            BlockKind::Condition => self.run_condition(block, ctx).await?,
            BlockKind::Parallel => self.run_parallel(block, ctx).await?,
          },
        }
      }
      Ok(())
    }
    .boxed()
  }

  /// Boundary check: cancellation, timeout, then pause.
  async fn checkpoint(&self, ctx: &ExecutionContext) -> Result<(), EngineError> {
    self.check_limits(ctx)?;
    if self.control.is_paused() {
      self.reporter.paused().await?;
      if !self.control.wait_while_paused().await {
        return Err(EngineError::Cancelled);
      }
      self.reporter.resumed().await?;
      self.check_limits(ctx)?;
    }
    Ok(())
  }

  fn check_limits(&self, ctx: &ExecutionContext) -> Result<(), EngineError> {
    if self.control.is_cancelled() {
      return Err(EngineError::Cancelled);
    }
    if ctx.is_timed_out() {
      return Err(EngineError::Timeout {
        elapsed_secs: ctx.elapsed_seconds(),
      });
    }
    Ok(())
  }

  async fn run_node(&self, node: &NodeDef, ctx: &mut ExecutionContext) -> Result<(), EngineError> {
    let iteration = self.iterations.next(&node.id);
    let result_id = self.reporter.node_started(node, iteration).await?;
    ctx.mark_running(&node.id);

    let mut streamed = String::new();
    let result = executors::execute(node, ctx, self.ai.as_ref(), &mut |chunk: &str| {
      streamed.push_str(chunk);
      self.reporter.node_streaming(node, iteration, &streamed);
    })
    .await;

    match result {
      Ok(outcome) => {
        self
          .reporter
          .node_completed(&result_id, node, iteration, &outcome)
          .await?;
        ctx.apply(&node.id, outcome);
        Ok(())
      }
      Err(e) => {
        let message = e.to_string();
        ctx.mark_failed(&node.id, &message);
        self
          .reporter
          .node_failed(&result_id, node, iteration, &message)
          .await?;
        Err(EngineError::node(&node.id, e))
      }
    }
  }

  /// Parse a block-start config. A malformed config fails the marker node
  /// like any other node, with a failed result row.
  async fn marker_config<T>(
    &self,
    node: &NodeDef,
    ctx: &mut ExecutionContext,
  ) -> Result<T, EngineError>
  where
    T: DeserializeOwned + Default,
  {
    let error = match parse_config(node) {
      Ok(config) => return Ok(config),
      Err(e) => e,
    };
    let message = error.to_string();
    let iteration = self.iterations.next(&node.id);
    let result_id = self.reporter.node_started(node, iteration).await?;
    ctx.mark_failed(&node.id, &message);
    self
      .reporter
      .node_failed(&result_id, node, iteration, &message)
      .await?;
    Err(EngineError::node(&node.id, error))
  }

  #[instrument(skip_all, fields(block_id = %block.block_id))]
  async fn run_loop(&self, block: &Block, ctx: &mut ExecutionContext) -> Result<(), EngineError> {
    let config: LoopStartConfig = self.marker_config(&block.start, ctx).await?;
    let key = ctx.scoped_key(&block.block_id);
    let ceiling = config.max_iterations.min(ctx.max_loop_count());
    ctx.reset_loop(&key);

    ctx.enter_scope(block.block_id.clone());
    let result = self.loop_iterations(block, &config, &key, ceiling, ctx).await;
    ctx.exit_scope();

    info!(iterations = ctx.loop_count(&key), "loop_finished");
    result
  }

  async fn loop_iterations(
    &self,
    block: &Block,
    config: &LoopStartConfig,
    key: &str,
    ceiling: u32,
    ctx: &mut ExecutionContext,
  ) -> Result<(), EngineError> {
    while ctx.loop_count(key) < ceiling {
      self.checkpoint(ctx).await?;

      if config.loop_type == LoopType::Condition {
        let subject = ctx.condition_subject(config.condition_variable.as_deref());
        if !predicate::evaluate(&config.condition, &subject, self.ai.as_ref()).await {
          debug!(iteration = ctx.loop_count(key), "loop_condition_false");
          break;
        }
      }

      let iteration = ctx.increment_loop(key);
      ctx.set_variable(LOOP_INDEX_VAR, iteration.to_string());
      self.run_steps(&block.body, ctx, false).await?;
    }
    Ok(())
  }

  #[instrument(skip_all, fields(block_id = %block.block_id))]
  async fn run_condition(
    &self,
    block: &Block,
    ctx: &mut ExecutionContext,
  ) -> Result<(), EngineError> {
    let config: ConditionIfConfig = self.marker_config(&block.start, ctx).await?;
    let subject = ctx.condition_subject(config.input_variable.as_deref());
    let taken = predicate::evaluate(&config.condition, &subject, self.ai.as_ref()).await;
    info!(taken, "condition_evaluated");

    let (branch, skipped) = if taken {
      (Some(block.body.as_slice()), block.else_body.as_deref())
    } else {
      (block.else_body.as_deref(), Some(block.body.as_slice()))
    };

    ctx.enter_scope(block.block_id.clone());
    if let Some(skipped) = skipped {
      mark_skipped(skipped, ctx);
    }
    let result = match branch {
      Some(steps) => self.run_steps(steps, ctx, false).await,
      None => Ok(()),
    };
    ctx.exit_scope();
    result
  }

  #[instrument(skip_all, fields(block_id = %block.block_id))]
  async fn run_parallel(
    &self,
    block: &Block,
    ctx: &mut ExecutionContext,
  ) -> Result<(), EngineError> {
    let config: ParallelStartConfig = self.marker_config(&block.start, ctx).await?;
    let semaphore = Semaphore::new(config.concurrency.max(1));
    let failed = AtomicBool::new(false);

    let instances = (1..=config.instances()).map(|index| {
      let mut fork = ctx.fork_instance(&block.block_id, index);
      let semaphore = &semaphore;
      let failed = &failed;
      async move {
        // The semaphore is never closed.
        let Ok(_permit) = semaphore.acquire().await else {
          return Some((fork, Err(EngineError::Cancelled)));
        };
        if failed.load(Ordering::SeqCst) {
          return None;
        }
        let result = match self.checkpoint(&fork).await {
          Ok(()) => self.run_steps(&block.body, &mut fork, false).await,
          Err(e) => Err(e),
        };
        if result.is_err() {
          failed.store(true, Ordering::SeqCst);
        }
        Some((fork, result))
      }
    });
    let results = join_all(instances).await;

    // Every instance that ran keeps its node states, failed or not. The first
    // failure in instance order is the one reported.
    let mut outputs = Vec::with_capacity(results.len());
    let mut first_error = None;
    for (fork, result) in results.into_iter().flatten() {
      match result {
        Ok(()) => outputs.push(fork.previous_output().to_string()),
        Err(e) => {
          first_error.get_or_insert(e);
        }
      }
      ctx.absorb(fork);
    }
    if let Some(e) = first_error {
      return Err(e);
    }

    let merged = match config.output_mode {
      OutputMode::Array => serde_json::Value::from(outputs).to_string(),
      OutputMode::Concat => outputs.join(&decode_separator(&config.separator)),
    };
    info!(instances = config.instances(), "parallel_merged");
    ctx.set_previous_output(merged);
    Ok(())
  }
}

/// Mark every node in an untaken branch as skipped.
fn mark_skipped(steps: &[Step], ctx: &mut ExecutionContext) {
  for step in steps {
    match step {
      Step::Node(node) => ctx.mark_skipped(&node.id),
      Step::Block(block) => {
        ctx.enter_scope(block.block_id.clone());
        mark_skipped(&block.body, ctx);
        if let Some(else_body) = &block.else_body {
          mark_skipped(else_body, ctx);
        }
        ctx.exit_scope();
      }
    }
  }
}
