//! ParallelExecutor - runs a batch of sub-actions under per-category limits
//!
//! Policy:
//! - `read_files`: concurrent, at most `max_reads` in flight
//! - `run_command`: concurrent, at most `max_commands` in flight
//! - `write_file`: strictly sequential, in batch order, after every read and
//!   command of the batch has been dispatched
//! - anything else: sequential, in batch order, after the writes
//!
//! Results land in index-addressed slots so output order always matches
//! input order.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::builtin::WorkTreeRunner;
use super::{ActionResult, ActionRunner, ParallelResult, ToolContext, ToolError, ToolProfile};
use crate::config::ExecutorConfig;
use crate::protocol::{Action, SubAction};

/// Batch executor
pub struct ParallelExecutor {
    runner: Arc<dyn ActionRunner>,
    config: ExecutorConfig,
}

impl ParallelExecutor {
    /// Create executor backed by the real working tree
    pub fn new(config: ExecutorConfig) -> Self {
        Self::with_runner(config, Arc::new(WorkTreeRunner))
    }

    /// Create executor with a custom runner
    pub fn with_runner(config: ExecutorConfig, runner: Arc<dyn ActionRunner>) -> Self {
        debug!(max_reads = config.max_reads, max_commands = config.max_commands, "ParallelExecutor::with_runner: called");
        Self { runner, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute a batch and aggregate its results
    pub async fn execute(&self, batch: Vec<SubAction>, ctx: &ToolContext) -> ParallelResult {
        debug!(count = batch.len(), profile = ?ctx.profile, "ParallelExecutor::execute: called");
        let reads = Arc::new(Semaphore::new(self.config.max_reads.max(1)));
        let commands = Arc::new(Semaphore::new(self.config.max_commands.max(1)));

        let mut slots: Vec<Option<ActionResult>> = vec![None; batch.len()];
        let mut spawned: Vec<(usize, JoinHandle<ActionResult>)> = Vec::new();
        let mut writes = Vec::new();
        let mut others = Vec::new();

        for (idx, action) in batch.iter().enumerate() {
            if ctx.profile == ToolProfile::ReadOnly && action.kind.mutates_worktree() {
                debug!(idx, kind = %action.kind, "ParallelExecutor::execute: refused by read-only profile");
                slots[idx] = Some(ActionResult::failure(
                    action.clone(),
                    ToolError::NotPermitted { action: action.kind },
                ));
                continue;
            }
            match action.kind {
                Action::ReadFiles => {
                    spawned.push((idx, self.spawn_gated(action.clone(), reads.clone(), ctx.clone())));
                }
                Action::RunCommand => {
                    spawned.push((idx, self.spawn_gated(action.clone(), commands.clone(), ctx.clone())));
                }
                Action::WriteFile => writes.push(idx),
                _ => others.push(idx),
            }
        }
        debug!(
            concurrent = spawned.len(),
            writes = writes.len(),
            others = others.len(),
            "ParallelExecutor::execute: dispatched concurrent sub-actions"
        );

        for idx in writes.into_iter().chain(others) {
            slots[idx] = Some(run_sequential(self.runner.as_ref(), batch[idx].clone(), ctx).await);
        }

        for (idx, handle) in spawned {
            let result = match handle.await {
                Ok(r) => r,
                Err(e) => ActionResult::failure(batch[idx].clone(), ToolError::Join(e.to_string())),
            };
            slots[idx] = Some(result);
        }

        let results: Vec<ActionResult> = slots
            .into_iter()
            .zip(batch)
            .map(|(slot, action)| {
                slot.unwrap_or_else(|| ActionResult::failure(action, ToolError::Join("result slot left empty".into())))
            })
            .collect();

        let result = ParallelResult::from_results(results);
        info!(
            total = result.len(),
            failed = result.failed_count(),
            "Batch complete"
        );
        result
    }

    /// Spawn a sub-action that must be admitted through `gate` first
    fn spawn_gated(&self, action: SubAction, gate: Arc<Semaphore>, ctx: ToolContext) -> JoinHandle<ActionResult> {
        let runner = self.runner.clone();
        tokio::spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    debug!(kind = %action.kind, "spawn_gated: cancelled while queued");
                    return ActionResult::failure(action, ToolError::CancelledBeforeStart);
                }
                permit = gate.acquire_owned() => permit,
            };
            let _permit = match permit {
                Ok(p) => p,
                Err(e) => return ActionResult::failure(action, ToolError::Join(e.to_string())),
            };
            attempt(runner.as_ref(), action, &ctx).await
        })
    }
}

/// Run one sub-action in line, unless the batch is already cancelled
async fn run_sequential(runner: &dyn ActionRunner, action: SubAction, ctx: &ToolContext) -> ActionResult {
    if ctx.cancel.is_cancelled() {
        debug!(kind = %action.kind, "run_sequential: cancelled before start");
        return ActionResult::failure(action, ToolError::CancelledBeforeStart);
    }
    attempt(runner, action, ctx).await
}

/// Run an admitted sub-action, racing the cancellation signal
///
/// Losing the race drops the runner future, which for commands kills the
/// child's process group. A write that has started always runs to completion
/// so its result reports what actually landed on disk.
async fn attempt(runner: &dyn ActionRunner, action: SubAction, ctx: &ToolContext) -> ActionResult {
    debug!(kind = %action.kind, "attempt: called");
    let outcome = if action.kind == Action::WriteFile {
        runner.run(&action, ctx).await
    } else {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(ToolError::Cancelled),
            res = runner.run(&action, ctx) => res,
        }
    };
    match outcome {
        Ok(output) => ActionResult::success(action, output),
        Err(e) => ActionResult::failure(action, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};
    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Gauge {
        fn enter(&self) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.current.fetch_sub(1, Ordering::SeqCst);
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    /// Sleeps for a fixed delay per sub-action and records concurrency
    struct SlowRunner {
        delay: Duration,
        reads: Gauge,
        commands: Gauge,
        writes: Gauge,
        started: Mutex<Vec<String>>,
    }

    impl SlowRunner {
        fn new(delay_ms: u64) -> Self {
            Self {
                delay: Duration::from_millis(delay_ms),
                reads: Gauge::default(),
                commands: Gauge::default(),
                writes: Gauge::default(),
                started: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ActionRunner for SlowRunner {
        async fn run(&self, action: &SubAction, _ctx: &ToolContext) -> Result<String, ToolError> {
            self.started.lock().unwrap().push(action.describe());
            let gauge = match action.kind {
                Action::ReadFiles => &self.reads,
                Action::RunCommand => &self.commands,
                Action::WriteFile => &self.writes,
                other => return Err(ToolError::Unsupported { action: other }),
            };
            gauge.enter();
            // Per-path delay override lets tests invert completion order
            let delay = action
                .params
                .paths
                .first()
                .and_then(|p| p.strip_prefix("sleep:"))
                .and_then(|ms| ms.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(self.delay);
            tokio::time::sleep(delay).await;
            gauge.exit();
            Ok(action.describe())
        }
    }

    fn config(max_reads: usize, max_commands: usize) -> ExecutorConfig {
        ExecutorConfig { max_reads, max_commands }
    }

    fn ctx() -> ToolContext {
        ToolContext::new(std::env::temp_dir(), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_results_preserve_input_order() {
        let runner = Arc::new(SlowRunner::new(0));
        let executor = ParallelExecutor::with_runner(config(10, 3), runner);
        let batch = vec![
            SubAction::read(&["sleep:120"]),
            SubAction::read(&["sleep:10"]),
            SubAction::write("out.txt", "x"),
            SubAction::read(&["sleep:60"]),
            SubAction::command("make"),
        ];

        let result = executor.execute(batch.clone(), &ctx()).await;

        assert_eq!(result.len(), batch.len());
        let kinds: Vec<SubAction> = result.results().iter().map(|r| r.action.clone()).collect();
        assert_eq!(kinds, batch);
        assert!(result.all_succeeded());
    }

    #[tokio::test]
    async fn test_read_concurrency_bounded() {
        let runner = Arc::new(SlowRunner::new(40));
        let executor = ParallelExecutor::with_runner(config(3, 1), runner.clone());
        let batch: Vec<SubAction> = (0..10).map(|_| SubAction::read(&["f"])).collect();

        let result = executor.execute(batch, &ctx()).await;

        assert!(result.all_succeeded());
        assert!(runner.reads.peak() <= 3, "peak reads {}", runner.reads.peak());
        assert!(runner.reads.peak() >= 2);
    }

    #[tokio::test]
    async fn test_command_concurrency_bounded() {
        let runner = Arc::new(SlowRunner::new(40));
        let executor = ParallelExecutor::with_runner(config(10, 2), runner.clone());
        let batch: Vec<SubAction> = (0..6).map(|i| SubAction::command(&format!("job {i}"))).collect();

        executor.execute(batch, &ctx()).await;

        assert!(runner.commands.peak() <= 2, "peak commands {}", runner.commands.peak());
    }

    #[tokio::test]
    async fn test_writes_never_overlap() {
        let runner = Arc::new(SlowRunner::new(50));
        let executor = ParallelExecutor::with_runner(config(10, 10), runner.clone());
        let batch = vec![
            SubAction::write("a", "1"),
            SubAction::write("b", "2"),
            SubAction::write("c", "3"),
        ];

        let start = Instant::now();
        let result = executor.execute(batch, &ctx()).await;

        assert!(result.all_succeeded());
        assert!(start.elapsed() >= Duration::from_millis(150));
        assert_eq!(runner.writes.peak(), 1);
        let started = runner.started.lock().unwrap().clone();
        assert_eq!(started, vec!["write_file a", "write_file b", "write_file c"]);
    }

    #[tokio::test]
    async fn test_others_fail_naming_type() {
        let runner = Arc::new(SlowRunner::new(0));
        let executor = ParallelExecutor::with_runner(config(10, 3), runner);
        let batch = vec![SubAction::new(Action::AskUser, Default::default())];

        let result = executor.execute(batch, &ctx()).await;

        assert_eq!(result.failed_count(), 1);
        assert!(result.results()[0].error.contains("ask_user"));
    }

    #[tokio::test]
    async fn test_cancel_while_queued_resolves_without_hang() {
        let runner = Arc::new(SlowRunner::new(300));
        let executor = ParallelExecutor::with_runner(config(1, 1), runner);
        let ctx = ctx();
        let batch = vec![SubAction::read(&["a"]), SubAction::read(&["b"]), SubAction::read(&["c"])];

        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(2), executor.execute(batch, &ctx))
            .await
            .expect("executor hung after cancellation");

        assert_eq!(result.failed_count(), 3);
        assert!(!result.all_succeeded());
        let attempted = result.results().iter().filter(|r| r.attempted).count();
        let queued = result.results().iter().filter(|r| !r.attempted).count();
        assert_eq!(attempted, 1);
        assert_eq!(queued, 2);
        assert!(
            result
                .results()
                .iter()
                .filter(|r| !r.attempted)
                .all(|r| r.error.contains("Cancelled before start"))
        );
    }

    #[tokio::test]
    async fn test_read_only_profile_refuses_mutations() {
        let runner = Arc::new(SlowRunner::new(0));
        let executor = ParallelExecutor::with_runner(config(10, 3), runner.clone());
        let ctx = ctx().with_profile(ToolProfile::ReadOnly);
        let batch = vec![
            SubAction::read(&["a"]),
            SubAction::write("b", "x"),
            SubAction::command("rm -rf target"),
        ];

        let result = executor.execute(batch, &ctx).await;

        assert!(result.results()[0].success);
        assert!(!result.results()[1].success && !result.results()[1].attempted);
        assert!(!result.results()[2].success && !result.results()[2].attempted);
        assert_eq!(runner.writes.peak(), 0);
        assert_eq!(runner.commands.peak(), 0);
    }

    #[tokio::test]
    async fn test_read_ok_and_missing_scenario() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a.txt"), "alpha").unwrap();
        let executor = ParallelExecutor::new(ExecutorConfig::default());
        let ctx = ToolContext::new(temp.path().to_path_buf(), CancellationToken::new());

        let result = executor
            .execute(vec![SubAction::read(&["a.txt"]), SubAction::read(&["missing.txt"])], &ctx)
            .await;

        assert_eq!(result.failed_count(), 1);
        assert!(!result.all_succeeded());
        assert!(result.results()[0].success);
        assert!(result.results()[1].error.contains("missing.txt"));
    }

    #[tokio::test]
    async fn test_four_sleeping_commands_two_at_a_time() {
        let temp = tempdir().unwrap();
        let executor = ParallelExecutor::new(config(10, 2));
        let ctx = ToolContext::new(temp.path().to_path_buf(), CancellationToken::new());
        let batch: Vec<SubAction> = (0..4).map(|_| SubAction::command("sleep 0.1")).collect();

        let start = Instant::now();
        let result = executor.execute(batch, &ctx).await;

        assert!(result.all_succeeded());
        assert!(start.elapsed() >= Duration::from_millis(200), "elapsed {:?}", start.elapsed());
    }

    #[tokio::test]
    async fn test_cancel_kills_running_command() {
        let temp = tempdir().unwrap();
        let executor = ParallelExecutor::new(config(10, 2));
        let ctx = ToolContext::new(temp.path().to_path_buf(), CancellationToken::new());
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });

        let start = Instant::now();
        let result = executor
            .execute(vec![SubAction::command("sleep 5; touch finished")], &ctx)
            .await;

        assert!(start.elapsed() < Duration::from_secs(3));
        assert_eq!(result.failed_count(), 1);
        assert!(result.results()[0].attempted);
        assert!(result.results()[0].error.contains("Cancelled while running"));
    }

    #[tokio::test]
    async fn test_started_write_finishes_despite_cancel() {
        let runner = Arc::new(SlowRunner::new(200));
        let executor = ParallelExecutor::with_runner(ExecutorConfig::default(), runner.clone());
        let ctx = ctx();
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let result = executor
            .execute(vec![SubAction::write("a.txt", "x"), SubAction::write("b.txt", "y")], &ctx)
            .await;

        let results = result.results();
        assert!(results[0].success, "started write reported {:?}", results[0].error);
        assert!(!results[1].success);
        assert!(!results[1].attempted);
        assert_eq!(runner.started.lock().unwrap().len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_kills_forked_grandchildren() {
        let temp = tempdir().unwrap();
        let executor = ParallelExecutor::new(config(10, 2));
        let ctx = ToolContext::new(temp.path().to_path_buf(), CancellationToken::new());
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });

        let result = executor
            .execute(vec![SubAction::command("sh -c 'sleep 0.6; touch leaked'; echo after")], &ctx)
            .await;
        assert!(result.results()[0].error.contains("Cancelled while running"));

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(!temp.path().join("leaked").exists(), "grandchild outlived the cancelled batch");
    }

    #[tokio::test]
    async fn test_sequential_write_after_cancel_not_started() {
        let temp = tempdir().unwrap();
        let executor = ParallelExecutor::new(ExecutorConfig::default());
        let ctx = ToolContext::new(temp.path().to_path_buf(), CancellationToken::new());
        ctx.cancel.cancel();

        let result = executor.execute(vec![SubAction::write("a.txt", "x")], &ctx).await;

        assert!(!result.results()[0].attempted);
        assert!(!temp.path().join("a.txt").exists());
    }
}
