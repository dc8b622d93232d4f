//! Benchmark runner - orchestrates the benchmark execution
//!
//! Lifecycle: Idle -> Setup -> Running -> Draining -> Stopped. Setup
//! failures are fatal and happen before any invocation; per-invocation
//! failures only ever show up as classified outcomes in the report.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::client::InvocationClient;
use crate::config::BenchConfig;
use crate::error::{BenchError, Result};
use crate::metrics::{MetricsCollector, StatsSnapshot};
use crate::pool::{RequestSource, StopSignal, WorkerPool};

/// Lifecycle of a single benchmark run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Setup,
    Running,
    Draining,
    Stopped,
}

/// Final report handed to the caller once the run stops
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub stats: StatsSnapshot,
    /// True when the drain deadline fired and in-flight invocations were
    /// abandoned as timeouts
    pub incomplete_drain: bool,
}

/// Housekeeping cadence for the run loop
const TICK: Duration = Duration::from_millis(100);

/// How often a progress line is logged
const PROGRESS_EVERY: Duration = Duration::from_secs(1);

/// Benchmark runner that owns the client, the pool and the collector
pub struct BenchmarkRunner<C> {
    config: BenchConfig,
    client: Arc<C>,
    metrics: Arc<MetricsCollector>,
    stop: StopSignal,
    state: RunnerState,
}

impl<C: InvocationClient> BenchmarkRunner<C> {
    /// Validate the configuration and take ownership of the client.
    ///
    /// A configuration error here is fatal: the runner never reaches
    /// Running and no invocation is attempted.
    pub fn new(config: BenchConfig, client: C) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            client: Arc::new(client),
            metrics: Arc::new(MetricsCollector::new()),
            stop: StopSignal::new(),
            state: RunnerState::Setup,
        })
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// Handle for stopping the run from outside (e.g. Ctrl-C)
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Live view of the aggregated statistics
    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    /// Drive the run to completion and produce the final report.
    ///
    /// The client and its pooled connections are released when the runner
    /// is dropped.
    pub async fn run(&mut self) -> Result<RunReport> {
        if self.state != RunnerState::Setup {
            return Err(BenchError::Bench("runner has already run".to_string()));
        }
        self.state = RunnerState::Running;
        info!(
            function = %self.config.function_name,
            region = %self.config.region,
            mode = self.config.mode.as_str(),
            concurrency = self.config.concurrency,
            "benchmark starting"
        );

        let source = Arc::new(RequestSource::new(&self.config));
        let pool = WorkerPool::new(
            Arc::clone(&self.client),
            self.config.concurrency,
            self.config.timeout(),
            self.config.think_time_ms,
        );
        let mut outcomes = pool.run(Arc::clone(&source), self.stop.clone());

        let drain_timeout = self.config.drain_timeout();
        let mut drain_deadline: Option<Instant> = None;
        let mut aborted = false;
        let mut last_progress = Instant::now();

        loop {
            tokio::select! {
                maybe = outcomes.recv() => match maybe {
                    Some(outcome) => {
                        self.metrics.record_outcome(&outcome);
                        if last_progress.elapsed() >= PROGRESS_EVERY {
                            let snapshot = self.metrics.snapshot();
                            info!(
                                total = snapshot.total_invocations,
                                failed = snapshot.failed_invocations,
                                throughput = snapshot.throughput,
                                "progress"
                            );
                            last_progress = Instant::now();
                        }
                    }
                    // every worker has exited
                    None => break,
                },
                _ = tokio::time::sleep(TICK), if drain_deadline.is_none() => {
                    if self.stop.stop_requested() || source.is_exhausted() {
                        debug!("draining in-flight invocations");
                        self.state = RunnerState::Draining;
                        self.stop.request_stop();
                        drain_deadline = Some(Instant::now() + drain_timeout);
                    }
                }
                _ = sleep_until_opt(drain_deadline), if drain_deadline.is_some() && !aborted => {
                    warn!("drain deadline exceeded, abandoning in-flight invocations");
                    self.stop.abort();
                    aborted = true;
                }
            }
        }

        self.state = RunnerState::Stopped;
        let stats = self.metrics.snapshot();
        info!(
            total = stats.total_invocations,
            success = stats.successful_invocations,
            failed = stats.failed_invocations,
            elapsed_secs = stats.elapsed.as_secs_f64(),
            "benchmark finished"
        );

        Ok(RunReport {
            stats,
            incomplete_drain: aborted,
        })
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}
