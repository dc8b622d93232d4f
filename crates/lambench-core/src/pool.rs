//! Closed-loop worker pool
//!
//! A fixed number of workers pull requests from a shared [`RequestSource`]
//! and call the invocation client; a worker claims the next request only
//! after its previous call completed, so at steady state exactly
//! `concurrency` invocations are in flight. Outcomes are delivered on a
//! channel in completion order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::trace;

use crate::client::{ErrorKind, InvocationClient, InvocationOutcome, InvocationRequest};
use crate::config::{BenchConfig, InvocationMode, LoadSpec};

/// Shutdown escalation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StopLevel {
    /// Keep pulling work
    Run,
    /// Finish in-flight calls, pull nothing new
    Drain,
    /// Abandon in-flight calls
    Abort,
}

/// Cloneable handle used to wind a running pool down
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<StopLevel>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(StopLevel::Run);
        Self { tx: Arc::new(tx) }
    }

    /// Request a graceful stop: in-flight invocations are left to finish
    pub fn request_stop(&self) {
        self.escalate(StopLevel::Drain);
    }

    /// Abandon in-flight invocations; they are recorded as timeouts
    pub fn abort(&self) {
        self.escalate(StopLevel::Abort);
    }

    // The level only ever moves forward
    fn escalate(&self, to: StopLevel) {
        self.tx.send_if_modified(|level| {
            if *level < to {
                *level = to;
                true
            } else {
                false
            }
        });
    }

    pub fn level(&self) -> StopLevel {
        *self.tx.borrow()
    }

    pub fn stop_requested(&self) -> bool {
        self.level() >= StopLevel::Drain
    }

    /// Resolves once the signal reaches [`StopLevel::Abort`]
    pub async fn aborted(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            if *rx.borrow() == StopLevel::Abort {
                return;
            }
            // the sender lives in this handle, so changed() cannot fail
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared, lazily materialised sequence of invocation requests.
///
/// Workers claim sequence numbers off a single atomic counter, which is
/// what keeps the load model closed-loop: a request exists only once a
/// worker is free to carry it.
pub struct RequestSource {
    function_name: Arc<str>,
    payload: Arc<[u8]>,
    mode: InvocationMode,
    limit: LoadSpec,
    issued: AtomicU64,
    started: Instant,
}

impl RequestSource {
    pub fn new(config: &BenchConfig) -> Self {
        Self {
            function_name: config.function_name.as_str().into(),
            payload: config.payload.as_slice().into(),
            mode: config.mode,
            limit: config.load,
            issued: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Claim the next request, or None once the source is dry
    pub fn next(&self) -> Option<InvocationRequest> {
        match self.limit {
            LoadSpec::Count(n) => {
                let seq = self.issued.fetch_add(1, Ordering::Relaxed);
                (seq < n).then(|| self.request(seq))
            }
            LoadSpec::Duration(window) => {
                if self.started.elapsed() >= window {
                    return None;
                }
                let seq = self.issued.fetch_add(1, Ordering::Relaxed);
                Some(self.request(seq))
            }
        }
    }

    /// Whether no further requests will be produced
    pub fn is_exhausted(&self) -> bool {
        match self.limit {
            LoadSpec::Count(n) => self.issued.load(Ordering::Relaxed) >= n,
            LoadSpec::Duration(window) => self.started.elapsed() >= window,
        }
    }

    fn request(&self, seq: u64) -> InvocationRequest {
        InvocationRequest {
            id: seq,
            function_name: self.function_name.to_string(),
            payload: self.payload.to_vec(),
            mode: self.mode,
        }
    }
}

/// Fixed-size pool of concurrent invokers
pub struct WorkerPool<C> {
    client: Arc<C>,
    concurrency: usize,
    call_timeout: Duration,
    think_time_ms: (u64, u64),
}

impl<C: InvocationClient> WorkerPool<C> {
    pub fn new(
        client: Arc<C>,
        concurrency: usize,
        call_timeout: Duration,
        think_time_ms: (u64, u64),
    ) -> Self {
        Self {
            client,
            concurrency,
            call_timeout,
            think_time_ms,
        }
    }

    /// Spawn the workers and hand back the outcome channel.
    ///
    /// The channel yields outcomes in completion order, not submission
    /// order, and closes once every worker has exited.
    pub fn run(
        &self,
        source: Arc<RequestSource>,
        stop: StopSignal,
    ) -> mpsc::Receiver<InvocationOutcome> {
        let (tx, rx) = mpsc::channel(self.concurrency.max(1) * 4);

        for worker_id in 0..self.concurrency {
            let client = Arc::clone(&self.client);
            let source = Arc::clone(&source);
            let stop = stop.clone();
            let tx = tx.clone();
            let call_timeout = self.call_timeout;
            let think_time_ms = self.think_time_ms;

            tokio::spawn(async move {
                run_worker(worker_id, client, source, stop, tx, call_timeout, think_time_ms).await;
            });
        }

        rx
    }
}

async fn run_worker<C: InvocationClient>(
    worker_id: usize,
    client: Arc<C>,
    source: Arc<RequestSource>,
    stop: StopSignal,
    tx: mpsc::Sender<InvocationOutcome>,
    call_timeout: Duration,
    think_time_ms: (u64, u64),
) {
    trace!(worker_id, "worker started");

    loop {
        if stop.stop_requested() {
            break;
        }
        let Some(req) = source.next() else { break };

        let started = Instant::now();
        let result = tokio::select! {
            res = timeout(call_timeout, client.invoke(&req)) => match res {
                Ok(inner) => inner,
                Err(_) => Err(ErrorKind::Timeout),
            },
            _ = stop.aborted() => Err(ErrorKind::Timeout),
        };
        let latency = started.elapsed();

        let outcome = match result {
            Ok(response) => InvocationOutcome::succeeded(req.id, latency, response.payload),
            Err(kind) => InvocationOutcome::failed(req.id, latency, kind),
        };

        // receiver gone means the run is over
        if tx.send(outcome).await.is_err() {
            break;
        }

        if let Some(pause) = think_time(think_time_ms) {
            tokio::time::sleep(pause).await;
        }
    }

    trace!(worker_id, "worker finished");
}

/// Random pause between invocations, if configured
fn think_time((min, max): (u64, u64)) -> Option<Duration> {
    if min == 0 && max == 0 {
        None
    } else {
        let millis = rand::thread_rng().gen_range(min..=max);
        Some(Duration::from_millis(millis))
    }
}
