//! End-to-end tests of the pool and runner against instrumented clients

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use lambench_core::{
    BenchConfig, BenchError, BenchmarkRunner, ErrorKind, InvocationClient, InvocationRequest,
    InvocationResponse, LoadSpec, RequestSource, RunnerState, StopSignal, WorkerPool,
};

/// What the mock does with each call
#[derive(Clone)]
enum Behavior {
    /// Complete successfully after the given delay
    Delay(Duration),
    /// Fail every n-th call (1-based) with the given kind, succeed otherwise
    FailEvery(u64, ErrorKind),
    /// Never complete
    Hang,
    /// Wait until the gate opens, then succeed
    Gate(watch::Receiver<bool>),
}

/// Instrumented client counting concurrent entries
#[derive(Clone)]
struct MockClient {
    inner: Arc<MockState>,
}

struct MockState {
    behavior: Behavior,
    calls: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockClient {
    fn new(behavior: Behavior) -> Self {
        Self {
            inner: Arc::new(MockState {
                behavior,
                calls: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    fn calls(&self) -> u64 {
        self.inner.calls.load(Ordering::SeqCst)
    }

    fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    fn peak_in_flight(&self) -> usize {
        self.inner.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl MockState {
    fn enter(&self) -> u64 {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        call
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InvocationClient for MockClient {
    fn invoke(
        &self,
        _req: &InvocationRequest,
    ) -> impl Future<Output = Result<InvocationResponse, ErrorKind>> + Send {
        let state = Arc::clone(&self.inner);
        async move {
            let call = state.enter();
            let result = match &state.behavior {
                Behavior::Delay(latency) => {
                    tokio::time::sleep(*latency).await;
                    Ok(InvocationResponse {
                        payload: Some(b"\"ok\"".to_vec()),
                    })
                }
                Behavior::FailEvery(n, kind) => {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    if call % n == 0 {
                        Err(*kind)
                    } else {
                        Ok(InvocationResponse {
                            payload: Some(b"{}".to_vec()),
                        })
                    }
                }
                Behavior::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                Behavior::Gate(gate) => {
                    let mut gate = gate.clone();
                    while !*gate.borrow() {
                        if gate.changed().await.is_err() {
                            break;
                        }
                    }
                    Ok(InvocationResponse { payload: None })
                }
            };
            state.exit();
            result
        }
    }
}

fn config(load: LoadSpec, concurrency: usize) -> BenchConfig {
    let mut config = BenchConfig::new("echo", "us-east-1", load);
    config.payload = b"{\"x\":1}".to_vec();
    config.concurrency = concurrency;
    config.timeout_ms = 5_000;
    config.drain_timeout_ms = 2_000;
    config
}

/// A single worker produces exactly N outcomes, one call in flight at a time
#[tokio::test]
async fn test_single_worker_runs_serially() {
    let client = MockClient::new(Behavior::Delay(Duration::from_millis(5)));
    let mut runner = BenchmarkRunner::new(config(LoadSpec::Count(7), 1), client.clone()).unwrap();

    let report = runner.run().await.unwrap();

    assert_eq!(report.stats.total_invocations, 7);
    assert_eq!(report.stats.successful_invocations, 7);
    assert_eq!(report.stats.failed_invocations, 0);
    assert_eq!(client.peak_in_flight(), 1);
    assert_eq!(runner.state(), RunnerState::Stopped);
    assert!(!report.incomplete_drain);
}

/// With K workers and N >= K requests the peak in-flight count is exactly K
#[tokio::test]
async fn test_peak_in_flight_matches_concurrency() {
    let (gate_tx, gate_rx) = watch::channel(false);
    let client = MockClient::new(Behavior::Gate(gate_rx));
    let mut runner = BenchmarkRunner::new(config(LoadSpec::Count(12), 4), client.clone()).unwrap();

    let opener = {
        let client = client.clone();
        tokio::spawn(async move {
            // wait until all four workers are inside the client
            for _ in 0..400 {
                if client.in_flight() == 4 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            assert_eq!(client.in_flight(), 4);
            gate_tx.send(true).unwrap();
        })
    };

    let report = runner.run().await.unwrap();
    opener.await.unwrap();

    assert_eq!(report.stats.total_invocations, 12);
    assert_eq!(report.stats.successful_invocations, 12);
    assert_eq!(client.peak_in_flight(), 4);
}

/// Every third call failing with ConnectionFailure shows up as exactly that
#[tokio::test]
async fn test_every_third_call_fails_with_connection_failure() {
    let client = MockClient::new(Behavior::FailEvery(3, ErrorKind::ConnectionFailure));
    let mut runner = BenchmarkRunner::new(config(LoadSpec::Count(9), 1), client.clone()).unwrap();

    let report = runner.run().await.unwrap();

    assert_eq!(report.stats.total_invocations, 9);
    assert_eq!(report.stats.successful_invocations, 6);
    assert_eq!(report.stats.failed_invocations, 3);
    assert_eq!(report.stats.connection_failures, 3);
    assert_eq!(report.stats.timeouts, 0);
}

/// A call exceeding the per-invocation timeout is recorded as a timeout,
/// and the worker loop keeps going
#[tokio::test]
async fn test_slow_calls_classified_as_timeouts() {
    let client = MockClient::new(Behavior::Delay(Duration::from_millis(200)));
    let mut cfg = config(LoadSpec::Count(2), 1);
    cfg.timeout_ms = 20;
    let mut runner = BenchmarkRunner::new(cfg, client.clone()).unwrap();

    let report = runner.run().await.unwrap();

    assert_eq!(report.stats.total_invocations, 2);
    assert_eq!(report.stats.failed_invocations, 2);
    assert_eq!(report.stats.timeouts, 2);
    assert!(!report.incomplete_drain);
}

/// When the drain deadline fires, hanging in-flight invocations are
/// force-completed as timeouts and the report says the drain was cut short
#[tokio::test]
async fn test_drain_deadline_abandons_in_flight_invocations() {
    let client = MockClient::new(Behavior::Hang);
    let mut cfg = config(LoadSpec::Count(4), 4);
    cfg.timeout_ms = 60_000;
    cfg.drain_timeout_ms = 300;
    let mut runner = BenchmarkRunner::new(cfg, client.clone()).unwrap();

    let report = runner.run().await.unwrap();

    assert_eq!(report.stats.total_invocations, 4);
    assert_eq!(report.stats.failed_invocations, 4);
    assert_eq!(report.stats.timeouts, 4);
    assert!(report.incomplete_drain);
    assert_eq!(runner.state(), RunnerState::Stopped);
}

/// An external stop request ends a duration-bounded run early and cleanly
#[tokio::test]
async fn test_stop_signal_ends_duration_run_early() {
    let client = MockClient::new(Behavior::Delay(Duration::from_millis(5)));
    let cfg = config(LoadSpec::Duration(Duration::from_secs(30)), 2);
    let mut runner = BenchmarkRunner::new(cfg, client.clone()).unwrap();

    let stop = runner.stop_signal();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        stop.request_stop();
    });

    let report = runner.run().await.unwrap();

    assert!(report.stats.total_invocations > 0);
    assert_eq!(report.stats.failed_invocations, 0);
    assert!(!report.incomplete_drain);
}

/// A configuration error is fatal before any invocation is attempted
#[tokio::test]
async fn test_empty_function_name_fatal_before_any_invocation() {
    let client = MockClient::new(Behavior::Delay(Duration::from_millis(1)));
    let mut cfg = config(LoadSpec::Count(5), 1);
    cfg.function_name = String::new();

    let err = BenchmarkRunner::new(cfg, client.clone()).unwrap_err();

    assert!(matches!(err, BenchError::Config(_)));
    assert_eq!(client.calls(), 0);
}

/// Five successful ~10ms invocations give the expected aggregate
#[tokio::test]
async fn test_five_successful_invocations_at_ten_millis() {
    let client = MockClient::new(Behavior::Delay(Duration::from_millis(10)));
    let mut runner = BenchmarkRunner::new(config(LoadSpec::Count(5), 1), client.clone()).unwrap();

    let report = runner.run().await.unwrap();

    assert_eq!(report.stats.total_invocations, 5);
    assert_eq!(report.stats.successful_invocations, 5);
    assert_eq!(report.stats.failed_invocations, 0);
    let p50 = report.stats.latencies.p50_ms();
    assert!((10.0..30.0).contains(&p50), "p50 was {}ms", p50);
}

/// Driving the pool directly: the channel drains every outcome exactly once
/// and closes when the source is dry
#[tokio::test]
async fn test_pool_channel_closes_after_source_drains() {
    let client = MockClient::new(Behavior::Delay(Duration::from_millis(2)));
    let cfg = config(LoadSpec::Count(6), 3);
    let source = Arc::new(RequestSource::new(&cfg));
    let pool = WorkerPool::new(Arc::new(client.clone()), 3, Duration::from_secs(5), (0, 0));

    let mut outcomes = pool.run(source, StopSignal::new());
    let mut collected = Vec::new();
    while let Some(outcome) = outcomes.recv().await {
        collected.push(outcome);
    }

    assert_eq!(collected.len(), 6);
    let mut ids: Vec<u64> = collected.iter().map(|o| o.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);
    assert!(collected.iter().all(|o| o.success));
}

/// Sync-mode responses carry the payload bytes back
#[tokio::test]
async fn test_sync_outcome_carries_response_bytes() {
    let client = MockClient::new(Behavior::Delay(Duration::from_millis(1)));
    let cfg = config(LoadSpec::Count(1), 1);
    let source = Arc::new(RequestSource::new(&cfg));
    let pool = WorkerPool::new(Arc::new(client), 1, Duration::from_secs(5), (0, 0));

    let mut outcomes = pool.run(source, StopSignal::new());
    let outcome = outcomes.recv().await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.response.as_deref(), Some(b"\"ok\"".as_slice()));
}
