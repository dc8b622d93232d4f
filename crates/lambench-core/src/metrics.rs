//! Thread-safe aggregation of invocation outcomes

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};

use crate::client::{ErrorKind, InvocationOutcome};

/// Thread-safe outcome collector
pub struct MetricsCollector {
    // Atomic counters for high-frequency updates
    total_invocations: AtomicU64,
    successful_invocations: AtomicU64,
    failed_invocations: AtomicU64,

    // Per-failure-kind counts
    connection_failures: AtomicU64,
    timeouts: AtomicU64,
    remote_errors: AtomicU64,
    invalid_responses: AtomicU64,

    // Latency histograms (lock required for HDR updates); failures are
    // tracked apart so they never skew the success distribution
    success_latency: RwLock<Histogram<u64>>,
    failure_latency: RwLock<Histogram<u64>>,

    start_time: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            total_invocations: AtomicU64::new(0),
            successful_invocations: AtomicU64::new(0),
            failed_invocations: AtomicU64::new(0),

            connection_failures: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            remote_errors: AtomicU64::new(0),
            invalid_responses: AtomicU64::new(0),

            // 1 microsecond to 60 seconds, 3 significant figures
            success_latency: RwLock::new(Histogram::new_with_bounds(1, 60_000_000, 3).unwrap()),
            failure_latency: RwLock::new(Histogram::new_with_bounds(1, 60_000_000, 3).unwrap()),

            start_time: Instant::now(),
        }
    }

    /// Record a completed invocation
    pub fn record_outcome(&self, outcome: &InvocationOutcome) {
        self.total_invocations.fetch_add(1, Ordering::Relaxed);

        let micros = (outcome.latency.as_micros() as u64).max(1);
        if outcome.success {
            self.successful_invocations.fetch_add(1, Ordering::Relaxed);
            if let Ok(mut hist) = self.success_latency.write() {
                let _ = hist.record(micros);
            }
        } else {
            self.failed_invocations.fetch_add(1, Ordering::Relaxed);
            match outcome.error {
                Some(ErrorKind::ConnectionFailure) => {
                    self.connection_failures.fetch_add(1, Ordering::Relaxed);
                }
                Some(ErrorKind::Timeout) => {
                    self.timeouts.fetch_add(1, Ordering::Relaxed);
                }
                Some(ErrorKind::RemoteExecutionError) => {
                    self.remote_errors.fetch_add(1, Ordering::Relaxed);
                }
                Some(ErrorKind::InvalidResponse) => {
                    self.invalid_responses.fetch_add(1, Ordering::Relaxed);
                }
                None => {}
            }
            if let Ok(mut hist) = self.failure_latency.write() {
                let _ = hist.record(micros);
            }
        }
    }

    /// Success latency percentiles
    pub fn latency_percentiles(&self) -> LatencyPercentiles {
        Self::percentiles_of(&self.success_latency)
    }

    fn percentiles_of(hist: &RwLock<Histogram<u64>>) -> LatencyPercentiles {
        if let Ok(hist) = hist.read() {
            LatencyPercentiles {
                p50_us: hist.value_at_percentile(50.0),
                p90_us: hist.value_at_percentile(90.0),
                p99_us: hist.value_at_percentile(99.0),
                max_us: hist.max(),
            }
        } else {
            LatencyPercentiles::default()
        }
    }

    /// Time since the collector was created
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Take a consistent point-in-time snapshot of all metrics
    pub fn snapshot(&self) -> StatsSnapshot {
        let elapsed = self.elapsed();
        let total = self.total_invocations.load(Ordering::Relaxed);

        StatsSnapshot {
            total_invocations: total,
            successful_invocations: self.successful_invocations.load(Ordering::Relaxed),
            failed_invocations: self.failed_invocations.load(Ordering::Relaxed),

            connection_failures: self.connection_failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            remote_errors: self.remote_errors.load(Ordering::Relaxed),
            invalid_responses: self.invalid_responses.load(Ordering::Relaxed),

            latencies: Self::percentiles_of(&self.success_latency),
            failure_latencies: Self::percentiles_of(&self.failure_latency),

            throughput: if elapsed.as_secs_f64() > 0.0 {
                total as f64 / elapsed.as_secs_f64()
            } else {
                0.0
            },
            elapsed,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency percentiles in microseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    pub p50_us: u64,
    pub p90_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

impl LatencyPercentiles {
    pub fn p50_ms(&self) -> f64 {
        self.p50_us as f64 / 1000.0
    }

    pub fn p90_ms(&self) -> f64 {
        self.p90_us as f64 / 1000.0
    }

    pub fn p99_ms(&self) -> f64 {
        self.p99_us as f64 / 1000.0
    }

    pub fn max_ms(&self) -> f64 {
        self.max_us as f64 / 1000.0
    }
}

/// Snapshot of all metrics for reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_invocations: u64,
    pub successful_invocations: u64,
    pub failed_invocations: u64,

    pub connection_failures: u64,
    pub timeouts: u64,
    pub remote_errors: u64,
    pub invalid_responses: u64,

    /// Success latency distribution
    pub latencies: LatencyPercentiles,
    /// Failure latency distribution, kept apart for diagnosing timeouts
    pub failure_latencies: LatencyPercentiles,

    /// Invocations per second over the whole run
    pub throughput: f64,

    #[serde(with = "serde_duration")]
    pub elapsed: Duration,
}

impl StatsSnapshot {
    pub fn success_rate(&self) -> f64 {
        if self.total_invocations == 0 {
            0.0
        } else {
            (self.successful_invocations as f64 / self.total_invocations as f64) * 100.0
        }
    }
}

mod serde_duration {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
