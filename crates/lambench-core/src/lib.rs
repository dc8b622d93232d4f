//! Core harness for benchmarking concurrent AWS Lambda invocations
//!
//! The crate wires four pieces together: a validated [`BenchConfig`], an
//! [`InvocationClient`] performing single calls, a closed-loop
//! [`WorkerPool`] keeping a fixed number of invocations in flight, and a
//! [`MetricsCollector`] aggregating outcomes. [`BenchmarkRunner`] drives
//! the whole lifecycle and produces the final [`RunReport`].

pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod runner;

pub use client::{
    ErrorKind, InvocationClient, InvocationOutcome, InvocationRequest, InvocationResponse,
    LambdaInvoker,
};
pub use config::{
    BenchConfig, InvocationMode, LoadSpec, DEFAULT_DRAIN_TIMEOUT_MS, DEFAULT_TIMEOUT_MS,
};
pub use error::{BenchError, Result};
pub use metrics::{LatencyPercentiles, MetricsCollector, StatsSnapshot};
pub use pool::{RequestSource, StopLevel, StopSignal, WorkerPool};
pub use runner::{BenchmarkRunner, RunReport, RunnerState};
