//! Benchmark configuration
//!
//! The host-facing parameter surface is a fixed struct with named fields,
//! validated once before any invocation is attempted.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

/// Default per-invocation timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default bound on the drain phase in milliseconds
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 10_000;

/// How the remote function is invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InvocationMode {
    /// Wait for the function to finish and return its payload
    #[default]
    Sync,
    /// Fire-and-forget: success is acceptance for execution
    Async,
}

impl InvocationMode {
    /// Parse a mode from its CLI name. The provider-side invocation type
    /// names are accepted as aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "sync" | "requestresponse" => Some(InvocationMode::Sync),
            "async" | "event" => Some(InvocationMode::Async),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationMode::Sync => "sync",
            InvocationMode::Async => "async",
        }
    }
}

/// How much load a run generates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSpec {
    /// Fixed number of invocations
    Count(u64),
    /// Invoke continuously for a wall-clock window
    Duration(Duration),
}

/// Configuration for a benchmark run
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Lambda function name or ARN
    pub function_name: String,
    /// Request payload, sent verbatim (must be valid JSON)
    pub payload: Vec<u8>,
    /// Synchronous or fire-and-forget invocation
    pub mode: InvocationMode,
    /// AWS region identifier (e.g. "eu-west-1")
    pub region: String,
    /// Number of concurrent workers
    pub concurrency: usize,
    /// Amount of load to generate
    pub load: LoadSpec,
    /// Per-invocation timeout in milliseconds
    pub timeout_ms: u64,
    /// Bound on waiting for in-flight invocations at shutdown
    pub drain_timeout_ms: u64,
    /// Min/max pause between invocations per worker, in milliseconds.
    /// (0, 0) disables think time.
    pub think_time_ms: (u64, u64),
}

impl BenchConfig {
    /// Configuration with defaults for everything beyond the required fields
    pub fn new(function_name: impl Into<String>, region: impl Into<String>, load: LoadSpec) -> Self {
        Self {
            function_name: function_name.into(),
            payload: b"{}".to_vec(),
            mode: InvocationMode::Sync,
            region: region.into(),
            concurrency: 1,
            load,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
            think_time_ms: (0, 0),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Check every field once, before any invocation is attempted.
    /// All violations are configuration errors, the only fatal class.
    pub fn validate(&self) -> Result<()> {
        if self.function_name.trim().is_empty() {
            return Err(BenchError::Config(
                "function name must not be empty".to_string(),
            ));
        }
        if !region_looks_valid(&self.region) {
            return Err(BenchError::Config(format!(
                "'{}' is not a valid AWS region identifier",
                self.region
            )));
        }
        if self.concurrency == 0 {
            return Err(BenchError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        match self.load {
            LoadSpec::Count(0) => {
                return Err(BenchError::Config(
                    "invocation count must be at least 1".to_string(),
                ));
            }
            LoadSpec::Duration(window) if window.is_zero() => {
                return Err(BenchError::Config(
                    "run duration must be positive".to_string(),
                ));
            }
            _ => {}
        }
        if self.timeout_ms == 0 {
            return Err(BenchError::Config(
                "invocation timeout must be positive".to_string(),
            ));
        }
        if self.think_time_ms.0 > self.think_time_ms.1 {
            return Err(BenchError::Config(
                "minimum think time exceeds maximum".to_string(),
            ));
        }
        if serde_json::from_slice::<serde_json::Value>(&self.payload).is_err() {
            return Err(BenchError::Config(
                "payload must be valid JSON".to_string(),
            ));
        }
        Ok(())
    }
}

/// Structural check only; the full region catalog is the SDK's concern
fn region_looks_valid(region: &str) -> bool {
    !region.is_empty()
        && region.contains('-')
        && !region.starts_with('-')
        && !region.ends_with('-')
        && region
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
