//! Invocation client - one network call per request
//!
//! [`LambdaInvoker`] is the production implementation over the AWS SDK.
//! The [`InvocationClient`] trait is the seam the worker pool drives, so
//! tests can substitute an instrumented client.

use std::future::Future;
use std::time::Duration;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_lambda::error::SdkError;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use aws_sdk_lambda::Client as SdkClient;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{BenchConfig, InvocationMode};

/// Classified reason an invocation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The request never reached the service
    ConnectionFailure,
    /// No response within the configured deadline
    Timeout,
    /// The function ran and reported an error
    RemoteExecutionError,
    /// The service answered with something unusable
    InvalidResponse,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConnectionFailure => "connection_failure",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RemoteExecutionError => "remote_execution_error",
            ErrorKind::InvalidResponse => "invalid_response",
        }
    }
}

/// One invocation of the remote function. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    /// Sequence number within the run
    pub id: u64,
    pub function_name: String,
    pub payload: Vec<u8>,
    pub mode: InvocationMode,
}

/// What a completed call returned
#[derive(Debug, Clone, Default)]
pub struct InvocationResponse {
    /// Response payload (synchronous invocations only)
    pub payload: Option<Vec<u8>>,
}

/// Recorded result of one invocation
#[derive(Debug, Clone)]
pub struct InvocationOutcome {
    pub id: u64,
    pub success: bool,
    pub latency: Duration,
    pub response: Option<Vec<u8>>,
    pub error: Option<ErrorKind>,
}

impl InvocationOutcome {
    pub fn succeeded(id: u64, latency: Duration, response: Option<Vec<u8>>) -> Self {
        Self {
            id,
            success: true,
            latency,
            response,
            error: None,
        }
    }

    pub fn failed(id: u64, latency: Duration, kind: ErrorKind) -> Self {
        Self {
            id,
            success: false,
            latency,
            response: None,
            error: Some(kind),
        }
    }
}

/// A client able to invoke the remote function once.
///
/// Implementations perform the network call and classify every failure;
/// nothing may escape uncaught. They must not keep mutable state shared
/// with the workers.
pub trait InvocationClient: Send + Sync + 'static {
    fn invoke(
        &self,
        req: &InvocationRequest,
    ) -> impl Future<Output = std::result::Result<InvocationResponse, ErrorKind>> + Send;
}

/// Production client backed by the AWS SDK.
///
/// The SDK client owns the connection pool and is shared read-only across
/// workers; dropping the invoker releases it.
#[derive(Debug, Clone)]
pub struct LambdaInvoker {
    client: SdkClient,
}

impl LambdaInvoker {
    /// Build a client for the configured region.
    ///
    /// Credentials come from the SDK default provider chain (environment,
    /// shared config, instance metadata).
    pub async fn connect(config: &BenchConfig) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;
        Self {
            client: SdkClient::new(&shared),
        }
    }

    /// Wrap a pre-built SDK client (custom endpoints, tests)
    pub fn with_client(client: SdkClient) -> Self {
        Self { client }
    }
}

impl InvocationClient for LambdaInvoker {
    fn invoke(
        &self,
        req: &InvocationRequest,
    ) -> impl Future<Output = std::result::Result<InvocationResponse, ErrorKind>> + Send {
        async move {
            let output = self
                .client
                .invoke()
                .function_name(&req.function_name)
                .invocation_type(invocation_type(req.mode))
                .payload(Blob::new(req.payload.clone()))
                .send()
                .await
                .map_err(classify_sdk_error)?;

            if let Some(reason) = output.function_error() {
                debug!(id = req.id, reason, "function reported an execution error");
                return Err(ErrorKind::RemoteExecutionError);
            }

            match req.mode {
                InvocationMode::Sync => {
                    let payload = output.payload().ok_or(ErrorKind::InvalidResponse)?;
                    Ok(InvocationResponse {
                        payload: Some(payload.as_ref().to_vec()),
                    })
                }
                // fire-and-forget: acceptance for execution is success
                InvocationMode::Async => Ok(InvocationResponse::default()),
            }
        }
    }
}

fn invocation_type(mode: InvocationMode) -> InvocationType {
    match mode {
        InvocationMode::Sync => InvocationType::RequestResponse,
        InvocationMode::Async => InvocationType::Event,
    }
}

/// Map an SDK failure onto the outcome taxonomy
fn classify_sdk_error<E>(err: SdkError<E>) -> ErrorKind {
    match err {
        SdkError::TimeoutError(_) => ErrorKind::Timeout,
        SdkError::DispatchFailure(failure) => {
            let timed_out = failure
                .as_connector_error()
                .map(|c| c.is_timeout())
                .unwrap_or(false);
            if timed_out {
                ErrorKind::Timeout
            } else {
                ErrorKind::ConnectionFailure
            }
        }
        SdkError::ResponseError(_) => ErrorKind::InvalidResponse,
        SdkError::ServiceError(_) => ErrorKind::RemoteExecutionError,
        _ => ErrorKind::ConnectionFailure,
    }
}
