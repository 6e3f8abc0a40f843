//! Appliance client
//!
//! [`Client`] is the session handle every reconciler shares. It wraps a
//! [`Transport`], deserializes results into caller types, observes the
//! caller's cancellation token, and awaits job ids returned by mutating
//! calls.
//!
//! A single `Arc<Client>` is safe to use from concurrent reconciles: each
//! call is self-contained and nothing is shared between calls except the
//! transport's request id counter and the metrics registry.

pub mod errors;
pub mod jobs;
#[cfg(test)]
pub mod mock;
pub mod poll;
pub mod rpc;
pub mod transport;

pub use errors::{
    is_auth_error, is_not_found_error, is_validation_error, ApiError, ConnectionError, ErrorKind,
    API_NAMESPACE,
};
pub use jobs::{Job, JobProgress, JobState};
pub use poll::{PollStep, Poller};
pub use rpc::{RawRpcError, RemoteCall};
pub use transport::{HttpTransport, Transport};

use crate::config::{ProviderConfig, DEFAULT_JOB_TIMEOUT, DEFAULT_POLL_INTERVAL};
use crate::error::{Error, Result};
use crate::metrics::ClientMetrics;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

// =============================================================================
// Operation Context
// =============================================================================

/// Per-operation settings supplied by the caller
#[derive(Debug, Clone)]
pub struct OpContext {
    /// Cancelled when the caller gives up
    pub cancel: CancellationToken,
    /// How long to wait for an asynchronous job
    pub job_timeout: Duration,
    /// Interval between job polls
    pub poll_interval: Duration,
}

impl OpContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn from_config(config: &ProviderConfig, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            job_timeout: config.job_timeout(),
            poll_interval: config.poll_interval(),
        }
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Poller bounded by this context's job timeout
    pub fn poller(&self) -> Poller {
        Poller::new(self.poll_interval, self.job_timeout)
    }
}

impl Default for OpContext {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

// =============================================================================
// Client
// =============================================================================

pub struct Client {
    transport: Arc<dyn Transport>,
    metrics: ClientMetrics,
}

impl Client {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            metrics: ClientMetrics::new(),
        }
    }

    /// Build an HTTP session from provider configuration
    pub fn connect(config: &ProviderConfig) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::new(Arc::new(transport)))
    }

    pub fn host(&self) -> &str {
        self.transport.host()
    }

    pub fn metrics(&self) -> &ClientMetrics {
        &self.metrics
    }

    /// Issue a call and return the raw result value
    pub async fn call_value(
        &self,
        ctx: &OpContext,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Value> {
        let call = RemoteCall::new(method, params);

        let outcome = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(Error::Cancelled {
                operation: method.to_string(),
            }),
            result = self.transport.call(call) => result,
        };

        let label = match &outcome {
            Ok(_) => "ok",
            Err(Error::Cancelled { .. }) => "cancelled",
            Err(_) => "error",
        };
        self.metrics.record_call(method, label);
        outcome
    }

    /// Issue a call and deserialize its result into `T`
    pub async fn call<T: DeserializeOwned>(
        &self,
        ctx: &OpContext,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T> {
        let value = self.call_value(ctx, method, params).await?;
        serde_json::from_value(value).map_err(|e| {
            Error::Protocol(format!("unexpected result shape for {}: {}", method, e))
        })
    }

    /// Issue a mutating call; if it answers with a job id, await the job.
    ///
    /// Returns the job's result, or the call's own result when it was
    /// synchronous.
    pub async fn call_and_wait(
        &self,
        ctx: &OpContext,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Value> {
        let value = self.call_value(ctx, method, params).await?;
        match value.as_i64() {
            Some(job_id) => {
                debug!("{} started job {}", method, job_id);
                self.wait_for_job(ctx, job_id, ctx.job_timeout).await
            }
            None => Ok(value),
        }
    }

    /// Check the session answers
    pub async fn ping(&self, ctx: &OpContext) -> Result<()> {
        let reply: String = self.call(ctx, "core.ping", vec![]).await?;
        if reply != "pong" {
            return Err(Error::Protocol(format!("unexpected ping reply: {}", reply)));
        }
        Ok(())
    }
}
