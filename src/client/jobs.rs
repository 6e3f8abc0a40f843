//! Job Waiter
//!
//! Long-running appliance calls return a numeric job id. The waiter polls
//! `core.get_jobs` until the job settles. A job observed in a terminal
//! state is never polled again.

use crate::client::poll::{PollStep, Poller};
use crate::client::{Client, OpContext};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

// =============================================================================
// Job Model
// =============================================================================

/// Job state as reported by the appliance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    Waiting,
    Running,
    Success,
    Failed,
    Aborted,
    #[serde(other)]
    Unknown,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success | JobState::Failed | JobState::Aborted)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Waiting => write!(f, "WAITING"),
            JobState::Running => write!(f, "RUNNING"),
            JobState::Success => write!(f, "SUCCESS"),
            JobState::Failed => write!(f, "FAILED"),
            JobState::Aborted => write!(f, "ABORTED"),
            JobState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobProgress {
    #[serde(default)]
    pub percent: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Remote asynchronous task
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub id: i64,
    #[serde(default)]
    pub method: Option<String>,
    pub state: JobState,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub progress: Option<JobProgress>,
    #[serde(default, deserialize_with = "job_time")]
    pub time_started: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "job_time")]
    pub time_finished: Option<DateTime<Utc>>,
}

impl Job {
    /// Remote-side run time, once finished
    pub fn runtime(&self) -> Option<chrono::Duration> {
        Some(self.time_finished? - self.time_started?)
    }

    fn failure_reason(&self) -> String {
        match &self.error {
            Some(error) if !error.is_empty() => error.clone(),
            _ => format!("job ended in state {}", self.state),
        }
    }
}

/// Timestamps arrive as `{"$date": <millis>}` or RFC 3339 text
fn job_time<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTime {
        Millis {
            #[serde(rename = "$date")]
            date: i64,
        },
        Text(DateTime<Utc>),
    }

    Ok(match Option::<RawTime>::deserialize(deserializer)? {
        Some(RawTime::Millis { date }) => DateTime::<Utc>::from_timestamp_millis(date),
        Some(RawTime::Text(t)) => Some(t),
        None => None,
    })
}

// =============================================================================
// Waiting
// =============================================================================

impl Client {
    /// Block until `job_id` settles, returning its result payload
    pub async fn wait_for_job(
        &self,
        ctx: &OpContext,
        job_id: i64,
        timeout: Duration,
    ) -> Result<Value> {
        let poller = Poller::new(ctx.poll_interval, timeout);
        let operation = format!("job {}", job_id);
        let started = Instant::now();

        debug!("Waiting for job {} (timeout {:?})", job_id, timeout);
        let outcome = poller
            .run(&ctx.cancel, &operation, move || self.poll_job(ctx, job_id))
            .await;

        let label = match &outcome {
            Ok(_) => "success",
            Err(Error::JobFailed { .. }) => "failed",
            Err(Error::Timeout { .. }) => "timeout",
            Err(Error::Cancelled { .. }) => "cancelled",
            Err(_) => "error",
        };
        self.metrics().record_job_wait(started.elapsed(), label);

        if let Err(err) = &outcome {
            warn!("Job {} did not succeed: {}", job_id, err);
        }
        outcome
    }

    async fn poll_job(&self, ctx: &OpContext, job_id: i64) -> Result<PollStep<Value>> {
        let jobs: Vec<Job> = self
            .call(ctx, "core.get_jobs", vec![json!([["id", "=", job_id]])])
            .await?;

        let job = jobs
            .into_iter()
            .find(|job| job.id == job_id)
            .ok_or_else(|| Error::Protocol(format!("job {} not listed", job_id)))?;

        Ok(match job.state {
            JobState::Success => {
                match job.runtime() {
                    Some(runtime) => info!(
                        "Job {} ({}) succeeded in {}ms",
                        job_id,
                        job.method.as_deref().unwrap_or("?"),
                        runtime.num_milliseconds()
                    ),
                    None => info!("Job {} succeeded", job_id),
                }
                PollStep::Ready(job.result.unwrap_or(Value::Null))
            }
            JobState::Failed | JobState::Aborted => PollStep::Fail(Error::JobFailed {
                job_id,
                reason: job.failure_reason(),
            }),
            state => {
                let progress = job.progress.unwrap_or_default();
                debug!(
                    "Job {} {}: {:.0}% {}",
                    job_id,
                    state,
                    progress.percent.unwrap_or(0.0),
                    progress.description.unwrap_or_default()
                );
                PollStep::Pending
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockTransport;
    use assert_matches::assert_matches;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn setup() -> (Arc<MockTransport>, Client, OpContext) {
        let mock = Arc::new(MockTransport::new());
        let client = Client::new(mock.clone());
        (mock, client, OpContext::default())
    }

    fn job(id: i64, state: &str) -> Value {
        json!([{"id": id, "method": "docker.update", "state": state, "progress": {"percent": 50, "description": "working"}}])
    }

    #[test]
    fn test_job_decoding() {
        let job: Job = serde_json::from_value(json!({
            "id": 12,
            "state": "SUCCESS",
            "result": {"ok": true},
            "time_started": {"$date": 1700000000000i64},
            "time_finished": {"$date": 1700000002500i64}
        }))
        .unwrap();
        assert_eq!(job.state, JobState::Success);
        assert_eq!(job.runtime().unwrap().num_milliseconds(), 2500);

        let odd: Job = serde_json::from_value(json!({"id": 1, "state": "PAUSED"})).unwrap();
        assert_eq!(odd.state, JobState::Unknown);
        assert!(!odd.state.is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_success_returns_result() {
        let (mock, client, ctx) = setup();
        mock.reply("core.get_jobs", job(5, "RUNNING"))
            .reply("core.get_jobs", json!([{"id": 5, "state": "SUCCESS", "result": "done"}]));

        let result = client
            .wait_for_job(&ctx, 5, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(result, json!("done"));
        assert_eq!(mock.calls_to("core.get_jobs").len(), 2);
        assert_eq!(mock.calls()[0].params, vec![json!([["id", "=", 5]])]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_failure_stops_polling() {
        let (mock, client, ctx) = setup();
        mock.reply("core.get_jobs", job(8, "RUNNING"))
            .reply("core.get_jobs", job(8, "WAITING"))
            .reply(
                "core.get_jobs",
                json!([{"id": 8, "state": "FAILED", "error": "[EFAULT] pool offline"}]),
            );

        let err = client
            .wait_for_job(&ctx, 8, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert_matches!(&err, Error::JobFailed { job_id: 8, reason } if reason == "[EFAULT] pool offline");

        let polls = mock.calls_to("core.get_jobs").len();
        assert_eq!(polls, 3);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(mock.calls_to("core.get_jobs").len(), polls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_without_message() {
        let (mock, client, ctx) = setup();
        mock.reply("core.get_jobs", json!([{"id": 3, "state": "ABORTED"}]));

        let err = client
            .wait_for_job(&ctx, 3, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert_matches!(err, Error::JobFailed { reason, .. } if reason.contains("ABORTED"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_errors_are_swallowed() {
        let (mock, client, ctx) = setup();
        mock.fail("core.get_jobs", -32603, "middleware busy")
            .reply("core.get_jobs", json!([]))
            .reply("core.get_jobs", json!([{"id": 2, "state": "SUCCESS"}]));

        let result = client
            .wait_for_job(&ctx, 2, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(result, Value::Null);
        assert_eq!(mock.calls_to("core.get_jobs").len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_timeout() {
        let (mock, client, ctx) = setup();
        mock.reply("core.get_jobs", job(4, "RUNNING"));

        let err = client
            .wait_for_job(&ctx, 4, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Timeout { .. });
        assert!(err.is_retryable());
        assert_eq!(client.metrics().call_count("core.get_jobs", "ok") as usize, mock.calls().len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_cancelled() {
        let (mock, client, _) = setup();
        mock.hang("core.get_jobs");

        let token = CancellationToken::new();
        let ctx = OpContext::new(token.clone());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        });

        let err = client
            .wait_for_job(&ctx, 6, Duration::from_secs(300))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Cancelled { .. });
    }
}
