//! Cancellable bounded polling
//!
//! The one retry loop in the crate. A probe is run every `interval` until
//! it reports a terminal step, the deadline passes, or the cancellation
//! token fires. Probe errors are transient and retried on the next tick;
//! only cancellation, the deadline and [`PollStep::Fail`] stop the loop.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Stand-in deadline for timeouts too large to add to the current instant
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Outcome of a single probe
#[derive(Debug)]
pub enum PollStep<T> {
    /// Terminal success
    Ready(T),
    /// Not there yet, poll again
    Pending,
    /// Terminal failure, stop polling
    Fail(Error),
}

#[derive(Debug, Clone, Copy)]
pub struct Poller {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Poller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Drive `probe` until it settles.
    ///
    /// The in-flight probe is raced against cancellation and the deadline,
    /// so returning never leaves a poll running behind the caller.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        operation: &str,
        mut probe: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<PollStep<T>>>,
    {
        let now = Instant::now();
        let deadline = now
            .checked_add(self.timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);
        let timed_out = || Error::Timeout {
            operation: operation.to_string(),
            timeout: self.timeout,
        };
        let cancelled = || Error::Cancelled {
            operation: operation.to_string(),
        };

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                _ = sleep_until(deadline) => return Err(timed_out()),
                step = probe() => step,
            };

            match step {
                Ok(PollStep::Ready(value)) => return Ok(value),
                Ok(PollStep::Fail(err)) => return Err(err),
                Ok(PollStep::Pending) => {}
                Err(err @ Error::Cancelled { .. }) => return Err(err),
                Err(err) => {
                    debug!(
                        "Poll {} for {} failed, retrying: {}",
                        attempt, operation, err
                    );
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                _ = sleep_until(deadline) => return Err(timed_out()),
                _ = sleep(self.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn poller() -> Poller {
        Poller::new(Duration::from_secs(2), Duration::from_secs(10))
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_pending() {
        let count = AtomicU32::new(0);
        let counter = &count;
        let value = poller()
            .run(&CancellationToken::new(), "thing", move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(if n < 3 { PollStep::Pending } else { PollStep::Ready(n) })
            })
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_are_retried() {
        let count = AtomicU32::new(0);
        let counter = &count;
        let value = poller()
            .run(&CancellationToken::new(), "thing", move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(Error::Protocol("blip".into()))
                } else {
                    Ok(PollStep::Ready("done"))
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "done");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_stops_immediately() {
        let count = AtomicU32::new(0);
        let counter = &count;
        let result: Result<()> = poller()
            .run(&CancellationToken::new(), "thing", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(PollStep::Fail(Error::Protocol("broken".into())))
            })
            .await;

        assert_matches!(result, Err(Error::Protocol(_)));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline() {
        let start = Instant::now();
        let result: Result<()> = poller()
            .run(&CancellationToken::new(), "thing", || async { Ok(PollStep::Pending) })
            .await;

        assert_matches!(result, Err(Error::Timeout { timeout, .. }) if timeout == Duration::from_secs(10));
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_probe() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let result: Result<()> = poller()
            .run(&token, "thing", || async {
                std::future::pending::<()>().await;
                Ok(PollStep::Pending)
            })
            .await;

        assert_matches!(result, Err(Error::Cancelled { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_probe_is_immediate() {
        let token = CancellationToken::new();
        let ready_poller = poller();
        let mut ready = tokio_test::task::spawn(
            ready_poller.run(&token, "thing", || async { Ok(PollStep::Ready(7)) }),
        );
        assert_matches!(tokio_test::assert_ready!(ready.poll()), Ok(7));

        let waiting_poller = poller();
        let mut waiting = tokio_test::task::spawn(
            waiting_poller.run(&token, "thing", || async { Ok(PollStep::<()>::Pending) }),
        );
        tokio_test::assert_pending!(waiting.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_timeout_does_not_overflow() {
        let value = Poller::new(Duration::from_secs(2), Duration::from_secs(u64::MAX))
            .run(&CancellationToken::new(), "thing", || async { Ok(PollStep::Ready(1)) })
            .await
            .unwrap();
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn test_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let result: Result<()> = poller()
            .run(&token, "thing", || async { Ok(PollStep::Pending) })
            .await;
        assert_matches!(result, Err(Error::Cancelled { .. }));
    }
}
