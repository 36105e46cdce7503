//! Cooperative polling primitive.
//!
//! [`PollLoop`] calls a status-check operation on an interval until it
//! reports a terminal result. Three bounds apply:
//!
//! - an overall deadline measured from loop start, so total wall time is
//!   bounded no matter how slow individual checks are
//! - a ceiling on consecutive failed checks, with a longer backoff after
//!   each failure
//! - a cancellation token checked before every check, before every wait
//!   and before any callback fires
//!
//! The loop reports progress values exactly as received. It does not
//! clamp, reorder or coalesce them.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use reel_core::{classify, ErrorKind, FailureContext, RenderPolicy};

/// Answer from one status check.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus<T> {
    /// Not finished yet
    Progress(f64),
    /// Terminal success
    Done(T),
    /// The checked operation reported failure
    Failed(String),
}

/// Terminal failures of a poll loop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PollError {
    #[error("deadline of {deadline:?} exceeded while still pending")]
    Timeout { deadline: Duration },

    #[error("{failures} consecutive status checks failed")]
    Exhausted { failures: u32 },

    #[error("{0}")]
    Failed(String),
}

/// How a poll loop ended when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    Done(T),
    /// Cancelled by the caller; nothing else was reported
    Cancelled,
}

/// Mutable state of one loop invocation.
#[derive(Debug)]
struct PollState {
    started_at: Instant,
    consecutive_failures: u32,
}

/// Polling bounds.
#[derive(Debug, Clone)]
pub struct PollLoop {
    interval: Duration,
    deadline: Duration,
    max_consecutive_failures: u32,
    failure_backoff: Duration,
}

impl PollLoop {
    pub fn new(interval: Duration, deadline: Duration, max_consecutive_failures: u32) -> Self {
        Self {
            interval,
            deadline,
            max_consecutive_failures: max_consecutive_failures.max(1),
            failure_backoff: interval.saturating_mul(2),
        }
    }

    pub fn from_policy(policy: &RenderPolicy) -> Self {
        Self::new(
            policy.poll_interval(),
            policy.deadline(),
            policy.max_consecutive_failures,
        )
        .with_failure_backoff(policy.failure_backoff())
    }

    /// Override the wait after a failed check. Never shorter than twice the interval.
    pub fn with_failure_backoff(mut self, backoff: Duration) -> Self {
        self.failure_backoff = backoff.max(self.interval.saturating_mul(2));
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn failure_backoff(&self) -> Duration {
        self.failure_backoff
    }

    /// Run the loop until a terminal result, a bound, or cancellation.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        cancel: &CancellationToken,
        mut check: F,
        mut on_progress: P,
    ) -> Result<PollOutcome<T>, PollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<PollStatus<T>, E>>,
        E: Display,
        P: FnMut(f64),
    {
        let mut state = PollState {
            started_at: Instant::now(),
            consecutive_failures: 0,
        };

        loop {
            if cancel.is_cancelled() {
                debug!("Poll loop cancelled before check");
                return Ok(PollOutcome::Cancelled);
            }

            let elapsed = state.started_at.elapsed();
            if elapsed > self.deadline {
                return Err(PollError::Timeout {
                    deadline: self.deadline,
                });
            }

            let remaining = self.deadline - elapsed;
            let result = match tokio::time::timeout(remaining, check()).await {
                Ok(result) => result,
                Err(_) => {
                    if cancel.is_cancelled() {
                        return Ok(PollOutcome::Cancelled);
                    }
                    warn!("Status check still pending at deadline");
                    return Err(PollError::Timeout {
                        deadline: self.deadline,
                    });
                }
            };

            // A late answer to a cancelled loop is dropped unseen.
            if cancel.is_cancelled() {
                debug!("Discarding status check result after cancellation");
                return Ok(PollOutcome::Cancelled);
            }

            let wait = match result {
                Ok(status) => {
                    state.consecutive_failures = 0;
                    match status {
                        PollStatus::Done(value) => return Ok(PollOutcome::Done(value)),
                        PollStatus::Failed(message) => return Err(PollError::Failed(message)),
                        PollStatus::Progress(p) => {
                            on_progress(p);
                            self.interval
                        }
                    }
                }
                Err(e) => {
                    state.consecutive_failures += 1;
                    let kind = classify(
                        &e.to_string(),
                        &FailureContext::transport(
                            state.consecutive_failures,
                            self.max_consecutive_failures,
                        ),
                    );
                    warn!(
                        "Status check failed ({}/{}, {}): {}",
                        state.consecutive_failures, self.max_consecutive_failures, kind, e
                    );
                    if kind == ErrorKind::NetworkFatal {
                        return Err(PollError::Exhausted {
                            failures: state.consecutive_failures,
                        });
                    }
                    self.failure_backoff
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Poll loop cancelled while waiting");
                    return Ok(PollOutcome::Cancelled);
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn scripted(
        script: Vec<Result<PollStatus<&'static str>, String>>,
    ) -> impl FnMut() -> std::future::Ready<Result<PollStatus<&'static str>, String>> {
        let mut script: VecDeque<_> = script.into();
        move || {
            let next = script
                .pop_front()
                .unwrap_or_else(|| Ok(PollStatus::Progress(1.0)));
            std::future::ready(next)
        }
    }

    fn default_loop() -> PollLoop {
        PollLoop::from_policy(&RenderPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_progress_then_done() {
        let cancel = CancellationToken::new();
        let mut seen = Vec::new();

        let outcome = default_loop()
            .run(
                &cancel,
                scripted(vec![
                    Ok(PollStatus::Progress(0.2)),
                    Ok(PollStatus::Progress(0.6)),
                    Ok(PollStatus::Done("video")),
                ]),
                |p| seen.push(p),
            )
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Done("video"));
        assert_eq!(seen, vec![0.2, 0.6]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_monotonic_progress_passed_through() {
        let cancel = CancellationToken::new();
        let mut seen = Vec::new();

        default_loop()
            .run(
                &cancel,
                scripted(vec![
                    Ok(PollStatus::Progress(0.5)),
                    Ok(PollStatus::Progress(0.3)),
                    Ok(PollStatus::Done("video")),
                ]),
                |p| seen.push(p),
            )
            .await
            .unwrap();

        assert_eq!(seen, vec![0.5, 0.3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_counter_resets_on_success() {
        let cancel = CancellationToken::new();
        let mut script = Vec::new();
        for _ in 0..4 {
            script.push(Err("Failed to fetch".to_string()));
        }
        script.push(Ok(PollStatus::Progress(0.1)));
        for _ in 0..4 {
            script.push(Err("Failed to fetch".to_string()));
        }
        script.push(Ok(PollStatus::Done("video")));

        let outcome = default_loop()
            .run(&cancel, scripted(script), |_| {})
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Done("video"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_back_off_longer_than_interval() {
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let result = PollLoop::new(Duration::from_secs(1), Duration::from_secs(600), 3)
            .run(
                &cancel,
                scripted(vec![
                    Err("boom".to_string()),
                    Err("boom".to_string()),
                    Err("boom".to_string()),
                ]),
                |_| {},
            )
            .await;

        assert_eq!(result, Err(PollError::Exhausted { failures: 3 }));
        // Two backoffs of at least 2x the interval between three failures.
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reported_failure_is_terminal() {
        let cancel = CancellationToken::new();
        let result = default_loop()
            .run(
                &cancel,
                scripted(vec![Ok(PollStatus::Failed("codec not supported".to_string()))]),
                |_| {},
            )
            .await;

        assert_eq!(result, Err(PollError::Failed("codec not supported".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_check_bounded_by_deadline() {
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let result: Result<PollOutcome<()>, PollError> =
            PollLoop::new(Duration::from_secs(1), Duration::from_secs(10), 5)
                .run(
                    &cancel,
                    || async {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Ok::<_, String>(PollStatus::Progress(0.5))
                    },
                    |_| {},
                )
                .await;

        assert!(matches!(result, Err(PollError::Timeout { .. })));
        assert!(start.elapsed() < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut calls = 0;

        let outcome = default_loop()
            .run(
                &cancel,
                || {
                    calls += 1;
                    std::future::ready(Ok::<_, String>(PollStatus::Done("video")))
                },
                |_| {},
            )
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Cancelled);
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_backoff_never_below_twice_interval() {
        let poll = PollLoop::new(Duration::from_secs(2), Duration::from_secs(60), 5)
            .with_failure_backoff(Duration::from_secs(1));
        assert_eq!(poll.failure_backoff(), Duration::from_secs(4));
    }

    #[test]
    fn test_huge_interval_saturates_backoff() {
        let poll = PollLoop::new(Duration::MAX, Duration::from_secs(60), 5);
        assert_eq!(poll.failure_backoff(), Duration::MAX);

        let policy = RenderPolicy {
            poll_interval_ms: u64::MAX,
            failure_backoff_factor: u32::MAX,
            ..RenderPolicy::default()
        };
        assert_eq!(PollLoop::from_policy(&policy).failure_backoff(), Duration::MAX);
    }
}
