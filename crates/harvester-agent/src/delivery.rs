//! Bounded retry-with-backoff around a single send attempt.
//!
//! The loop never returns an error: after the schedule is exhausted the
//! payload is dropped and the next report cycle resends current values.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Ordered waits between attempts. `n` entries allow `n + 1` attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule(Vec<Duration>);

impl BackoffSchedule {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self(delays)
    }

    pub fn from_secs(secs: &[u64]) -> Self {
        Self(secs.iter().copied().map(Duration::from_secs).collect())
    }

    pub fn delays(&self) -> &[Duration] {
        &self.0
    }

    pub fn max_attempts(&self) -> usize {
        self.0.len() + 1
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::from_secs(&[1, 3, 5])
    }
}

/// Distinguishes failures worth retrying (transport) from those that are
/// not (the server answered and refused).
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Runs `attempt` until it succeeds, fails permanently or the schedule runs
/// out. Returns whether the payload was delivered.
pub async fn deliver<F, Fut, E>(what: &str, schedule: &BackoffSchedule, mut attempt: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Retryable + Display,
{
    let mut delays = schedule.delays().iter();
    let mut tries = 0usize;
    loop {
        tries += 1;
        let err = match attempt().await {
            Ok(()) => {
                if tries > 1 {
                    tracing::info!(what, attempts = tries, "Delivered after retry");
                }
                return true;
            }
            Err(e) => e,
        };

        if !err.is_retryable() {
            tracing::warn!(what, error = %err, "Delivery rejected, not retrying");
            return false;
        }
        match delays.next() {
            Some(delay) => {
                tracing::warn!(
                    what,
                    attempt = tries,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %err,
                    "Delivery failed, retrying"
                );
                tokio::time::sleep(*delay).await;
            }
            None => {
                tracing::error!(what, attempts = tries, error = %err, "Delivery failed, giving up");
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[derive(Debug)]
    enum FakeError {
        Down,
        Refused,
    }

    impl Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                FakeError::Down => f.write_str("connection refused"),
                FakeError::Refused => f.write_str("server answered 400"),
            }
        }
    }

    impl Retryable for FakeError {
        fn is_retryable(&self) -> bool {
            matches!(self, FakeError::Down)
        }
    }

    /// An attempt that fails with `error` for the first `failures` calls.
    fn flaky(
        failures: usize,
        error: fn() -> FakeError,
    ) -> (Arc<AtomicUsize>, impl FnMut() -> std::future::Ready<Result<(), FakeError>>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let attempt = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(if n < failures { Err(error()) } else { Ok(()) })
        };
        (calls, attempt)
    }

    #[tokio::test(start_paused = true)]
    async fn success_needs_one_attempt() {
        let (calls, attempt) = flaky(0, || FakeError::Down);
        let start = Instant::now();
        assert!(deliver("batch", &BackoffSchedule::default(), attempt).await);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_follow_the_schedule() {
        let (calls, attempt) = flaky(2, || FakeError::Down);
        let start = Instant::now();
        assert!(deliver("batch", &BackoffSchedule::default(), attempt).await);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(1 + 3));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_schedule_gives_up_silently() {
        let (calls, attempt) = flaky(usize::MAX, || FakeError::Down);
        let start = Instant::now();
        assert!(!deliver("batch", &BackoffSchedule::default(), attempt).await);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(1 + 3 + 5));
    }

    #[tokio::test(start_paused = true)]
    async fn refusal_is_not_retried() {
        let (calls, attempt) = flaky(usize::MAX, || FakeError::Refused);
        assert!(!deliver("batch", &BackoffSchedule::default(), attempt).await);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn schedule_counts_attempts() {
        assert_eq!(BackoffSchedule::default().max_attempts(), 4);
        assert_eq!(BackoffSchedule::new(Vec::new()).max_attempts(), 1);
    }
}
