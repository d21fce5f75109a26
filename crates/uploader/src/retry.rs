use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{ChunkError, UploadError};

/// Ordered delays between retry attempts.
///
/// The operation runs once, then once more per scheduled delay, so the
/// total attempt count is `len + 1`. Only retryable failures consume a
/// slot.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    delays: Vec<Duration>,
}

impl Default for RetrySchedule {
    /// The stock schedule: an immediate retry, then 3 s, 5 s, 10 s.
    fn default() -> Self {
        Self {
            delays: vec![
                Duration::ZERO,
                Duration::from_millis(3000),
                Duration::from_millis(5000),
                Duration::from_millis(10000),
            ],
        }
    }
}

impl RetrySchedule {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// A schedule with no retries: one attempt, failures are terminal.
    pub fn none() -> Self {
        Self { delays: Vec::new() }
    }

    /// Maximum number of attempts, including the initial one.
    pub fn attempts(&self) -> usize {
        self.delays.len() + 1
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

/// Runs `op`, retrying retryable failures per `schedule`.
///
/// Fatal failures propagate immediately without consuming a slot or
/// sleeping. Delays suspend cooperatively and race against `cancel`, so
/// a cancelled session never sits out a backoff. After the schedule is
/// exhausted, the last retryable failure is returned as terminal.
pub async fn with_retry<T>(
    schedule: &RetrySchedule,
    cancel: &CancellationToken,
    mut op: impl AsyncFnMut() -> Result<T, ChunkError>,
) -> Result<T, UploadError> {
    if cancel.is_cancelled() {
        return Err(UploadError::Cancelled);
    }

    let mut last_err = match op().await {
        Ok(value) => return Ok(value),
        Err(e) if !e.is_retryable() => return Err(e.into()),
        Err(e) => e,
    };

    for (attempt, delay) in schedule.delays().iter().enumerate() {
        warn!(
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            error = %last_err,
            "retryable failure, scheduling retry"
        );

        if !delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                _ = tokio::time::sleep(*delay) => {}
            }
        }
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        last_err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e.into()),
            Err(e) => e,
        };
    }

    Err(last_err.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn schedule() -> RetrySchedule {
        RetrySchedule::default()
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_success_needs_no_schedule() {
        let cancel = CancellationToken::new();
        let attempts = AtomicUsize::new(0);

        let result = with_retry(&schedule(), &cancel, async || {
            attempts.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ChunkError>(42)
        })
        .await
        .unwrap();

        assert_eq!(result, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn three_failures_then_success_takes_four_attempts() {
        let cancel = CancellationToken::new();
        let attempts = AtomicUsize::new(0);

        let result = with_retry(&schedule(), &cancel, async || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 3 {
                Err(ChunkError::Network("reset".into()))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_schedule_reports_last_error_after_five_attempts() {
        let cancel = CancellationToken::new();
        let attempts = AtomicUsize::new(0);

        let err = with_retry(&schedule(), &cancel, async || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ChunkError::Network(format!("attempt {n}")))
        })
        .await
        .unwrap_err();

        // Schedule of 4 delays = initial attempt + 4 retries.
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
        match err {
            UploadError::Chunk(ChunkError::Network(msg)) => assert_eq!(msg, "attempt 4"),
            other => panic!("expected the last network error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_propagates_after_one_attempt_with_no_delay() {
        let cancel = CancellationToken::new();
        let attempts = AtomicUsize::new(0);
        let started = tokio::time::Instant::now();

        let err = with_retry(&schedule(), &cancel, async || {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ChunkError::Rejected { status: 403 })
        })
        .await
        .unwrap_err();

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        // Under paused time, any sleep would have advanced the clock.
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(matches!(
            err,
            UploadError::Chunk(ChunkError::Rejected { status: 403 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_mid_schedule_stops_retrying() {
        let cancel = CancellationToken::new();
        let attempts = AtomicUsize::new(0);

        let err = with_retry(&schedule(), &cancel, async || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err::<(), _>(ChunkError::Timeout("30s".into()))
            } else {
                Err(ChunkError::OffsetMismatch {
                    expected: 8,
                    actual: 4,
                })
            }
        })
        .await
        .unwrap_err();

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(matches!(
            err,
            UploadError::Chunk(ChunkError::OffsetMismatch { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_wait_the_scheduled_delays() {
        let cancel = CancellationToken::new();
        let attempts = AtomicUsize::new(0);
        let started = tokio::time::Instant::now();

        let _ = with_retry(&schedule(), &cancel, async || {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ChunkError::Network("down".into()))
        })
        .await;

        // 0 + 3000 + 5000 + 10000 ms.
        assert_eq!(started.elapsed(), Duration::from_millis(18_000));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_delay_aborts() {
        let cancel = CancellationToken::new();
        let attempts = AtomicUsize::new(0);

        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1000)).await;
            token.cancel();
        });

        let err = with_retry(&schedule(), &cancel, async || {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ChunkError::Network("down".into()))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, UploadError::Cancelled));
        // Initial attempt plus the zero-delay retry happen before the
        // 3 s sleep the cancellation interrupts.
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pre_cancelled_token_never_runs_op() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let attempts = AtomicUsize::new(0);

        let err = with_retry(&schedule(), &cancel, async || {
            attempts.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ChunkError>(1)
        })
        .await
        .unwrap_err();

        assert!(matches!(err, UploadError::Cancelled));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn schedule_attempt_counts() {
        assert_eq!(RetrySchedule::default().attempts(), 5);
        assert_eq!(RetrySchedule::none().attempts(), 1);
        assert_eq!(
            RetrySchedule::new(vec![Duration::from_secs(1)]).attempts(),
            2
        );
    }
}
