//! Retry, fallback and delay primitives shared by every collector.
//!
//! [`retry_with_backoff`] wraps any fallible async operation and retries on
//! transient errors (network failures, 5xx, 429). Non-transient errors are
//! returned immediately. [`with_error_recovery`] turns any failure, panics
//! included, into a caller-supplied fallback value.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;

use crate::error::SourceError;

const DEFAULT_MAX_DELAY_MS: u64 = 60_000;

/// Bounded exponential back-off schedule.
///
/// Back-off schedule with `backoff_base_ms = 1_000`:
///
/// | Attempt failed | Sleep before next attempt      |
/// |----------------|--------------------------------|
/// | 1              | 1 000 ms × 2⁰ ± 25 % jitter    |
/// | 2              | 1 000 ms × 2¹ ± 25 % jitter    |
/// | 3              | 1 000 ms × 2² ± 25 % jitter    |
///
/// Delay is capped at `max_delay_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Values below 1 are treated as 1.
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, backoff_base_ms: u64) -> Self {
        Self {
            max_attempts,
            backoff_base_ms,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }

    /// Zero-delay policy for tests: retries happen back-to-back.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_base_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Delay to wait after the `attempt`-th failure (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let computed = self
            .backoff_base_ms
            .saturating_mul(1u64 << attempt.saturating_sub(1).min(10));
        let capped = computed.min(self.max_delay_ms);
        if capped == 0 {
            return Duration::ZERO;
        }
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let jittered = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
        Duration::from_millis(jittered)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 1_000)
    }
}

/// Cooperative delay. A zero duration returns without yielding to the timer.
pub async fn sleep(duration: Duration) {
    if duration.is_zero() {
        return;
    }
    tokio::time::sleep(duration).await;
}

/// Runs `operation` up to `policy.max_attempts` times in total.
///
/// Transient errors (see [`SourceError::is_transient`]) are retried after a
/// jittered exponential delay; anything else is returned immediately. When
/// every attempt fails the last error is returned.
///
/// # Errors
///
/// Returns the terminal [`SourceError`].
pub async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_transient() || attempt >= max_attempts {
                    return Err(err);
                }
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "transient upstream error, retrying after back-off"
                );
                sleep(delay).await;
            }
        }
    }
}

/// Sends the request produced by `build` with retry on transient failures.
///
/// `build` is invoked once per attempt because a `RequestBuilder` is consumed
/// by `send`. HTTP 429 becomes [`SourceError::RateLimited`]; any other non-2xx
/// status becomes [`SourceError::UnexpectedStatus`] (5xx retried, 4xx not).
///
/// # Errors
///
/// Returns the terminal [`SourceError`] once attempts are exhausted or a
/// non-transient error occurs.
pub async fn fetch_with_retry<F>(
    policy: RetryPolicy,
    build: F,
) -> Result<reqwest::Response, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    retry_with_backoff(policy, || {
        let request = build();
        async move {
            let response = request.send().await?;
            check_status(response)
        }
    })
    .await
}

/// Map a non-success status to a typed error, passing 2xx responses through.
///
/// # Errors
///
/// [`SourceError::RateLimited`] on 429, [`SourceError::UnexpectedStatus`] on
/// any other non-2xx status.
pub fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SourceError> {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        return Err(SourceError::RateLimited {
            url: response.url().to_string(),
            retry_after_secs,
        });
    }
    if !status.is_success() {
        return Err(SourceError::UnexpectedStatus {
            status: status.as_u16(),
            url: response.url().to_string(),
        });
    }
    Ok(response)
}

/// Why [`with_error_recovery_else`] fell back.
#[derive(Debug)]
pub enum Recovered<E> {
    Error(E),
    Panic(String),
}

impl<E: fmt::Display> fmt::Display for Recovered<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recovered::Error(e) => write!(f, "{e}"),
            Recovered::Panic(msg) => write!(f, "panicked: {msg}"),
        }
    }
}

/// Awaits `fut`; on error or panic, logs and returns `on_error(reason)`.
pub async fn with_error_recovery_else<T, E, Fut, G>(operation: &str, fut: Fut, on_error: G) -> T
where
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
    G: FnOnce(Recovered<E>) -> T,
{
    let reason = match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(value)) => return value,
        Ok(Err(e)) => Recovered::Error(e),
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            Recovered::Panic(msg)
        }
    };
    tracing::warn!(operation, error = %reason, "operation failed, using fallback");
    on_error(reason)
}

/// Awaits `fut`; on error or panic, logs and returns `fallback`.
pub async fn with_error_recovery<T, E, Fut>(operation: &str, fut: Fut, fallback: T) -> T
where
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    with_error_recovery_else(operation, fut, |_| fallback).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn unavailable() -> SourceError {
        SourceError::UnexpectedStatus {
            status: 503,
            url: "https://upstream.test".to_owned(),
        }
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(RetryPolicy::immediate(3), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, SourceError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(RetryPolicy::immediate(3), || {
            let c = Arc::clone(&c);
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(unavailable())
                } else {
                    Ok::<u32, SourceError>(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(RetryPolicy::immediate(3), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(unavailable())
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3, "exactly max_attempts calls");
        assert!(matches!(
            result,
            Err(SourceError::UnexpectedStatus { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(RetryPolicy::immediate(5), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(SourceError::UnexpectedStatus {
                    status: 403,
                    url: "https://upstream.test".to_owned(),
                })
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn zero_max_attempts_still_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let _ = retry_with_backoff(RetryPolicy::immediate(0), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(unavailable())
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delay_grows_exponentially_within_jitter_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff_base_ms: 1_000,
            max_delay_ms: 3_000,
        };
        let first = policy.delay_for(1).as_millis();
        assert!((750..=1_250).contains(&first), "first delay {first}");
        let second = policy.delay_for(2).as_millis();
        assert!((1_500..=2_500).contains(&second), "second delay {second}");
        let capped = policy.delay_for(6).as_millis();
        assert!(capped <= 3_750, "capped delay {capped}");
        assert_eq!(RetryPolicy::immediate(3).delay_for(2), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_waits_for_duration() {
        let start = tokio::time::Instant::now();
        sleep(Duration::from_millis(250)).await;
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn error_recovery_returns_value_on_success() {
        let v = with_error_recovery("ok", async { Ok::<_, SourceError>(7) }, 0).await;
        assert_eq!(v, 7);
    }

    #[tokio::test]
    async fn error_recovery_returns_fallback_on_error() {
        let v = with_error_recovery("fails", async { Err::<u32, _>(unavailable()) }, 5).await;
        assert_eq!(v, 5);
    }

    #[tokio::test]
    async fn error_recovery_catches_panics() {
        let reason = with_error_recovery_else(
            "panics",
            async {
                if true {
                    panic!("collector bug");
                }
                Ok::<String, SourceError>(String::new())
            },
            |reason| reason.to_string(),
        )
        .await;
        assert_eq!(reason, "panicked: collector bug");
    }
}
