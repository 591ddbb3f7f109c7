use actix_web::rt::time::sleep;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// Errors that know whether repeating the same call can succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before attempt `attempt + 1`, doubling each time.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }

    /// Runs `op`, retrying errors the error type marks as retryable.
    pub async fn run<T, E, F, Fut>(&self, label: &str, op: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_classified(label, E::is_retryable, op).await
    }

    /// Runs `op` with a classifier chosen by the call site.
    pub async fn run_classified<T, E, C, F, Fut>(
        &self,
        label: &str,
        classify: C,
        mut op: F,
    ) -> Result<T, E>
    where
        E: Display,
        C: Fn(&E) -> bool,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if classify(&e) && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying failed operation"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if classify(&e) {
                        error!(operation = label, attempt, error = %e, "Operation failed after retries");
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug)]
    enum TestError {
        Flaky,
        Fatal,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Flaky)
        }
    }

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO)
    }

    #[actix_web::test]
    async fn retries_until_success_within_bound() {
        let calls = Cell::new(0);
        let result = fast(3)
            .run("flaky", || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 { Err(TestError::Flaky) } else { Ok(n) }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[actix_web::test]
    async fn gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<(), _> = fast(4)
            .run("always-flaky", || {
                calls.set(calls.get() + 1);
                async { Err(TestError::Flaky) }
            })
            .await;

        assert!(matches!(result, Err(TestError::Flaky)));
        assert_eq!(calls.get(), 4);
    }

    #[actix_web::test]
    async fn terminal_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), _> = fast(5)
            .run("fatal", || {
                calls.set(calls.get() + 1);
                async { Err(TestError::Fatal) }
            })
            .await;

        assert!(matches!(result, Err(TestError::Fatal)));
        assert_eq!(calls.get(), 1);
    }

    #[actix_web::test]
    async fn call_site_classifier_overrides_error_kind() {
        let calls = Cell::new(0);
        let _: Result<(), _> = fast(3)
            .run_classified("never", |_: &TestError| false, || {
                calls.set(calls.get() + 1);
                async { Err(TestError::Flaky) }
            })
            .await;

        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
