use crate::config::RetryConfig;
use backon::{BackoffBuilder, ConstantBuilder, ExponentialBuilder, Retryable};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Delay shape between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    Exponential,
}

/// Bounded retry primitive: at most `max_attempts` calls, with a fixed or
/// exponential delay between them.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedRetry {
    max_attempts: usize,
    delay: Duration,
    max_delay: Duration,
    backoff: Backoff,
    jitter: bool,
}

impl BoundedRetry {
    pub fn fixed(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            max_delay: delay,
            backoff: Backoff::Fixed,
            jitter: false,
        }
    }

    pub fn exponential(max_attempts: usize, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: min_delay,
            max_delay,
            backoff: Backoff::Exponential,
            jitter: false,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        let retry = if config.use_exponential_backoff {
            Self::exponential(
                config.max_attempts as usize,
                config.min_delay(),
                config.max_delay(),
            )
        } else {
            Self::fixed(config.max_attempts as usize, config.min_delay())
        };
        retry.with_jitter(config.jitter)
    }

    /// Jitter only applies to exponential delays
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Run `operation` until it succeeds or the attempt budget is spent.
    /// The last error is returned on exhaustion.
    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_when(operation, |_| true).await
    }

    /// Like [`BoundedRetry::run`], but only errors accepted by `retry_if` are retried.
    pub async fn run_when<T, E, F, Fut, P>(&self, operation: F, retry_if: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: FnMut(&E) -> bool,
    {
        // backon counts retries, not attempts
        let retries = self.max_attempts - 1;
        match self.backoff {
            Backoff::Fixed => {
                let builder = ConstantBuilder::default()
                    .with_delay(self.delay)
                    .with_max_times(retries);
                Self::retry_with(builder, self.max_attempts, operation, retry_if).await
            }
            Backoff::Exponential => {
                let mut builder = ExponentialBuilder::default()
                    .with_min_delay(self.delay)
                    .with_max_delay(self.max_delay)
                    .with_max_times(retries);
                if self.jitter {
                    builder = builder.with_jitter();
                }
                Self::retry_with(builder, self.max_attempts, operation, retry_if).await
            }
        }
    }

    async fn retry_with<B, T, E, F, Fut, P>(
        builder: B,
        max_attempts: usize,
        operation: F,
        retry_if: P,
    ) -> Result<T, E>
    where
        B: BackoffBuilder,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: FnMut(&E) -> bool,
    {
        let mut attempt = 0usize;
        operation
            .retry(builder)
            .sleep(tokio::time::sleep)
            .when(retry_if)
            .notify(|error: &E, delay: Duration| {
                attempt += 1;
                debug!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Attempt failed, retrying"
                );
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tokio::time::Instant;

    fn failing_until(calls: &Cell<usize>, succeed_on: usize) -> Result<usize, String> {
        calls.set(calls.get() + 1);
        if calls.get() >= succeed_on {
            Ok(calls.get())
        } else {
            Err(format!("attempt {} failed", calls.get()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_last_attempt() {
        let calls = &Cell::new(0);
        let retry = BoundedRetry::fixed(5, Duration::from_secs(2));
        let started = Instant::now();

        let result = retry.run(move || async move { failing_until(calls, 5) }).await;

        assert_eq!(result, Ok(5));
        assert_eq!(calls.get(), 5);
        assert_eq!(started.elapsed(), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let calls = &Cell::new(0);
        let retry = BoundedRetry::fixed(5, Duration::from_secs(2));

        let result = retry.run(move || async move { failing_until(calls, 99) }).await;

        assert_eq!(result, Err("attempt 5 failed".to_string()));
        assert_eq!(calls.get(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_makes_one_call() {
        let calls = &Cell::new(0);
        let retry = BoundedRetry::fixed(5, Duration::from_secs(2));
        let started = Instant::now();

        let result = retry.run(move || async move { failing_until(calls, 1) }).await;

        assert_eq!(result, Ok(1));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_stops_retries() {
        let calls = &Cell::new(0);
        let retry = BoundedRetry::fixed(5, Duration::from_millis(10));

        let result = retry
            .run_when(
                move || async move { failing_until(calls, 99) },
                |error: &String| !error.contains("2"),
            )
            .await;

        assert_eq!(result, Err("attempt 2 failed".to_string()));
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_respects_budget() {
        let calls = &Cell::new(0);
        let retry = BoundedRetry::exponential(3, Duration::from_millis(100), Duration::from_secs(1));

        let result = retry.run(move || async move { failing_until(calls, 99) }).await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_from_config() {
        let retry = BoundedRetry::from_config(&RetryConfig::vm_verification());
        assert_eq!(retry.max_attempts(), 5);
        assert_eq!(retry.delay(), Duration::from_secs(2));
        assert_eq!(retry.backoff(), Backoff::Fixed);

        let retry = BoundedRetry::from_config(&RetryConfig::default());
        assert_eq!(retry.backoff(), Backoff::Exponential);
    }

    #[test]
    fn test_zero_attempts_is_clamped() {
        assert_eq!(BoundedRetry::fixed(0, Duration::ZERO).max_attempts(), 1);
    }
}
