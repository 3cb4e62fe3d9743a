//! Exponential backoff with jitter, shared by every retrying sub-client.
//!
//! [`Backoff::retry_with_backoff`] drives a closure that returns a
//! [`ControlFlow`]: `Break` stops the loop and yields its value, `Continue`
//! sleeps (for either a throttle-requested duration or the next backoff
//! step) and tries again. The deadline, if configured, bounds the total
//! wall-clock time spent retrying rather than the number of attempts.

use std::ops::ControlFlow;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::warn;

/// Configuration for [`Backoff`].
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Initial backoff duration.
    pub init_backoff: Duration,

    /// Maximum backoff duration, reached once `init_backoff * base.powi(n)`
    /// exceeds it.
    pub max_backoff: Duration,

    /// Multiplier applied to the backoff duration after each attempt.
    pub base: f64,

    /// Total time budget for retries. `None` means retry forever.
    pub deadline: Option<Duration>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            init_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(500),
            base: 3.0,
            deadline: None,
        }
    }
}

/// The outcome of one attempt inside [`Backoff::retry_with_backoff`]: either
/// the request failed outright, or it succeeded but the broker asked the
/// client to slow down.
#[derive(Debug)]
pub enum ErrorOrThrottle<E> {
    Error(E),
    Throttle(Duration),
}

impl<E> From<E> for ErrorOrThrottle<E> {
    fn from(e: E) -> Self {
        Self::Error(e)
    }
}

/// The retry loop exhausted its [`BackoffConfig::deadline`].
#[derive(Debug, Error)]
#[error("gave up after {elapsed:?} retrying '{request_name}'")]
pub struct BackoffError {
    pub request_name: String,
    pub elapsed: Duration,
}

/// Tracks the state of an in-progress exponential backoff.
#[derive(Debug)]
pub struct Backoff {
    init_backoff: f64,
    next_backoff_secs: f64,
    max_backoff_secs: f64,
    base: f64,
    deadline: Option<Duration>,
    started_at: Option<std::time::Instant>,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        let init_backoff = config.init_backoff.as_secs_f64();

        Self {
            init_backoff,
            next_backoff_secs: init_backoff,
            max_backoff_secs: config.max_backoff.as_secs_f64(),
            base: config.base,
            deadline: config.deadline,
            started_at: None,
        }
    }

    /// Resets the backoff state to its initial configuration.
    pub fn reset(&mut self) {
        self.next_backoff_secs = self.init_backoff;
        self.started_at = None;
    }

    fn next_sleep(&mut self) -> Duration {
        let now = self.next_backoff_secs;
        // jitter: uniformly distributed in [now / 2, now)
        let jittered = rand::thread_rng().gen_range((now / 2.0)..now);
        self.next_backoff_secs = (now * self.base).min(self.max_backoff_secs);
        Duration::from_secs_f64(jittered)
    }

    /// Runs `f` until it returns [`ControlFlow::Break`], sleeping between
    /// attempts per [`ControlFlow::Continue`]. The sleep duration is either
    /// the broker-requested throttle or the next exponential backoff step.
    pub async fn retry_with_backoff<F, Fut, B, E>(
        &mut self,
        request_name: &str,
        f: F,
    ) -> Result<B, BackoffError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = ControlFlow<B, ErrorOrThrottle<E>>>,
    {
        let started_at = *self.started_at.get_or_insert_with(std::time::Instant::now);

        loop {
            match f().await {
                ControlFlow::Break(v) => return Ok(v),
                ControlFlow::Continue(outcome) => {
                    if let Some(deadline) = self.deadline {
                        let elapsed = started_at.elapsed();
                        if elapsed > deadline {
                            return Err(BackoffError {
                                request_name: request_name.to_string(),
                                elapsed,
                            });
                        }
                    }

                    let sleep = match outcome {
                        ErrorOrThrottle::Throttle(d) => d,
                        ErrorOrThrottle::Error(_) => self.next_sleep(),
                    };

                    warn!(
                        request_name,
                        sleep_secs = sleep.as_secs_f64(),
                        "request failed, backing off",
                    );

                    tokio::time::sleep(sleep).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_growth_is_capped() {
        let config = BackoffConfig {
            init_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(20),
            base: 3.0,
            deadline: None,
        };
        let mut backoff = Backoff::new(&config);

        for _ in 0..10 {
            let sleep = backoff.next_sleep();
            assert!(sleep <= Duration::from_millis(20));
        }
    }

    #[tokio::test]
    async fn retry_breaks_on_first_success() {
        let mut backoff = Backoff::new(&BackoffConfig::default());
        let got: Result<i32, BackoffError> = backoff
            .retry_with_backoff("test", || async { ControlFlow::Break(42) })
            .await;
        assert_eq!(got.unwrap(), 42);
    }

    #[tokio::test]
    async fn retry_gives_up_after_deadline() {
        let config = BackoffConfig {
            init_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            base: 2.0,
            deadline: Some(Duration::from_millis(5)),
        };
        let mut backoff = Backoff::new(&config);

        let got: Result<(), BackoffError> = backoff
            .retry_with_backoff("test", || async {
                ControlFlow::<(), ErrorOrThrottle<()>>::Continue(ErrorOrThrottle::Error(()))
            })
            .await;
        assert!(got.is_err());
    }
}
