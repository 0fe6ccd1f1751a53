use std::future::Future;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_MAX_ATTEMPTS: usize = 12;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(50);

/// Suspends the current task between retry attempts.
pub trait Sleeper {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Upper bound of the jittered delay that follows the given attempt.
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_ceiling(attempt).mul_f64(rand::random::<f64>())
    }
}

/// Runs an async operation until it succeeds or the attempt budget is spent.
///
/// `retryable` is a static switch for the call site: when it is `false` the
/// first error is returned as is, without sleeping. Otherwise every failure is
/// followed by a random sleep in `[0, 2^attempt * base_delay)`, and the last
/// error is returned once `max_attempts` calls have failed.
pub struct Retry<Z = TokioSleeper> {
    policy: RetryPolicy,
    retryable: bool,
    sleeper: Z,
}

impl Retry {
    pub fn new(policy: RetryPolicy, retryable: bool) -> Self {
        Self {
            policy,
            retryable,
            sleeper: TokioSleeper,
        }
    }
}

impl<Z: Sleeper> Retry<Z> {
    pub fn with_sleeper<S: Sleeper>(self, sleeper: S) -> Retry<S> {
        Retry {
            policy: self.policy,
            retryable: self.retryable,
            sleeper,
        }
    }

    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt: u32 = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !self.retryable => return Err(err),
                Err(err) => {
                    self.sleeper.sleep(self.policy.backoff(attempt)).await;
                    attempt += 1;
                    if attempt as usize >= max_attempts {
                        return Err(err);
                    }
                    debug!("Attempt {attempt}/{max_attempts} failed, retrying: {err}");
                }
            }
        }
    }
}
