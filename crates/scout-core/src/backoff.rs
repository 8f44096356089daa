//! Exponential backoff with jitter, plus the bounded retry combinator every
//! retry scope of a run goes through.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use rand::Rng;

/// Something that can wait. Production code sleeps on the tokio timer; tests
/// record the requested durations instead.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Jitter factor range applied to every backoff delay.
const JITTER_MIN: f64 = 0.5;
const JITTER_MAX: f64 = 1.5;

/// Extra wait added on top of a server-mandated rate-limit wait.
pub const RATE_LIMIT_SLACK: Duration = Duration::from_secs(1);

/// Ceiling for a single server-mandated wait. Longer demands are clamped.
pub const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(3600);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// `min(cap, base * 2^attempt) * jitter`.
    pub fn delay_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        let factor = 2f64.powi(attempt.min(63) as i32);
        let raw = self.base.as_secs_f64() * factor;
        let capped = raw.min(self.cap.as_secs_f64());
        Duration::from_secs_f64((capped * jitter).max(0.0))
    }

    /// Delay for `attempt` with a fresh jitter drawn from `[0.5, 1.5)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(JITTER_MIN..JITTER_MAX);
        self.delay_with_jitter(attempt, jitter)
    }

    pub async fn sleep(&self, sleeper: &dyn Sleeper, attempt: u32) {
        sleeper.sleep(self.delay(attempt)).await;
    }
}

/// What a retry scope should do with one failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Back off and try again; consumes one attempt.
    Retry,
    /// Sleep for the mandated wait, then try again; does not consume an attempt.
    Wait(Duration),
    /// Stop immediately.
    Fatal,
}

/// Attempt budget of one retry scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryBudget {
    pub attempts: u32,
    /// Upper bound on mandated waits, so a misbehaving server cannot stall a
    /// scope forever.
    pub max_waits: u32,
}

/// Why a retry scope gave up.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryError<E> {
    /// All generic attempts failed; carries the last error.
    Exhausted(E),
    /// The mandated-wait bound was hit; carries the last error.
    TooManyWaits(E),
    /// An error classified as [`Disposition::Fatal`].
    Fatal(E),
}

/// Run `op` until it succeeds, following `classify` for every failure.
///
/// Generic failures back off via `policy` with their own attempt counter;
/// mandated waits sleep `wait + RATE_LIMIT_SLACK` (with `wait` clamped to
/// [`MAX_RATE_LIMIT_WAIT`]) and are counted separately.
pub async fn retry<T, E, F, Fut, C>(
    policy: &BackoffPolicy,
    sleeper: &dyn Sleeper,
    budget: RetryBudget,
    classify: C,
    mut op: F,
) -> std::result::Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    C: Fn(&E) -> Disposition,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    let mut waits = 0u32;
    loop {
        let err = match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };

        match classify(&err) {
            Disposition::Fatal => return Err(RetryError::Fatal(err)),
            Disposition::Wait(wait) => {
                if waits >= budget.max_waits {
                    tracing::warn!(waits, "rate-limit wait bound reached: {err}");
                    return Err(RetryError::TooManyWaits(err));
                }
                waits += 1;
                let wait = wait.min(MAX_RATE_LIMIT_WAIT);
                tracing::warn!(wait_secs = wait.as_secs(), "rate limited, sleeping");
                sleeper.sleep(wait.saturating_add(RATE_LIMIT_SLACK)).await;
            }
            Disposition::Retry => {
                tracing::debug!(attempt, "attempt failed: {err}");
                // Skip the pointless sleep after the final attempt.
                if attempt + 1 >= budget.attempts {
                    return Err(RetryError::Exhausted(err));
                }
                policy.sleep(sleeper, attempt).await;
                attempt += 1;
            }
        }
    }
}
