//! PriceDataSource contract and retry capability.
//!
//! Retry-with-backoff belongs to the source, not to the simulator: every
//! source exposes a [`RetryPolicy`] and the provided
//! [`PriceDataSource::fetch_with_retry`] applies it.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::{PriceFrame, PriceRequest};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that a [`PriceDataSource`] may return.
#[derive(Debug, Clone, PartialEq)]
pub enum PriceError {
    /// The source has no data for the request.
    DataUnavailable(String),
    /// Network or transport failure.
    Transport(String),
    /// The upstream API returned an application-level error.
    Api { code: Option<i64>, message: String },
    /// A response payload could not be decoded.
    Decode(String),
    /// Every attempt allowed by the retry policy failed.
    Exhausted {
        attempts: u32,
        last: Box<PriceError>,
    },
}

impl fmt::Display for PriceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceError::DataUnavailable(msg) => write!(f, "data unavailable: {msg}"),
            PriceError::Transport(msg) => write!(f, "transport error: {msg}"),
            PriceError::Api {
                code: Some(c),
                message,
            } => write!(f, "price api error code={c}: {message}"),
            PriceError::Api {
                code: None,
                message,
            } => write!(f, "price api error: {message}"),
            PriceError::Decode(msg) => write!(f, "decode error: {msg}"),
            PriceError::Exhausted { attempts, last } => {
                write!(f, "price fetch failed after {attempts} attempt(s): {last}")
            }
        }
    }
}

impl std::error::Error for PriceError {}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Exponential backoff with additive jitter.
///
/// Delay before retry `k` (0-based) = `base_delay * 2^k + uniform(0, max_jitter)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first call. Always >= 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_jitter: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_jitter,
        }
    }

    /// Single attempt, no sleeping.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Backoff component of the delay before retry `attempt` (0-based), no jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        self.backoff(attempt).saturating_add(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(1))
    }
}

// ---------------------------------------------------------------------------
// Source trait
// ---------------------------------------------------------------------------

/// Upstream price-data contract.
///
/// `fetch` returns, per requested ticker, the date-ordered closes inside
/// `[req.start, req.end)`. Tickers the source knows nothing about are
/// omitted rather than reported as errors.
#[async_trait::async_trait]
pub trait PriceDataSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, req: &PriceRequest) -> Result<PriceFrame, PriceError>;

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }

    /// `fetch` under this source's [`RetryPolicy`].
    ///
    /// Returns [`PriceError::Exhausted`] carrying the last failure once every
    /// attempt has failed.
    async fn fetch_with_retry(&self, req: &PriceRequest) -> Result<PriceFrame, PriceError> {
        let policy = self.retry_policy();
        let mut last: Option<PriceError> = None;

        for attempt in 0..policy.max_attempts {
            match self.fetch(req).await {
                Ok(frame) => return Ok(frame),
                Err(e) => {
                    let is_last = attempt + 1 >= policy.max_attempts;
                    if !is_last {
                        let wait = policy.delay_with_jitter(attempt);
                        warn!(
                            source = self.name(),
                            attempt = attempt + 1,
                            wait_ms = wait.as_millis() as u64,
                            error = %e,
                            "price fetch failed; retrying"
                        );
                        tokio::time::sleep(wait).await;
                    }
                    last = Some(e);
                }
            }
        }

        Err(PriceError::Exhausted {
            attempts: policy.max_attempts,
            last: Box::new(last.unwrap_or_else(|| {
                PriceError::DataUnavailable("no attempt was made".to_string())
            })),
        })
    }
}

/// Wraps a source and overrides its retry policy (e.g. from run config).
pub struct WithRetryPolicy<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> WithRetryPolicy<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait::async_trait]
impl<S: PriceDataSource> PriceDataSource for WithRetryPolicy<S> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn fetch(&self, req: &PriceRequest) -> Result<PriceFrame, PriceError> {
        self.inner.fetch(req).await
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait::async_trait]
impl<S: PriceDataSource + ?Sized> PriceDataSource for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn fetch(&self, req: &PriceRequest) -> Result<PriceFrame, PriceError> {
        (**self).fetch(req).await
    }

    fn retry_policy(&self) -> RetryPolicy {
        (**self).retry_policy()
    }
}

// ---------------------------------------------------------------------------
// In-memory source
// ---------------------------------------------------------------------------

/// Serves slices of a preloaded frame. Never fails.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPriceSource {
    frame: PriceFrame,
}

impl InMemoryPriceSource {
    pub fn new(frame: PriceFrame) -> Self {
        Self { frame }
    }

    pub fn frame(&self) -> &PriceFrame {
        &self.frame
    }
}

#[async_trait::async_trait]
impl PriceDataSource for InMemoryPriceSource {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn fetch(&self, req: &PriceRequest) -> Result<PriceFrame, PriceError> {
        Ok(self.frame.slice(req))
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::no_retry()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let p = RetryPolicy::new(3, Duration::from_millis(100), Duration::ZERO);
        assert_eq!(p.backoff(0), Duration::from_millis(100));
        assert_eq!(p.backoff(1), Duration::from_millis(200));
        assert_eq!(p.backoff(2), Duration::from_millis(400));
    }

    #[test]
    fn jitter_stays_within_bound() {
        let p = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(5));
        for _ in 0..50 {
            let d = p.delay_with_jitter(1);
            assert!(d >= Duration::from_millis(20));
            assert!(d <= Duration::from_millis(25));
        }
    }

    #[test]
    fn zero_attempts_clamped_to_one() {
        let p = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO);
        assert_eq!(p.max_attempts, 1);
    }

    #[test]
    fn exhausted_display_includes_last_error() {
        let err = PriceError::Exhausted {
            attempts: 3,
            last: Box::new(PriceError::Transport("connection refused".to_string())),
        };
        assert_eq!(
            err.to_string(),
            "price fetch failed after 3 attempt(s): transport error: connection refused"
        );
    }

    #[test]
    fn api_error_display_with_and_without_code() {
        let with = PriceError::Api {
            code: Some(429),
            message: "rate limited".to_string(),
        };
        let without = PriceError::Api {
            code: None,
            message: "bad symbol".to_string(),
        };
        assert_eq!(with.to_string(), "price api error code=429: rate limited");
        assert_eq!(without.to_string(), "price api error: bad symbol");
    }

    #[test]
    fn source_is_object_safe_via_box() {
        let _p: Box<dyn PriceDataSource> = Box::new(InMemoryPriceSource::default());
    }
}
