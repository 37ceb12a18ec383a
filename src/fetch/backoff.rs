//! Retry policy for AEMET requests.
//!
//! The OpenData API rate-limits aggressively, so an HTTP 429 is an expected
//! condition and is retried for as long as the server keeps signalling it.
//! Server faults (5xx) and connection errors are retried with exponential
//! backoff up to a bounded number of attempts. Any other 4xx is final.

use reqwest::StatusCode;
use std::time::Duration;

pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);
pub const DEFAULT_TRANSIENT_BASE: Duration = Duration::from_secs(2);
pub const DEFAULT_TRANSIENT_MAX_DELAY: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_TRANSIENT_ATTEMPTS: u32 = 5;

/// Why a single request attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// HTTP 429, or an envelope reporting `estado: 429`.
    RateLimited,
    /// HTTP 5xx.
    TransientServerFault(StatusCode),
    /// HTTP 4xx other than 429.
    ClientRequestError(StatusCode),
    /// The request never produced a response (DNS, connect, timeout, reset).
    ConnectionError,
}

impl FailureClass {
    /// Classifies a non-success HTTP status. Returns `None` for 2xx/3xx.
    pub fn from_status(status: StatusCode) -> Option<Self> {
        if status == StatusCode::TOO_MANY_REQUESTS {
            Some(FailureClass::RateLimited)
        } else if status.is_server_error() {
            Some(FailureClass::TransientServerFault(status))
        } else if status.is_client_error() {
            Some(FailureClass::ClientRequestError(status))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffDecision {
    RetryAfter(Duration),
    Abort,
}

/// How long to wait after a rate-limit response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitMode {
    /// Always wait the same amount of time.
    Fixed(Duration),
    /// Start at `base` and double on every consecutive 429, never exceeding `max_delay`.
    Exponential { base: Duration, max_delay: Duration },
}

impl Default for RateLimitMode {
    fn default() -> Self {
        RateLimitMode::Fixed(DEFAULT_RATE_LIMIT_WAIT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub rate_limit: RateLimitMode,
    /// Delay after the first server fault or connection error; doubles afterwards.
    pub transient_base: Duration,
    pub transient_max_delay: Duration,
    /// Total attempts allowed for a request that keeps failing transiently.
    pub max_transient_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitMode::default(),
            transient_base: DEFAULT_TRANSIENT_BASE,
            transient_max_delay: DEFAULT_TRANSIENT_MAX_DELAY,
            max_transient_attempts: DEFAULT_MAX_TRANSIENT_ATTEMPTS,
        }
    }
}

impl BackoffPolicy {
    /// Decides what to do after the `attempt`-th consecutive failure of `class`
    /// (1-based).
    ///
    /// Rate limits are never aborted, whatever the attempt count.
    pub fn decide(&self, class: FailureClass, attempt: u32) -> BackoffDecision {
        match class {
            FailureClass::RateLimited => BackoffDecision::RetryAfter(self.rate_limit_delay(attempt)),
            FailureClass::TransientServerFault(_) | FailureClass::ConnectionError => {
                if attempt >= self.max_transient_attempts {
                    BackoffDecision::Abort
                } else {
                    BackoffDecision::RetryAfter(exponential(
                        self.transient_base,
                        self.transient_max_delay,
                        attempt,
                    ))
                }
            }
            FailureClass::ClientRequestError(_) => BackoffDecision::Abort,
        }
    }

    fn rate_limit_delay(&self, attempt: u32) -> Duration {
        match self.rate_limit {
            RateLimitMode::Fixed(wait) => wait,
            RateLimitMode::Exponential { base, max_delay } => exponential(base, max_delay, attempt),
        }
    }
}

/// `base * 2^(attempt - 1)`, saturating, capped at `max_delay`.
fn exponential(base: Duration, max_delay: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exponent).min(max_delay)
}
