//! Retry policy of the model agent.
//!
//! A [`RetryPolicy`] bounds how many times a model call is attempted and how long the agent
//! waits between two attempts. It is built with [`RetryPolicyBuilder`]:
//!
//! ```
//! use std::time::Duration;
//! use game_arena::llm::RetryPolicyBuilder;
//!
//! let policy = RetryPolicyBuilder::new()
//!     .with_max_attempts(5)
//!     .with_retry_delay(Duration::from_millis(500))
//!     .build()
//!     .unwrap();
//! assert_eq!(policy.max_attempts(), 5);
//! ```
//!
//! [`RetryPolicyBuilder::from_env()`] reads the same values from environment variables.

use std::{env, time::Duration};

use anyhow::bail;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Bounded retries with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    retry_delay: Duration,
}

impl RetryPolicy {
    /// Total number of attempts, including the first one. Always at least 1.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Pause after a failed attempt, when another one follows.
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Builder for [`RetryPolicy`]. Unset values fall back to 3 attempts and 5 seconds.
#[derive(Debug, Default, Clone)]
pub struct RetryPolicyBuilder {
    max_attempts: Option<u32>,
    retry_delay: Option<Duration>,
}

impl RetryPolicyBuilder {
    /// Builder with every value unset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the policy from environment variables:
    /// - `ARENA_MAX_RETRIES` (u32): total number of attempts
    /// - `ARENA_RETRY_DELAY_MS` (u64): delay between attempts in milliseconds
    ///
    /// Unset or unparsable variables keep their default.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            max_attempts: env::var("ARENA_MAX_RETRIES").ok().and_then(|v| v.parse().ok()),
            retry_delay: env::var("ARENA_RETRY_DELAY_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis),
        }
    }

    /// Sets the total number of attempts.
    #[must_use]
    pub fn with_max_attempts(self, attempts: u32) -> Self {
        Self {
            max_attempts: Some(attempts),
            ..self
        }
    }

    /// Sets the delay between two attempts.
    #[must_use]
    pub fn with_retry_delay(self, delay: Duration) -> Self {
        Self {
            retry_delay: Some(delay),
            ..self
        }
    }

    /// # Errors
    ///
    /// Fails when zero attempts are requested.
    pub fn build(self) -> anyhow::Result<RetryPolicy> {
        let max_attempts = self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
        if max_attempts == 0 {
            bail!("a retry policy needs at least one attempt");
        }
        Ok(RetryPolicy {
            max_attempts,
            retry_delay: self.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let policy = RetryPolicyBuilder::new().build().unwrap();
        assert_eq!(policy, RetryPolicy::default());
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.retry_delay(), Duration::from_secs(5));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        assert!(RetryPolicyBuilder::new().with_max_attempts(0).build().is_err());
    }

    #[test]
    fn builder_overrides() {
        let policy = RetryPolicyBuilder::new()
            .with_retry_delay(Duration::ZERO)
            .with_max_attempts(1)
            .build()
            .unwrap();
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.retry_delay(), Duration::ZERO);
    }
}
