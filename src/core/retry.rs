//! Retry policy for downloads
//!
//! Operations report failures as [`RestoreError`]s; the policy only looks at
//! [`RestoreError::kind`]. Retriable failures are attempted again after a
//! backoff until the attempt budget is spent, everything else is returned
//! immediately.

use crate::error::{ErrorKind, RestoreError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Shape of the delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Same delay every time
    Fixed,
    /// Delay grows by `initial_backoff_ms` per attempt
    Linear,
    /// Delay doubles per attempt
    Exponential,
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// When false every operation runs exactly once
    pub enabled: bool,
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub strategy: BackoffStrategy,
    /// Delay before the second attempt, in milliseconds
    pub initial_backoff_ms: u64,
    /// Upper bound for any single delay, in milliseconds
    pub max_backoff_ms: u64,
    /// Add up to 25% random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            strategy: BackoffStrategy::Exponential,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration that never retries
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_initial_backoff_ms(mut self, initial_backoff_ms: u64) -> Self {
        self.initial_backoff_ms = initial_backoff_ms;
        self
    }

    pub fn with_max_backoff_ms(mut self, max_backoff_ms: u64) -> Self {
        self.max_backoff_ms = max_backoff_ms;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Attempts the policy will make, at least one
    pub fn effective_attempts(&self) -> u32 {
        if self.enabled {
            self.max_attempts.max(1)
        } else {
            1
        }
    }

    /// Delay after the failed attempt number `attempt` (0-based)
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let base_ms = match self.strategy {
            BackoffStrategy::Fixed => self.initial_backoff_ms,
            BackoffStrategy::Linear => self
                .initial_backoff_ms
                .saturating_mul(u64::from(attempt) + 1),
            BackoffStrategy::Exponential => self
                .initial_backoff_ms
                .saturating_mul(2u64.saturating_pow(attempt)),
        };
        let capped_ms = base_ms.min(self.max_backoff_ms);

        let final_ms = if self.jitter && capped_ms > 0 {
            let jitter_range = capped_ms / 4;
            capped_ms.saturating_add(rand::thread_rng().gen_range(0..=jitter_range))
        } else {
            capped_ms
        };

        Duration::from_millis(final_ms)
    }
}

/// Runs an operation, retrying the failures it classifies as retriable
pub trait RetryPolicy: Send + Sync {
    fn submit<T, F>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Result<T>;
}

/// Retry policy driven by a [`RetryConfig`]
#[derive(Debug, Clone, Default)]
pub struct Retrier {
    config: RetryConfig,
}

impl Retrier {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

impl RetryPolicy for Retrier {
    fn submit<T, F>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let max_attempts = self.config.effective_attempts();
        let mut attempt = 0;

        loop {
            let err = match operation() {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            attempt += 1;

            if err.kind() != ErrorKind::Retriable {
                return Err(err);
            }

            if attempt >= max_attempts {
                return Err(RestoreError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let backoff = self.config.backoff_duration(attempt - 1);
            warn!(
                attempt = attempt,
                max_attempts = max_attempts,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "Retriable error, backing off"
            );
            std::thread::sleep(backoff);
        }
    }
}

/// Policy that runs every operation exactly once
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn submit<T, F>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        operation()
    }
}
