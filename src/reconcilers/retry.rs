// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Retry with exponential backoff for Kubernetes API reads and writes.
//!
//! Rate limiting (429), server errors (5xx) and connection failures are
//! retried; every other error is returned immediately. Certificate flows are
//! not retried here: a failed flow waits for the next reconciliation pass.

use rand::Rng;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::errors::Result;

/// Maximum total time to spend retrying (2 minutes)
const MAX_ELAPSED_TIME_SECS: u64 = 120;

/// Initial retry interval (100ms)
const INITIAL_INTERVAL_MILLIS: u64 = 100;

/// Maximum interval between retries (10 seconds)
const MAX_INTERVAL_SECS: u64 = 10;

/// Backoff multiplier
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Randomization factor (±10%)
const RANDOMIZATION_FACTOR: f64 = 0.1;

/// Exponential backoff with jitter.
#[derive(Debug)]
pub struct ExponentialBackoff {
    pub current_interval: Duration,
    pub max_interval: Duration,
    pub max_elapsed_time: Duration,
    pub multiplier: f64,
    pub randomization_factor: f64,
    start_time: Instant,
}

impl ExponentialBackoff {
    /// Next interval to wait, or `None` once the elapsed time budget is spent.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.start_time.elapsed() >= self.max_elapsed_time {
            return None;
        }

        let interval = self.current_interval;
        let next = interval.as_secs_f64() * self.multiplier;
        self.current_interval = Duration::from_secs_f64(next).min(self.max_interval);

        Some(self.apply_jitter(interval))
    }

    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return interval;
        }

        let secs = interval.as_secs_f64();
        let delta = secs * self.randomization_factor;
        let jittered = rand::thread_rng().gen_range((secs - delta)..=(secs + delta));

        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Backoff used for Kubernetes API calls: 100ms doubling up to 10s, for at
/// most 2 minutes.
#[must_use]
pub fn default_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        current_interval: Duration::from_millis(INITIAL_INTERVAL_MILLIS),
        max_interval: Duration::from_secs(MAX_INTERVAL_SECS),
        max_elapsed_time: Duration::from_secs(MAX_ELAPSED_TIME_SECS),
        multiplier: BACKOFF_MULTIPLIER,
        randomization_factor: RANDOMIZATION_FACTOR,
        start_time: Instant::now(),
    }
}

/// Retry a Kubernetes API call on transient errors.
///
/// # Errors
///
/// Returns the last API error once it is not retryable or the backoff is
/// exhausted.
pub async fn retry_api_call<T, F, Fut>(mut operation: F, operation_name: &str) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, kube::Error>>,
{
    let mut backoff = default_backoff();
    let mut attempt = 0;

    loop {
        attempt += 1;

        let e = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Kubernetes API call succeeded after retries");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !is_retryable_error(&e) {
            return Err(e.into());
        }

        match backoff.next_backoff() {
            Some(duration) => {
                warn!(
                    operation = operation_name,
                    attempt,
                    retry_after = ?duration,
                    error = %e,
                    "Retryable Kubernetes API error, will retry"
                );
                tokio::time::sleep(duration).await;
            }
            None => {
                error!(operation = operation_name, attempt, error = %e, "Backoff exhausted, giving up");
                return Err(e.into());
            }
        }
    }
}

/// Rate limiting, server errors and connection failures are transient.
fn is_retryable_error(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(api_err) => api_err.code == 429 || (500..600).contains(&api_err.code),
        kube::Error::Service(_) => true,
        _ => false,
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
