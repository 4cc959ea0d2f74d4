// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `retry.rs`

use super::*;
use crate::errors::Error;
use std::sync::atomic::{AtomicUsize, Ordering};

fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(
        kube::core::Status::failure(reason, reason)
            .with_code(code)
            .boxed(),
    )
}

#[test]
fn test_backoff_configuration() {
    let backoff = default_backoff();

    assert_eq!(backoff.current_interval, Duration::from_millis(100));
    assert_eq!(backoff.max_interval, Duration::from_secs(10));
    assert_eq!(backoff.max_elapsed_time, Duration::from_secs(120));
}

#[test]
fn test_backoff_grows_and_caps() {
    let mut backoff = default_backoff();
    backoff.randomization_factor = 0.0;

    let intervals: Vec<Duration> = (0..10).filter_map(|_| backoff.next_backoff()).collect();

    assert_eq!(intervals[0], Duration::from_millis(100));
    assert_eq!(intervals[1], Duration::from_millis(200));
    assert_eq!(intervals[2], Duration::from_millis(400));
    assert_eq!(intervals[9], Duration::from_secs(10));
}

#[test]
fn test_jitter_stays_in_range() {
    let mut backoff = default_backoff();
    for _ in 0..20 {
        let interval = backoff.next_backoff().unwrap();
        assert!(interval <= Duration::from_secs(11));
    }
}

#[test]
fn test_retryable_errors() {
    assert!(is_retryable_error(&api_error(429, "TooManyRequests")));
    assert!(is_retryable_error(&api_error(500, "InternalError")));
    assert!(is_retryable_error(&api_error(503, "ServiceUnavailable")));
    assert!(!is_retryable_error(&api_error(404, "NotFound")));
    assert!(!is_retryable_error(&api_error(409, "Conflict")));
    assert!(!is_retryable_error(&api_error(403, "Forbidden")));
}

#[tokio::test(start_paused = true)]
async fn test_retry_until_success() {
    let calls = AtomicUsize::new(0);

    let value = retry_api_call(
        || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(api_error(503, "ServiceUnavailable"))
                } else {
                    Ok("done")
                }
            }
        },
        "test operation",
    )
    .await
    .unwrap();

    assert_eq!(value, "done");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_non_retryable_error_fails_immediately() {
    let calls = AtomicUsize::new(0);

    let result: Result<()> = retry_api_call(
        || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(api_error(404, "NotFound")) }
        },
        "test operation",
    )
    .await;

    assert!(matches!(result, Err(Error::Kubernetes(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
