// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `main.rs` - metrics endpoint and signal handling

use super::*;
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test]
async fn test_metrics_handler_serves_registry() {
    metrics::record_reconciliation(true);

    let (status, body) = metrics_handler().await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("acmedns_reconciliations_total"));
}

#[tokio::test]
async fn test_shutdown_signal_waits_for_signal() {
    let result = timeout(Duration::from_millis(100), shutdown_signal()).await;
    assert!(result.is_err(), "shutdown should wait until a signal arrives");
}

#[tokio::test]
async fn test_metrics_server_rejects_invalid_address() {
    let result = run_metrics_server("not-an-address").await;
    assert!(result.is_err());
}
