// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `dns/observer.rs`

use super::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

const RECORD: &str = "_acme-challenge.example.com.";
const TIMEOUT: Duration = Duration::from_secs(60);
const POLL: Duration = Duration::from_secs(1);

fn nameserver(name: &str, last_octet: u8) -> Nameserver {
    Nameserver {
        name: name.to_string(),
        address: SocketAddr::from(([192, 0, 2, last_octet], 53)),
    }
}

#[tokio::test(start_paused = true)]
async fn test_all_nameservers_converge() {
    let nameservers = vec![nameserver("ns1.example.net.", 1), nameserver("ns2.example.net.", 2)];
    let polls: Mutex<HashMap<String, usize>> = Mutex::new(HashMap::new());

    wait_for_nameservers(RECORD, "digest", &nameservers, TIMEOUT, POLL, |ns| {
        let count = {
            let mut polls = polls.lock().unwrap();
            let count = polls.entry(ns.name.clone()).or_insert(0);
            *count += 1;
            *count
        };
        // ns2 lags behind by a few polls
        let ready = ns.name.starts_with("ns1") || count > 3;
        async move {
            Ok(if ready {
                vec!["other".to_string(), "digest".to_string()]
            } else {
                vec![]
            })
        }
    })
    .await
    .unwrap();

    let polls = polls.lock().unwrap();
    assert_eq!(polls["ns1.example.net."], 1);
    assert_eq!(polls["ns2.example.net."], 4);
}

#[tokio::test(start_paused = true)]
async fn test_stale_nameserver_times_out() {
    let nameservers = vec![nameserver("ns1.example.net.", 1), nameserver("ns2.example.net.", 2)];

    let err = wait_for_nameservers(RECORD, "digest", &nameservers, TIMEOUT, POLL, |ns| {
        let values = if ns.name.starts_with("ns1") {
            vec!["digest".to_string()]
        } else {
            vec!["stale".to_string()]
        };
        async move { Ok(values) }
    })
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        Error::PropagationTimeout { record, nameserver }
            if record == RECORD && nameserver == "ns2.example.net."
    ));
}

#[tokio::test(start_paused = true)]
async fn test_value_containing_digest_is_accepted() {
    let nameservers = vec![nameserver("ns1.example.net.", 1)];
    let polls = AtomicUsize::new(0);

    wait_for_nameservers(RECORD, "digest", &nameservers, TIMEOUT, POLL, |_| {
        polls.fetch_add(1, Ordering::SeqCst);
        async { Ok(vec!["\"digest\"".to_string()]) }
    })
    .await
    .unwrap();

    assert_eq!(polls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_query_errors_keep_polling() {
    let nameservers = vec![nameserver("ns1.example.net.", 1)];
    let attempts = AtomicUsize::new(0);

    wait_for_nameservers(RECORD, "digest", &nameservers, TIMEOUT, POLL, |_| {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt < 2 {
                Err(Error::Resolution {
                    name: RECORD.to_string(),
                    reason: "timed out".to_string(),
                })
            } else {
                Ok(vec!["digest".to_string()])
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_per_nameserver() {
    let nameservers = vec![nameserver("ns1.example.net.", 1)];
    let started = Instant::now();

    let result = wait_for_nameservers(RECORD, "digest", &nameservers, TIMEOUT, POLL, |_| async {
        Ok(Vec::new())
    })
    .await;

    assert!(result.is_err());
    let elapsed = started.elapsed();
    assert!(elapsed >= TIMEOUT);
    assert!(elapsed < TIMEOUT + POLL * 2);
}

#[tokio::test]
async fn test_invalid_record_name_fails_fast() {
    let observer = DnsRecordObserver::new(TIMEOUT);
    let err = observer
        .wait_for_record("bad..name", "example.com.", "digest")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Resolution { .. }));
}
