// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `errors.rs`

use super::*;

#[test]
fn test_acme_error_keeps_original_message() {
    let err = Error::Acme("Must agree to subscriber agreement before any further actions".into());
    assert!(err.to_string().contains("Must agree to subscriber agreement"));
}

#[test]
fn test_secret_name_required_mentions_annotation() {
    let err = Error::SecretNameRequired;
    assert_eq!(
        err.to_string(),
        "acme/secretName must be specified if multiple domains are requested"
    );
}

#[test]
fn test_propagation_timeout_display() {
    let err = Error::PropagationTimeout {
        record: "_acme-challenge.example.com.".into(),
        nameserver: "ns1.example.com.".into(),
    };
    let msg = err.to_string();
    assert!(msg.contains("_acme-challenge.example.com."));
    assert!(msg.contains("ns1.example.com."));
}

#[test]
fn test_categories() {
    assert_eq!(Error::Acme(String::new()).category(), "acme");
    assert_eq!(
        Error::InvalidChallenge {
            domain: "a.example.com".into(),
            reason: String::new()
        }
        .category(),
        "acme"
    );
    assert_eq!(
        Error::NoMatchingZone {
            record: "x.".into()
        }
        .category(),
        "dns_provider"
    );
    assert_eq!(
        Error::Resolution {
            name: "x.".into(),
            reason: String::new()
        }
        .category(),
        "propagation"
    );
    assert_eq!(Error::NoDomains.category(), "annotation");
    assert_eq!(Error::WatchLost(String::new()).category(), "kubernetes");
}
