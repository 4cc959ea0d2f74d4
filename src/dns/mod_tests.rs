// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for zone selection

use super::*;

fn zone(id: &str, name: &str, private: bool) -> Zone {
    Zone {
        id: id.to_string(),
        name: name.to_string(),
        private,
    }
}

#[test]
fn test_fqdn() {
    assert_eq!(fqdn("example.com"), "example.com.");
    assert_eq!(fqdn("example.com."), "example.com.");
}

#[test]
fn test_longest_suffix_wins() {
    let zones = vec![
        zone("1", "example.com.", false),
        zone("2", "sub.example.com.", false),
    ];

    let selected = select_zone("_acme-challenge.www.sub.example.com.", zones).unwrap();
    assert_eq!(selected.id, "2");
}

#[test]
fn test_public_zone_wins_tie() {
    let zones = vec![
        zone("private", "example.com.", true),
        zone("public", "example.com.", false),
    ];

    let selected = select_zone("_acme-challenge.example.com.", zones).unwrap();
    assert_eq!(selected.id, "public");
}

#[test]
fn test_private_zone_used_when_only_match() {
    let zones = vec![
        zone("private", "internal.example.com.", true),
        zone("public", "example.com.", false),
    ];

    let selected = select_zone("_acme-challenge.app.internal.example.com", zones).unwrap();
    assert_eq!(selected.id, "private");
}

#[test]
fn test_first_zone_kept_on_identical_candidates() {
    let zones = vec![
        zone("first", "example.com.", false),
        zone("second", "example.com.", false),
    ];

    let selected = select_zone("_acme-challenge.example.com.", zones).unwrap();
    assert_eq!(selected.id, "first");
}

#[test]
fn test_suffix_must_be_label_aligned() {
    let zones = vec![zone("1", "ample.com.", false)];
    assert!(select_zone("_acme-challenge.example.com.", zones).is_none());
}

#[test]
fn test_zone_names_compare_case_insensitively() {
    let zones = vec![zone("1", "Example.COM.", false)];
    assert!(select_zone("_acme-challenge.www.example.com", zones).is_some());
}

#[test]
fn test_no_matching_zone() {
    let zones = vec![zone("1", "example.org.", false)];
    assert!(select_zone("_acme-challenge.example.com.", zones).is_none());
}

#[test]
fn test_quote_txt_value() {
    assert_eq!(quote_txt_value("abc"), "\"abc\"");
    assert_eq!(quote_txt_value("\"abc\""), "\"abc\"");
}
