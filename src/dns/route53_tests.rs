// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `dns/route53.rs`

use super::*;
use aws_sdk_route53::types::HostedZoneConfig;

fn hosted_zone(id: &str, name: &str, private: Option<bool>) -> HostedZone {
    let mut builder = HostedZone::builder()
        .id(id)
        .name(name)
        .caller_reference("test");
    if let Some(private) = private {
        builder = builder.config(HostedZoneConfig::builder().private_zone(private).build());
    }
    builder.build().unwrap()
}

#[test]
fn test_zone_from_hosted_strips_prefix() {
    let zone = zone_from_hosted(&hosted_zone("/hostedzone/Z123", "example.com.", Some(false)));

    assert_eq!(zone.id, "Z123");
    assert_eq!(zone.name, "example.com.");
    assert!(!zone.private);
}

#[test]
fn test_zone_without_config_is_public() {
    let zone = zone_from_hosted(&hosted_zone("Z9", "example.org.", None));
    assert_eq!(zone.id, "Z9");
    assert!(!zone.private);
}

#[test]
fn test_private_zone_flag() {
    let zone = zone_from_hosted(&hosted_zone("/hostedzone/Z1", "internal.", Some(true)));
    assert!(zone.private);
}

#[test]
fn test_challenge_change_upsert() {
    let batch = challenge_change(ChangeAction::Upsert, "_acme-challenge.example.com.", "digest").unwrap();

    let change = &batch.changes()[0];
    assert_eq!(*change.action(), ChangeAction::Upsert);

    let record_set = change.resource_record_set().unwrap();
    assert_eq!(record_set.name(), "_acme-challenge.example.com.");
    assert_eq!(*record_set.r#type(), RrType::Txt);
    assert_eq!(record_set.ttl(), Some(60));
    assert_eq!(record_set.resource_records()[0].value(), "\"digest\"");
}

#[test]
fn test_challenge_change_delete_matches_upsert_record() {
    let upsert = challenge_change(ChangeAction::Upsert, "_acme-challenge.example.com.", "digest").unwrap();
    let delete = challenge_change(ChangeAction::Delete, "_acme-challenge.example.com.", "digest").unwrap();

    assert_eq!(*delete.changes()[0].action(), ChangeAction::Delete);
    assert_eq!(
        upsert.changes()[0].resource_record_set(),
        delete.changes()[0].resource_record_set()
    );
}

#[test]
fn test_strip_prefix() {
    assert_eq!(strip_prefix("/change/C2682N5HXP0BZ4", CHANGE_PREFIX), "C2682N5HXP0BZ4");
    assert_eq!(strip_prefix("C2682N5HXP0BZ4", CHANGE_PREFIX), "C2682N5HXP0BZ4");
}
