// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `secrets.rs`

use super::*;
use chrono::{TimeZone, Utc};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
}

fn secret_with(annotations: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some("www-example-com-tls".to_string()),
            namespace: Some("default".to_string()),
            annotations: Some(
                annotations
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            ),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn domains(names: &[&str]) -> Vec<String> {
    names.iter().map(|d| (*d).to_string()).collect()
}

fn response() -> CertificateResponse {
    CertificateResponse {
        domains: domains(&["www.example.com", "example.com"]),
        certificate_files: BTreeMap::from([
            ("certificate.pem".to_string(), STANDARD.encode("CERT")),
            ("key.pem".to_string(), STANDARD.encode("KEY")),
        ]),
        expiry_date: Utc.with_ymd_and_hms(2025, 6, 8, 12, 30, 0).unwrap(),
        ca: "https://acme.test/directory".to_string(),
    }
}

#[test]
fn test_parse_single_domain() {
    assert_eq!(parse_domains("www.example.com").unwrap(), domains(&["www.example.com"]));
}

#[test]
fn test_parse_domain_array() {
    let parsed = parse_domains(r#"["a.example.com", "b.example.com"]"#).unwrap();
    assert_eq!(parsed, domains(&["a.example.com", "b.example.com"]));
}

#[test]
fn test_parse_empty_array_has_no_domains() {
    assert!(matches!(parse_domains("[]"), Err(Error::NoDomains)));
}

#[test]
fn test_parse_malformed_array() {
    assert!(matches!(
        parse_domains(r#"["a.example.com""#),
        Err(Error::InvalidAnnotation { .. })
    ));
}

#[test]
fn test_default_secret_name() {
    let name = secret_name(&domains(&["www.example.com"]), None).unwrap();
    assert_eq!(name, "www-example-com-tls");
}

#[test]
fn test_secret_name_override() {
    let name = secret_name(&domains(&["a.example.com", "b.example.com"]), Some("shared")).unwrap();
    assert_eq!(name, "shared");
}

#[test]
fn test_multiple_domains_require_secret_name() {
    let result = secret_name(&domains(&["a.example.com", "b.example.com"]), None);
    assert!(matches!(result, Err(Error::SecretNameRequired)));
}

#[test]
fn test_empty_override_is_rejected() {
    let err = secret_name(&domains(&["example.com"]), Some("")).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidAnnotation { key, .. } if key == SECRET_NAME_ANNOTATION
    ));
}

#[test]
fn test_expiring_within_window() {
    let secret = secret_with(&[(EXPIRY_ANNOTATION, "2025-03-12")]);
    assert!(certificate_is_expiring(&secret, today()));

    let secret = secret_with(&[(EXPIRY_ANNOTATION, "2025-03-01")]);
    assert!(certificate_is_expiring(&secret, today()));
}

#[test]
fn test_not_expiring_outside_window() {
    let secret = secret_with(&[(EXPIRY_ANNOTATION, "2025-03-13")]);
    assert!(!certificate_is_expiring(&secret, today()));
}

#[test]
fn test_missing_expiry_is_not_expiring() {
    assert!(!certificate_is_expiring(&secret_with(&[]), today()));
    assert!(!certificate_is_expiring(
        &secret_with(&[(EXPIRY_ANNOTATION, "soon")]),
        today()
    ));
}

#[test]
fn test_domains_unchanged_ignores_order() {
    let secret = secret_with(&[(REQUEST_ANNOTATION, r#"["b.example.com","a.example.com"]"#)]);
    assert!(!have_domains_changed(&domains(&["a.example.com", "b.example.com"]), &secret));
}

#[test]
fn test_domains_added_or_removed() {
    let secret = secret_with(&[(REQUEST_ANNOTATION, r#"["a.example.com"]"#)]);
    assert!(have_domains_changed(&domains(&["a.example.com", "b.example.com"]), &secret));

    let secret = secret_with(&[(REQUEST_ANNOTATION, r#"["a.example.com","b.example.com"]"#)]);
    assert!(have_domains_changed(&domains(&["a.example.com"]), &secret));
}

#[test]
fn test_duplicate_domain_count_is_changed() {
    let secret = secret_with(&[
        (REQUEST_ANNOTATION, r#"["a.example.com"]"#),
        (EXPIRY_ANNOTATION, "2025-06-01"),
    ]);
    let requested = domains(&["a.example.com", "a.example.com"]);

    assert!(have_domains_changed(&requested, &secret));
    assert_eq!(
        decide_renewal(&requested, Some(&secret), today()),
        RenewalDecision::Renew
    );
}

#[test]
fn test_missing_domain_annotation_is_unchanged() {
    assert!(!have_domains_changed(&domains(&["a.example.com"]), &secret_with(&[])));
}

#[test]
fn test_unreadable_domain_annotation_is_changed() {
    let secret = secret_with(&[(REQUEST_ANNOTATION, "a.example.com")]);
    assert!(have_domains_changed(&domains(&["a.example.com"]), &secret));
}

#[test]
fn test_decide_renewal() {
    let requested = domains(&["a.example.com"]);
    assert_eq!(decide_renewal(&requested, None, today()), RenewalDecision::New);

    let current = secret_with(&[
        (REQUEST_ANNOTATION, r#"["a.example.com"]"#),
        (EXPIRY_ANNOTATION, "2025-06-01"),
    ]);
    assert_eq!(
        decide_renewal(&requested, Some(&current), today()),
        RenewalDecision::UpToDate
    );

    let expiring = secret_with(&[
        (REQUEST_ANNOTATION, r#"["a.example.com"]"#),
        (EXPIRY_ANNOTATION, "2025-03-11"),
    ]);
    assert_eq!(
        decide_renewal(&requested, Some(&expiring), today()),
        RenewalDecision::Renew
    );

    let changed = secret_with(&[
        (REQUEST_ANNOTATION, r#"["b.example.com"]"#),
        (EXPIRY_ANNOTATION, "2025-06-01"),
    ]);
    assert_eq!(
        decide_renewal(&requested, Some(&changed), today()),
        RenewalDecision::Renew
    );
}

#[test]
fn test_certificate_annotations() {
    let annotations = certificate_annotations(&response()).unwrap();

    assert_eq!(
        annotations[REQUEST_ANNOTATION],
        r#"["www.example.com","example.com"]"#
    );
    assert_eq!(annotations[EXPIRY_ANNOTATION], "2025-06-08");
    assert_eq!(annotations[ACME_CA_ANNOTATION], "https://acme.test/directory");
}

#[test]
fn test_certificate_data_is_decoded() {
    let data = certificate_data(&response()).unwrap();

    assert_eq!(data["certificate.pem"], ByteString(b"CERT".to_vec()));
    assert_eq!(data["key.pem"], ByteString(b"KEY".to_vec()));
}

#[test]
fn test_certificate_data_rejects_invalid_base64() {
    let mut bad = response();
    bad.certificate_files
        .insert("chain.pem".to_string(), "not base64!".to_string());
    assert!(matches!(certificate_data(&bad), Err(Error::Acme(_))));
}

#[test]
fn test_new_certificate_secret() {
    let secret = certificate_secret("web", "shared", &response()).unwrap();

    assert_eq!(secret.metadata.name.as_deref(), Some("shared"));
    assert_eq!(secret.metadata.namespace.as_deref(), Some("web"));
    assert_eq!(secret.data.as_ref().map(BTreeMap::len), Some(2));
}

#[test]
fn test_update_keeps_unrelated_metadata() {
    let mut existing = secret_with(&[
        ("team", "payments"),
        (EXPIRY_ANNOTATION, "2025-03-11"),
    ]);
    existing.metadata.resource_version = Some("42".to_string());
    existing.data = Some(BTreeMap::from([(
        "old.pem".to_string(),
        ByteString(b"OLD".to_vec()),
    )]));

    let updated = updated_certificate_secret(existing, &response()).unwrap();
    let annotations = updated.metadata.annotations.unwrap();

    assert_eq!(annotations["team"], "payments");
    assert_eq!(annotations[EXPIRY_ANNOTATION], "2025-06-08");
    assert_eq!(updated.metadata.resource_version.as_deref(), Some("42"));
    assert!(!updated.data.unwrap().contains_key("old.pem"));
}

#[test]
fn test_secret_name_override_annotation() {
    let annotations = BTreeMap::from([(SECRET_NAME_ANNOTATION.to_string(), "custom".to_string())]);
    assert_eq!(secret_name_override(&annotations), Some("custom"));
    assert_eq!(secret_name_override(&BTreeMap::new()), None);
}
