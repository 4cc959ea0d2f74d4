// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Certificate secrets and the renewal policy.
//!
//! A certificate secret carries three annotations next to its data:
//!
//! - `acme/certificate`: JSON array of the domains the certificate covers
//! - `acme/expiryDate`: expiry as an ISO calendar date (`YYYY-MM-DD`)
//! - `acme/ca`: ACME directory URL of the issuing CA
//!
//! A secret is renewed when it expires within [`RENEWAL_WINDOW_DAYS`] days
//! or when the requested domains differ from the stored ones.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{Days, NaiveDate};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, PostParams};
use kube::Client;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use super::retry::retry_api_call;
use crate::constants::{
    ACME_CA_ANNOTATION, EXPIRY_ANNOTATION, RENEWAL_WINDOW_DAYS, REQUEST_ANNOTATION,
    SECRET_NAME_ANNOTATION, SECRET_NAME_SUFFIX,
};
use crate::errors::{Error, Result};
use crate::model::CertificateResponse;

/// What to do with the certificate of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalDecision {
    /// No secret exists yet
    New,
    /// The secret exists but is expiring or covers other domains
    Renew,
    /// The secret is current
    UpToDate,
}

/// Reads and writes certificate secrets.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    async fn insert_certificate(
        &self,
        namespace: &str,
        name: &str,
        certificate: &CertificateResponse,
    ) -> Result<()>;

    async fn update_certificate(
        &self,
        namespace: &str,
        name: &str,
        certificate: &CertificateResponse,
    ) -> Result<()>;
}

/// [`SecretStore`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
}

impl KubeSecretStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        retry_api_call(
            || async { api.get_opt(name).await },
            &format!("get secret {namespace}/{name}"),
        )
        .await
    }

    async fn insert_certificate(
        &self,
        namespace: &str,
        name: &str,
        certificate: &CertificateResponse,
    ) -> Result<()> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = certificate_secret(namespace, name, certificate)?;
        api.create(&PostParams::default(), &secret).await?;
        info!(namespace = %namespace, secret = %name, "Stored certificate secret");
        Ok(())
    }

    async fn update_certificate(
        &self,
        namespace: &str,
        name: &str,
        certificate: &CertificateResponse,
    ) -> Result<()> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let existing = retry_api_call(
            || async { api.get(name).await },
            &format!("get secret {namespace}/{name}"),
        )
        .await?;

        let secret = updated_certificate_secret(existing, certificate)?;
        api.replace(name, &PostParams::default(), &secret).await?;
        info!(namespace = %namespace, secret = %name, "Updated certificate secret");
        Ok(())
    }
}

/// Parse the request annotation: a single domain or a JSON array of domains.
///
/// # Errors
///
/// Returns [`Error::NoDomains`] for an empty array and
/// [`Error::InvalidAnnotation`] for a malformed array.
pub fn parse_domains(annotation: &str) -> Result<Vec<String>> {
    let value = annotation.trim();
    if !value.starts_with('[') {
        return Ok(vec![value.to_string()]);
    }

    let domains: Vec<String> =
        serde_json::from_str(value).map_err(|e| Error::InvalidAnnotation {
            key: REQUEST_ANNOTATION.to_string(),
            reason: e.to_string(),
        })?;
    if domains.is_empty() {
        return Err(Error::NoDomains);
    }
    Ok(domains)
}

/// Secret name for a request: the explicit override, or the hyphenated
/// domain with a `-tls` suffix.
///
/// # Errors
///
/// Returns [`Error::SecretNameRequired`] when several domains are requested
/// without an override, and [`Error::InvalidAnnotation`] for an empty override.
pub fn secret_name(domains: &[String], override_name: Option<&str>) -> Result<String> {
    match override_name {
        Some("") => {
            return Err(Error::InvalidAnnotation {
                key: SECRET_NAME_ANNOTATION.to_string(),
                reason: "secret name must not be empty".to_string(),
            });
        }
        Some(name) => return Ok(name.to_string()),
        None => {}
    }

    match domains {
        [] => Err(Error::NoDomains),
        [domain] => Ok(format!("{}{SECRET_NAME_SUFFIX}", domain.replace('.', "-"))),
        _ => Err(Error::SecretNameRequired),
    }
}

/// Decide whether the certificate for `domains` needs to be requested.
#[must_use]
pub fn decide_renewal(domains: &[String], existing: Option<&Secret>, today: NaiveDate) -> RenewalDecision {
    let Some(secret) = existing else {
        return RenewalDecision::New;
    };

    if certificate_is_expiring(secret, today) || have_domains_changed(domains, secret) {
        RenewalDecision::Renew
    } else {
        RenewalDecision::UpToDate
    }
}

/// Whether the stored certificate expires within the renewal window.
///
/// A missing or unreadable expiry annotation is treated as not expiring.
#[must_use]
pub fn certificate_is_expiring(secret: &Secret, today: NaiveDate) -> bool {
    let name = secret_display_name(secret);
    let Some(value) = annotation(secret, EXPIRY_ANNOTATION) else {
        warn!(secret = %name, "Certificate secret has no expiry annotation");
        return false;
    };

    let expiry = match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(expiry) => expiry,
        Err(e) => {
            warn!(secret = %name, value = %value, error = %e, "Unreadable expiry annotation");
            return false;
        }
    };

    let threshold = today
        .checked_add_days(Days::new(RENEWAL_WINDOW_DAYS))
        .unwrap_or(NaiveDate::MAX);
    let expiring = expiry <= threshold;
    if expiring {
        info!(secret = %name, expiry = %expiry, "Certificate is expiring");
    }
    expiring
}

/// Whether the requested domains differ from those stored on the secret.
///
/// A missing annotation counts as unchanged, an unreadable one as changed.
#[must_use]
pub fn have_domains_changed(domains: &[String], secret: &Secret) -> bool {
    let name = secret_display_name(secret);
    let Some(value) = annotation(secret, REQUEST_ANNOTATION) else {
        warn!(secret = %name, "Certificate secret has no domain annotation");
        return false;
    };

    let stored: Vec<String> = match serde_json::from_str(value) {
        Ok(stored) => stored,
        Err(e) => {
            warn!(secret = %name, value = %value, error = %e, "Unreadable domain annotation");
            return true;
        }
    };

    let requested: BTreeSet<&String> = domains.iter().collect();
    let stored_set: BTreeSet<&String> = stored.iter().collect();
    let changed = domains.len() != stored.len() || requested != stored_set;
    if changed {
        info!(secret = %name, requested = ?domains, stored = ?stored, "Certificate domains changed");
    }
    changed
}

/// Annotations recorded on a certificate secret.
///
/// # Errors
///
/// Fails only if the domain list cannot be serialized.
pub fn certificate_annotations(certificate: &CertificateResponse) -> Result<BTreeMap<String, String>> {
    let domains = serde_json::to_string(&certificate.domains).map_err(|e| Error::InvalidAnnotation {
        key: REQUEST_ANNOTATION.to_string(),
        reason: e.to_string(),
    })?;

    Ok(BTreeMap::from([
        (REQUEST_ANNOTATION.to_string(), domains),
        (
            EXPIRY_ANNOTATION.to_string(),
            certificate.expiry_date.date_naive().format("%Y-%m-%d").to_string(),
        ),
        (ACME_CA_ANNOTATION.to_string(), certificate.ca.clone()),
    ]))
}

/// Secret data decoded from the base64 payloads of the response.
///
/// # Errors
///
/// Returns [`Error::Acme`] if a payload is not valid base64.
pub fn certificate_data(certificate: &CertificateResponse) -> Result<BTreeMap<String, ByteString>> {
    certificate
        .certificate_files
        .iter()
        .map(|(file, encoded)| {
            STANDARD
                .decode(encoded)
                .map(|bytes| (file.clone(), ByteString(bytes)))
                .map_err(|e| Error::Acme(format!("Invalid payload for '{file}': {e}")))
        })
        .collect()
}

/// Build a new certificate secret.
///
/// # Errors
///
/// Propagates annotation and payload encoding errors.
pub fn certificate_secret(
    namespace: &str,
    name: &str,
    certificate: &CertificateResponse,
) -> Result<Secret> {
    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            annotations: Some(certificate_annotations(certificate)?),
            ..Default::default()
        },
        data: Some(certificate_data(certificate)?),
        ..Default::default()
    })
}

/// Replace data and certificate annotations of an existing secret, keeping
/// its other metadata and resource version.
///
/// # Errors
///
/// Propagates annotation and payload encoding errors.
pub fn updated_certificate_secret(mut secret: Secret, certificate: &CertificateResponse) -> Result<Secret> {
    let annotations = secret.metadata.annotations.get_or_insert_with(BTreeMap::new);
    annotations.extend(certificate_annotations(certificate)?);
    secret.data = Some(certificate_data(certificate)?);
    secret.string_data = None;
    debug!(secret = %secret_display_name(&secret), "Prepared certificate secret update");
    Ok(secret)
}

/// Name of the secret requested by a service, from its annotations.
pub(crate) fn secret_name_override(annotations: &BTreeMap<String, String>) -> Option<&str> {
    annotations.get(SECRET_NAME_ANNOTATION).map(String::as_str)
}

fn annotation<'a>(secret: &'a Secret, key: &str) -> Option<&'a str> {
    secret
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(key))
        .map(String::as_str)
}

fn secret_display_name(secret: &Secret) -> String {
    format!(
        "{}/{}",
        secret.metadata.namespace.as_deref().unwrap_or_default(),
        secret.metadata.name.as_deref().unwrap_or_default()
    )
}

#[cfg(test)]
#[path = "secrets_tests.rs"]
mod secrets_tests;
