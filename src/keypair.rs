// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! ACME account credentials, persisted as a Kubernetes secret.
//!
//! The account key identifies the controller to the certificate authority and
//! must survive restarts. The serialized account credentials (key, account
//! URL and directory) are read once at startup from
//! `kube-system/letsencrypt-keypair`; when the secret is missing a new account
//! is registered and its credentials stored before the controller continues.
//!
//! The secret records the directory URL it was registered against in the
//! `acme/ca` annotation. Credentials of another directory, or a bare PEM key
//! left by an earlier release, are treated as absent and replaced by a new
//! registration.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, PostParams};
use kube::Client;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::constants::{ACME_CA_ANNOTATION, KEYPAIR_FIELD, KEYPAIR_SECRET_NAME, SYSTEM_NAMESPACE};
use crate::errors::{Error, Result};
use crate::reconcilers::retry::retry_api_call;

/// Persistence of the serialized ACME account credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Stored credentials JSON for `directory_url`, if any.
    async fn load_credentials_json(&self, directory_url: &str) -> Result<Option<String>>;

    /// Store credentials JSON, replacing whatever was stored before.
    async fn save_credentials_json(&self, directory_url: &str, json: &str) -> Result<()>;
}

/// [`CredentialStore`] backed by the account key secret.
#[derive(Clone)]
pub struct KubeCredentialStore {
    client: Client,
}

impl KubeCredentialStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self) -> Api<Secret> {
        Api::namespaced(self.client.clone(), SYSTEM_NAMESPACE)
    }
}

#[async_trait]
impl CredentialStore for KubeCredentialStore {
    async fn load_credentials_json(&self, directory_url: &str) -> Result<Option<String>> {
        let api = self.api();
        let existing = retry_api_call(
            || async { api.get_opt(KEYPAIR_SECRET_NAME).await },
            "get account key secret",
        )
        .await?;

        match existing {
            Some(secret) => credentials_from_secret(&secret, directory_url),
            None => {
                info!("No account key secret in cluster");
                Ok(None)
            }
        }
    }

    async fn save_credentials_json(&self, directory_url: &str, json: &str) -> Result<()> {
        let api = self.api();
        let mut secret = credentials_secret(directory_url, json);

        let existing = retry_api_call(
            || async { api.get_opt(KEYPAIR_SECRET_NAME).await },
            "get account key secret",
        )
        .await?;

        match existing {
            Some(current) => {
                secret.metadata.resource_version = current.metadata.resource_version;
                api.replace(KEYPAIR_SECRET_NAME, &PostParams::default(), &secret)
                    .await?;
            }
            None => {
                api.create(&PostParams::default(), &secret).await?;
            }
        }
        info!(
            namespace = SYSTEM_NAMESPACE,
            secret = KEYPAIR_SECRET_NAME,
            "Account credentials stored in cluster"
        );
        Ok(())
    }
}

/// Read the credentials JSON from the account key secret.
///
/// Returns `None` when the secret belongs to another directory or holds a
/// bare PEM key instead of credentials.
///
/// # Errors
///
/// Returns [`Error::KeyPair`] if the secret lacks the key field or the field
/// is not UTF-8.
pub fn credentials_from_secret(secret: &Secret, directory_url: &str) -> Result<Option<String>> {
    let bytes = secret
        .data
        .as_ref()
        .and_then(|data| data.get(KEYPAIR_FIELD))
        .ok_or_else(|| {
            Error::KeyPair(format!(
                "Secret {SYSTEM_NAMESPACE}/{KEYPAIR_SECRET_NAME} has no '{KEYPAIR_FIELD}' field"
            ))
        })?;

    let stored = std::str::from_utf8(&bytes.0)
        .map_err(|e| Error::KeyPair(format!("Account key is not valid UTF-8: {e}")))?
        .trim();

    let registered_at = secret
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(ACME_CA_ANNOTATION));
    if let Some(registered_at) = registered_at.filter(|url| *url != directory_url) {
        warn!(
            registered_at = %registered_at,
            ca = %directory_url,
            "Stored ACME account belongs to another directory"
        );
        return Ok(None);
    }

    if !stored.starts_with('{') {
        warn!("Stored account key is not in credential format");
        return Ok(None);
    }

    info!("Existing account credentials loaded from cluster");
    Ok(Some(stored.to_string()))
}

/// Build the secret persisting the account credentials.
#[must_use]
pub fn credentials_secret(directory_url: &str, json: &str) -> Secret {
    let data = BTreeMap::from([(
        KEYPAIR_FIELD.to_string(),
        ByteString(json.as_bytes().to_vec()),
    )]);

    Secret {
        metadata: ObjectMeta {
            name: Some(KEYPAIR_SECRET_NAME.to_string()),
            namespace: Some(SYSTEM_NAMESPACE.to_string()),
            annotations: Some(BTreeMap::from([(
                ACME_CA_ANNOTATION.to_string(),
                directory_url.to_string(),
            )])),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

#[cfg(test)]
#[path = "keypair_tests.rs"]
mod keypair_tests;
