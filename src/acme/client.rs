// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! ACME account and order handling on top of `instant-acme`.
//!
//! [`CaAccount`] and [`CaOrder`] are the operations the orchestrator needs
//! from a certificate authority. [`AcmeAccount`] implements them with an
//! `instant_acme::Account` whose credentials live in a [`CredentialStore`].

use async_trait::async_trait;
pub use instant_acme::OrderStatus;
use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus, ChallengeType, Identifier, NewAccount,
    NewOrder, Order,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::errors::{Error, Result};
use crate::keypair::CredentialStore;

/// A DNS-01 challenge the CA expects to see published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChallenge {
    /// Domain being authorized, without wildcard prefix
    pub domain: String,
    /// Challenge URL, used to tell the CA the record is in place
    pub url: String,
    /// TXT value to publish under `_acme-challenge.<domain>`
    pub dns_value: String,
}

/// An authorization the CA marked invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAuthorization {
    pub domain: String,
    pub reason: String,
}

/// Registered account at a certificate authority.
#[async_trait]
pub trait CaAccount: Send + Sync {
    /// Open an order covering `domains`.
    async fn new_order(&self, domains: &[String]) -> Result<Box<dyn CaOrder>>;

    /// Accept the current subscriber agreement.
    async fn agree_to_terms(&self) -> Result<()>;
}

/// One certificate order.
#[async_trait]
pub trait CaOrder: Send {
    /// DNS-01 challenges of all authorizations that are not valid yet.
    async fn pending_challenges(&mut self) -> Result<Vec<PendingChallenge>>;

    /// Ask the CA to validate `challenge`.
    async fn set_ready(&mut self, challenge: &PendingChallenge) -> Result<()>;

    /// Fetch the current order status.
    async fn refresh(&mut self) -> Result<OrderStatus>;

    /// Authorizations of the order the CA marked invalid.
    async fn failed_authorizations(&mut self) -> Result<Vec<FailedAuthorization>>;

    /// Submit the DER encoded CSR.
    async fn finalize(&mut self, csr_der: &[u8]) -> Result<()>;

    /// Download the PEM certificate chain of a valid order.
    async fn certificate(&mut self) -> Result<Option<String>>;
}

/// Whether an error message from the CA asks for the subscriber agreement.
pub fn requires_agreement(message: &str) -> bool {
    message.contains("userActionRequired") || message.to_ascii_lowercase().contains("agree to")
}

fn acme_error(e: instant_acme::Error) -> Error {
    Error::Acme(e.to_string())
}

/// [`CaAccount`] backed by `instant-acme`.
pub struct AcmeAccount {
    directory_url: String,
    store: Arc<dyn CredentialStore>,
    account: RwLock<Account>,
}

impl AcmeAccount {
    /// Restore the stored account for `directory_url`, registering a new one
    /// when none is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if stored credentials are unreadable, the CA refuses
    /// them, or registration fails.
    pub async fn load_or_register(
        directory_url: &str,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        let account = match store.load_credentials_json(directory_url).await? {
            Some(json) => {
                let credentials: AccountCredentials = serde_json::from_str(&json)
                    .map_err(|e| Error::KeyPair(format!("Failed to parse account credentials: {e}")))?;
                let account = Account::builder()
                    .map_err(acme_error)?
                    .from_credentials(credentials)
                    .await
                    .map_err(acme_error)?;
                info!(ca = %directory_url, "Restored ACME account");
                account
            }
            None => register(directory_url, store.as_ref()).await?,
        };

        Ok(Self {
            directory_url: directory_url.to_string(),
            store,
            account: RwLock::new(account),
        })
    }
}

/// Register an account that agrees to the current terms and store it.
async fn register(directory_url: &str, store: &dyn CredentialStore) -> Result<Account> {
    info!(ca = %directory_url, "Registering ACME account");
    let (account, credentials) = Account::builder()
        .map_err(acme_error)?
        .create(
            &NewAccount {
                contact: &[],
                terms_of_service_agreed: true,
                only_return_existing: false,
            },
            directory_url.to_owned(),
            None,
        )
        .await
        .map_err(acme_error)?;

    let json = serde_json::to_string(&credentials)
        .map_err(|e| Error::KeyPair(format!("Failed to serialize account credentials: {e}")))?;
    store.save_credentials_json(directory_url, &json).await?;

    info!(ca = %directory_url, "Registered ACME account");
    Ok(account)
}

#[async_trait]
impl CaAccount for AcmeAccount {
    async fn new_order(&self, domains: &[String]) -> Result<Box<dyn CaOrder>> {
        let identifiers: Vec<Identifier> = domains.iter().map(|d| Identifier::Dns(d.clone())).collect();
        let order = self
            .account
            .read()
            .await
            .new_order(&NewOrder::new(&identifiers))
            .await
            .map_err(acme_error)?;
        debug!(domains = ?domains, "Created ACME order");
        Ok(Box::new(AcmeOrder { order }))
    }

    async fn agree_to_terms(&self) -> Result<()> {
        let account = register(&self.directory_url, self.store.as_ref()).await?;
        *self.account.write().await = account;
        Ok(())
    }
}

/// [`CaOrder`] backed by an `instant_acme::Order`.
struct AcmeOrder {
    order: Order,
}

#[async_trait]
impl CaOrder for AcmeOrder {
    async fn pending_challenges(&mut self) -> Result<Vec<PendingChallenge>> {
        let mut pending = Vec::new();
        let mut authorizations = self.order.authorizations();

        while let Some(result) = authorizations.next().await {
            let mut authz = result.map_err(acme_error)?;
            let domain = match &authz.identifier().identifier {
                Identifier::Dns(domain) => domain.trim_start_matches("*.").to_string(),
                other => return Err(Error::Acme(format!("Unsupported identifier {other:?}"))),
            };

            match &authz.status {
                AuthorizationStatus::Valid => {
                    info!(domain = %domain, "Authorization already valid");
                    continue;
                }
                AuthorizationStatus::Pending => {}
                status => {
                    return Err(Error::InvalidChallenge {
                        domain,
                        reason: format!("authorization is {status:?}"),
                    })
                }
            }

            let challenge = authz
                .challenge(ChallengeType::Dns01)
                .ok_or_else(|| Error::Acme(format!("No dns-01 challenge offered for '{domain}'")))?;
            pending.push(PendingChallenge {
                url: challenge.url.clone(),
                dns_value: challenge.key_authorization().dns_value(),
                domain,
            });
        }

        Ok(pending)
    }

    async fn set_ready(&mut self, challenge: &PendingChallenge) -> Result<()> {
        let mut authorizations = self.order.authorizations();
        while let Some(result) = authorizations.next().await {
            let mut authz = result.map_err(acme_error)?;
            let matching_type = authz
                .challenges
                .iter()
                .find(|c| c.url == challenge.url)
                .map(|c| c.r#type.clone());

            if let Some(challenge_type) = matching_type {
                if let Some(mut handle) = authz.challenge(challenge_type) {
                    return handle.set_ready().await.map_err(acme_error);
                }
            }
        }

        Err(Error::Acme(format!(
            "Challenge {} for '{}' is not part of the order",
            challenge.url, challenge.domain
        )))
    }

    async fn refresh(&mut self) -> Result<OrderStatus> {
        let state = self.order.refresh().await.map_err(acme_error)?;
        Ok(state.status)
    }

    async fn failed_authorizations(&mut self) -> Result<Vec<FailedAuthorization>> {
        let mut failed = Vec::new();
        let mut authorizations = self.order.authorizations();

        while let Some(result) = authorizations.next().await {
            let authz = result.map_err(acme_error)?;
            if authz.status != AuthorizationStatus::Invalid {
                continue;
            }
            let domain = match &authz.identifier().identifier {
                Identifier::Dns(domain) => domain.clone(),
                other => format!("{other:?}"),
            };
            let reason = authz
                .challenges
                .iter()
                .find_map(|c| c.error.as_ref())
                .map_or_else(|| "no reason given".to_string(), ToString::to_string);
            failed.push(FailedAuthorization { domain, reason });
        }

        Ok(failed)
    }

    async fn finalize(&mut self, csr_der: &[u8]) -> Result<()> {
        self.order.finalize_csr(csr_der).await.map_err(acme_error)
    }

    async fn certificate(&mut self) -> Result<Option<String>> {
        self.order.certificate().await.map_err(acme_error)
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod client_tests;
