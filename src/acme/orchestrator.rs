// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Certificate orchestration against an ACME server.
//!
//! One order is created for all domains. The DNS-01 challenges of its pending
//! authorizations are collected under a lock shared by all requests, then
//! processed in parallel: each digest is published through the
//! [`DnsResponder`] and the [`PropagationCheck`] waits until all authoritative
//! nameservers serve it. Only then is the CA asked to validate. Challenge
//! records are removed once validation finished, whatever the outcome.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::client::{requires_agreement, CaAccount, CaOrder, OrderStatus, PendingChallenge};
use super::csr::{create_csr, generate_rsa_key, parse_chain, private_key_pem, IssuedChain};
use super::CertificateIssuer;
use crate::constants::{
    ACME_CHALLENGE_PREFIX, CHALLENGE_POLL_INTERVAL, CHALLENGE_TIMEOUT, ORDER_POLL_INTERVAL,
    ORDER_TIMEOUT,
};
use crate::dns::observer::PropagationCheck;
use crate::dns::DnsResponder;
use crate::errors::{Error, Result};
use crate::model::{CertificateResponse, SecretFilenames};

/// Drives certificate issuance for the controller.
pub struct AcmeOrchestrator {
    acme_url: String,
    account: Arc<dyn CaAccount>,
    responder: Arc<dyn DnsResponder>,
    observer: Arc<dyn PropagationCheck>,
    filenames: SecretFilenames,
    /// Serializes authorization fetches across concurrent requests
    authorization_lock: Mutex<()>,
    challenge_poll_interval: Duration,
    order_poll_interval: Duration,
}

impl AcmeOrchestrator {
    #[must_use]
    pub fn new(
        acme_url: &str,
        account: Arc<dyn CaAccount>,
        responder: Arc<dyn DnsResponder>,
        observer: Arc<dyn PropagationCheck>,
        filenames: SecretFilenames,
    ) -> Self {
        Self {
            acme_url: acme_url.to_string(),
            account,
            responder,
            observer,
            filenames,
            authorization_lock: Mutex::new(()),
            challenge_poll_interval: CHALLENGE_POLL_INTERVAL,
            order_poll_interval: ORDER_POLL_INTERVAL,
        }
    }

    /// Override the challenge and order status poll intervals.
    #[must_use]
    pub fn with_poll_intervals(mut self, challenge: Duration, order: Duration) -> Self {
        self.challenge_poll_interval = challenge;
        self.order_poll_interval = order;
        self
    }

    async fn request_once(&self, domains: &[String]) -> Result<CertificateResponse> {
        let mut order = self.account.new_order(domains).await?;

        let challenges = {
            let _guard = self.authorization_lock.lock().await;
            order.pending_challenges().await?
        };
        debug!(domains = ?domains, pending = challenges.len(), "Fetched authorizations");

        let outcome = self.authorize(order.as_mut(), &challenges).await;
        self.remove_records(&challenges).await;
        outcome?;

        let (issued, key_pem) = self.sign(order.as_mut(), domains).await?;
        Ok(self.encode_response(domains, issued, &key_pem))
    }

    /// Publish every challenge, then let the CA validate them.
    async fn authorize(&self, order: &mut dyn CaOrder, challenges: &[PendingChallenge]) -> Result<()> {
        if challenges.is_empty() {
            return Ok(());
        }

        // Every domain runs to completion before the first error is reported
        let published = join_all(challenges.iter().map(|challenge| self.publish(challenge))).await;
        published.into_iter().collect::<Result<Vec<()>>>()?;

        for challenge in challenges {
            info!(domain = %challenge.domain, "Triggering challenge validation");
            order.set_ready(challenge).await?;
        }

        self.wait_for_validation(order).await
    }

    async fn publish(&self, challenge: &PendingChallenge) -> Result<()> {
        let record = challenge_record(&challenge.domain);
        info!(domain = %challenge.domain, record = %record, "Publishing DNS-01 challenge");

        let zone_root = self
            .responder
            .add_challenge_record(&record, &challenge.dns_value)
            .await?;
        self.observer
            .wait_for_record(&record, &zone_root, &challenge.dns_value)
            .await
    }

    async fn remove_records(&self, challenges: &[PendingChallenge]) {
        join_all(challenges.iter().map(|challenge| async move {
            let record = challenge_record(&challenge.domain);
            if let Err(e) = self
                .responder
                .remove_challenge_record(&record, &challenge.dns_value)
                .await
            {
                warn!(domain = %challenge.domain, record = %record, error = %e, "Failed to remove challenge record");
            }
        }))
        .await;
    }

    /// Poll until the CA has validated every challenge of the order.
    async fn wait_for_validation(&self, order: &mut dyn CaOrder) -> Result<()> {
        let deadline = Instant::now() + CHALLENGE_TIMEOUT;
        loop {
            match order.refresh().await? {
                OrderStatus::Ready | OrderStatus::Processing | OrderStatus::Valid => {
                    info!("Challenges validated");
                    return Ok(());
                }
                OrderStatus::Invalid => {
                    let failed = order.failed_authorizations().await?;
                    return Err(match failed.into_iter().next() {
                        Some(authorization) => Error::InvalidChallenge {
                            domain: authorization.domain,
                            reason: authorization.reason,
                        },
                        None => Error::Acme("Order became invalid during validation".to_string()),
                    });
                }
                OrderStatus::Pending => {
                    if Instant::now() >= deadline {
                        return Err(Error::Acme(
                            "Timed out waiting for challenge validation".to_string(),
                        ));
                    }
                    tokio::time::sleep(self.challenge_poll_interval).await;
                }
            }
        }
    }

    /// Finalize the order with a fresh certificate key and download the chain.
    async fn sign(&self, order: &mut dyn CaOrder, domains: &[String]) -> Result<(IssuedChain, String)> {
        info!(domains = ?domains, "Signing certificate");
        let certificate_key = tokio::task::spawn_blocking(generate_rsa_key)
            .await
            .map_err(|e| Error::KeyPair(format!("Key generation task failed: {e}")))??;
        let csr = create_csr(&certificate_key, domains)?;

        order.finalize(&csr).await?;

        let deadline = Instant::now() + ORDER_TIMEOUT;
        loop {
            match order.refresh().await? {
                OrderStatus::Valid => break,
                OrderStatus::Invalid => {
                    return Err(Error::Acme("Order became invalid during finalization".to_string()));
                }
                status => {
                    if Instant::now() >= deadline {
                        return Err(Error::Acme(format!(
                            "Timed out waiting for certificate, order is {status:?}"
                        )));
                    }
                    tokio::time::sleep(self.order_poll_interval).await;
                }
            }
        }

        let pem = order
            .certificate()
            .await?
            .ok_or_else(|| Error::Acme("Order is valid without certificate".to_string()))?;

        let issued = parse_chain(&pem)?;
        info!(domains = ?domains, expiry = %issued.expiry_date, "Certificate issued");
        Ok((issued, private_key_pem(&certificate_key)?))
    }

    fn encode_response(
        &self,
        domains: &[String],
        issued: IssuedChain,
        key_pem: &str,
    ) -> CertificateResponse {
        let certificate_files = BTreeMap::from([
            (self.filenames.certificate.clone(), STANDARD.encode(&issued.certificate)),
            (self.filenames.chain.clone(), STANDARD.encode(&issued.chain)),
            (self.filenames.key.clone(), STANDARD.encode(key_pem)),
            (self.filenames.fullchain.clone(), STANDARD.encode(&issued.fullchain)),
        ]);

        CertificateResponse {
            domains: domains.to_vec(),
            certificate_files,
            expiry_date: issued.expiry_date,
            ca: self.acme_url.clone(),
        }
    }
}

/// Fully qualified DNS-01 record name of `domain`.
fn challenge_record(domain: &str) -> String {
    format!("{ACME_CHALLENGE_PREFIX}.{domain}.")
}

#[async_trait]
impl CertificateIssuer for AcmeOrchestrator {
    async fn request_certificate(&self, domains: &[String]) -> Result<CertificateResponse> {
        match self.request_once(domains).await {
            Err(Error::Acme(message)) if requires_agreement(&message) => {
                info!(ca = %self.acme_url, "Subscriber agreement required, retrying request");
                self.account.agree_to_terms().await?;
                self.request_once(domains).await
            }
            result => result,
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod orchestrator_tests;
