// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Per-namespace reconciliation of annotated services.
//!
//! Each pass inspects the listed services, and for every service carrying the
//! `acme/certificate` annotation dispatches a detached task that decides
//! whether a certificate is needed and, if so, requests and stores it. At most
//! one task runs per service: the service name is claimed in the in-progress
//! set before dispatch and released when the task ends.

use chrono::{NaiveDate, Utc};
use k8s_openapi::api::core::v1::Service;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, Instrument};

use super::secrets::{
    decide_renewal, parse_domains, secret_name, secret_name_override, RenewalDecision,
    SecretStore,
};
use crate::acme::CertificateIssuer;
use crate::constants::REQUEST_ANNOTATION;
use crate::errors::Result;
use crate::metrics;
use crate::model::CertificateRequest;

type InProgressSet = Arc<Mutex<HashSet<String>>>;

/// Reconciles the services of one namespace.
pub struct ServiceReconciler {
    namespace: String,
    secrets: Arc<dyn SecretStore>,
    issuer: Arc<dyn CertificateIssuer>,
    in_progress: InProgressSet,
}

impl ServiceReconciler {
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        secrets: Arc<dyn SecretStore>,
        issuer: Arc<dyn CertificateIssuer>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            secrets,
            issuer,
            in_progress: Arc::default(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Names of the services with a certificate flow in progress.
    #[must_use]
    pub fn in_progress(&self) -> HashSet<String> {
        self.in_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run one pass over `services`, returning the handles of the dispatched
    /// tasks. Callers are free to drop the handles.
    pub fn reconcile(&self, services: &[Service]) -> Vec<JoinHandle<()>> {
        services
            .iter()
            .filter_map(|service| self.reconcile_service(service))
            .collect()
    }

    /// Dispatch a certificate task for one service.
    ///
    /// Returns `None` when the service requests no certificate or a task for
    /// it is already running.
    pub fn reconcile_service(&self, service: &Service) -> Option<JoinHandle<()>> {
        let service_name = service.metadata.name.clone()?;
        debug!(namespace = %self.namespace, service = %service_name, "Reconciling service");

        if !is_certificate_request(service) {
            return None;
        }

        let Some(guard) = InProgressGuard::claim(&self.in_progress, &service_name) else {
            debug!(
                namespace = %self.namespace,
                service = %service_name,
                "Certificate request already in progress"
            );
            return None;
        };

        let namespace = self.namespace.clone();
        let secrets = Arc::clone(&self.secrets);
        let issuer = Arc::clone(&self.issuer);
        let service = service.clone();
        let span = info_span!("certificate", namespace = %namespace, service = %service_name);

        Some(tokio::spawn(
            async move {
                let _guard = guard;
                if let Err(e) =
                    process_service(&namespace, &service, secrets.as_ref(), issuer.as_ref()).await
                {
                    error!(
                        error = %e,
                        category = e.category(),
                        "Certificate request failed"
                    );
                }
            }
            .instrument(span),
        ))
    }
}

/// Releases a claimed service name when dropped.
struct InProgressGuard {
    set: InProgressSet,
    name: String,
}

impl InProgressGuard {
    fn claim(set: &InProgressSet, name: &str) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());
        inserted.then(|| Self {
            set: Arc::clone(set),
            name: name.to_string(),
        })
    }
}

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}

async fn process_service(
    namespace: &str,
    service: &Service,
    secrets: &dyn SecretStore,
    issuer: &dyn CertificateIssuer,
) -> Result<()> {
    let today = Utc::now().date_naive();
    let request = match prepare_certificate_request(namespace, service, secrets, today).await {
        Ok(Some(request)) => request,
        Ok(None) => return Ok(()),
        Err(e) => {
            metrics::record_error(&e);
            return Err(e);
        }
    };

    let started = Instant::now();
    match handle_certificate_request(namespace, &request, secrets, issuer).await {
        Ok(()) => {
            metrics::record_certificate_success(request.renew, started.elapsed());
            Ok(())
        }
        Err(e) => {
            metrics::record_certificate_error(request.renew, started.elapsed(), &e);
            Err(e)
        }
    }
}

/// Whether a service carries the certificate request annotation.
#[must_use]
pub fn is_certificate_request(service: &Service) -> bool {
    service
        .metadata
        .annotations
        .as_ref()
        .is_some_and(|annotations| annotations.contains_key(REQUEST_ANNOTATION))
}

/// Work out what a service needs from its annotations and the current state
/// of its secret.
///
/// Returns `None` when the service requests nothing or its certificate is
/// current.
///
/// # Errors
///
/// Fails on malformed annotations and on Secret read errors.
pub async fn prepare_certificate_request(
    namespace: &str,
    service: &Service,
    secrets: &dyn SecretStore,
    today: NaiveDate,
) -> Result<Option<CertificateRequest>> {
    let Some(annotations) = service.metadata.annotations.as_ref() else {
        return Ok(None);
    };
    let Some(request_annotation) = annotations.get(REQUEST_ANNOTATION) else {
        return Ok(None);
    };
    let service_name = service.metadata.name.as_deref().unwrap_or_default();

    let domains = parse_domains(request_annotation)?;
    let secret_name = secret_name(&domains, secret_name_override(annotations))?;
    let existing = secrets.get_secret(namespace, &secret_name).await?;

    let renew = match decide_renewal(&domains, existing.as_ref(), today) {
        RenewalDecision::New => {
            info!(service = %service_name, domains = ?domains, "Service requesting certificate");
            false
        }
        RenewalDecision::Renew => {
            info!(service = %service_name, domains = ?domains, "Renewal of certificate requested");
            true
        }
        RenewalDecision::UpToDate => {
            debug!(service = %service_name, domains = ?domains, "Certificate already exists");
            return Ok(None);
        }
    };

    Ok(Some(CertificateRequest {
        secret_name,
        domains,
        renew,
    }))
}

/// Request the certificate and store it, creating or updating its secret.
///
/// # Errors
///
/// Propagates issuer and Secret store errors.
pub async fn handle_certificate_request(
    namespace: &str,
    request: &CertificateRequest,
    secrets: &dyn SecretStore,
    issuer: &dyn CertificateIssuer,
) -> Result<()> {
    let certificate = issuer.request_certificate(&request.domains).await?;

    if request.renew {
        secrets
            .update_certificate(namespace, &request.secret_name, &certificate)
            .await
    } else {
        secrets
            .insert_certificate(namespace, &request.secret_name, &certificate)
            .await
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
pub(crate) mod service_tests;
