// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Namespace lifecycle tracking and periodic reconciliation.
//!
//! The scheduler watches namespaces. Every live namespace gets its own
//! [`ServiceReconciler`] and a periodic task that lists the namespace's
//! services every [`RECONCILE_INTERVAL`], starting immediately. Deleting the
//! namespace aborts the periodic task; certificate flows it already
//! dispatched run to completion.
//!
//! Losing the namespace watch is fatal: [`NamespaceScheduler::run`] returns
//! [`Error::WatchLost`] and the process exits.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::{Namespace, Service};
use kube::api::{Api, ListParams};
use kube::runtime::watcher;
use kube::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::retry::retry_api_call;
use super::secrets::SecretStore;
use super::service::ServiceReconciler;
use crate::acme::CertificateIssuer;
use crate::constants::RECONCILE_INTERVAL;
use crate::errors::{Error, Result};
use crate::metrics;

/// Lists the services of a namespace.
#[async_trait]
pub trait ServiceLister: Send + Sync {
    async fn list_services(&self, namespace: &str) -> Result<Vec<Service>>;
}

/// [`ServiceLister`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeServiceLister {
    client: Client,
}

impl KubeServiceLister {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ServiceLister for KubeServiceLister {
    async fn list_services(&self, namespace: &str) -> Result<Vec<Service>> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let list = retry_api_call(
            || async { api.list(&ListParams::default()).await },
            &format!("list services in {namespace}"),
        )
        .await?;
        Ok(list.items)
    }
}

/// Namespace lifecycle event relevant to scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceEvent {
    Added(String),
    Deleted(String),
    Ignored,
}

impl From<watcher::Event<Namespace>> for NamespaceEvent {
    fn from(event: watcher::Event<Namespace>) -> Self {
        let (namespace, added) = match event {
            watcher::Event::Apply(ns) | watcher::Event::InitApply(ns) => (ns, true),
            watcher::Event::Delete(ns) => (ns, false),
            watcher::Event::Init | watcher::Event::InitDone => return NamespaceEvent::Ignored,
        };

        match namespace.metadata.name {
            Some(name) if added => NamespaceEvent::Added(name),
            Some(name) => NamespaceEvent::Deleted(name),
            None => NamespaceEvent::Ignored,
        }
    }
}

/// Starts and stops the per-namespace reconciliation loops.
pub struct NamespaceScheduler {
    lister: Arc<dyn ServiceLister>,
    secrets: Arc<dyn SecretStore>,
    issuer: Arc<dyn CertificateIssuer>,
    interval: Duration,
    loops: HashMap<String, JoinHandle<()>>,
}

impl NamespaceScheduler {
    #[must_use]
    pub fn new(
        lister: Arc<dyn ServiceLister>,
        secrets: Arc<dyn SecretStore>,
        issuer: Arc<dyn CertificateIssuer>,
    ) -> Self {
        Self {
            lister,
            secrets,
            issuer,
            interval: RECONCILE_INTERVAL,
            loops: HashMap::new(),
        }
    }

    /// Override the reconciliation interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Namespaces with a running reconciliation loop, sorted by name.
    #[must_use]
    pub fn active_namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loops.keys().cloned().collect();
        names.sort();
        names
    }

    /// Apply one lifecycle event.
    pub fn handle_event(&mut self, event: NamespaceEvent) {
        match event {
            NamespaceEvent::Added(name) => {
                if self.loops.contains_key(&name) {
                    return;
                }
                info!(namespace = %name, "Starting reconciliation loop");
                let handle = self.spawn_loop(&name);
                self.loops.insert(name, handle);
            }
            NamespaceEvent::Deleted(name) => {
                if let Some(handle) = self.loops.remove(&name) {
                    info!(namespace = %name, "Stopping reconciliation loop");
                    handle.abort();
                }
            }
            NamespaceEvent::Ignored => return,
        }
        metrics::set_active_namespaces(self.loops.len());
    }

    /// Watch namespaces until the watch fails.
    ///
    /// # Errors
    ///
    /// Always returns [`Error::WatchLost`] once the watch stream errors or ends.
    pub async fn run(mut self, client: Client) -> Result<()> {
        let api: Api<Namespace> = Api::all(client);
        info!("Watching namespaces");
        self.process_events(watcher(api, watcher::Config::default()))
            .await
    }

    pub(crate) async fn process_events<S>(&mut self, events: S) -> Result<()>
    where
        S: Stream<Item = std::result::Result<watcher::Event<Namespace>, watcher::Error>>,
    {
        let mut events = std::pin::pin!(events);
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => self.handle_event(event.into()),
                Err(e) => {
                    error!(error = %e, "Namespace watch failed");
                    return Err(Error::WatchLost(e.to_string()));
                }
            }
        }
        Err(Error::WatchLost("namespace watch stream ended".to_string()))
    }

    fn spawn_loop(&self, namespace: &str) -> JoinHandle<()> {
        let reconciler = ServiceReconciler::new(
            namespace,
            Arc::clone(&self.secrets),
            Arc::clone(&self.issuer),
        );
        let lister = Arc::clone(&self.lister);
        let period = self.interval;

        tokio::spawn(
            async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    run_pass(&reconciler, lister.as_ref()).await;
                }
            }
            .instrument(info_span!("namespace", namespace = %namespace)),
        )
    }
}

impl Drop for NamespaceScheduler {
    fn drop(&mut self) {
        for handle in self.loops.values() {
            handle.abort();
        }
    }
}

async fn run_pass(reconciler: &ServiceReconciler, lister: &dyn ServiceLister) {
    match lister.list_services(reconciler.namespace()).await {
        Ok(services) => {
            let dispatched = reconciler.reconcile(&services).len();
            debug!(services = services.len(), dispatched, "Reconciliation pass complete");
            metrics::record_reconciliation(true);
        }
        Err(e) => {
            warn!(error = %e, "Failed to list services, skipping pass");
            metrics::record_reconciliation(false);
            metrics::record_error(&e);
        }
    }
}

#[cfg(test)]
#[path = "namespace_tests.rs"]
mod namespace_tests;
