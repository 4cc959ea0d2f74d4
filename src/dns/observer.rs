// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Propagation observer for challenge records.
//!
//! Recursive resolvers cache negative answers, so the observer bypasses them:
//! it looks up the NS records of the zone hosting the challenge and queries
//! every authoritative nameserver directly until each one serves the expected
//! TXT value. All nameservers are watched in parallel and the first one to
//! exceed its timeout fails the whole wait.

use async_trait::async_trait;
use futures::future::try_join_all;
use hickory_client::client::{Client, SyncClient};
use hickory_client::rr::{DNSClass, Name, RData, RecordType};
use hickory_client::udp::UdpClientConnection;
use hickory_resolver::TokioAsyncResolver;
use std::future::Future;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::constants::{DNS_PORT, DNS_QUERY_TIMEOUT, PROPAGATION_POLL_INTERVAL};
use crate::errors::{Error, Result};

/// Waits until a challenge record is visible to the CA.
#[async_trait]
pub trait PropagationCheck: Send + Sync {
    /// Block until every authoritative nameserver of `zone_root` serves
    /// `expected` as a TXT value of `record_name`.
    async fn wait_for_record(&self, record_name: &str, zone_root: &str, expected: &str) -> Result<()>;
}

/// An authoritative nameserver and the address it is queried on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nameserver {
    pub name: String,
    pub address: SocketAddr,
}

/// Observes propagation by querying authoritative nameservers directly.
#[derive(Debug, Clone)]
pub struct DnsRecordObserver {
    timeout: Duration,
    poll_interval: Duration,
}

impl DnsRecordObserver {
    /// `timeout` bounds the wait on each nameserver.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            poll_interval: PROPAGATION_POLL_INTERVAL,
        }
    }

    async fn authoritative_nameservers(&self, zone_root: &str) -> Result<Vec<Nameserver>> {
        let resolution_error = |e: &dyn std::fmt::Display| Error::Resolution {
            name: zone_root.to_string(),
            reason: e.to_string(),
        };

        let resolver = TokioAsyncResolver::tokio_from_system_conf().map_err(|e| resolution_error(&e))?;
        let ns_records = resolver
            .ns_lookup(zone_root)
            .await
            .map_err(|e| resolution_error(&e))?;

        let mut nameservers = Vec::new();
        for ns in ns_records.iter() {
            let name = ns.to_string();
            let addresses = resolver.lookup_ip(name.as_str()).await.map_err(|e| Error::Resolution {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            let ip = addresses.iter().next().ok_or_else(|| Error::Resolution {
                name: name.clone(),
                reason: "no addresses".to_string(),
            })?;
            nameservers.push(Nameserver {
                name,
                address: SocketAddr::new(ip, DNS_PORT),
            });
        }

        if nameservers.is_empty() {
            return Err(resolution_error(&"zone has no NS records"));
        }
        debug!(zone = %zone_root, nameservers = ?nameservers, "Resolved authoritative nameservers");
        Ok(nameservers)
    }
}

#[async_trait]
impl PropagationCheck for DnsRecordObserver {
    async fn wait_for_record(&self, record_name: &str, zone_root: &str, expected: &str) -> Result<()> {
        info!(record = %record_name, zone = %zone_root, "Waiting for DNS record update");

        let name = Name::from_str(record_name).map_err(|e| Error::Resolution {
            name: record_name.to_string(),
            reason: e.to_string(),
        })?;
        let nameservers = self.authoritative_nameservers(zone_root).await?;

        wait_for_nameservers(
            record_name,
            expected,
            &nameservers,
            self.timeout,
            self.poll_interval,
            |ns| query_txt(name.clone(), ns.address),
        )
        .await?;

        info!(record = %record_name, "DNS record updated on all nameservers");
        Ok(())
    }
}

/// Poll every nameserver in parallel until each serves a TXT value
/// containing `expected`.
///
/// Query errors and empty answers are retried; only the per-nameserver
/// timeout fails the wait.
pub(crate) async fn wait_for_nameservers<F, Fut>(
    record: &str,
    expected: &str,
    nameservers: &[Nameserver],
    timeout: Duration,
    poll_interval: Duration,
    query: F,
) -> Result<()>
where
    F: Fn(&Nameserver) -> Fut,
    Fut: Future<Output = Result<Vec<String>>>,
{
    let query = &query;
    let checks = nameservers.iter().map(|ns| async move {
        let deadline = Instant::now() + timeout;
        loop {
            match query(ns).await {
                Ok(values) if values.iter().any(|value| value.contains(expected)) => {
                    debug!(record = %record, nameserver = %ns.name, "Record served by nameserver");
                    return Ok(());
                }
                Ok(values) => {
                    trace!(record = %record, nameserver = %ns.name, found = ?values, "Record not updated yet");
                }
                Err(e) => {
                    debug!(record = %record, nameserver = %ns.name, error = %e, "Nameserver query failed");
                }
            }

            if Instant::now() >= deadline {
                return Err(Error::PropagationTimeout {
                    record: record.to_string(),
                    nameserver: ns.name.clone(),
                });
            }
            tokio::time::sleep(poll_interval).await;
        }
    });

    try_join_all(checks).await.map(|_| ())
}

/// Query TXT values of `name` directly from `server`.
async fn query_txt(name: Name, server: SocketAddr) -> Result<Vec<String>> {
    let resolution_error = |reason: String| Error::Resolution {
        name: name.to_string(),
        reason,
    };

    let lookup = name.clone();
    tokio::task::spawn_blocking(move || {
        let conn = UdpClientConnection::with_timeout(server, DNS_QUERY_TIMEOUT)
            .map_err(|e| format!("Failed to create UDP connection to {server}: {e}"))?;
        let client = SyncClient::new(conn);

        let response = client
            .query(&lookup, DNSClass::IN, RecordType::TXT)
            .map_err(|e| format!("TXT query to {server} failed: {e}"))?;

        Ok::<_, String>(
            response
                .answers()
                .iter()
                .filter_map(|record| match record.data() {
                    Some(RData::TXT(txt)) => Some(
                        txt.txt_data()
                            .iter()
                            .map(|part| String::from_utf8_lossy(part))
                            .collect::<String>(),
                    ),
                    _ => None,
                })
                .collect(),
        )
    })
    .await
    .map_err(|e| resolution_error(format!("DNS query task failed: {e}")))?
    .map_err(resolution_error)
}

#[cfg(test)]
#[path = "observer_tests.rs"]
mod observer_tests;
