// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! AWS Route 53 responder.
//!
//! Credentials and region come from the default AWS provider chain
//! (environment, profile, web identity or instance metadata).

use async_trait::async_trait;
use aws_sdk_route53::error::DisplayErrorContext;
use aws_sdk_route53::types::{
    Change, ChangeAction, ChangeBatch, ChangeStatus, HostedZone, ResourceRecord, ResourceRecordSet,
    RrType,
};
use aws_sdk_route53::Client;
use std::time::Duration;
use tracing::{debug, info};

use super::{fqdn, quote_txt_value, select_zone, DnsResponder, Zone};
use crate::constants::{CHALLENGE_RECORD_TTL_SECS, ROUTE53_POLL_INTERVAL};
use crate::errors::{Error, Result};

const HOSTED_ZONE_PREFIX: &str = "/hostedzone/";
const CHANGE_PREFIX: &str = "/change/";

/// DNS responder backed by AWS Route 53.
#[derive(Debug, Clone)]
pub struct Route53Responder {
    client: Client,
    poll_interval: Duration,
}

impl Route53Responder {
    /// Create a responder from the default AWS configuration.
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        info!(region = ?config.region(), "Using AWS Route 53");
        Self::new(Client::new(&config))
    }

    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            poll_interval: ROUTE53_POLL_INTERVAL,
        }
    }

    async fn list_zones(&self) -> Result<Vec<Zone>> {
        let mut zones = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let page = self
                .client
                .list_hosted_zones()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| provider_error("list hosted zones", &e))?;

            zones.extend(page.hosted_zones().iter().map(zone_from_hosted));

            match page.next_marker() {
                Some(next) if page.is_truncated() => marker = Some(next.to_string()),
                _ => break,
            }
        }

        debug!(count = zones.len(), "Listed Route 53 hosted zones");
        Ok(zones)
    }

    async fn find_zone(&self, record: &str) -> Result<Zone> {
        let zones = self.list_zones().await?;
        select_zone(record, zones).ok_or_else(|| Error::NoMatchingZone {
            record: record.to_string(),
        })
    }

    async fn apply_change(&self, zone: &Zone, batch: ChangeBatch) -> Result<()> {
        let response = self
            .client
            .change_resource_record_sets()
            .hosted_zone_id(zone.id.as_str())
            .change_batch(batch)
            .send()
            .await
            .map_err(|e| provider_error("change record sets", &e))?;

        let mut info = response
            .change_info()
            .cloned()
            .ok_or_else(|| Error::DnsProvider("Route 53 returned no change info".to_string()))?;
        let change_id = strip_prefix(info.id(), CHANGE_PREFIX).to_string();

        while *info.status() == ChangeStatus::Pending {
            tokio::time::sleep(self.poll_interval).await;
            let status = self
                .client
                .get_change()
                .id(change_id.as_str())
                .send()
                .await
                .map_err(|e| provider_error("get change", &e))?;
            info = status
                .change_info()
                .cloned()
                .ok_or_else(|| Error::DnsProvider("Route 53 returned no change info".to_string()))?;
        }

        debug!(zone = %zone.name, change = %change_id, "Route 53 change in sync");
        Ok(())
    }
}

#[async_trait]
impl DnsResponder for Route53Responder {
    async fn add_challenge_record(&self, record_name: &str, digest: &str) -> Result<String> {
        let record = fqdn(record_name);
        let zone = self.find_zone(&record).await?;
        info!(record = %record, zone = %zone.name, "Adding challenge record to Route 53");

        let batch = challenge_change(ChangeAction::Upsert, &record, digest)?;
        self.apply_change(&zone, batch).await?;
        Ok(zone.name)
    }

    async fn remove_challenge_record(&self, record_name: &str, digest: &str) -> Result<()> {
        let record = fqdn(record_name);
        let zone = self.find_zone(&record).await?;
        info!(record = %record, zone = %zone.name, "Removing challenge record from Route 53");

        let batch = challenge_change(ChangeAction::Delete, &record, digest)?;
        self.apply_change(&zone, batch).await
    }
}

fn zone_from_hosted(zone: &HostedZone) -> Zone {
    Zone {
        id: strip_prefix(zone.id(), HOSTED_ZONE_PREFIX).to_string(),
        name: zone.name().to_string(),
        private: zone.config().is_some_and(|config| config.private_zone()),
    }
}

/// Change batch publishing or deleting the challenge TXT record.
fn challenge_change(action: ChangeAction, record: &str, digest: &str) -> Result<ChangeBatch> {
    let value = ResourceRecord::builder()
        .value(quote_txt_value(digest))
        .build()
        .map_err(build_error)?;
    let record_set = ResourceRecordSet::builder()
        .name(record)
        .r#type(RrType::Txt)
        .ttl(CHALLENGE_RECORD_TTL_SECS)
        .resource_records(value)
        .build()
        .map_err(build_error)?;
    let change = Change::builder()
        .action(action)
        .resource_record_set(record_set)
        .build()
        .map_err(build_error)?;

    ChangeBatch::builder()
        .changes(change)
        .build()
        .map_err(build_error)
}

fn strip_prefix<'a>(id: &'a str, prefix: &str) -> &'a str {
    id.strip_prefix(prefix).unwrap_or(id)
}

fn build_error(e: aws_sdk_route53::error::BuildError) -> Error {
    Error::DnsProvider(format!("Invalid Route 53 request: {e}"))
}

fn provider_error<E: std::error::Error>(action: &str, e: &E) -> Error {
    Error::DnsProvider(format!(
        "Route 53 failed to {action}: {}",
        DisplayErrorContext(e)
    ))
}

#[cfg(test)]
#[path = "route53_tests.rs"]
mod route53_tests;
