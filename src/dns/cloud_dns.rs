// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Google Cloud DNS responder.
//!
//! Talks to the Cloud DNS v1 REST API with an access token of the instance
//! service account, taken from the GCE metadata server. The project is read
//! from `GOOGLE_CLOUD_PROJECT` or, when unset, from the metadata server.
//!
//! Cloud DNS reports a change as `done` before every nameserver of the zone
//! answers with it, so after the change completes the responder waits for a
//! fixed settle delay.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use super::{fqdn, quote_txt_value, select_zone, DnsResponder, Zone};
use crate::constants::{
    CHALLENGE_RECORD_TTL_SECS, CLOUD_DNS_API_URL, CLOUD_DNS_POLL_INTERVAL, CLOUD_DNS_SETTLE_DELAY,
    GCE_METADATA_URL,
};
use crate::errors::{Error, Result};

const METADATA_FLAVOR: (&str, &str) = ("Metadata-Flavor", "Google");
const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";
const PROJECT_PATH: &str = "/computeMetadata/v1/project/project-id";

/// Access tokens are refreshed this long before they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

const TXT: &str = "TXT";
const STATUS_PENDING: &str = "pending";
const VISIBILITY_PRIVATE: &str = "private";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManagedZonesPage {
    #[serde(default)]
    managed_zones: Vec<ManagedZone>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManagedZone {
    name: String,
    dns_name: String,
    #[serde(default)]
    visibility: Option<String>,
}

impl From<ManagedZone> for Zone {
    fn from(zone: ManagedZone) -> Self {
        Zone {
            private: zone.visibility.as_deref() == Some(VISIBILITY_PRIVATE),
            id: zone.name,
            name: zone.dns_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ResourceRecordSet {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    ttl: i64,
    rrdatas: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ResourceRecordSetsPage {
    #[serde(default)]
    rrsets: Vec<ResourceRecordSet>,
}

#[derive(Debug, Default, Serialize)]
struct ChangeRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    additions: Vec<ResourceRecordSet>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    deletions: Vec<ResourceRecordSet>,
}

#[derive(Debug, Deserialize)]
struct Change {
    id: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// DNS responder backed by Google Cloud DNS.
#[derive(Debug)]
pub struct CloudDnsResponder {
    http: reqwest::Client,
    api_url: String,
    metadata_url: String,
    project: String,
    token: Mutex<Option<CachedToken>>,
    poll_interval: Duration,
    settle_delay: Duration,
}

impl CloudDnsResponder {
    /// Create a responder for the project the controller runs in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the project cannot be determined.
    pub async fn new(http: reqwest::Client) -> Result<Self> {
        let project = match std::env::var("GOOGLE_CLOUD_PROJECT") {
            Ok(project) if !project.is_empty() => project,
            _ => metadata_project(&http, GCE_METADATA_URL).await?,
        };
        info!(project = %project, "Using Google Cloud DNS");

        Ok(Self::with_endpoints(
            http,
            CLOUD_DNS_API_URL,
            GCE_METADATA_URL,
            &project,
        ))
    }

    /// Create a responder against explicit API and metadata endpoints.
    #[must_use]
    pub fn with_endpoints(
        http: reqwest::Client,
        api_url: &str,
        metadata_url: &str,
        project: &str,
    ) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            metadata_url: metadata_url.trim_end_matches('/').to_string(),
            project: project.to_string(),
            token: Mutex::new(None),
            poll_interval: CLOUD_DNS_POLL_INTERVAL,
            settle_delay: CLOUD_DNS_SETTLE_DELAY,
        }
    }

    /// Override the change poll interval and the post-change settle delay.
    #[must_use]
    pub fn with_timing(mut self, poll_interval: Duration, settle_delay: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.settle_delay = settle_delay;
        self
    }

    fn zones_url(&self) -> String {
        format!("{}/projects/{}/managedZones", self.api_url, self.project)
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() + TOKEN_REFRESH_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        debug!("Fetching access token from metadata server");
        let url = format!("{}{TOKEN_PATH}", self.metadata_url);
        let response = self
            .http
            .get(&url)
            .header(METADATA_FLAVOR.0, METADATA_FLAVOR.1)
            .send()
            .await
            .map_err(|e| provider_error("fetch access token", &e))?;
        let token: AccessToken = read_json(response, "fetch access token").await?;

        let value = token.access_token.clone();
        *cached = Some(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(value)
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, url: Url, action: &str) -> Result<T> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| provider_error(action, &e))?;
        read_json(response, action).await
    }

    async fn list_zones(&self) -> Result<Vec<Zone>> {
        let mut zones = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = parse_url(&self.zones_url())?;
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }

            let page: ManagedZonesPage = self.get(url, "list managed zones").await?;
            zones.extend(page.managed_zones.into_iter().map(Zone::from));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(count = zones.len(), "Listed Cloud DNS managed zones");
        Ok(zones)
    }

    async fn find_zone(&self, record: &str) -> Result<Zone> {
        let zones = self.list_zones().await?;
        select_zone(record, zones).ok_or_else(|| Error::NoMatchingZone {
            record: record.to_string(),
        })
    }

    async fn existing_record_set(&self, zone: &Zone, record: &str) -> Result<Option<ResourceRecordSet>> {
        let mut url = parse_url(&format!("{}/{}/rrsets", self.zones_url(), zone.id))?;
        url.query_pairs_mut()
            .append_pair("name", record)
            .append_pair("type", TXT);

        let page: ResourceRecordSetsPage = self.get(url, "list record sets").await?;
        Ok(page
            .rrsets
            .into_iter()
            .find(|rrset| rrset.kind == TXT && rrset.name.eq_ignore_ascii_case(record)))
    }

    async fn apply_change(&self, zone: &Zone, change: &ChangeRequest) -> Result<()> {
        let changes_url = format!("{}/{}/changes", self.zones_url(), zone.id);
        let token = self.access_token().await?;
        let response = self
            .http
            .post(&changes_url)
            .bearer_auth(token)
            .json(change)
            .send()
            .await
            .map_err(|e| provider_error("create change", &e))?;
        let mut status: Change = read_json(response, "create change").await?;

        while status.status == STATUS_PENDING {
            tokio::time::sleep(self.poll_interval).await;
            let url = parse_url(&format!("{changes_url}/{}", status.id))?;
            status = self.get(url, "get change status").await?;
        }
        debug!(zone = %zone.name, change = %status.id, status = %status.status, "Cloud DNS change applied");
        Ok(())
    }
}

#[async_trait]
impl DnsResponder for CloudDnsResponder {
    async fn add_challenge_record(&self, record_name: &str, digest: &str) -> Result<String> {
        let record = fqdn(record_name);
        let zone = self.find_zone(&record).await?;
        info!(record = %record, zone = %zone.name, "Adding challenge record to Cloud DNS");

        let mut change = ChangeRequest::default();
        if let Some(existing) = self.existing_record_set(&zone, &record).await? {
            debug!(record = %record, values = ?existing.rrdatas, "Replacing existing TXT record set");
            change.deletions.push(existing);
        }
        change.additions.push(ResourceRecordSet {
            name: record.clone(),
            kind: TXT.to_string(),
            ttl: CHALLENGE_RECORD_TTL_SECS,
            rrdatas: vec![quote_txt_value(digest)],
        });

        self.apply_change(&zone, &change).await?;

        debug!(delay = ?self.settle_delay, "Waiting for Cloud DNS to settle");
        tokio::time::sleep(self.settle_delay).await;

        Ok(zone.name)
    }

    async fn remove_challenge_record(&self, record_name: &str, digest: &str) -> Result<()> {
        let record = fqdn(record_name);
        let zone = self.find_zone(&record).await?;

        let value = quote_txt_value(digest);
        let Some(existing) = self.existing_record_set(&zone, &record).await? else {
            debug!(record = %record, "Challenge record already absent");
            return Ok(());
        };
        if !existing.rrdatas.contains(&value) {
            debug!(record = %record, "Challenge value already absent");
            return Ok(());
        }

        info!(record = %record, zone = %zone.name, "Removing challenge record from Cloud DNS");
        let mut change = ChangeRequest::default();
        change.deletions.push(existing);

        self.apply_change(&zone, &change).await
    }
}

async fn metadata_project(http: &reqwest::Client, metadata_url: &str) -> Result<String> {
    let url = format!("{}{PROJECT_PATH}", metadata_url.trim_end_matches('/'));
    let response = http
        .get(&url)
        .header(METADATA_FLAVOR.0, METADATA_FLAVOR.1)
        .send()
        .await
        .map_err(|e| Error::Configuration(format!("Failed to query GCE metadata server: {e}")))?;

    if !response.status().is_success() {
        return Err(Error::Configuration(format!(
            "GCE metadata server returned HTTP {} for project id",
            response.status()
        )));
    }
    let project = response
        .text()
        .await
        .map_err(|e| Error::Configuration(format!("Failed to read project id: {e}")))?;
    Ok(project.trim().to_string())
}

async fn read_json<T: for<'de> Deserialize<'de>>(response: reqwest::Response, action: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::DnsProvider(format!(
            "Cloud DNS failed to {action}: HTTP {status} - {body}"
        )));
    }
    response
        .json()
        .await
        .map_err(|e| Error::DnsProvider(format!("Cloud DNS failed to {action}: invalid response: {e}")))
}

fn provider_error(action: &str, e: &reqwest::Error) -> Error {
    Error::DnsProvider(format!("Cloud DNS failed to {action}: {e}"))
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| Error::DnsProvider(format!("Invalid Cloud DNS URL '{url}': {e}")))
}

#[cfg(test)]
#[path = "cloud_dns_tests.rs"]
mod cloud_dns_tests;
