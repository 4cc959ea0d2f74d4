// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS-01 challenge record management.
//!
//! A [`DnsResponder`] publishes and removes `_acme-challenge` TXT records in
//! the zone of a cloud DNS provider. Both providers pick the hosting zone with
//! [`select_zone`]: the longest zone name that is a suffix of the record, with
//! public zones winning over private zones of equal length.
//!
//! [`observer`] then watches the authoritative nameservers of that zone until
//! the record is served everywhere.

use async_trait::async_trait;
use tracing::debug;

use crate::errors::Result;

pub mod cloud_dns;
pub mod observer;
pub mod route53;

/// Manages challenge TXT records in a DNS provider.
#[async_trait]
pub trait DnsResponder: Send + Sync {
    /// Publish `digest` as TXT value of `record_name` and wait until the
    /// provider reports the change as applied.
    ///
    /// Returns the fully qualified name of the zone hosting the record.
    async fn add_challenge_record(&self, record_name: &str, digest: &str) -> Result<String>;

    /// Remove the TXT record previously published for `digest`.
    async fn remove_challenge_record(&self, record_name: &str, digest: &str) -> Result<()>;
}

/// A hosted zone of a DNS provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    /// Provider specific zone identifier
    pub id: String,
    /// Fully qualified zone name, trailing dot included
    pub name: String,
    /// Zone is only visible inside private networks
    pub private: bool,
}

/// Append the root dot to a name if it is missing.
#[must_use]
pub fn fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

/// Pick the zone hosting `record`.
///
/// Only zones whose name is a label aligned suffix of the record qualify.
/// The longest match wins; on equal length a public zone is preferred.
pub fn select_zone<I>(record: &str, zones: I) -> Option<Zone>
where
    I: IntoIterator<Item = Zone>,
{
    let record = fqdn(record).to_ascii_lowercase();

    let selected = zones
        .into_iter()
        .filter(|zone| is_zone_suffix(&record, &fqdn(&zone.name).to_ascii_lowercase()))
        .fold(None::<Zone>, |best, zone| match best {
            None => Some(zone),
            Some(best) => {
                let (best_len, len) = (fqdn(&best.name).len(), fqdn(&zone.name).len());
                if len > best_len || (len == best_len && best.private && !zone.private) {
                    Some(zone)
                } else {
                    Some(best)
                }
            }
        });

    if let Some(zone) = &selected {
        debug!(record = %record, zone = %zone.name, private = zone.private, "Selected DNS zone");
    }
    selected
}

fn is_zone_suffix(record: &str, zone: &str) -> bool {
    zone == "." || record == zone || record.ends_with(&format!(".{zone}"))
}

/// TXT values are sent as quoted character strings.
#[must_use]
pub fn quote_txt_value(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value.to_string()
    } else {
        format!("\"{value}\"")
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
