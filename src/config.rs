// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller configuration and cloud platform detection.
//!
//! All settings come from the environment (with matching command line flags
//! for local runs). When `CLOUD_PLATFORM` is not set the platform is detected
//! by probing provider specific signals.

use clap::{Parser, ValueEnum};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::constants::{
    DEFAULT_ACME_URL, DEFAULT_CERTIFICATE_FILENAME, DEFAULT_CHAIN_FILENAME,
    DEFAULT_FULLCHAIN_FILENAME, DEFAULT_KEY_FILENAME, DEFAULT_METRICS_BIND_ADDRESS,
    DEFAULT_PROPAGATION_TIMEOUT_SECS, DETECTION_PROBE_TIMEOUT, EC2_METADATA_URL,
    GCE_METADATA_HOST,
};
use crate::errors::{Error, Result};
use crate::model::SecretFilenames;

/// Cloud platform hosting the DNS zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CloudPlatform {
    /// Google Cloud Platform (Cloud DNS)
    #[value(name = "GCP", alias = "gcp")]
    Gcp,
    /// Amazon Web Services (Route 53)
    #[value(name = "AWS", alias = "aws")]
    Aws,
}

impl std::fmt::Display for CloudPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloudPlatform::Gcp => write!(f, "Google Cloud Platform"),
            CloudPlatform::Aws => write!(f, "Amazon Web Services"),
        }
    }
}

/// Controller configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "acmedns", version, about = "ACME DNS-01 certificate controller")]
pub struct Config {
    /// Cloud platform providing DNS; detected when unset
    #[arg(long, env = "CLOUD_PLATFORM", value_enum)]
    pub cloud_platform: Option<CloudPlatform>,

    /// ACME directory URL
    #[arg(long, env = "ACME_URL", default_value = DEFAULT_ACME_URL)]
    pub acme_url: String,

    /// Secret data key for the certificate
    #[arg(long, env = "CERTIFICATE_FILENAME", default_value = DEFAULT_CERTIFICATE_FILENAME)]
    pub certificate_filename: String,

    /// Secret data key for the issuer chain
    #[arg(long, env = "CHAIN_FILENAME", default_value = DEFAULT_CHAIN_FILENAME)]
    pub chain_filename: String,

    /// Secret data key for the private key
    #[arg(long, env = "KEY_FILENAME", default_value = DEFAULT_KEY_FILENAME)]
    pub key_filename: String,

    /// Secret data key for the certificate followed by its chain
    #[arg(long, env = "FULLCHAIN_FILENAME", default_value = DEFAULT_FULLCHAIN_FILENAME)]
    pub fullchain_filename: String,

    /// Seconds to wait for each authoritative nameserver to serve a challenge
    #[arg(long, env = "PROPAGATION_TIMEOUT_SECS", default_value_t = DEFAULT_PROPAGATION_TIMEOUT_SECS)]
    pub propagation_timeout_secs: u64,

    /// Address the Prometheus metrics server listens on
    #[arg(long, env = "METRICS_BIND_ADDRESS", default_value = DEFAULT_METRICS_BIND_ADDRESS)]
    pub metrics_bind_address: String,
}

impl Config {
    /// Data keys for the secret payload.
    #[must_use]
    pub fn secret_filenames(&self) -> SecretFilenames {
        SecretFilenames {
            certificate: self.certificate_filename.clone(),
            chain: self.chain_filename.clone(),
            key: self.key_filename.clone(),
            fullchain: self.fullchain_filename.clone(),
        }
    }

    /// Per-nameserver propagation timeout.
    #[must_use]
    pub fn propagation_timeout(&self) -> Duration {
        Duration::from_secs(self.propagation_timeout_secs)
    }

    /// Return the configured platform, or detect it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if no platform is configured and none
    /// could be detected.
    pub async fn resolve_cloud_platform(&self) -> Result<CloudPlatform> {
        if let Some(platform) = self.cloud_platform {
            info!(platform = %platform, "Using configured cloud platform");
            return Ok(platform);
        }

        detect_cloud_platform().await.ok_or_else(|| {
            Error::Configuration("Could not determine cloud platform for DNS responder".into())
        })
    }
}

/// Inspect the environment to determine which cloud platform the controller
/// runs on.
pub async fn detect_cloud_platform() -> Option<CloudPlatform> {
    info!("Detecting current cloud platform");

    if detect_amazon_web_services().await {
        info!(platform = %CloudPlatform::Aws, "Detected cloud platform");
        return Some(CloudPlatform::Aws);
    }

    if detect_google_cloud_platform().await {
        info!(platform = %CloudPlatform::Gcp, "Detected cloud platform");
        return Some(CloudPlatform::Gcp);
    }

    warn!("Could not detect cloud platform");
    None
}

/// AWS is assumed when a region is configured or the instance metadata
/// service answers.
async fn detect_amazon_web_services() -> bool {
    if aws_region_from_env(|key| std::env::var(key).ok()).is_some() {
        return true;
    }

    let Ok(client) = reqwest::Client::builder()
        .timeout(DETECTION_PROBE_TIMEOUT)
        .build()
    else {
        return false;
    };

    match client.get(EC2_METADATA_URL).send().await {
        Ok(response) => {
            debug!(status = %response.status(), "EC2 metadata service answered");
            // IMDSv2 answers 401 without a token, which still identifies EC2
            response.status().is_success() || response.status().as_u16() == 401
        }
        Err(e) => {
            debug!(error = %e, "EC2 metadata service not reachable");
            false
        }
    }
}

fn aws_region_from_env<F>(lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    ["AWS_REGION", "AWS_DEFAULT_REGION", "AWS_EXECUTION_ENV"]
        .iter()
        .find_map(|key| lookup(key).filter(|value| !value.is_empty()))
}

/// GCP is assumed when the metadata server hostname resolves.
async fn detect_google_cloud_platform() -> bool {
    let lookup = tokio::net::lookup_host((GCE_METADATA_HOST, 80));
    match tokio::time::timeout(DETECTION_PROBE_TIMEOUT, lookup).await {
        Ok(Ok(mut addrs)) => addrs.next().is_some(),
        Ok(Err(e)) => {
            debug!(error = %e, "GCE metadata host does not resolve");
            false
        }
        Err(_) => false,
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
