// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the certificate lifecycle.
//!
//! Every failure inside a certificate flow is raised to the task owning the
//! flow, logged there, and left for the next reconciliation pass to retry.
//! The variants below keep the failure categories apart so that logs and
//! metrics can tell a missing zone from a propagation timeout or a CA error.

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the controller.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration or cloud platform detection failed.
    ///
    /// Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Any failure reported by the ACME server or while talking to it.
    ///
    /// Carries the original message so that the subscriber agreement case
    /// can be recognised by its text.
    #[error("ACME request failed: {0}")]
    Acme(String),

    /// The CA marked a DNS-01 challenge as invalid.
    #[error("Challenge for domain '{domain}' failed validation: {reason}")]
    InvalidChallenge {
        /// The domain whose challenge failed
        domain: String,
        /// Problem reported by the CA, if any
        reason: String,
    },

    /// No managed zone of the DNS provider is a suffix of the record.
    #[error("No matching DNS zone found for record '{record}'")]
    NoMatchingZone {
        /// The fully qualified record name
        record: String,
    },

    /// The DNS provider API rejected a request or could not be reached.
    #[error("DNS provider error: {0}")]
    DnsProvider(String),

    /// A nameserver did not serve the expected challenge value in time.
    #[error("Timeout while waiting for record '{record}' to update on nameserver {nameserver}")]
    PropagationTimeout {
        /// The challenge record name
        record: String,
        /// The authoritative nameserver that did not converge
        nameserver: String,
    },

    /// A name could not be parsed or a nameserver could not be resolved.
    #[error("DNS resolution failed for '{name}': {reason}")]
    Resolution {
        /// The name being resolved
        name: String,
        /// Underlying resolver error
        reason: String,
    },

    /// Several domains were requested without an explicit secret name.
    #[error("{} must be specified if multiple domains are requested", crate::constants::SECRET_NAME_ANNOTATION)]
    SecretNameRequired,

    /// The request annotation contained an empty domain list.
    #[error("No domains have been specified")]
    NoDomains,

    /// An annotation value could not be parsed.
    #[error("Invalid annotation '{key}': {reason}")]
    InvalidAnnotation {
        /// The annotation key
        key: String,
        /// Why the value was rejected
        reason: String,
    },

    /// The ACME account key could not be read, generated or encoded.
    #[error("Account key pair error: {0}")]
    KeyPair(String),

    /// Kubernetes API call failed.
    #[error("Kubernetes API error: {0}")]
    Kubernetes(#[from] kube::Error),

    /// The namespace watch stream failed or ended.
    #[error("Lost connection to Kubernetes API server: {0}")]
    WatchLost(String),
}

impl Error {
    /// Short label for the error category, used as a metrics label.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration",
            Error::Acme(_) | Error::InvalidChallenge { .. } => "acme",
            Error::NoMatchingZone { .. } | Error::DnsProvider(_) => "dns_provider",
            Error::PropagationTimeout { .. } | Error::Resolution { .. } => "propagation",
            Error::SecretNameRequired | Error::NoDomains | Error::InvalidAnnotation { .. } => {
                "annotation"
            }
            Error::KeyPair(_) => "keypair",
            Error::Kubernetes(_) | Error::WatchLost(_) => "kubernetes",
        }
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
