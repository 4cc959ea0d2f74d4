// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Values passed between the reconciler, the renewal policy and the ACME
//! orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::{
    DEFAULT_CERTIFICATE_FILENAME, DEFAULT_CHAIN_FILENAME, DEFAULT_FULLCHAIN_FILENAME,
    DEFAULT_KEY_FILENAME,
};

/// A request for a signed certificate derived from service annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRequest {
    /// Name of the secret the certificate is stored in
    pub secret_name: String,

    /// Requested domains, first one becomes the subject CN
    pub domains: Vec<String>,

    /// Whether an existing secret is replaced
    pub renew: bool,
}

/// A signed certificate as returned by the ACME server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateResponse {
    /// Domains covered by the certificate
    pub domains: Vec<String>,

    /// Logical file name to base64 encoded PEM content
    pub certificate_files: BTreeMap<String, String>,

    /// `notAfter` of the leaf certificate
    pub expiry_date: DateTime<Utc>,

    /// ACME directory URL of the issuing CA
    pub ca: String,
}

/// Data keys used for the certificate files in the secret payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretFilenames {
    pub certificate: String,
    pub chain: String,
    pub key: String,
    pub fullchain: String,
}

impl Default for SecretFilenames {
    fn default() -> Self {
        Self {
            certificate: DEFAULT_CERTIFICATE_FILENAME.to_string(),
            chain: DEFAULT_CHAIN_FILENAME.to_string(),
            key: DEFAULT_KEY_FILENAME.to_string(),
            fullchain: DEFAULT_FULLCHAIN_FILENAME.to_string(),
        }
    }
}
