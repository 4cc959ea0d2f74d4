// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! ACME (RFC 8555) DNS-01 certificate issuance.
//!
//! The protocol itself (JWS signing, nonces, account and order resources) is
//! handled by `instant-acme` behind [`client::CaAccount`]. A certificate
//! request runs through registration, parallel per-domain authorization,
//! signing and download:
//!
//! ```text
//! START -> REGISTERED -> AUTHORIZING (per domain) -> SIGNING -> DONE
//!              ^                  |
//!              +-- AGREE_LICENSE <+  (at most once per request)
//! ```

use async_trait::async_trait;

use crate::errors::Result;
use crate::model::CertificateResponse;

pub mod client;
mod csr;
mod orchestrator;

pub use client::{AcmeAccount, CaAccount};
pub use orchestrator::AcmeOrchestrator;

/// Obtains signed certificates for a set of domains.
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    /// Run the full issuance flow. The first domain becomes the subject CN.
    async fn request_certificate(&self, domains: &[String]) -> Result<CertificateResponse>;
}
