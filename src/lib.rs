// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # acmedns - ACME DNS-01 certificates for Kubernetes services
//!
//! acmedns is a Kubernetes controller that provisions and renews TLS
//! certificates from an ACME certificate authority for annotated services and
//! stores them as Kubernetes secrets.
//!
//! ## Overview
//!
//! A service requests a certificate with annotations:
//!
//! ```yaml
//! metadata:
//!   annotations:
//!     acme/certificate: '["www.example.com", "example.com"]'
//!     acme/secretName: www-tls
//! ```
//!
//! The controller proves ownership of each domain with a DNS-01 challenge
//! published through Google Cloud DNS or AWS Route 53, waits until every
//! authoritative nameserver serves the challenge, and stores the signed
//! certificate in the named secret. Certificates are renewed two days before
//! expiry or when the requested domains change.
//!
//! ## Modules
//!
//! - [`reconcilers`] - Namespace scheduling, service reconciliation, secrets
//! - [`acme`] - ACME protocol client and issuance flow
//! - [`dns`] - Challenge record providers and propagation observer
//! - [`keypair`] - ACME account key storage
//! - [`config`] - Environment configuration and cloud platform detection
//! - [`metrics`] - Prometheus metrics

pub mod acme;
pub mod config;
pub mod constants;
pub mod dns;
pub mod errors;
pub mod keypair;
pub mod metrics;
pub mod model;
pub mod reconcilers;
