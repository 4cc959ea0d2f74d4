// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes reconciliation of certificate requests.
//!
//! # Reconciliation Architecture
//!
//! 1. **Watch** - [`namespace::NamespaceScheduler`] tracks live namespaces
//! 2. **Schedule** - every namespace is reconciled every 45 seconds
//! 3. **Reconcile** - [`service::ServiceReconciler`] inspects annotated services
//!    and dispatches one certificate flow per service
//! 4. **Persist** - [`secrets`] decides new / renew / up to date and stores the
//!    certificate with its provenance annotations
//!
//! Failed flows are not retried in place; the next pass picks them up again.

pub mod namespace;
pub mod retry;
pub mod secrets;
pub mod service;

pub use namespace::{KubeServiceLister, NamespaceEvent, NamespaceScheduler, ServiceLister};
pub use secrets::{KubeSecretStore, RenewalDecision, SecretStore};
pub use service::ServiceReconciler;
