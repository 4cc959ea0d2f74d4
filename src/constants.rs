// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the acmedns controller.
//!
//! Annotation keys and secret names in this module form the durable contract
//! with existing cluster state and must not change between releases.

use std::time::Duration;

// ============================================================================
// Annotation Constants
// ============================================================================

/// Service annotation requesting a certificate (domain or JSON array of domains).
///
/// Also written onto certificate secrets, holding the JSON array of domains
/// the stored certificate covers.
pub const REQUEST_ANNOTATION: &str = "acme/certificate";

/// Secret annotation holding the certificate expiry as an ISO calendar date
pub const EXPIRY_ANNOTATION: &str = "acme/expiryDate";

/// Secret annotation holding the ACME directory URL that issued the certificate
///
/// Also set on the account key secret, naming the directory the account was
/// registered with.
pub const ACME_CA_ANNOTATION: &str = "acme/ca";

/// Service annotation overriding the default secret name
pub const SECRET_NAME_ANNOTATION: &str = "acme/secretName";

/// Suffix appended to the hyphenated domain for default secret names
pub const SECRET_NAME_SUFFIX: &str = "-tls";

// ============================================================================
// Account Key Constants
// ============================================================================

/// Namespace holding the ACME account key secret
pub const SYSTEM_NAMESPACE: &str = "kube-system";

/// Name of the secret holding the ACME account key
pub const KEYPAIR_SECRET_NAME: &str = "letsencrypt-keypair";

/// Data field of the account key secret holding the serialized account credentials
pub const KEYPAIR_FIELD: &str = "keypair";

/// RSA modulus size for certificate keys
pub const RSA_KEY_BITS: usize = 2048;

// ============================================================================
// Secret Payload Defaults
// ============================================================================

/// Default data key for the leaf certificate
pub const DEFAULT_CERTIFICATE_FILENAME: &str = "certificate.pem";

/// Default data key for the issuer chain
pub const DEFAULT_CHAIN_FILENAME: &str = "chain.pem";

/// Default data key for the certificate private key
pub const DEFAULT_KEY_FILENAME: &str = "key.pem";

/// Default data key for leaf certificate followed by its chain
pub const DEFAULT_FULLCHAIN_FILENAME: &str = "fullchain.pem";

// ============================================================================
// ACME Constants
// ============================================================================

/// Let's Encrypt production directory
pub const DEFAULT_ACME_URL: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// Prefix of DNS-01 challenge records
pub const ACME_CHALLENGE_PREFIX: &str = "_acme-challenge";

/// Interval between challenge status polls
pub const CHALLENGE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on waiting for the CA to leave the pending challenge state
pub const CHALLENGE_TIMEOUT: Duration = Duration::from_secs(600);

/// Interval between order status polls while waiting for ready/valid
pub const ORDER_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Upper bound on waiting for an order to become ready or valid
pub const ORDER_TIMEOUT: Duration = Duration::from_secs(300);

/// Days before expiry at which a certificate is renewed
pub const RENEWAL_WINDOW_DAYS: u64 = 2;

// ============================================================================
// DNS Constants
// ============================================================================

/// Standard DNS port for queries
pub const DNS_PORT: u16 = 53;

/// TTL of challenge TXT records in seconds
pub const CHALLENGE_RECORD_TTL_SECS: i64 = 60;

/// Cloud DNS change status poll interval
pub const CLOUD_DNS_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Extra wait after Cloud DNS reports a change as done
///
/// Cloud DNS answers from stale servers for a while after a change is "done".
pub const CLOUD_DNS_SETTLE_DELAY: Duration = Duration::from_secs(100);

/// Route 53 change status poll interval
pub const ROUTE53_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default per-nameserver propagation timeout in seconds
pub const DEFAULT_PROPAGATION_TIMEOUT_SECS: u64 = 60;

/// Interval between direct nameserver lookups while observing propagation
pub const PROPAGATION_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Timeout of a single direct nameserver query
pub const DNS_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Cloud Platform Constants
// ============================================================================

/// Google Cloud DNS REST API base URL
pub const CLOUD_DNS_API_URL: &str = "https://dns.googleapis.com/dns/v1";

/// GCE metadata server base URL
pub const GCE_METADATA_URL: &str = "http://metadata.google.internal";

/// Hostname probed to detect Google Cloud Platform
pub const GCE_METADATA_HOST: &str = "metadata.google.internal";

/// EC2 instance metadata address probed to detect Amazon Web Services
pub const EC2_METADATA_URL: &str = "http://169.254.169.254/latest/meta-data/";

/// Timeout for cloud platform detection probes
pub const DETECTION_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Reconciliation Constants
// ============================================================================

/// Interval between reconciliation passes of one namespace
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(45);

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Default bind address for the Prometheus metrics HTTP server
pub const DEFAULT_METRICS_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";
