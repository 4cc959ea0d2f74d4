// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Certificate keys, signing requests and issued chain handling.

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding as Pkcs1LineEnding};
use rsa::pkcs1v15::{Signature, SigningKey};
use rsa::RsaPrivateKey;
use sha2::Sha256;
use std::str::FromStr;
use x509_cert::builder::{Builder, RequestBuilder};
use x509_cert::der::asn1::Ia5String;
use x509_cert::der::pem::LineEnding;
use x509_cert::der::{Encode, EncodePem};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::SubjectAltName;
use x509_cert::name::Name;
use x509_cert::Certificate;

use crate::constants::RSA_KEY_BITS;
use crate::errors::{Error, Result};

/// Generate a fresh RSA key for a certificate.
pub(crate) fn generate_rsa_key() -> Result<RsaPrivateKey> {
    RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
        .map_err(|e| Error::KeyPair(format!("Failed to generate RSA key: {e}")))
}

/// PKCS#1 PEM encoding of a certificate key.
pub(crate) fn private_key_pem(key: &RsaPrivateKey) -> Result<String> {
    key.to_pkcs1_pem(Pkcs1LineEnding::LF)
        .map(|pem| pem.to_string())
        .map_err(|e| Error::KeyPair(format!("Failed to encode RSA key: {e}")))
}

/// Build a DER encoded CSR. The first domain becomes the subject CN and all
/// domains are listed as DNS subject alternative names.
pub(crate) fn create_csr(key: &RsaPrivateKey, domains: &[String]) -> Result<Vec<u8>> {
    let primary = domains.first().ok_or(Error::NoDomains)?;

    let subject = Name::from_str(&format!("CN={primary}"))
        .map_err(|e| csr_error(format!("invalid subject for '{primary}': {e}")))?;
    let names = domains
        .iter()
        .map(|domain| Ia5String::new(domain).map(GeneralName::DnsName))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| csr_error(format!("invalid DNS name: {e}")))?;

    let signer = SigningKey::<Sha256>::new(key.clone());
    let mut builder = RequestBuilder::new(subject, &signer).map_err(|e| csr_error(e.to_string()))?;
    builder
        .add_extension(&SubjectAltName(names))
        .map_err(|e| csr_error(e.to_string()))?;

    let request = builder
        .build::<Signature>()
        .map_err(|e| csr_error(e.to_string()))?;
    request.to_der().map_err(|e| csr_error(e.to_string()))
}

fn csr_error(reason: String) -> Error {
    Error::Acme(format!("Failed to create certificate signing request: {reason}"))
}

/// Issued certificate split into leaf and issuer chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IssuedChain {
    pub certificate: String,
    pub chain: String,
    pub fullchain: String,
    pub expiry_date: DateTime<Utc>,
}

/// Parse the PEM chain downloaded from the CA, leaf first.
pub(crate) fn parse_chain(pem: &str) -> Result<IssuedChain> {
    let certificates = Certificate::load_pem_chain(pem.as_bytes())
        .map_err(|e| Error::Acme(format!("Invalid certificate chain: {e}")))?;
    let leaf = certificates
        .first()
        .ok_or_else(|| Error::Acme("Certificate chain is empty".to_string()))?;

    let encoded = certificates
        .iter()
        .map(|cert| {
            cert.to_pem(LineEnding::LF)
                .map_err(|e| Error::Acme(format!("Failed to encode certificate: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let not_after = leaf
        .tbs_certificate
        .validity
        .not_after
        .to_unix_duration()
        .as_secs();
    let expiry_date = i64::try_from(not_after)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .ok_or_else(|| Error::Acme(format!("Certificate expiry out of range: {not_after}")))?;

    Ok(IssuedChain {
        certificate: encoded[0].clone(),
        chain: encoded[1..].concat(),
        fullchain: encoded.concat(),
        expiry_date,
    })
}

#[cfg(test)]
#[path = "csr_tests.rs"]
pub(crate) mod csr_tests;
