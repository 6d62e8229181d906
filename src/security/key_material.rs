//! Issuer key material.
//!
//! The issuer publishes each key as a PEM-encoded X.509 certificate. Only the
//! RSA public key inside the certificate matters for verification; the
//! certificate's own validity period and chain are not consulted (the
//! `Cache-Control` lifetime of the whole set governs freshness instead).
//! Bare `PUBLIC KEY` / `RSA PUBLIC KEY` PEM blocks are accepted as well.

use jsonwebtoken::DecodingKey;
use x509_parser::oid_registry::OID_PKCS1_RSAENCRYPTION;

const CERTIFICATE_BEGIN: &str = "-----BEGIN CERTIFICATE-----";

/// Why a published key could not be turned into a [`SigningKey`].
#[derive(Debug, thiserror::Error)]
pub enum KeyMaterialError {
    #[error("invalid PEM certificate: {0}")]
    Certificate(String),
    #[error("certificate does not carry an RSA public key")]
    NotRsa,
    #[error("invalid RSA public key: {0}")]
    PublicKey(#[from] jsonwebtoken::errors::Error),
}

/// A verification-ready public key published by the issuer.
///
/// Immutable; a key rotation produces a new set of `SigningKey`s rather than
/// changing existing ones.
#[derive(Clone)]
pub struct SigningKey {
    key_id: String,
    decoding_key: DecodingKey,
}

impl SigningKey {
    /// Parse a PEM certificate or RSA public key published under `key_id`.
    pub fn from_pem(key_id: impl Into<String>, pem: &str) -> Result<Self, KeyMaterialError> {
        let decoding_key = if pem.trim_start().starts_with(CERTIFICATE_BEGIN) {
            rsa_key_from_certificate(pem)?
        } else {
            DecodingKey::from_rsa_pem(pem.as_bytes())?
        };
        Ok(Self {
            key_id: key_id.into(),
            decoding_key,
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

// Key material stays out of Debug output.
impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

fn rsa_key_from_certificate(pem: &str) -> Result<DecodingKey, KeyMaterialError> {
    let (_, block) = x509_parser::pem::parse_x509_pem(pem.trim_start().as_bytes())
        .map_err(|e| KeyMaterialError::Certificate(e.to_string()))?;
    let cert = block
        .parse_x509()
        .map_err(|e| KeyMaterialError::Certificate(e.to_string()))?;
    let spki = cert.public_key();
    if spki.algorithm.algorithm != OID_PKCS1_RSAENCRYPTION {
        return Err(KeyMaterialError::NotRsa);
    }
    // The SPKI bit string of an rsaEncryption key is the PKCS#1 RSAPublicKey DER.
    Ok(DecodingKey::from_rsa_der(&spki.subject_public_key.data))
}
