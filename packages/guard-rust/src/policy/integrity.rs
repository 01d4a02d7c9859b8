//! Payload digest verification.
//!
//! The digest covers the canonical JSON encoding of the payload with the
//! digest field itself removed. Payloads are `BTreeMap`s, so key order is
//! already stable.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use bastion_core::{Payload, Value};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::config::ExecutorConfig;
use crate::traits::IntegrityVerifier;

/// Digest function used for payload checksums.
#[derive(Clone)]
pub enum DigestAlgorithm {
    /// Plain SHA-256. Detects corruption, not forgery.
    Sha256,
    /// BLAKE3 keyed hash (MAC) with a 32-byte secret.
    Blake3Keyed([u8; 32]),
}

impl fmt::Debug for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 => f.write_str("Sha256"),
            Self::Blake3Keyed(_) => f.write_str("Blake3Keyed(<redacted>)"),
        }
    }
}

/// Verifies a hex digest carried in a payload field.
#[derive(Debug, Clone)]
pub struct DigestIntegrityVerifier {
    algorithm: DigestAlgorithm,
    field: String,
}

impl DigestIntegrityVerifier {
    #[must_use]
    pub fn new(algorithm: DigestAlgorithm, field: impl Into<String>) -> Self {
        Self {
            algorithm,
            field: field.into(),
        }
    }

    /// Verifier reading the digest from the configured `integrity_field`.
    #[must_use]
    pub fn from_config(algorithm: DigestAlgorithm, config: &ExecutorConfig) -> Self {
        Self::new(algorithm, config.integrity_field.clone())
    }

    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Hex digest of `payload`, excluding the digest field.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be encoded as JSON (non-finite floats).
    pub fn digest(&self, payload: &Payload) -> Result<String, serde_json::Error> {
        let view: BTreeMap<&str, &Value> = payload
            .iter()
            .filter(|(key, _)| key.as_str() != self.field)
            .map(|(key, value)| (key.as_str(), value))
            .collect();
        let bytes = serde_json::to_vec(&view)?;
        Ok(match &self.algorithm {
            DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(&bytes)),
            DigestAlgorithm::Blake3Keyed(key) => {
                blake3::keyed_hash(key, &bytes).to_hex().to_string()
            }
        })
    }

    /// Write the digest of `payload` into its digest field.
    ///
    /// # Errors
    ///
    /// Same as [`digest`](Self::digest).
    pub fn seal(&self, payload: &mut Payload) -> Result<(), serde_json::Error> {
        let digest = self.digest(payload)?;
        payload.insert(self.field.clone(), Value::String(digest));
        Ok(())
    }

    fn check(&self, payload: &Payload) -> bool {
        let Some(supplied) = payload.get(&self.field).and_then(Value::as_str) else {
            debug!(field = %self.field, "payload carries no digest");
            return false;
        };
        let expected = match self.digest(payload) {
            Ok(expected) => expected,
            Err(e) => {
                debug!(error = %e, "payload digest could not be computed");
                return false;
            }
        };
        let supplied = supplied.to_ascii_lowercase();
        expected.as_bytes().ct_eq(supplied.as_bytes()).into()
    }
}

#[async_trait]
impl IntegrityVerifier for DigestIntegrityVerifier {
    async fn verify(&self, payload: &Payload) -> bool {
        self.check(payload)
    }
}
