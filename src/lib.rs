//! Authenticity checks for incoming webhook deliveries.
//!
//! A sender signs the raw request body with a shared secret and puts the
//! result in the `X-Hook-Signature` header. [`signature::SignatureVerifier`]
//! recomputes that signature and compares it in constant time; the
//! [`webhook`] and [`server`] modules adapt it to HTTP.

use rsa::RsaPublicKey;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub mod config;
pub mod error;
pub mod server;
pub mod signature;
pub mod webhook;

pub use error::{ConfigError, WebhookError};
pub use signature::{
    compute_signature, constant_time_eq, sign_rsa_sha512, verify, SignatureVerifier,
};

/// Header carrying the sender's claimed signature (`X-Hook-Signature`).
pub const SIGNATURE_HEADER: &str = "x-hook-signature";

/// Secret shared between the webhook sender and this receiver.
///
/// Loaded once at startup and never mutated. Clones share the same bytes.
/// Not `PartialEq`: compare exposed bytes with [`constant_time_eq`].
#[derive(Clone)]
pub struct SharedSecret(Arc<[u8]>);

impl SharedSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, ConfigError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(ConfigError::EmptySecret);
        }
        Ok(SharedSecret(Arc::from(bytes)))
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

/// Key material a verifier checks signatures against.
#[derive(Debug, Clone)]
pub enum VerificationKey {
    Shared(SharedSecret),
    RsaPublic(RsaPublicKey),
}

/// Outcome of a signature check. There is no third state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationResult {
    Valid,
    Invalid,
}

impl VerificationResult {
    pub fn is_valid(self) -> bool {
        matches!(self, VerificationResult::Valid)
    }
}

impl From<bool> for VerificationResult {
    fn from(valid: bool) -> Self {
        if valid {
            VerificationResult::Valid
        } else {
            VerificationResult::Invalid
        }
    }
}

/// How the digest is derived from the secret and the payload.
///
/// `Sha512Concat` hashes `secret || payload` and is what existing senders
/// produce. It is not a MAC construction; `HmacSha512` is available for
/// senders that can be moved to it. `RsaSha512` is the v2 scheme: an
/// RSASSA-PKCS1-v1_5 SHA-512 signature checked against the sender's public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureScheme {
    #[default]
    Sha512Concat,
    HmacSha512,
    RsaSha512,
}

impl SignatureScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            SignatureScheme::Sha512Concat => "sha512",
            SignatureScheme::HmacSha512 => "hmac-sha512",
            SignatureScheme::RsaSha512 => "rsa-sha512",
        }
    }

    pub fn uses_public_key(self) -> bool {
        matches!(self, SignatureScheme::RsaSha512)
    }
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureScheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha512" | "v1" => Ok(SignatureScheme::Sha512Concat),
            "hmac-sha512" | "v1-hmac" => Ok(SignatureScheme::HmacSha512),
            "rsa-sha512" | "v2" => Ok(SignatureScheme::RsaSha512),
            other => Err(ConfigError::UnknownScheme(other.to_string())),
        }
    }
}
