// signature.rs
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha512};
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::{ConfigError, SharedSecret, SignatureScheme, VerificationKey, VerificationResult};

type HmacSha512 = Hmac<Sha512>;

/// Length of an encoded shared-secret signature: 64 digest bytes in padded base64.
pub const SIGNATURE_LEN: usize = 88;

/// Signs `payload` with `secret`, returning the padded base64 digest.
///
/// The digest covers the payload bytes exactly as given, so callers must pass
/// the raw request body rather than a re-serialized form. Returns `None` for
/// `RsaSha512`, which needs the sender's private key (see [`sign_rsa_sha512`]).
pub fn compute_signature(
    scheme: SignatureScheme,
    secret: &[u8],
    payload: &[u8],
) -> Option<String> {
    match scheme {
        SignatureScheme::Sha512Concat => {
            let mut hasher = Sha512::new();
            hasher.update(secret);
            hasher.update(payload);
            Some(STANDARD.encode(hasher.finalize()))
        }
        SignatureScheme::HmacSha512 => {
            let mut mac =
                HmacSha512::new_from_slice(secret).expect("HMAC accepts keys of any length");
            mac.update(payload);
            Some(STANDARD.encode(mac.finalize().into_bytes()))
        }
        SignatureScheme::RsaSha512 => None,
    }
}

/// Sender side of the v2 scheme: base64 RSASSA-PKCS1-v1_5 SHA-512 signature.
pub fn sign_rsa_sha512(private_key: &RsaPrivateKey, payload: &[u8]) -> String {
    let signing_key = SigningKey::<Sha512>::new(private_key.clone());
    STANDARD.encode(signing_key.sign(payload).to_bytes())
}

/// Equality whose running time depends only on the input lengths.
///
/// Lengths are not secret, so a mismatch returns early.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Checks `claimed` against the `Sha512Concat` signature of `payload`.
///
/// Malformed or empty claims are simply `Invalid`.
pub fn verify(secret: &[u8], payload: &[u8], claimed: &str) -> VerificationResult {
    match compute_signature(SignatureScheme::Sha512Concat, secret, payload) {
        Some(computed) => constant_time_eq(computed.as_bytes(), claimed.as_bytes()).into(),
        None => VerificationResult::Invalid,
    }
}

#[derive(Clone)]
enum Key {
    Shared(SharedSecret),
    Rsa(Arc<VerifyingKey<Sha512>>),
}

#[derive(Clone)]
pub struct SignatureVerifier {
    key: Key,
    scheme: SignatureScheme,
}

impl SignatureVerifier {
    pub fn new(secret: SharedSecret) -> Self {
        Self {
            key: Key::Shared(secret),
            scheme: SignatureScheme::Sha512Concat,
        }
    }

    pub fn with_scheme(secret: SharedSecret, scheme: SignatureScheme) -> Result<Self, ConfigError> {
        Self::with_key(VerificationKey::Shared(secret), scheme)
    }

    /// Fails when the key kind does not fit the scheme.
    pub fn with_key(key: VerificationKey, scheme: SignatureScheme) -> Result<Self, ConfigError> {
        let key = match (key, scheme.uses_public_key()) {
            (VerificationKey::Shared(secret), false) => Key::Shared(secret),
            (VerificationKey::RsaPublic(public_key), true) => {
                Key::Rsa(Arc::new(VerifyingKey::<Sha512>::new(public_key)))
            }
            _ => return Err(ConfigError::KeySchemeMismatch(scheme)),
        };
        Ok(Self { key, scheme })
    }

    pub fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    pub fn shared_secret(&self) -> Option<&SharedSecret> {
        match &self.key {
            Key::Shared(secret) => Some(secret),
            Key::Rsa(_) => None,
        }
    }

    /// The signature a sender would produce, when this side can compute it.
    pub fn sign(&self, payload: &[u8]) -> Option<String> {
        match &self.key {
            Key::Shared(secret) => compute_signature(self.scheme, secret.expose(), payload),
            Key::Rsa(_) => None,
        }
    }

    pub fn verify(&self, payload: &[u8], claimed: &str) -> VerificationResult {
        match &self.key {
            Key::Shared(secret) => match compute_signature(self.scheme, secret.expose(), payload) {
                Some(computed) => constant_time_eq(computed.as_bytes(), claimed.as_bytes()).into(),
                None => VerificationResult::Invalid,
            },
            Key::Rsa(verifying_key) => {
                let Ok(raw) = STANDARD.decode(claimed) else {
                    return VerificationResult::Invalid;
                };
                let Ok(signature) = Signature::try_from(raw.as_slice()) else {
                    return VerificationResult::Invalid;
                };
                verifying_key.verify(payload, &signature).is_ok().into()
            }
        }
    }
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}
