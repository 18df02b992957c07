// webhook.rs
use axum::http::HeaderMap;
use tracing::debug;

use crate::signature::SignatureVerifier;
use crate::{SignatureScheme, VerificationResult, SIGNATURE_HEADER};

#[derive(Debug, Clone)]
pub struct WebhookHandler {
    verifier: SignatureVerifier,
}

impl WebhookHandler {
    pub fn new(verifier: SignatureVerifier) -> Self {
        Self { verifier }
    }

    pub fn scheme(&self) -> SignatureScheme {
        self.verifier.scheme()
    }

    /// The claimed signature, if exactly one readable header is present.
    pub fn claimed_signature(headers: &HeaderMap) -> Option<&str> {
        let mut values = headers.get_all(SIGNATURE_HEADER).iter();
        let value = values.next()?;
        if values.next().is_some() {
            return None;
        }
        value.to_str().ok()
    }

    pub fn verify_request(&self, headers: &HeaderMap, body: &[u8]) -> VerificationResult {
        let claimed = match Self::claimed_signature(headers) {
            Some(sig) => sig,
            None => return VerificationResult::Invalid,
        };

        let result = self.verifier.verify(body, claimed);

        // Release builds never emit signature values.
        if cfg!(debug_assertions) && !result.is_valid() {
            debug!(
                expected = ?self.verifier.sign(body),
                claimed = %claimed,
                "signature mismatch"
            );
        }

        result
    }
}
