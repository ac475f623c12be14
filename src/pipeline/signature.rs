//! Shared-secret signature verification for inbound webhooks
//!
//! Signature = base64(HMAC-SHA256(secret, raw_body)).
//!
//! A request without a signature header is accepted (permissive bootstrap
//! default). Whether an invalid signature rejects the request is decided by
//! the caller's `SignaturePolicy`, not here.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Outcome of a signature check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    /// No signature header was sent
    Skipped,
    Valid,
    Invalid,
}

impl SignatureCheck {
    /// Skipped counts as passing
    pub fn passed(&self) -> bool {
        !matches!(self, SignatureCheck::Invalid)
    }
}

/// Verifies `X-Signature` headers against a configured secret
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    secret: Option<String>,
}

impl SignatureVerifier {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    /// Boolean form of [`SignatureVerifier::check`]
    pub fn verify(&self, raw_body: &str, signature: Option<&str>) -> bool {
        self.check(raw_body, signature).passed()
    }

    /// Check `signature` against the body. Never fails: internal errors are
    /// logged and reported as `Invalid`.
    pub fn check(&self, raw_body: &str, signature: Option<&str>) -> SignatureCheck {
        let signature = match signature.map(str::trim).filter(|s| !s.is_empty()) {
            Some(sig) => sig,
            None => {
                log::debug!("No webhook signature supplied, skipping verification");
                return SignatureCheck::Skipped;
            }
        };

        let secret = match &self.secret {
            Some(secret) => secret,
            None => {
                log::warn!("Webhook signature supplied but no WEBHOOK_SECRET configured");
                return SignatureCheck::Invalid;
            }
        };

        let provided = match STANDARD.decode(signature) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Webhook signature is not valid base64: {}", e);
                return SignatureCheck::Invalid;
            }
        };

        let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
            Ok(mac) => mac,
            Err(e) => {
                log::error!("Failed to initialise HMAC: {}", e);
                return SignatureCheck::Invalid;
            }
        };
        mac.update(raw_body.as_bytes());

        // verify_slice compares in constant time
        match mac.verify_slice(&provided) {
            Ok(()) => SignatureCheck::Valid,
            Err(_) => SignatureCheck::Invalid,
        }
    }

    /// Compute the signature a sender would attach to `raw_body`
    pub fn sign(&self, raw_body: &str) -> Option<String> {
        let secret = self.secret.as_ref()?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(raw_body.as_bytes());
        Some(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{"externalId":"P1","type":"sleep","score":0.8}"#;

    #[test]
    fn test_missing_signature_is_skipped_and_passes() {
        let verifier = SignatureVerifier::new(Some("shh".to_string()));
        assert_eq!(verifier.check(BODY, None), SignatureCheck::Skipped);
        assert_eq!(verifier.check(BODY, Some("  ")), SignatureCheck::Skipped);
        assert!(verifier.verify(BODY, None));
    }

    #[test]
    fn test_valid_signature() {
        let verifier = SignatureVerifier::new(Some("shh".to_string()));
        let sig = verifier.sign(BODY).unwrap();
        assert_eq!(verifier.check(BODY, Some(&sig)), SignatureCheck::Valid);
    }

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2, base64 encoded
        let verifier = SignatureVerifier::new(Some("Jefe".to_string()));
        let body = "what do ya want for nothing?";
        let expected = "W9zBRr9gdU5qBCQmCJV1x1oAPwidJzmDnexYuWTsOEM=";
        assert_eq!(verifier.sign(body).as_deref(), Some(expected));
        assert!(verifier.verify(body, Some(expected)));
    }

    #[test]
    fn test_tampered_body_fails() {
        let verifier = SignatureVerifier::new(Some("shh".to_string()));
        let sig = verifier.sign(BODY).unwrap();
        let tampered = BODY.replace("0.8", "0.9");
        assert_eq!(verifier.check(&tampered, Some(&sig)), SignatureCheck::Invalid);
    }

    #[test]
    fn test_garbage_signature_fails_without_panicking() {
        let verifier = SignatureVerifier::new(Some("shh".to_string()));
        assert!(!verifier.verify(BODY, Some("%%% not base64 %%%")));
        assert!(!verifier.verify(BODY, Some("c2hvcnQ=")));
    }

    #[test]
    fn test_signature_without_secret_fails() {
        let verifier = SignatureVerifier::new(None);
        assert_eq!(verifier.check(BODY, Some("abc=")), SignatureCheck::Invalid);
        assert!(verifier.sign(BODY).is_none());
    }
}
