//! Webhook signature verification.
//!
//! Recomputes an HMAC-SHA256 over `"{timestamp}.{raw_body}"` with the shared
//! secret and compares it against every candidate carried by the signature
//! header, in constant time. The timestamp embedded in the header must fall
//! within the configured tolerance window (replay protection).
//!
//! Verification operates on the raw request body exactly as received.
//! Re-encoding a parsed body before verifying would change whitespace and
//! key ordering and break the signature - the handler must hand the bytes
//! straight through.
//!
//! Header format (processor convention):
//!
//! ```text
//! stripe-signature: t=1614556800,v1=5257a869e7...,v1=ff2899e...
//! ```
//!
//! Multiple entries with the scheme tag are legal (the processor sends more
//! than one during secret rotation); any single match passes.

use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::billing::config::WebhookConfig;
use crate::billing::error::VerificationError;

type HmacSha256 = Hmac<Sha256>;

/// Verifier for the processor's timestamped HMAC signature scheme.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    secret: String,
    scheme: String,
    tolerance: Duration,
}

impl SignatureVerifier {
    /// Build a verifier from the webhook configuration.
    pub fn new(config: &WebhookConfig) -> Self {
        Self {
            secret: config.secret.clone(),
            scheme: config.scheme.clone(),
            tolerance: config.tolerance,
        }
    }

    /// Verify `payload` against `header`, using the current wall clock for
    /// the tolerance check.
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), VerificationError> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    /// Verify with an explicit "now" (tests and deterministic replay).
    pub fn verify_at(
        &self,
        payload: &[u8],
        header: &str,
        now_unix: i64,
    ) -> Result<(), VerificationError> {
        if self.secret.is_empty() {
            return Err(VerificationError::MissingSecret);
        }

        let parsed = parse_header(header, &self.scheme)?;

        let age = now_unix.abs_diff(parsed.timestamp);
        if age > self.tolerance.as_secs() {
            return Err(VerificationError::StaleTimestamp {
                tolerance_secs: self.tolerance.as_secs(),
            });
        }

        for candidate in &parsed.candidates {
            let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
                .map_err(|_| VerificationError::MissingSecret)?;
            mac.update(format!("{}.", parsed.timestamp).as_bytes());
            mac.update(payload);
            // verify_slice is the constant-time comparison.
            if mac.verify_slice(candidate).is_ok() {
                return Ok(());
            }
        }

        Err(VerificationError::BadSignature)
    }
}

struct ParsedHeader {
    timestamp: i64,
    candidates: Vec<Vec<u8>>,
}

fn parse_header(header: &str, scheme: &str) -> Result<ParsedHeader, VerificationError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();

    for entry in header.split(',') {
        let Some((key, value)) = entry.trim().split_once('=') else {
            continue;
        };
        if key == "t" {
            timestamp = value.parse::<i64>().ok();
        } else if key == scheme {
            // Undecodable entries cannot match anything; skip them.
            if let Ok(decoded) = hex::decode(value) {
                candidates.push(decoded);
            }
        }
    }

    match (timestamp, candidates.is_empty()) {
        (Some(timestamp), false) => Ok(ParsedHeader {
            timestamp,
            candidates,
        }),
        _ => Err(VerificationError::MissingSignature),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test123secret456";

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(&WebhookConfig::test_config())
    }

    #[test]
    fn test_valid_signature_accepted() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let now = 1_700_000_000;
        let header = format!("t={now},v1={}", sign(payload, SECRET, now));

        assert!(verifier().verify_at(payload, &header, now).is_ok());
    }

    #[test]
    fn test_single_byte_change_rejected() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let tampered = br#"{"type":"checkout.session.completed"]"#;
        let now = 1_700_000_000;
        let header = format!("t={now},v1={}", sign(payload, SECRET, now));

        assert_eq!(
            verifier().verify_at(tampered, &header, now),
            Err(VerificationError::BadSignature)
        );
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = b"{}";
        let now = 1_700_000_000;
        let header = format!("t={now},v1={}", sign(payload, "wrong_secret", now));

        assert_eq!(
            verifier().verify_at(payload, &header, now),
            Err(VerificationError::BadSignature)
        );
    }

    #[test]
    fn test_old_timestamp_rejected() {
        let payload = b"{}";
        let now = 1_700_000_000;
        let then = now - 600;
        let header = format!("t={then},v1={}", sign(payload, SECRET, then));

        assert!(matches!(
            verifier().verify_at(payload, &header, now),
            Err(VerificationError::StaleTimestamp { .. })
        ));
    }

    #[test]
    fn test_future_timestamp_rejected() {
        let payload = b"{}";
        let now = 1_700_000_000;
        let ahead = now + 600;
        let header = format!("t={ahead},v1={}", sign(payload, SECRET, ahead));

        assert!(matches!(
            verifier().verify_at(payload, &header, now),
            Err(VerificationError::StaleTimestamp { .. })
        ));
    }

    #[test]
    fn test_missing_components_rejected() {
        let v = verifier();
        let now = 1_700_000_000;

        assert_eq!(
            v.verify_at(b"{}", "t=1700000000", now),
            Err(VerificationError::MissingSignature)
        );
        assert_eq!(
            v.verify_at(b"{}", "v1=abcdef", now),
            Err(VerificationError::MissingSignature)
        );
        assert_eq!(
            v.verify_at(b"{}", "", now),
            Err(VerificationError::MissingSignature)
        );
        assert_eq!(
            v.verify_at(b"{}", "garbage", now),
            Err(VerificationError::MissingSignature)
        );
    }

    #[test]
    fn test_missing_secret() {
        let mut config = WebhookConfig::test_config();
        config.secret = String::new();
        let v = SignatureVerifier::new(&config);

        assert_eq!(
            v.verify_at(b"{}", "t=1,v1=aa", 1),
            Err(VerificationError::MissingSecret)
        );
    }

    #[test]
    fn test_rotation_accepts_any_matching_candidate() {
        let payload = b"{}";
        let now = 1_700_000_000;
        let stale = sign(payload, "retired_secret", now);
        let good = sign(payload, SECRET, now);
        let header = format!("t={now},v1={stale},v1={good}");

        assert!(verifier().verify_at(payload, &header, now).is_ok());
    }

    #[test]
    fn test_other_scheme_entries_ignored() {
        let payload = b"{}";
        let now = 1_700_000_000;
        let header = format!("t={now},v0=ignored,v1={}", sign(payload, SECRET, now));

        assert!(verifier().verify_at(payload, &header, now).is_ok());
    }
}
