//! Callback signature verification.
//!
//! Senders sign `"<unix secs>.<raw body>"` with HMAC-SHA256 and send
//! `X-Convoflow-Signature: t=<unix secs>,v1=<hex digest>`. Timestamps older
//! than the configured tolerance are rejected to stop replays.

use std::time::Duration;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

pub const SIGNATURE_HEADER: &str = "x-convoflow-signature";

/// Allowed clock skew for timestamps in the future.
const MAX_CLOCK_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("Missing signature header")]
    Missing,

    #[error("Malformed signature header: {0}")]
    Malformed(&'static str),

    #[error("Signature timestamp outside tolerance")]
    Expired,

    #[error("Signature timestamp in the future")]
    FromFuture,

    #[error("Signature mismatch")]
    Mismatch,
}

/// Parsed `t=..,v1=..` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parses the header. Several `v1` entries are allowed so senders can
    /// rotate secrets; unknown keys are ignored.
    pub fn parse(header: &str) -> Result<Self, SignatureError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .trim()
                .split_once('=')
                .ok_or(SignatureError::Malformed("expected key=value pairs"))?;
            match key {
                "t" => {
                    timestamp = Some(
                        value
                            .parse()
                            .map_err(|_| SignatureError::Malformed("invalid timestamp"))?,
                    )
                }
                "v1" => signatures.push(
                    hex::decode(value).map_err(|_| SignatureError::Malformed("invalid hex"))?,
                ),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureError::Malformed("missing timestamp"))?;
        if signatures.is_empty() {
            return Err(SignatureError::Malformed("missing v1 signature"));
        }
        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

/// Verifies signed callbacks. Without a secret every callback is accepted.
#[derive(Clone)]
pub struct CallbackVerifier {
    secret: Option<SecretString>,
    tolerance: Duration,
}

impl CallbackVerifier {
    pub fn new(secret: Option<SecretString>, tolerance: Duration) -> Self {
        Self { secret, tolerance }
    }

    /// A verifier that accepts unsigned callbacks.
    pub fn disabled() -> Self {
        Self::new(None, Duration::ZERO)
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    pub fn verify(&self, payload: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
        self.verify_at(payload, header, chrono::Utc::now().timestamp())
    }

    pub fn verify_at(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now_secs: i64,
    ) -> Result<(), SignatureError> {
        let Some(secret) = &self.secret else {
            return Ok(());
        };
        let header = SignatureHeader::parse(header.ok_or(SignatureError::Missing)?)?;

        let age = now_secs - header.timestamp;
        if age > self.tolerance.as_secs() as i64 {
            return Err(SignatureError::Expired);
        }
        if age < -MAX_CLOCK_SKEW_SECS {
            return Err(SignatureError::FromFuture);
        }

        let expected = sign(secret.expose_secret(), header.timestamp, payload);
        let matched = header
            .signatures
            .iter()
            .any(|candidate| candidate.len() == expected.len() && bool::from(candidate.ct_eq(&expected)));
        if matched {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }
}

fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> Vec<u8> {
    // new_from_slice only fails for fixed-size keys, never for HMAC.
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return Vec::new();
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Builds a header value for `payload`, as a callback sender would.
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    format!("t={},v1={}", timestamp, hex::encode(sign(secret, timestamp, payload)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "cbsec_test_secret_0001";
    const NOW: i64 = 1_760_000_000;

    fn verifier() -> CallbackVerifier {
        CallbackVerifier::new(Some(SecretString::new(SECRET.into())), Duration::from_secs(300))
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Header parsing
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn parses_timestamp_and_signatures() {
        let header = SignatureHeader::parse("t=123,v1=abcd,v1=ef01,v0=zz").unwrap();
        assert_eq!(header.timestamp, 123);
        assert_eq!(header.signatures, vec![vec![0xab, 0xcd], vec![0xef, 0x01]]);
    }

    #[test]
    fn rejects_header_without_signature() {
        assert_eq!(
            SignatureHeader::parse("t=123"),
            Err(SignatureError::Malformed("missing v1 signature"))
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(SignatureHeader::parse("nonsense").is_err());
        assert!(SignatureHeader::parse("t=abc,v1=00").is_err());
        assert!(SignatureHeader::parse("t=1,v1=xyz").is_err());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Verification
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn accepts_valid_signature() {
        let body = br#"{"correlation_key":"PAY-123"}"#;
        let header = signature_header(SECRET, NOW - 10, body);
        assert_eq!(verifier().verify_at(body, Some(&header), NOW), Ok(()));
    }

    #[test]
    fn rejects_tampered_body() {
        let header = signature_header(SECRET, NOW, b"original");
        assert_eq!(
            verifier().verify_at(b"tampered", Some(&header), NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn rejects_wrong_secret() {
        let header = signature_header("some_other_secret_value", NOW, b"body");
        assert_eq!(
            verifier().verify_at(b"body", Some(&header), NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn rejects_stale_and_future_timestamps() {
        let stale = signature_header(SECRET, NOW - 301, b"body");
        assert_eq!(
            verifier().verify_at(b"body", Some(&stale), NOW),
            Err(SignatureError::Expired)
        );

        let future = signature_header(SECRET, NOW + 120, b"body");
        assert_eq!(
            verifier().verify_at(b"body", Some(&future), NOW),
            Err(SignatureError::FromFuture)
        );
    }

    #[test]
    fn missing_header_is_rejected_only_when_enabled() {
        assert_eq!(verifier().verify_at(b"body", None, NOW), Err(SignatureError::Missing));
        assert_eq!(CallbackVerifier::disabled().verify_at(b"body", None, NOW), Ok(()));
    }
}
