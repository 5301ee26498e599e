use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age (either direction) of a signed timestamp, in seconds.
pub const TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    MissingHeader,
    Malformed,
    TimestampOutOfTolerance { timestamp: i64, now: i64 },
    Mismatch,
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureError::MissingHeader => write!(f, "missing Stripe-Signature header"),
            SignatureError::Malformed => write!(f, "malformed Stripe-Signature header"),
            SignatureError::TimestampOutOfTolerance { timestamp, now } => write!(
                f,
                "signature timestamp {} outside tolerance (now {})",
                timestamp, now
            ),
            SignatureError::Mismatch => write!(f, "no v1 signature matched the payload"),
        }
    }
}

impl std::error::Error for SignatureError {}

/// Verifies a `t=<unix>,v1=<hex>[,v1=<hex>...]` header against the raw body.
///
/// The signed content is `"{t}.{body}"` keyed with the full endpoint secret.
pub fn verify(
    payload: &[u8],
    header: Option<&str>,
    secret: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::MissingHeader)?;

    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();
    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if now.abs_diff(timestamp) > TOLERANCE_SECS.unsigned_abs() {
        return Err(SignatureError::TimestampOutOfTolerance { timestamp, now });
    }

    let matched = signatures.iter().any(|candidate| {
        signed_mac(payload, secret, timestamp)
            .map(|mac| mac.verify_slice(candidate).is_ok())
            .unwrap_or(false)
    });
    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Builds a header value the way the provider does.
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let digest = signed_mac(payload, secret, timestamp)
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
        .unwrap_or_default();
    format!("t={},v1={}", timestamp, digest)
}

fn signed_mac(payload: &[u8], secret: &str, timestamp: i64) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Some(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const BODY: &[u8] = br#"{"id":"evt_1","type":"checkout.session.completed"}"#;

    #[test]
    fn test_valid_signature_accepted() {
        let header = sign(BODY, SECRET, 1_700_000_000);
        assert_eq!(verify(BODY, Some(header.as_str()), SECRET, 1_700_000_100), Ok(()));
    }

    #[test]
    fn test_any_v1_may_match() {
        let good = sign(BODY, SECRET, 1_700_000_000);
        let v1 = good.split("v1=").nth(1).unwrap();
        let header = format!("t=1700000000,v1={},v1={},v0=deadbeef", "00".repeat(32), v1);
        assert_eq!(verify(BODY, Some(header.as_str()), SECRET, 1_700_000_000), Ok(()));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let header = sign(BODY, SECRET, 1_700_000_000);
        let tampered = br#"{"id":"evt_1","type":"checkout.session.expired"}"#;
        assert_eq!(
            verify(tampered, Some(header.as_str()), SECRET, 1_700_000_000),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let header = sign(BODY, "whsec_other", 1_700_000_000);
        assert_eq!(
            verify(BODY, Some(header.as_str()), SECRET, 1_700_000_000),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let header = sign(BODY, SECRET, 1_700_000_000);
        assert!(matches!(
            verify(BODY, Some(header.as_str()), SECRET, 1_700_000_000 + TOLERANCE_SECS + 1),
            Err(SignatureError::TimestampOutOfTolerance { .. })
        ));
    }

    #[test]
    fn test_missing_or_malformed_header() {
        assert_eq!(
            verify(BODY, None, SECRET, 0),
            Err(SignatureError::MissingHeader)
        );
        assert_eq!(
            verify(BODY, Some("v1=abcd"), SECRET, 0),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify(BODY, Some("t=0"), SECRET, 0),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn test_extreme_timestamps_are_out_of_tolerance() {
        let header = format!("t={},v1={}", i64::MIN, "00".repeat(32));
        assert_eq!(
            verify(BODY, Some(header.as_str()), SECRET, 1_700_000_000),
            Err(SignatureError::TimestampOutOfTolerance {
                timestamp: i64::MIN,
                now: 1_700_000_000,
            })
        );

        let header = format!("t={},v1={}", i64::MAX, "00".repeat(32));
        assert!(verify(BODY, Some(header.as_str()), SECRET, i64::MIN).is_err());
    }
}
