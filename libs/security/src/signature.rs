use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;

type HmacSha256 = Hmac<Sha256>;

/// Inbound signature header (case-insensitive on the wire).
pub const SIGNATURE_HEADER: &str = "signature";
/// Inbound timestamp header, UNIX seconds of the raw body.
pub const TIMESTAMP_HEADER: &str = "timestamp";
/// Maximum allowed clock skew between sender and receiver.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),
    #[error("timestamp is not an integer")]
    MalformedTimestamp,
    #[error("timestamp outside tolerance window")]
    StaleTimestamp,
    #[error("signature does not match payload")]
    Mismatch,
}

/// Hex HMAC-SHA256 over `"{timestamp}.{body}"`.
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("hmac-sha256 accepts keys of any length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a signature against the current clock.
pub fn verify(
    secret: &str,
    signature: Option<&str>,
    timestamp: Option<&str>,
    body: &[u8],
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    verify_at(
        secret,
        signature,
        timestamp,
        body,
        tolerance_secs,
        OffsetDateTime::now_utc().unix_timestamp(),
    )
}

/// Clock-injected form of [`verify`].
pub fn verify_at(
    secret: &str,
    signature: Option<&str>,
    timestamp: Option<&str>,
    body: &[u8],
    tolerance_secs: i64,
    now: i64,
) -> Result<(), SignatureError> {
    let signature = signature
        .filter(|s| !s.is_empty())
        .ok_or(SignatureError::MissingHeader("signature"))?;
    let timestamp = timestamp
        .filter(|t| !t.is_empty())
        .ok_or(SignatureError::MissingHeader("timestamp"))?;
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::MalformedTimestamp)?;
    if (now - ts).abs() > tolerance_secs {
        return Err(SignatureError::StaleTimestamp);
    }
    let expected = sign(secret, ts, body);
    if constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// Outbound header name: the merchant name reduced to an HTTP token plus
/// `-Signature`.
pub fn merchant_signature_header(merchant: &str) -> String {
    let mut token = String::with_capacity(merchant.len());
    for c in merchant.chars() {
        if c.is_ascii_alphanumeric() {
            token.push(c);
        } else if !token.ends_with('-') && !token.is_empty() {
            token.push('-');
        }
    }
    let token = token.trim_end_matches('-');
    if token.is_empty() {
        "Merchant-Signature".into()
    } else {
        format!("{token}-Signature")
    }
}
