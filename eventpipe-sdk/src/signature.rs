//! HMAC-SHA256 signatures for inbound webhook bodies.
//!
//! The header format is:
//!
//! ```text
//! Eventpipe-Signature: {unix_timestamp}.{base64_signature}
//! ```
//!
//! where the signature is `HMAC-SHA256("{timestamp}.{raw_body}", secret)`.
//! The body is signed byte-for-byte, so verification never re-serializes it.

/// Header name for the HMAC signature.
pub const SIGNATURE_HEADER: &str = "Eventpipe-Signature";

/// Maximum allowed age of a signature (in seconds).
pub const MAX_SIGNATURE_AGE: i64 = 5 * 60;

/// Errors produced by signature operations.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid header format")]
    InvalidFormat,
    #[error("invalid base64 encoding")]
    InvalidBase64,
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("signature expired")]
    Expired,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

fn signing_input(timestamp: i64, body: &[u8]) -> Vec<u8> {
    let prefix = format!("{timestamp}.");
    let mut data = Vec::with_capacity(prefix.len() + body.len());
    data.extend_from_slice(prefix.as_bytes());
    data.extend_from_slice(body);
    data
}

fn hmac_key(key: &[u8]) -> ring::hmac::Key {
    ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key)
}

// ---------------------------------------------------------------------------
// Signing / verification
// ---------------------------------------------------------------------------

/// Sign `body` with the current time and return the full header value.
pub fn sign_body(body: &[u8], key: &[u8]) -> String {
    let timestamp = time::OffsetDateTime::now_utc().unix_timestamp();
    sign_body_at(timestamp, body, key)
}

/// Sign `body` for an explicit timestamp and return the full header value.
pub fn sign_body_at(timestamp: i64, body: &[u8], key: &[u8]) -> String {
    let sig = ring::hmac::sign(&hmac_key(key), &signing_input(timestamp, body));
    format_signature_header(timestamp, sig.as_ref())
}

/// Verify a raw `Eventpipe-Signature` header value against `body`.
///
/// Checks the HMAC first and then the timestamp freshness.
pub fn verify_body(header_value: &str, body: &[u8], key: &[u8]) -> Result<(), SignatureError> {
    let (timestamp, signature) = parse_signature_header(header_value)?;
    ring::hmac::verify(
        &hmac_key(key),
        &signing_input(timestamp, body),
        signature.as_ref(),
    )?;
    check_timestamp(timestamp)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Header parsing / formatting
// ---------------------------------------------------------------------------

/// Parse a `{timestamp}.{base64}` header value into
/// `(timestamp, raw_signature_bytes)`.
pub fn parse_signature_header(value: &str) -> Result<(i64, Box<[u8]>), SignatureError> {
    let (timestamp, signature) = value.split_once('.').ok_or(SignatureError::InvalidFormat)?;
    let timestamp: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| SignatureError::InvalidFormat)?;
    let signature_bytes = fast32::base64::RFC4648_NOPAD
        .decode_str(signature.trim())
        .map_err(|_| SignatureError::InvalidBase64)?
        .into_boxed_slice();
    Ok((timestamp, signature_bytes))
}

/// Format a `{timestamp}.{base64}` header value from its parts.
pub fn format_signature_header(timestamp: i64, signature: &[u8]) -> String {
    format!(
        "{}.{}",
        timestamp,
        fast32::base64::RFC4648_NOPAD.encode(signature)
    )
}

/// Check that a signature timestamp is within [`MAX_SIGNATURE_AGE`].
pub fn check_timestamp(timestamp: i64) -> Result<(), SignatureError> {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    if now - timestamp > MAX_SIGNATURE_AGE {
        return Err(SignatureError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"webhook-secret";

    #[test]
    fn test_sign_then_verify() {
        let body = br#"{"issue":{"id":"1"}}"#;
        let header = sign_body(body, KEY);
        assert!(verify_body(&header, body, KEY).is_ok());
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let header = sign_body(b"{\"a\":1}", KEY);
        assert!(matches!(
            verify_body(&header, b"{\"a\":2}", KEY),
            Err(SignatureError::SignatureMismatch)
        ));
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let header = sign_body(b"{}", KEY);
        assert!(matches!(
            verify_body(&header, b"{}", b"other"),
            Err(SignatureError::SignatureMismatch)
        ));
    }

    #[test]
    fn test_expired_signature() {
        let old = time::OffsetDateTime::now_utc().unix_timestamp() - MAX_SIGNATURE_AGE - 10;
        let header = sign_body_at(old, b"{}", KEY);
        assert!(matches!(
            verify_body(&header, b"{}", KEY),
            Err(SignatureError::Expired)
        ));
    }

    #[test]
    fn test_malformed_headers() {
        assert!(matches!(
            parse_signature_header("no-dot"),
            Err(SignatureError::InvalidFormat)
        ));
        assert!(matches!(
            parse_signature_header("abc.AAAA"),
            Err(SignatureError::InvalidFormat)
        ));
        assert!(matches!(
            parse_signature_header("123.!!!"),
            Err(SignatureError::InvalidBase64)
        ));
    }

    #[test]
    fn test_header_round_trip() {
        let header = format_signature_header(42, &[1, 2, 3]);
        let (ts, sig) = parse_signature_header(&header).unwrap();
        assert_eq!(ts, 42);
        assert_eq!(sig.as_ref(), &[1, 2, 3]);
    }
}
