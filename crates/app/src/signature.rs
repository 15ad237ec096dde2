use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

pub const SIGNATURE_HEADER: &str = "X-Tripleseat-Signature";

/// Why a delivery failed signature verification. The dispatcher prefixes
/// these with `SIGNATURE_VERIFICATION_FAILED_` in the acknowledgment body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureFailure {
    MissingHeader,
    MalformedHeader,
    KeyNotConfigured,
    DigestMismatch,
}

impl SignatureFailure {
    pub fn reason(self) -> &'static str {
        match self {
            Self::MissingHeader => "MISSING_SIGNATURE_HEADER",
            Self::MalformedHeader => "MALFORMED_SIGNATURE_HEADER",
            Self::KeyNotConfigured => "SIGNING_KEY_NOT_CONFIGURED",
            Self::DigestMismatch => "DIGEST_MISMATCH",
        }
    }
}

/// Verifies a `t=<unix_ts>,v1=<hex>` signature header against the raw body.
///
/// The digest is HMAC-SHA256 over `"{t}.{raw_body}"`. Fails closed: a
/// missing secret or missing header rejects the delivery, never accepts it.
pub fn verify(
    secret: Option<&[u8]>,
    header: Option<&str>,
    body: &[u8],
) -> Result<(), SignatureFailure> {
    let Some(secret) = secret else {
        return Err(SignatureFailure::KeyNotConfigured);
    };
    let Some(header) = header else {
        return Err(SignatureFailure::MissingHeader);
    };

    let (timestamp, digest) = parse_header(header)?;
    let provided = hex::decode(digest).map_err(|_| SignatureFailure::MalformedHeader)?;

    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret).map_err(|_| SignatureFailure::KeyNotConfigured)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    let expected = mac.finalize().into_bytes();
    let expected_bytes: &[u8] = expected.as_ref();

    if expected_bytes.ct_eq(provided.as_slice()).into() {
        Ok(())
    } else {
        Err(SignatureFailure::DigestMismatch)
    }
}

fn parse_header(header: &str) -> Result<(&str, &str), SignatureFailure> {
    let mut timestamp = None;
    let mut digest = None;
    for part in header.split(',') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix("t=") {
            timestamp = Some(value);
        } else if let Some(value) = part.strip_prefix("v1=") {
            digest = Some(value);
        }
    }

    match (timestamp, digest) {
        (Some(timestamp), Some(digest)) if !timestamp.is_empty() && !digest.is_empty() => {
            Ok((timestamp, digest))
        }
        _ => Err(SignatureFailure::MalformedHeader),
    }
}
