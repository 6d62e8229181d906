//! Structural parsing of compact-serialized tokens.
//!
//! Only the header is interpreted here. The payload and signature stay as the
//! raw segments received: both are attacker-controlled until the signature
//! over `header.payload` has been checked, and any edit to either must surface
//! as a signature failure rather than a decoding one.

use super::AuthError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{Map, Value};

/// A token split into its three parts.
#[derive(Debug)]
pub struct ParsedToken<'a> {
    /// Decoded header object
    pub header: Map<String, Value>,
    /// Payload segment, still base64url-encoded
    pub payload: &'a str,
    /// `header-segment "." payload-segment` exactly as received
    pub signed: &'a str,
    /// Signature segment, still base64url-encoded
    pub signature: &'a str,
}

impl ParsedToken<'_> {
    /// Header `alg`, if present and a string.
    pub fn algorithm(&self) -> Option<&str> {
        self.header.get("alg").and_then(Value::as_str)
    }

    /// Header `kid`, if present, a string, and non-empty.
    pub fn key_id(&self) -> Option<&str> {
        self.header
            .get("kid")
            .and_then(Value::as_str)
            .filter(|kid| !kid.is_empty())
    }
}

/// Decode one base64url segment.
///
/// Both alphabets are tolerated: `-`/`_` are mapped to `+`/`/` and the input is
/// padded to a multiple of four before standard decoding.
pub fn decode_segment(segment: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let mut normalized: String = segment
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    let rem = normalized.len() % 4;
    if rem != 0 {
        normalized.extend(std::iter::repeat('=').take(4 - rem));
    }
    STANDARD.decode(normalized)
}

/// Split and decode `token`.
///
/// # Errors
///
/// [`AuthError::MalformedToken`] if the token does not have exactly three
/// segments or the header is not base64-encoded JSON object.
pub fn parse(token: &str) -> Result<ParsedToken<'_>, AuthError> {
    let mut segments = token.split('.');
    let (header_b64, payload_b64, signature_b64) =
        match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(h), Some(p), Some(s), None) => (h, p, s),
            _ => return Err(AuthError::malformed("expected three segments")),
        };

    let header_bytes =
        decode_segment(header_b64).map_err(|e| AuthError::malformed(format!("header: {e}")))?;
    let header: Map<String, Value> = serde_json::from_slice(&header_bytes)
        .map_err(|e| AuthError::malformed(format!("header is not a JSON object: {e}")))?;
    // Signed bytes come from the original string, never re-encoded.
    let signed = &token[..header_b64.len() + 1 + payload_b64.len()];

    Ok(ParsedToken {
        header,
        payload: payload_b64,
        signed,
        signature: signature_b64,
    })
}
