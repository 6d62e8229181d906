//! Authentication failure taxonomy.
//!
//! Every way a request can fail to authenticate is a distinct [`AuthError`]
//! variant. All of them surface as `401` at the HTTP boundary, but callers keep
//! the distinction for logging: [`AuthError::code`] is the short reason code
//! that goes into the response body, while the variant payloads (expected vs.
//! received values, timestamps, key ids) only ever reach structured logs via
//! [`AuthError::log`].

use tracing::{debug, warn};

/// Broad grouping of [`AuthError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The issuer could not be reached or answered with something unusable
    Transport,
    /// The credential could not be interpreted at all
    MalformedInput,
    /// Key rotation lag or an adversarial token
    Trust,
    /// Signature was fine but the assertion does not hold for this audience/time
    Claim,
}

/// Reasons a bearer credential is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No `Authorization` header, wrong scheme, or empty token
    #[error("missing or invalid authorization header")]
    MissingOrInvalidAuthHeader,

    /// Segment count, base64, or JSON structure is wrong
    #[error("malformed token: {reason}")]
    MalformedToken { reason: String },

    /// Header `alg` is absent or anything other than RS256
    #[error("unsupported token algorithm {alg:?}")]
    UnsupportedAlgorithm { alg: Option<String> },

    /// Header `kid` is absent or empty
    #[error("token header has no key id")]
    MissingKeyId,

    /// Certificate endpoint failed, timed out, or returned an unusable key set
    #[error("signing key source unavailable: {reason}")]
    KeySourceUnavailable { reason: String },

    /// No published key matches the token's `kid`, even after a refresh
    #[error("unknown signing key '{kid}'")]
    UnknownSigningKey { kid: String },

    /// Signature does not verify against the resolved key
    #[error("invalid token signature")]
    InvalidSignature,

    #[error("invalid audience (expected {expected:?}, got {got:?})")]
    InvalidAudience { expected: String, got: Option<String> },

    #[error("invalid issuer (expected {expected:?}, got {got:?})")]
    InvalidIssuer { expected: String, got: Option<String> },

    #[error("token has no subject")]
    MissingSubject,

    #[error("token expired (exp: {exp:?}, now: {now})")]
    TokenExpired { exp: Option<i64>, now: i64 },

    #[error("token issued in the future (iat: {iat}, now: {now})")]
    TokenIssuedInFuture { iat: i64, now: i64 },
}

impl AuthError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        AuthError::MalformedToken {
            reason: reason.into(),
        }
    }

    pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
        AuthError::KeySourceUnavailable {
            reason: reason.into(),
        }
    }

    /// Stable, machine-readable reason code. Safe to return to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingOrInvalidAuthHeader => "missing_or_invalid_auth_header",
            AuthError::MalformedToken { .. } => "malformed_token",
            AuthError::UnsupportedAlgorithm { .. } => "unsupported_algorithm",
            AuthError::MissingKeyId => "missing_key_id",
            AuthError::KeySourceUnavailable { .. } => "key_source_unavailable",
            AuthError::UnknownSigningKey { .. } => "unknown_signing_key",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::InvalidAudience { .. } => "invalid_audience",
            AuthError::InvalidIssuer { .. } => "invalid_issuer",
            AuthError::MissingSubject => "missing_subject",
            AuthError::TokenExpired { .. } => "token_expired",
            AuthError::TokenIssuedInFuture { .. } => "token_issued_in_future",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            AuthError::KeySourceUnavailable { .. } => ErrorCategory::Transport,
            AuthError::MissingOrInvalidAuthHeader
            | AuthError::MalformedToken { .. }
            | AuthError::UnsupportedAlgorithm { .. }
            | AuthError::MissingKeyId => ErrorCategory::MalformedInput,
            AuthError::UnknownSigningKey { .. } | AuthError::InvalidSignature => {
                ErrorCategory::Trust
            }
            AuthError::InvalidAudience { .. }
            | AuthError::InvalidIssuer { .. }
            | AuthError::MissingSubject
            | AuthError::TokenExpired { .. }
            | AuthError::TokenIssuedInFuture { .. } => ErrorCategory::Claim,
        }
    }

    /// Log the failure with structured fields.
    ///
    /// A missing header is routine (anonymous callers) and logs at debug;
    /// everything else is a warning.
    pub fn log(&self) {
        match self {
            AuthError::MissingOrInvalidAuthHeader => {
                debug!(reason = self.code(), "Bearer authentication failed: no usable credential");
            }
            AuthError::MalformedToken { reason } => {
                warn!(reason = self.code(), detail = %reason, "Bearer authentication failed: malformed token");
            }
            AuthError::UnsupportedAlgorithm { alg } => {
                warn!(reason = self.code(), alg = ?alg, "Bearer authentication failed: unsupported algorithm");
            }
            AuthError::MissingKeyId => {
                warn!(reason = self.code(), "Bearer authentication failed: missing 'kid' in token header");
            }
            AuthError::KeySourceUnavailable { reason } => {
                warn!(reason = self.code(), detail = %reason, "Bearer authentication failed: signing keys unavailable");
            }
            AuthError::UnknownSigningKey { kid } => {
                warn!(reason = self.code(), kid = %kid, "Bearer authentication failed: key not published by issuer");
            }
            AuthError::InvalidSignature => {
                warn!(reason = self.code(), "Bearer authentication failed: invalid signature");
            }
            AuthError::InvalidAudience { expected, got } => {
                warn!(reason = self.code(), expected = %expected, got = ?got, "Bearer authentication failed: invalid audience");
            }
            AuthError::InvalidIssuer { expected, got } => {
                warn!(reason = self.code(), expected = %expected, got = ?got, "Bearer authentication failed: invalid issuer");
            }
            AuthError::MissingSubject => {
                warn!(reason = self.code(), "Bearer authentication failed: missing subject");
            }
            AuthError::TokenExpired { exp, now } => {
                warn!(reason = self.code(), exp = ?exp, now = now, "Bearer authentication failed: token expired");
            }
            AuthError::TokenIssuedInFuture { iat, now } => {
                warn!(reason = self.code(), iat = iat, now = now, "Bearer authentication failed: token issued in the future");
            }
        }
    }
}
