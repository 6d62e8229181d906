use super::key_source::KeySource;
use super::token;
use super::AuthError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::debug;

/// The only accepted header `alg`. No negotiation, no `none`.
pub const SUPPORTED_ALGORITHM: &str = "RS256";

/// Issuer URLs are this prefix followed by the project id (the audience).
pub const DEFAULT_ISSUER_PREFIX: &str = "https://securetoken.google.com/";

/// How far in the future `iat` may be before a token is rejected.
pub const DEFAULT_MAX_ISSUED_AT_SKEW: Duration = Duration::from_secs(60);

/// Claim rules that are fixed per deployment.
#[derive(Debug, Clone)]
pub struct ClaimPolicy {
    pub issuer_prefix: String,
    pub max_issued_at_skew: Duration,
}

impl Default for ClaimPolicy {
    fn default() -> Self {
        Self {
            issuer_prefix: DEFAULT_ISSUER_PREFIX.to_string(),
            max_issued_at_skew: DEFAULT_MAX_ISSUED_AT_SKEW,
        }
    }
}

/// Claims of a token whose signature and claim rules have all been checked.
///
/// Serializes back to the payload's original field names; unrecognised fields
/// are carried in `extra` unchanged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Claims {
    #[serde(rename = "sub")]
    pub subject: String,
    #[serde(rename = "aud")]
    pub audience: String,
    #[serde(rename = "iss")]
    pub issuer: String,
    #[serde(rename = "iat")]
    pub issued_at: i64,
    #[serde(rename = "exp")]
    pub expires_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// Payload as received; nothing here is trusted yet.
#[derive(Debug, Deserialize)]
struct RawClaims {
    aud: Option<String>,
    iss: Option<String>,
    sub: Option<String>,
    iat: Option<i64>,
    exp: Option<i64>,
    email: Option<String>,
    email_verified: Option<bool>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Verifies bearer tokens issued for a project.
///
/// Pipeline, in order, stopping at the first failure:
///
/// 1. split into three segments and parse the header
/// 2. require `alg == RS256`
/// 3. require a `kid` and resolve it through the [`KeySource`]
/// 4. verify the RS256 signature over the original `header.payload` bytes
/// 5. decode and parse the payload, then check `aud`, `iss`, `sub`, `exp`,
///    `iat` against a single `now`
///
/// # Usage
///
/// ```rust,ignore
/// use progress_auth::security::{HttpKeySource, KeySourceConfig, TokenVerifier};
/// use std::sync::Arc;
///
/// let keys = HttpKeySource::new(config)?;
/// let verifier = TokenVerifier::new(Arc::new(keys));
/// let claims = verifier.verify(token, "my-project")?;
/// println!("authenticated {}", claims.subject);
/// ```
pub struct TokenVerifier {
    keys: Arc<dyn KeySource>,
    policy: ClaimPolicy,
}

impl TokenVerifier {
    pub fn new(keys: Arc<dyn KeySource>) -> Self {
        Self {
            keys,
            policy: ClaimPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ClaimPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Issuer a token for `audience` must carry.
    pub fn expected_issuer(&self, audience: &str) -> String {
        format!("{}{}", self.policy.issuer_prefix, audience)
    }

    /// Verify `token` for `expected_audience` at the current time.
    pub fn verify(&self, token: &str, expected_audience: &str) -> Result<Claims, AuthError> {
        self.verify_at(token, expected_audience, unix_now())
    }

    /// Verify `token` for `expected_audience` with `now` in unix seconds.
    pub fn verify_at(
        &self,
        token: &str,
        expected_audience: &str,
        now: i64,
    ) -> Result<Claims, AuthError> {
        let parsed = token::parse(token)?;

        match parsed.algorithm() {
            Some(SUPPORTED_ALGORITHM) => {}
            other => {
                return Err(AuthError::UnsupportedAlgorithm {
                    alg: other.map(str::to_string),
                })
            }
        }

        let kid = parsed.key_id().ok_or(AuthError::MissingKeyId)?;
        let key = self.keys.get_key(kid)?;

        // An undecodable signature segment is a failed signature, not a parse error
        let signature = token::decode_segment(parsed.signature)
            .map(|bytes| URL_SAFE_NO_PAD.encode(bytes))
            .map_err(|_| AuthError::InvalidSignature)?;
        let valid = jsonwebtoken::crypto::verify(
            &signature,
            parsed.signed.as_bytes(),
            key.decoding_key(),
            Algorithm::RS256,
        )
        .unwrap_or(false);
        if !valid {
            return Err(AuthError::InvalidSignature);
        }

        let payload = token::decode_segment(parsed.payload)
            .map_err(|e| AuthError::malformed(format!("payload: {e}")))?;
        let raw: RawClaims = serde_json::from_slice(&payload)
            .map_err(|e| AuthError::malformed(format!("payload: {e}")))?;
        let claims = self.check_claims(raw, expected_audience, now)?;
        debug!(kid = %kid, sub = %claims.subject, "Bearer token verified");
        Ok(claims)
    }

    fn check_claims(
        &self,
        raw: RawClaims,
        expected_audience: &str,
        now: i64,
    ) -> Result<Claims, AuthError> {
        let audience = match raw.aud {
            Some(aud) if aud == expected_audience => aud,
            got => {
                return Err(AuthError::InvalidAudience {
                    expected: expected_audience.to_string(),
                    got,
                })
            }
        };

        let expected_issuer = self.expected_issuer(expected_audience);
        let issuer = match raw.iss {
            Some(iss) if iss == expected_issuer => iss,
            got => {
                return Err(AuthError::InvalidIssuer {
                    expected: expected_issuer,
                    got,
                })
            }
        };

        let subject = raw
            .sub
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::MissingSubject)?;

        let expires_at = match raw.exp {
            Some(exp) if exp > now => exp,
            exp => return Err(AuthError::TokenExpired { exp, now }),
        };

        let issued_at = raw
            .iat
            .ok_or_else(|| AuthError::malformed("payload: missing iat"))?;
        let skew = i64::try_from(self.policy.max_issued_at_skew.as_secs()).unwrap_or(i64::MAX);
        if issued_at > now.saturating_add(skew) {
            return Err(AuthError::TokenIssuedInFuture {
                iat: issued_at,
                now,
            });
        }

        Ok(Claims {
            subject,
            audience,
            issuer,
            issued_at,
            expires_at,
            email: raw.email,
            email_verified: raw.email_verified,
            extra: raw.extra,
        })
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
