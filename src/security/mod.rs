//! # Security Module
//!
//! Bearer-token authentication for the progress endpoint.
//!
//! ## Overview
//!
//! Two components run in a strict pipeline on every authenticated request:
//!
//! - **Key source** ([`KeySource`], [`HttpKeySource`]) - keeps a time-bounded
//!   cache of the issuer's published signing keys and refreshes it on expiry
//!   or when a token names a key id the cache does not know.
//! - **Token verifier** ([`TokenVerifier`]) - parses the bearer credential,
//!   pins the algorithm to RS256, resolves the key, checks the signature and
//!   then the claims (`aud`, `iss`, `sub`, `exp`, `iat`).
//!
//! [`BearerAuthenticator`] ties both to an `Authorization` header and the
//! configured audience.
//!
//! ## Architecture
//!
//! ```text
//! Authorization header
//!        │ extract_bearer_token
//!        ▼
//! TokenVerifier::verify ──► KeySource::get_key(kid) ──► (refresh if needed)
//!        │
//!        ▼
//! Claims | AuthError
//! ```
//!
//! ## Failures
//!
//! Every rejection is an [`AuthError`] variant with a stable reason code
//! ([`AuthError::code`]). The HTTP layer returns `401` for all of them with
//! only the code in the body; details go to the log.
//!
//! ## Example
//!
//! ```rust,ignore
//! use progress_auth::security::{BearerAuthenticator, HttpKeySource, KeySourceConfig, TokenVerifier};
//! use std::sync::Arc;
//!
//! let keys = HttpKeySource::new(KeySourceConfig {
//!     certs_url: "https://www.googleapis.com/robot/v1/metadata/x509/securetoken@system.gserviceaccount.com".into(),
//!     fetch_timeout: std::time::Duration::from_secs(2),
//!     default_max_age: std::time::Duration::from_secs(300),
//! })?;
//! let verifier = Arc::new(TokenVerifier::new(Arc::new(keys)));
//! let auth = BearerAuthenticator::new(verifier, "my-project");
//!
//! let claims = auth.authenticate(Some("Bearer eyJhbGciOi..."))?;
//! ```

use std::sync::Arc;

/// Authenticates requests for one trusted audience.
pub struct BearerAuthenticator {
    verifier: Arc<TokenVerifier>,
    audience: String,
}

impl BearerAuthenticator {
    pub fn new(verifier: Arc<TokenVerifier>, audience: impl Into<String>) -> Self {
        Self {
            verifier,
            audience: audience.into(),
        }
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Authenticate a request from its `Authorization` header value.
    ///
    /// Failures are logged here (see [`AuthError::log`]) so callers only need
    /// to map them to a response.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<Claims, AuthError> {
        extract_bearer_token(authorization)
            .and_then(|token| self.verifier.verify(token, &self.audience))
            .inspect_err(AuthError::log)
    }
}

pub use bearer::extract_bearer_token;
pub use error::{AuthError, ErrorCategory};
pub use key_material::{KeyMaterialError, SigningKey};
pub use key_source::{
    parse_max_age, HttpKeySource, KeyCache, KeySource, KeySourceConfig, KeySourceConfigError,
    StaticKeySource, DEFAULT_MAX_AGE,
};
pub use token::ParsedToken;
pub use verifier::{
    ClaimPolicy, Claims, TokenVerifier, DEFAULT_ISSUER_PREFIX, DEFAULT_MAX_ISSUED_AT_SKEW,
    SUPPORTED_ALGORITHM,
};

mod bearer;
mod error;
mod key_material;
pub mod key_source;
pub mod token;
mod verifier;
