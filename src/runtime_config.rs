//! # Runtime Configuration Module
//!
//! Environment-variable configuration for the progress service.
//!
//! ## Environment Variables
//!
//! ### `FIREBASE_PROJECT_ID` / `GCP_PROJECT_ID`
//!
//! The trusted audience. Tokens are only accepted if their `aud` equals this
//! value and their `iss` is the issuer prefix followed by it. The first
//! non-empty variable wins. Without it the service still starts, but every
//! `/progress` request answers `500`.
//!
//! ### `PROGRESS_CERTS_URL`
//!
//! Certificate endpoint publishing the issuer's signing keys.
//! Default: the Google `securetoken` X.509 metadata URL.
//!
//! ### `PROGRESS_ISSUER_PREFIX`
//!
//! Default: `https://securetoken.google.com/`
//!
//! ### `PROGRESS_CERTS_TIMEOUT_MS`
//!
//! Timeout for one certificate fetch. Default: `2000`
//!
//! ### `PROGRESS_CERTS_DEFAULT_MAX_AGE_SECS`
//!
//! Key set lifetime when the endpoint sends no usable `max-age`. Default: `300`
//!
//! ### `PROGRESS_MAX_IAT_SKEW_SECS`
//!
//! How far in the future `iat` may be. Default: `60`
//!
//! ### `PROGRESS_STACK_SIZE`
//!
//! Stack size for request coroutines. Accepts decimal (`32768`) or hex
//! (`0x8000`). Default: `0x8000` (32 KB)
//!
//! ## Usage
//!
//! ```rust
//! use progress_auth::runtime_config::ServiceConfig;
//!
//! let config = ServiceConfig::from_env();
//! println!("Stack size: {} bytes", config.stack_size);
//! ```

use crate::security::{
    ClaimPolicy, KeySourceConfig, DEFAULT_ISSUER_PREFIX, DEFAULT_MAX_AGE,
    DEFAULT_MAX_ISSUED_AT_SKEW,
};
use std::env;
use std::time::Duration;

pub const DEFAULT_CERTS_URL: &str =
    "https://www.googleapis.com/robot/v1/metadata/x509/securetoken@system.gserviceaccount.com";

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_millis(2000);
const DEFAULT_STACK_SIZE: usize = 0x8000;

/// Fatal configuration problems.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing FIREBASE_PROJECT_ID/GCP_PROJECT_ID")]
    MissingProjectId,
}

impl ConfigError {
    /// Reason code returned to clients.
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::MissingProjectId => "missing_project_id",
        }
    }
}

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Trusted audience; `Err` when not configured
    pub project_id: Result<String, ConfigError>,
    pub certs_url: String,
    pub issuer_prefix: String,
    pub fetch_timeout: Duration,
    pub default_max_age: Duration,
    pub max_issued_at_skew: Duration,
    pub stack_size: usize,
}

impl ServiceConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let secs = |name: &str, default: Duration| {
            non_empty(name)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        let project_id = non_empty("FIREBASE_PROJECT_ID")
            .or_else(|| non_empty("GCP_PROJECT_ID"))
            .map(|v| v.trim().to_string())
            .ok_or(ConfigError::MissingProjectId);

        let fetch_timeout = non_empty("PROGRESS_CERTS_TIMEOUT_MS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_FETCH_TIMEOUT);

        let stack_size = match non_empty("PROGRESS_STACK_SIZE") {
            Some(val) => {
                if let Some(hex) = val.strip_prefix("0x") {
                    usize::from_str_radix(hex, 16).unwrap_or(DEFAULT_STACK_SIZE)
                } else {
                    val.parse().unwrap_or(DEFAULT_STACK_SIZE)
                }
            }
            None => DEFAULT_STACK_SIZE,
        };

        Self {
            project_id,
            certs_url: non_empty("PROGRESS_CERTS_URL")
                .unwrap_or_else(|| DEFAULT_CERTS_URL.to_string()),
            issuer_prefix: non_empty("PROGRESS_ISSUER_PREFIX")
                .unwrap_or_else(|| DEFAULT_ISSUER_PREFIX.to_string()),
            fetch_timeout,
            default_max_age: secs("PROGRESS_CERTS_DEFAULT_MAX_AGE_SECS", DEFAULT_MAX_AGE),
            max_issued_at_skew: secs("PROGRESS_MAX_IAT_SKEW_SECS", DEFAULT_MAX_ISSUED_AT_SKEW),
            stack_size,
        }
    }

    pub fn key_source(&self) -> KeySourceConfig {
        KeySourceConfig {
            certs_url: self.certs_url.clone(),
            fetch_timeout: self.fetch_timeout,
            default_max_age: self.default_max_age,
        }
    }

    pub fn claim_policy(&self) -> ClaimPolicy {
        ClaimPolicy {
            issuer_prefix: self.issuer_prefix.clone(),
            max_issued_at_skew: self.max_issued_at_skew,
        }
    }
}
