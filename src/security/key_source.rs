//! Issuer signing-key source with a time-bounded cache.
//!
//! [`HttpKeySource`] fetches the issuer's published key set (a JSON object of
//! `kid -> PEM certificate`) and keeps it for as long as the response's
//! `Cache-Control: max-age` allows. The set is held in an [`ArcSwap`]: readers
//! always see one complete set, and a refresh publishes its replacement with a
//! single atomic store. No lock is held across the network round trip.
//!
//! Concurrent refreshes are collapsed: the first caller fetches, the rest wait
//! briefly for it and reuse whatever it published. If nothing new lands in
//! time, a waiter fetches on its own; duplicate fetches are harmless.

use super::key_material::SigningKey;
use super::AuthError;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};
use url::Url;

/// Lifetime of a fetched key set when the response carries no usable `max-age`.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(300);

/// Upper bound on how long a caller waits for someone else's in-flight refresh.
const REFRESH_WAIT_SLACK: Duration = Duration::from_millis(500);

/// Longest fetch timeout honoured; larger values are clamped.
pub const MAX_FETCH_TIMEOUT: Duration = Duration::from_secs(300);

/// Supplies the public key for a key id.
///
/// The verifier only depends on this trait, so tests and alternative
/// deployments can swap in their own implementation.
pub trait KeySource: Send + Sync {
    /// Resolve `key_id` to a signing key.
    ///
    /// # Errors
    ///
    /// - [`AuthError::KeySourceUnavailable`] when a needed refresh failed
    /// - [`AuthError::UnknownSigningKey`] when the (refreshed) set has no such key
    fn get_key(&self, key_id: &str) -> Result<Arc<SigningKey>, AuthError>;
}

/// One published key set and the instant it stops being authoritative.
#[derive(Debug, Clone)]
pub struct KeyCache {
    keys: HashMap<String, Arc<SigningKey>>,
    expires_at: SystemTime,
}

impl KeyCache {
    /// An empty, already-expired cache (the state at process start).
    pub fn empty() -> Self {
        Self {
            keys: HashMap::new(),
            expires_at: SystemTime::UNIX_EPOCH,
        }
    }

    pub fn new(keys: impl IntoIterator<Item = SigningKey>, expires_at: SystemTime) -> Self {
        Self {
            keys: keys
                .into_iter()
                .map(|k| (k.key_id().to_string(), Arc::new(k)))
                .collect(),
            expires_at,
        }
    }

    /// Non-empty and not yet expired.
    pub fn is_valid_at(&self, now: SystemTime) -> bool {
        !self.keys.is_empty() && now < self.expires_at
    }

    pub fn get(&self, key_id: &str) -> Option<Arc<SigningKey>> {
        self.keys.get(key_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::empty()
    }
}

/// Extract `max-age` from a `Cache-Control` header value.
///
/// Directive names are matched case-insensitively. Returns `None` when the
/// directive is absent or its value is not a non-negative integer.
pub fn parse_max_age(cache_control: &str) -> Option<Duration> {
    cache_control.split(',').find_map(|directive| {
        let (name, value) = directive.trim().split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("max-age") {
            return None;
        }
        value
            .trim()
            .trim_matches('"')
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    })
}

/// Expiry of a set fetched at `fetched_at` that may be kept for `max_age`.
///
/// A `max-age` too large to represent falls back to `default_max_age`.
fn cache_expiry(
    fetched_at: SystemTime,
    max_age: Duration,
    default_max_age: Duration,
) -> SystemTime {
    fetched_at.checked_add(max_age).unwrap_or_else(|| {
        debug!(max_age_secs = max_age.as_secs(), "max-age out of range, using default");
        fetched_at.checked_add(default_max_age).unwrap_or(fetched_at)
    })
}

/// Build signing keys from a `kid -> PEM` map. One bad entry fails the set.
pub fn parse_key_set(raw: HashMap<String, String>) -> Result<Vec<SigningKey>, AuthError> {
    raw.into_iter()
        .map(|(kid, pem)| {
            SigningKey::from_pem(kid.as_str(), &pem).map_err(|e| {
                AuthError::unavailable(format!("published key '{kid}' is unusable: {e}"))
            })
        })
        .collect()
}

/// Configuration for [`HttpKeySource`].
#[derive(Debug, Clone)]
pub struct KeySourceConfig {
    /// Certificate endpoint (HTTPS, or HTTP for exact `localhost`/`127.0.0.1`)
    pub certs_url: String,
    /// Timeout for the whole fetch; a timeout counts as the endpoint being unavailable
    pub fetch_timeout: Duration,
    /// Set lifetime when the response has no usable `max-age`
    pub default_max_age: Duration,
}

/// Errors raised while constructing a key source.
#[derive(Debug, thiserror::Error)]
pub enum KeySourceConfigError {
    #[error("certificate URL '{url}' is invalid: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("certificate URL must use HTTPS (HTTP only allowed for localhost/127.0.0.1), got '{0}'")]
    InsecureUrl(String),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Check that the certificate URL is safe to trust keys from.
///
/// The host is compared exactly, so `localhost.attacker.com` does not pass as
/// `localhost`.
pub fn validate_certs_url(url: &str) -> Result<(), KeySourceConfigError> {
    let parsed = Url::parse(url).map_err(|e| KeySourceConfigError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "https" => Ok(()),
        "http" => match parsed.host_str() {
            Some("localhost") | Some("127.0.0.1") => Ok(()),
            _ => Err(KeySourceConfigError::InsecureUrl(url.to_string())),
        },
        _ => Err(KeySourceConfigError::InsecureUrl(url.to_string())),
    }
}

/// Key source backed by the issuer's certificate endpoint.
pub struct HttpKeySource {
    certs_url: String,
    client: reqwest::blocking::Client,
    fetch_timeout: Duration,
    default_max_age: Duration,
    cache: ArcSwap<KeyCache>,
    // Bumped after every successful swap so waiters can tell a new set landed
    generation: AtomicU64,
    refresh_in_progress: AtomicBool,
    fetches: AtomicU64,
}

impl HttpKeySource {
    /// Create a key source with an empty cache.
    ///
    /// # Errors
    ///
    /// Fails if the URL is not acceptable (see [`validate_certs_url`]) or the
    /// HTTP client cannot be built.
    pub fn new(config: KeySourceConfig) -> Result<Self, KeySourceConfigError> {
        validate_certs_url(&config.certs_url)?;
        let fetch_timeout = config.fetch_timeout.min(MAX_FETCH_TIMEOUT);
        if fetch_timeout < config.fetch_timeout {
            warn!(
                requested_ms = config.fetch_timeout.as_millis() as u64,
                max_ms = MAX_FETCH_TIMEOUT.as_millis() as u64,
                "Signing key fetch timeout clamped"
            );
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(fetch_timeout)
            .build()?;
        Ok(Self {
            certs_url: config.certs_url,
            client,
            fetch_timeout,
            default_max_age: config.default_max_age,
            cache: ArcSwap::from_pointee(KeyCache::empty()),
            generation: AtomicU64::new(0),
            refresh_in_progress: AtomicBool::new(false),
            fetches: AtomicU64::new(0),
        })
    }

    /// Seed the cache, e.g. from a previous process or a test fixture.
    pub fn with_cache(self, cache: KeyCache) -> Self {
        self.cache.store(Arc::new(cache));
        self
    }

    /// Number of outbound fetches issued so far (successful or not).
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn cached_key_count(&self) -> usize {
        self.cache.load().len()
    }

    pub fn cache_expires_at(&self) -> SystemTime {
        self.cache.load().expires_at()
    }

    fn refresh(&self) -> Result<(), AuthError> {
        let seen = self.generation.load(Ordering::Acquire);

        if self
            .refresh_in_progress
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            self.wait_for_inflight_refresh();
            if self.generation.load(Ordering::Acquire) != seen {
                debug!("Joined in-flight key refresh");
                return Ok(());
            }
            debug!("In-flight key refresh did not publish a new set, fetching directly");
            return self.fetch_and_swap();
        }

        let result = self.fetch_and_swap();
        self.refresh_in_progress.store(false, Ordering::Release);
        result
    }

    fn wait_for_inflight_refresh(&self) {
        // None only if the clock is near its end; then wait without a bound
        let deadline = Instant::now()
            .checked_add(self.fetch_timeout.saturating_add(REFRESH_WAIT_SLACK));
        // Exponential backoff: 5ms, 10ms, 20ms, ... capped at 100ms
        let mut wait_ms = 5;
        while self.refresh_in_progress.load(Ordering::Acquire) {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!("Timed out waiting for in-flight key refresh");
                return;
            }
            std::thread::sleep(Duration::from_millis(wait_ms));
            wait_ms = (wait_ms * 2).min(100);
        }
    }

    fn fetch_and_swap(&self) -> Result<(), AuthError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let fetched_at = SystemTime::now();
        let started = Instant::now();

        let response = self.client.get(&self.certs_url).send().map_err(|e| {
            warn!(url = %self.certs_url, error = %e, "Signing key fetch failed");
            AuthError::unavailable(format!("fetch failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %self.certs_url, status = status.as_u16(), "Signing key endpoint returned non-success status");
            return Err(AuthError::unavailable(format!(
                "certificate endpoint returned {status}"
            )));
        }

        let max_age = response
            .headers()
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_max_age)
            .unwrap_or(self.default_max_age);

        let raw: HashMap<String, String> = response.json().map_err(|e| {
            warn!(url = %self.certs_url, error = %e, "Signing key endpoint returned an unreadable key set");
            AuthError::unavailable(format!("unreadable key set: {e}"))
        })?;
        let keys = parse_key_set(raw).inspect_err(|e| {
            warn!(url = %self.certs_url, error = %e, "Rejected published key set");
        })?;
        if keys.is_empty() {
            warn!(url = %self.certs_url, "Signing key endpoint published an empty key set");
        }

        let expires_at = cache_expiry(fetched_at, max_age, self.default_max_age);
        let next = KeyCache::new(keys, expires_at);
        let key_count = next.len();
        self.cache.store(Arc::new(next));
        self.generation.fetch_add(1, Ordering::Release);

        info!(
            url = %self.certs_url,
            keys = key_count,
            max_age_secs = max_age.as_secs(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Signing keys refreshed"
        );
        Ok(())
    }
}

impl KeySource for HttpKeySource {
    fn get_key(&self, key_id: &str) -> Result<Arc<SigningKey>, AuthError> {
        {
            let cache = self.cache.load();
            if cache.is_valid_at(SystemTime::now()) {
                if let Some(key) = cache.get(key_id) {
                    return Ok(key);
                }
                debug!(kid = %key_id, "Key id not in current set, refreshing");
            }
        }

        self.refresh()?;

        self.cache
            .load()
            .get(key_id)
            .ok_or_else(|| AuthError::UnknownSigningKey {
                kid: key_id.to_string(),
            })
    }
}

/// Fixed in-memory key set that never refreshes.
///
/// Useful for tests and for deployments that pin the issuer's keys.
#[derive(Debug, Clone, Default)]
pub struct StaticKeySource {
    keys: HashMap<String, Arc<SigningKey>>,
}

impl StaticKeySource {
    pub fn new(keys: impl IntoIterator<Item = SigningKey>) -> Self {
        Self {
            keys: keys
                .into_iter()
                .map(|k| (k.key_id().to_string(), Arc::new(k)))
                .collect(),
        }
    }
}

impl KeySource for StaticKeySource {
    fn get_key(&self, key_id: &str) -> Result<Arc<SigningKey>, AuthError> {
        self.keys
            .get(key_id)
            .cloned()
            .ok_or_else(|| AuthError::UnknownSigningKey {
                kid: key_id.to_string(),
            })
    }
}
