//! Key source refresh behaviour against a mock certificate endpoint.

use progress_auth::security::{
    AuthError, HttpKeySource, KeyCache, KeySource, KeySourceConfig, SigningKey, TokenVerifier,
};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

mod common;
use common::certs_server::{MockCertsServer, Reply};
use common::fixtures::{PROJECT, ROTATED_CERT, ROTATED_KEY, SIGNER_CERT, SIGNER_KEY};
use common::tokens::{now, sign, valid_claims};

fn source(url: &str) -> HttpKeySource {
    HttpKeySource::new(KeySourceConfig {
        certs_url: url.to_string(),
        fetch_timeout: Duration::from_millis(300),
        default_max_age: Duration::from_secs(42),
    })
    .unwrap()
}

fn signer_cache(expires_at: SystemTime) -> KeyCache {
    KeyCache::new(
        [SigningKey::from_pem("signer", SIGNER_CERT).unwrap()],
        expires_at,
    )
}

fn assert_close(actual: SystemTime, expected: SystemTime) {
    let diff = actual
        .duration_since(expected)
        .or_else(|_| expected.duration_since(actual))
        .unwrap();
    assert!(diff < Duration::from_secs(5), "off by {diff:?}");
}

#[test]
fn test_first_use_fetches_once() {
    let server = MockCertsServer::start(Reply::keys(&[("signer", SIGNER_CERT)]));
    let keys = source(&server.url);
    assert_eq!(keys.cached_key_count(), 0);

    keys.get_key("signer").unwrap();
    keys.get_key("signer").unwrap();
    keys.get_key("signer").unwrap();

    assert_eq!(keys.fetch_count(), 1);
    assert_eq!(server.hits(), 1);
    assert_eq!(keys.cached_key_count(), 1);
}

#[test]
fn test_fresh_cache_never_fetches() {
    let server = MockCertsServer::start(Reply::status(500));
    let keys =
        source(&server.url).with_cache(signer_cache(SystemTime::now() + Duration::from_secs(60)));

    for _ in 0..5 {
        keys.get_key("signer").unwrap();
    }
    assert_eq!(keys.fetch_count(), 0);
    assert_eq!(server.hits(), 0);
}

#[test]
fn test_stale_cache_refreshes_once() {
    let server = MockCertsServer::start(Reply::keys(&[("signer", SIGNER_CERT)]));
    let keys = source(&server.url).with_cache(signer_cache(SystemTime::UNIX_EPOCH));

    keys.get_key("signer").unwrap();
    assert_eq!(server.hits(), 1);
    keys.get_key("signer").unwrap();
    assert_eq!(server.hits(), 1);
}

#[test]
fn test_max_age_sets_expiry() {
    let mut reply = Reply::keys(&[("signer", SIGNER_CERT)]);
    reply.cache_control = Some("public, max-age=19000, must-revalidate, no-transform".into());
    let server = MockCertsServer::start(reply);
    let keys = source(&server.url);

    keys.get_key("signer").unwrap();
    assert_close(
        keys.cache_expires_at(),
        SystemTime::now() + Duration::from_secs(19000),
    );
}

#[test]
fn test_missing_max_age_uses_default() {
    let mut reply = Reply::keys(&[("signer", SIGNER_CERT)]);
    reply.cache_control = Some("no-transform".into());
    let server = MockCertsServer::start(reply);
    let keys = source(&server.url);

    keys.get_key("signer").unwrap();
    assert_close(
        keys.cache_expires_at(),
        SystemTime::now() + Duration::from_secs(42),
    );
}

#[test]
fn test_non_success_status_keeps_cache() {
    let server = MockCertsServer::start(Reply::status(503));
    let expires_at = SystemTime::now() + Duration::from_secs(60);
    let keys = source(&server.url).with_cache(signer_cache(expires_at));

    // Unknown kid forces a refresh, which fails
    assert!(matches!(
        keys.get_key("rotated"),
        Err(AuthError::KeySourceUnavailable { .. })
    ));
    assert_eq!(server.hits(), 1);

    // The previous set is untouched and still serves its keys
    assert_eq!(keys.cached_key_count(), 1);
    assert_eq!(keys.cache_expires_at(), expires_at);
    keys.get_key("signer").unwrap();
    assert_eq!(server.hits(), 1);
}

#[test]
fn test_empty_cache_with_failing_endpoint() {
    let server = MockCertsServer::start(Reply::status(404));
    let keys = source(&server.url);
    assert!(matches!(
        keys.get_key("signer"),
        Err(AuthError::KeySourceUnavailable { .. })
    ));
    assert_eq!(keys.cached_key_count(), 0);
}

#[test]
fn test_timeout_is_unavailable() {
    let mut reply = Reply::keys(&[("signer", SIGNER_CERT)]);
    reply.delay = Duration::from_millis(1500);
    let server = MockCertsServer::start(reply);
    let keys = source(&server.url).with_cache(signer_cache(SystemTime::UNIX_EPOCH));

    assert!(matches!(
        keys.get_key("signer"),
        Err(AuthError::KeySourceUnavailable { .. })
    ));
    assert_eq!(keys.cached_key_count(), 1);
    assert_eq!(keys.cache_expires_at(), SystemTime::UNIX_EPOCH);
}

#[test]
fn test_unreachable_endpoint_is_unavailable() {
    // Bind then drop to get a port nobody listens on
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let keys = source(&format!("http://127.0.0.1:{port}/certs"));
    assert!(matches!(
        keys.get_key("signer"),
        Err(AuthError::KeySourceUnavailable { .. })
    ));
}

#[test]
fn test_malformed_key_set_rejected_whole() {
    let server = MockCertsServer::start(Reply::keys(&[
        ("signer", SIGNER_CERT),
        ("broken", "-----BEGIN CERTIFICATE-----\nnope\n-----END CERTIFICATE-----\n"),
    ]));
    let keys = source(&server.url);
    assert!(matches!(
        keys.get_key("signer"),
        Err(AuthError::KeySourceUnavailable { .. })
    ));
    assert_eq!(keys.cached_key_count(), 0);
}

#[test]
fn test_non_object_body_rejected() {
    let mut reply = Reply::status(200);
    reply.body = r#"["not", "a", "map"]"#.into();
    let server = MockCertsServer::start(reply);
    let keys = source(&server.url);
    assert!(matches!(
        keys.get_key("signer"),
        Err(AuthError::KeySourceUnavailable { .. })
    ));
}

#[test]
fn test_key_rotation_picked_up_on_unknown_kid() {
    let server = MockCertsServer::start(Reply::keys(&[("signer", SIGNER_CERT)]));
    let keys = Arc::new(source(&server.url));
    let verifier = TokenVerifier::new(Arc::clone(&keys) as Arc<dyn KeySource>);

    let old = sign(SIGNER_KEY, "signer", &valid_claims(now()));
    let new = sign(ROTATED_KEY, "rotated", &valid_claims(now()));

    verifier.verify(&old, PROJECT).unwrap();
    assert_eq!(
        verifier.verify(&new, PROJECT).map(|_| ()),
        Err(AuthError::UnknownSigningKey {
            kid: "rotated".into()
        })
    );

    // Issuer publishes the new key alongside the old one
    server.set_reply(Reply::keys(&[
        ("signer", SIGNER_CERT),
        ("rotated", ROTATED_CERT),
    ]));
    verifier.verify(&new, PROJECT).unwrap();
    verifier.verify(&old, PROJECT).unwrap();
    assert_eq!(keys.fetch_count(), 3);
    assert_eq!(keys.cached_key_count(), 2);
}

#[test]
fn test_concurrent_misses_collapse_into_one_fetch() {
    let mut reply = Reply::keys(&[("signer", SIGNER_CERT)]);
    reply.delay = Duration::from_millis(100);
    let server = MockCertsServer::start(reply);
    let keys = Arc::new(source(&server.url));

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let keys = Arc::clone(&keys);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                keys.get_key("signer").map(|k| k.key_id().to_string())
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), "signer");
    }
    // One leader fetch; a straggler that missed the swap may add one more
    assert!(server.hits() <= 2, "hits = {}", server.hits());
}

#[test]
fn test_waiters_fetch_themselves_when_inflight_refresh_fails() {
    // The first fetch fails slowly; every later one succeeds
    let mut failing = Reply::status(503);
    failing.delay = Duration::from_millis(150);
    let server =
        MockCertsServer::start_with_queue(vec![failing], Reply::keys(&[("signer", SIGNER_CERT)]));
    let keys = Arc::new(source(&server.url));

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let keys = Arc::clone(&keys);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let started = Instant::now();
                let result = keys.get_key("signer").map(|k| k.key_id().to_string());
                (result, started.elapsed())
            })
        })
        .collect();

    // A waiter gives up after fetch_timeout + 500ms, then spends at most one
    // fetch_timeout on its own request
    let bound = Duration::from_millis(300 + 500 + 300);
    let mut failures = 0;
    for handle in handles {
        let (result, elapsed) = handle.join().unwrap();
        assert!(elapsed < bound, "caller took {elapsed:?}");
        match result {
            Ok(kid) => assert_eq!(kid, "signer"),
            Err(AuthError::KeySourceUnavailable { .. }) => failures += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    // Only the caller whose fetch drew the 503 fails
    assert_eq!(failures, 1);
    assert!(server.hits() >= 2, "hits = {}", server.hits());
    assert_eq!(keys.cached_key_count(), 1);
}

#[test]
fn test_max_age_beyond_clock_range_falls_back_to_default() {
    let mut reply = Reply::keys(&[("signer", SIGNER_CERT)]);
    reply.cache_control = Some("max-age=18446744073709551615".into());
    let server = MockCertsServer::start(reply);
    let keys = source(&server.url);

    assert_eq!(keys.get_key("signer").unwrap().key_id(), "signer");
    assert_close(
        keys.cache_expires_at(),
        SystemTime::now() + Duration::from_secs(42),
    );
}
