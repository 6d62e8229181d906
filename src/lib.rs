//! # progress-auth
//!
//! **progress-auth** serves a player's progress to clients that prove their
//! identity with a Firebase ID token. Tokens are verified locally against the
//! issuer's published signing keys; no call to the issuer happens per request
//! beyond periodic key refreshes.
//!
//! ## Architecture
//!
//! - **[`security`]** - key source (cached issuer keys) and token verifier
//! - **[`server`]** - HTTP server built on `may_minihttp`; routes `/progress` and `/health`
//! - **[`progress`]** - progress model and the [`progress::ProgressStore`] seam
//! - **[`runtime_config`]** - environment configuration
//! - **[`logging`]** - `tracing` subscriber setup
//! - **[`cli`]** - the `progress-auth` binary's commands
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Server as ProgressService<br/>(may_minihttp)
//!     participant Auth as BearerAuthenticator
//!     participant Keys as HttpKeySource
//!     participant Issuer as Certificate endpoint
//!     participant Store as ProgressStore
//!
//!     Client->>Server: GET /progress<br/>Authorization: Bearer <token>
//!     Server->>Auth: authenticate(header)
//!     Auth->>Auth: Split token, pin alg = RS256
//!     Auth->>Keys: get_key(kid)
//!     alt Cache expired or kid unknown
//!         Keys->>Issuer: GET certificates
//!         Issuer-->>Keys: kid → PEM, Cache-Control: max-age
//!     end
//!     Keys-->>Auth: SigningKey
//!     Auth->>Auth: Verify signature, then aud/iss/sub/exp/iat
//!     alt Rejected
//!         Auth-->>Client: 401 {"ok":false,"error":<code>}
//!     end
//!     Server->>Store: load_progress(sub)
//!     Server-->>Client: 200 {"ok":true,"user":...,"progress":...}
//! ```
//!
//! ## Runtime Considerations
//!
//! The server runs on the `may` coroutine runtime. Coroutine stack size is set
//! with `PROGRESS_STACK_SIZE`. Key refreshes use a blocking HTTP client and
//! happen at most once per key set lifetime (plus on key rotation).
//!
//! ## Quick Start
//!
//! ```no_run
//! use progress_auth::progress::DefaultProgressStore;
//! use progress_auth::runtime_config::ServiceConfig;
//! use progress_auth::server::HttpServer;
//! use std::sync::Arc;
//!
//! let config = ServiceConfig::from_env();
//! let service = progress_auth::cli::build_service(&config, Arc::new(DefaultProgressStore))
//!     .expect("service");
//! let handle = HttpServer(service).start("0.0.0.0:8080").expect("bind");
//! handle.join().ok();
//! ```

pub mod cli;
pub mod logging;
pub mod progress;
pub mod runtime_config;
pub mod security;
pub mod server;

pub use progress::{DefaultProgressStore, ProgressStore, UserProgress};
pub use security::{AuthError, BearerAuthenticator, Claims, HttpKeySource, KeySource, TokenVerifier};
