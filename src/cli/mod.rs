//! # CLI Module
//!
//! Command-line interface for the `progress-auth` binary.
//!
//! ## Commands
//!
//! ### `serve`
//!
//! Run the HTTP service:
//!
//! ```bash
//! FIREBASE_PROJECT_ID=my-project progress-auth serve --addr 0.0.0.0:8080
//! ```
//!
//! Options:
//! - `--addr <ADDR>` - Listen address (env `PROGRESS_ADDR`, default `0.0.0.0:8080`)
//!
//! ### `verify`
//!
//! Verify one token against the configured project and print its claims.
//! Exits non-zero with the reason code on failure:
//!
//! ```bash
//! FIREBASE_PROJECT_ID=my-project progress-auth verify "$ID_TOKEN"
//! ```
//!
//! All other settings come from the environment; see
//! [`crate::runtime_config`] and [`crate::logging`].

mod commands;


pub use commands::{build_service, run_cli, Cli, Commands};
