use crate::progress::{DefaultProgressStore, ProgressStore};
use crate::runtime_config::ServiceConfig;
use crate::security::{BearerAuthenticator, HttpKeySource, TokenVerifier};
use crate::server::{HttpServer, ProgressService};
use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};

/// Command-line interface for the progress service
#[derive(Parser)]
#[command(name = "progress-auth")]
#[command(about = "Authenticated player progress service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve /progress and /health over HTTP
    Serve {
        /// Address to listen on
        #[arg(long, env = "PROGRESS_ADDR", default_value = "0.0.0.0:8080")]
        addr: String,
    },
    /// Verify a bearer token and print its claims as JSON
    Verify {
        /// The token, without the "Bearer " prefix
        token: String,
    },
}

fn authenticator(
    config: &ServiceConfig,
    audience: &str,
) -> anyhow::Result<Arc<BearerAuthenticator>> {
    let keys = HttpKeySource::new(config.key_source()).context("invalid key source settings")?;
    let verifier = TokenVerifier::new(Arc::new(keys)).with_policy(config.claim_policy());
    Ok(Arc::new(BearerAuthenticator::new(Arc::new(verifier), audience)))
}

/// Wire configuration, key source, verifier and store into a service.
///
/// A missing project id is not fatal: it is logged here and reported on every
/// `/progress` request.
///
/// # Errors
///
/// Fails if the certificate URL is unacceptable or the HTTP client cannot be
/// built.
pub fn build_service(
    config: &ServiceConfig,
    store: Arc<dyn ProgressStore>,
) -> anyhow::Result<ProgressService> {
    match &config.project_id {
        Ok(audience) => {
            let auth = authenticator(config, audience)?;
            info!(
                audience = %audience,
                certs_url = %config.certs_url,
                "Bearer authentication configured"
            );
            Ok(ProgressService::new(auth, store))
        }
        Err(err) => {
            error!(error = %err, "No trusted audience; /progress will answer 500");
            Ok(ProgressService::misconfigured(err.clone(), store))
        }
    }
}

/// Parse arguments and run the selected command.
///
/// # Errors
///
/// Returns an error if the service cannot be built or the server fails to
/// start, or, for `verify`, if the token is rejected.
pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ServiceConfig::from_env();
    match cli.command {
        Commands::Serve { addr } => {
            may::config().set_stack_size(config.stack_size);
            info!(stack_size = config.stack_size, "Coroutine stack size configured");

            let service = build_service(&config, Arc::new(DefaultProgressStore))?;
            let handle = HttpServer(service)
                .start(addr.as_str())
                .with_context(|| format!("failed to bind {addr}"))?;
            handle
                .join()
                .map_err(|e| anyhow!("server coroutine panicked: {e:?}"))?;
            Ok(())
        }
        Commands::Verify { token } => {
            let audience = config.project_id.clone()?;
            let auth = authenticator(&config, &audience)?;
            let header = format!("Bearer {token}");
            let claims = auth
                .authenticate(Some(&header))
                .map_err(|e| anyhow!("token rejected: {}", e.code()))?;
            println!("{}", serde_json::to_string_pretty(&claims)?);
            Ok(())
        }
    }
}
