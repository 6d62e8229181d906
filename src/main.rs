use anyhow::Context;
use progress_auth::{cli::run_cli, logging};

fn main() -> anyhow::Result<()> {
    logging::init_logging().context("failed to initialize logging")?;
    run_cli()
}
