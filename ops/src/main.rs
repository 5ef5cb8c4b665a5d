//! `ticketflow-ops` binary.

use clap::Parser;
use std::process::ExitCode;
use ticketflow_ops::cli::{self, Cli};
use ticketflow_ops::{Config, Resources};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("configuration error: {error}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.observability.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match execute(cli, config).await {
        Ok(code) => code,
        Err(error) => {
            tracing::error!(error = %error, "Command failed");
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli, config: Config) -> anyhow::Result<ExitCode> {
    let resources = Resources::from_config(config).await?;
    cli::run(cli.command, &resources).await
}
