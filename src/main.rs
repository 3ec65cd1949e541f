use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use siga_megazap_sync::config::Config;
use siga_megazap_sync::{diagnostics, integration};

/// SIGA → MegaZap integration for boletos about to fall due.
#[derive(Parser, Debug)]
#[command(name = "siga-megazap-sync", version)]
struct Cli {
    /// Do not send to MegaZap, only log the payloads
    #[arg(long)]
    dry_run: bool,
    /// Print the SIGA URL, params and headers (token masked) and exit
    #[arg(long, alias = "debug")]
    debug_siga: bool,
}

/// Entry point for the one-shot batch run.
///
/// Exits non-zero when configuration loading or any HTTP call fails.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "siga_megazap_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // MegaZap is never called in dry-run or diagnostics mode
    let config = Config::from_env(!(cli.dry_run || cli.debug_siga))?;
    tracing::info!("Configuration loaded successfully");

    if cli.debug_siga {
        diagnostics::debug_siga(&config)?;
        return Ok(());
    }

    integration::run(&config, cli.dry_run).await?;
    Ok(())
}
