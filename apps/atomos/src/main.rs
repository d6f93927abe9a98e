//! atomos - transactional OS deployment engine
//!
//! Installs or updates an OS image onto target storage as an atomic,
//! rollback-safe operation.

mod cli;

use std::process;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use atomos_install::Installer;
use atomos_transaction::SnapshotManager;
use atomos_types::Deployment;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(e) = run(cli).await {
        error!("install failed: {e}");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), atomos_errors::Error> {
    info!("atomos v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Install {
            descriptor,
            target_root,
            max_snapshots,
        } => {
            let mut deployment = Deployment::from_file(&descriptor).await?;
            deployment.sanitize()?;

            let transactioner =
                SnapshotManager::new(target_root).with_max_snapshots(max_snapshots);
            let mut installer = Installer::new(Box::new(transactioner));

            let token = CancellationToken::new();
            let cancel = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });

            let outcome = installer.install(&token, &mut deployment).await?;
            info!(
                transaction = outcome.transaction_id,
                digest = ?outcome.digest,
                "deployment installed"
            );
            Ok(())
        }
    }
}
