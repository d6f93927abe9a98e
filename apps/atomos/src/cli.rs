//! Command line interface definition

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// atomos - transactional OS deployment engine
#[derive(Parser)]
#[command(name = "atomos")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Transactional OS deployment engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install a deployment onto target storage
    Install {
        /// Path to the deployment descriptor (TOML)
        #[arg(short, long, value_name = "PATH")]
        descriptor: PathBuf,

        /// Mounted root of the target system partition
        #[arg(long, value_name = "PATH")]
        target_root: PathBuf,

        /// Snapshot slot budget on the target
        #[arg(long, default_value_t = 8)]
        max_snapshots: usize,
    },
}
