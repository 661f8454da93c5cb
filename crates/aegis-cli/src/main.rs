//! Aegis CLI - cluster protection function deployment.
//!
//! The main entry point for the `aegis` CLI binary.

use anyhow::Result;
use clap::Parser;

use aegis_cli::{Cli, Commands};
use aegis_core::observability::{init_logging, LogFormat};

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();
    let config = cli.config();

    // Initialize tracing
    init_logging(if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    });

    // Create runtime and execute
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        match cli.command {
            Commands::Validate(args) => aegis_cli::commands::validate::execute(&args, &config),
            Commands::Package(args) => aegis_cli::commands::package::execute(&args, &config),
            Commands::Apply(args) => aegis_cli::commands::apply::execute(args, &config).await,
        }
    })
}
