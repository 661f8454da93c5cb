//! # aegis-cli
//!
//! Command-line interface for Aegis, the cluster protection function
//! deployment tool.
//!
//! ## Commands
//!
//! - `aegis validate` - Check a deploy configuration offline
//! - `aegis package` - Package function source and print its digest
//! - `aegis apply` - Run one full reconciliation
//!
//! ## Configuration
//!
//! The CLI uses environment variables or command-line flags for settings:
//!
//! - `AEGIS_CONFIG` - Path to the deploy configuration file (JSON)
//! - `AEGIS_ACCESS_TOKEN` - Platform access token for remote calls

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

pub mod commands;

use aegis_core::Redacted;
use clap::{Parser, Subcommand};

/// Aegis CLI - cluster protection function deployment.
#[derive(Debug, Parser)]
#[command(name = "aegis")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Platform access token for remote calls.
    #[arg(long, env = "AEGIS_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Output format.
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,

    /// Emit JSON logs instead of pretty logs.
    #[arg(long)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Get the effective configuration.
    #[must_use]
    pub fn config(&self) -> Config {
        Config {
            access_token: self.access_token.clone().map(Redacted::new),
            format: self.format.clone(),
        }
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check a deploy configuration offline.
    Validate(commands::validate::ValidateArgs),
    /// Package function source and print its digest.
    Package(commands::package::PackageArgs),
    /// Run one full reconciliation.
    Apply(commands::apply::ApplyArgs),
}

/// Output format.
#[derive(Debug, Clone, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
    /// Table output.
    Table,
}

/// CLI configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Platform access token for remote calls.
    pub access_token: Option<Redacted>,
    /// Output format.
    pub format: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_config_from_flags() {
        let cli = Cli::parse_from([
            "aegis",
            "--access-token",
            "token-abc",
            "--format",
            "json",
            "validate",
            "--config-file",
            "deploy.json",
        ]);

        let config = cli.config();
        assert_eq!(
            config.access_token.as_ref().map(Redacted::expose),
            Some("token-abc")
        );
        assert!(matches!(config.format, OutputFormat::Json));
    }

    #[test]
    fn test_cli_token_never_rendered_in_debug() {
        let cli = Cli::parse_from([
            "aegis",
            "--access-token",
            "super-secret-token",
            "validate",
            "--config-file",
            "deploy.json",
        ]);

        let config = cli.config();
        assert!(!format!("{config:?}").contains("super-secret-token"));
    }
}
