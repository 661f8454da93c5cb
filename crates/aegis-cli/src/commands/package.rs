//! Package command - archive function source and print its digest.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use aegis_deploy::bundle::package_source;

use crate::{Config, OutputFormat};

/// Arguments for the package command.
#[derive(Debug, Args)]
pub struct PackageArgs {
    /// Directory holding the function source.
    #[arg(long, short = 's')]
    pub source_dir: PathBuf,

    /// Directory the archive is written into (defaults to the system
    /// temporary directory).
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,
}

/// Execute the package command.
///
/// # Errors
///
/// Returns an error if the source directory is missing, unreadable, or
/// empty, or if the archive cannot be written.
pub fn execute(args: &PackageArgs, config: &Config) -> Result<()> {
    let staging = args.staging_dir.clone().unwrap_or_else(std::env::temp_dir);
    let bundle = package_source(&args.source_dir, &staging)
        .with_context(|| format!("Failed to package {}", args.source_dir.display()))?;

    match config.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "digest": bundle.digest,
                    "objectName": bundle.object_name(),
                    "sizeBytes": bundle.size_bytes,
                    "archivePath": bundle.archive_path,
                }))
                .context("Failed to serialize response")?
            );
        }
        OutputFormat::Text => {
            println!("Source packaged.");
            println!();
            println!("  Digest:       {}", bundle.digest);
            println!("  Object Name:  {}", bundle.object_name());
            println!("  Size:         {} bytes", bundle.size_bytes);
            println!("  Archive:      {}", bundle.archive_path.display());
        }
        OutputFormat::Table => {
            use tabled::{Table, Tabled};

            #[derive(Tabled)]
            struct Row {
                #[tabled(rename = "Field")]
                field: String,
                #[tabled(rename = "Value")]
                value: String,
            }

            let rows = vec![
                Row {
                    field: "Digest".to_string(),
                    value: bundle.digest.clone(),
                },
                Row {
                    field: "Object Name".to_string(),
                    value: bundle.object_name(),
                },
                Row {
                    field: "Size (bytes)".to_string(),
                    value: bundle.size_bytes.to_string(),
                },
                Row {
                    field: "Archive".to_string(),
                    value: bundle.archive_path.display().to_string(),
                },
            ];

            println!("{}", Table::new(rows));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_package_args_parsing() {
        #[derive(Parser)]
        struct TestCli {
            #[command(flatten)]
            args: PackageArgs,
        }

        let cli = TestCli::parse_from(["test", "-s", "function-source"]);
        assert_eq!(cli.args.source_dir, PathBuf::from("function-source"));
        assert!(cli.args.staging_dir.is_none());
    }

    #[test]
    fn test_package_produces_a_content_addressed_archive() {
        let source = TempDir::new().unwrap();
        std::fs::write(source.path().join("main.py"), b"def main(): pass").unwrap();
        let staging = TempDir::new().unwrap();

        let args = PackageArgs {
            source_dir: source.path().to_path_buf(),
            staging_dir: Some(staging.path().to_path_buf()),
        };
        execute(&args, &Config::default()).expect("package");

        let archives: Vec<_> = std::fs::read_dir(staging.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(archives.len(), 1);
        assert!(archives[0].starts_with("function-source."));
        assert!(archives[0].ends_with(".zip"));
    }

    #[test]
    fn test_package_empty_directory_fails() {
        let source = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();

        let args = PackageArgs {
            source_dir: source.path().to_path_buf(),
            staging_dir: Some(staging.path().to_path_buf()),
        };
        let err = execute(&args, &Config::default()).expect_err("empty source");
        assert!(format!("{err:#}").contains("Failed to package"));
    }
}
