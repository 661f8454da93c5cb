//! Apply command - run one full reconciliation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use aegis_deploy::gcp::{GcfFunctions, GcfIam, GcfTriggers, GcpConnection, GcsStore};
use aegis_deploy::{DeployOutputs, Pipeline, PublishOutcome};

use crate::{Config, OutputFormat};

/// Arguments for the apply command.
#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Path to the deploy configuration file (JSON).
    #[arg(long, short = 'f', env = "AEGIS_CONFIG")]
    pub config_file: PathBuf,

    /// Directory holding the function source.
    #[arg(long, short = 's')]
    pub source_dir: PathBuf,

    /// Directory the packaged archive is written into (defaults to the
    /// system temporary directory).
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,
}

/// Execute the apply command.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the access token is
/// missing, or any pipeline stage fails. The error reports which stage
/// failed.
pub async fn execute(args: ApplyArgs, config: &Config) -> Result<()> {
    let deploy = crate::commands::load_config(&args.config_file)?;
    deploy
        .validate()
        .context("Configuration failed validation")?;

    let token = config
        .access_token
        .clone()
        .context("An access token is required. Set AEGIS_ACCESS_TOKEN or use --access-token")?;

    let conn = GcpConnection::new(token, deploy.remote_timeout())
        .context("Failed to initialize the platform connection")?;
    let storage = Arc::new(GcsStore::new(conn.clone(), &deploy.artifact_bucket));
    let functions = Arc::new(GcfFunctions::new(conn.clone()));
    let triggers = Arc::new(GcfTriggers::new(conn.clone()));
    let iam = Arc::new(GcfIam::new(conn));

    let pipeline = Pipeline::new(storage, functions, triggers, iam);
    let staging = args.staging_dir.clone().unwrap_or_else(std::env::temp_dir);

    let outputs = match pipeline.run(&deploy, &args.source_dir, &staging).await {
        Ok(outputs) => outputs,
        Err(e) => {
            let stage = e.stage();
            return Err(
                anyhow::Error::new(e).context(format!("Reconciliation failed at stage '{stage}'"))
            );
        }
    };

    render(&outputs, config)
}

fn render(outputs: &DeployOutputs, config: &Config) -> Result<()> {
    match config.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(outputs).context("Failed to serialize response")?
            );
        }
        OutputFormat::Text => {
            let digest_preview: String = outputs.artifact.digest.chars().take(12).collect();
            let artifact_note = match outputs.artifact.outcome {
                PublishOutcome::Uploaded => "uploaded",
                PublishOutcome::AlreadyPresent => "already present",
            };
            println!("Reconciliation complete!");
            println!();
            println!("  Run ID:      {}", outputs.run_id);
            println!("  Function:    {}", outputs.function_name);
            println!("  Endpoint:    {}", outputs.function_uri);
            println!("  Artifact:    {digest_preview}... ({artifact_note})");
            println!("  Action:      {:?}", outputs.action);
            println!("  Trigger:     {:?}", outputs.trigger);
            println!("  Access:      {:?}", outputs.access);
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
                    field: "Run ID".to_string(),
                    value: outputs.run_id.clone(),
                },
                Row {
                    field: "Function".to_string(),
                    value: outputs.function_name.clone(),
                },
                Row {
                    field: "Endpoint".to_string(),
                    value: outputs.function_uri.clone(),
                },
                Row {
                    field: "Artifact".to_string(),
                    value: outputs.artifact.object_name.clone(),
                },
                Row {
                    field: "Action".to_string(),
                    value: format!("{:?}", outputs.action),
                },
                Row {
                    field: "Trigger".to_string(),
                    value: format!("{:?}", outputs.trigger),
                },
                Row {
                    field: "Access".to_string(),
                    value: format!("{:?}", outputs.access),
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

    #[test]
    fn test_apply_args_parsing() {
        #[derive(Parser)]
        struct TestCli {
            #[command(flatten)]
            args: ApplyArgs,
        }

        let cli = TestCli::parse_from([
            "test",
            "-f",
            "deploy.json",
            "-s",
            "function-source",
            "--staging-dir",
            "/tmp/staging",
        ]);
        assert_eq!(cli.args.config_file, PathBuf::from("deploy.json"));
        assert_eq!(cli.args.source_dir, PathBuf::from("function-source"));
        assert_eq!(cli.args.staging_dir, Some(PathBuf::from("/tmp/staging")));
    }

    #[tokio::test]
    async fn test_apply_requires_an_access_token() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("deploy.json");
        std::fs::write(
            &path,
            r#"{
                "deployment_project_id": "p",
                "location": "l",
                "artifact_bucket": "b",
                "trigger_topic": "t",
                "service_account_email": "s@p.iam",
                "falcon_client_id": "id",
                "falcon_client_secret": "secret",
                "scope": "projects",
                "scope_identifier": "p"
            }"#,
        )
        .unwrap();

        let args = ApplyArgs {
            config_file: path,
            source_dir: dir.path().to_path_buf(),
            staging_dir: None,
        };
        let err = execute(args, &Config::default())
            .await
            .expect_err("missing token");
        assert!(format!("{err:#}").contains("access token"));
    }
}
