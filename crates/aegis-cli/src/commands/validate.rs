//! Validate command - check a deploy configuration offline.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use aegis_core::{DeployConfig, Principal};

use crate::{Config, OutputFormat};

/// Arguments for the validate command.
#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Path to the deploy configuration file (JSON).
    #[arg(long, short = 'f', env = "AEGIS_CONFIG")]
    pub config_file: PathBuf,
}

/// Execute the validate command.
///
/// # Errors
///
/// Returns an error if the configuration file cannot be read, fails to
/// parse, or violates a declared constraint. No remote call is made.
pub fn execute(args: &ValidateArgs, config: &Config) -> Result<()> {
    let deploy = crate::commands::load_config(&args.config_file)?;
    deploy
        .validate()
        .context("Configuration failed validation")?;

    let unauthenticated = deploy.invoker_principal == Principal::AllUsers;

    match config.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "valid": true,
                    "project": deploy.project_id,
                    "location": deploy.location,
                    "scope": deploy.scope.to_string(),
                    "scopeIdentifier": deploy.scope_identifier,
                    "invokerPrincipal": deploy.invoker_principal.to_string(),
                    "allowsUnauthenticatedInvocation": unauthenticated,
                }))
                .context("Failed to serialize response")?
            );
        }
        OutputFormat::Text => {
            println!("Configuration is valid.");
            println!();
            println!("  Project:          {}", deploy.project_id);
            println!("  Location:         {}", deploy.location);
            println!("  Scope:            {} ({})", deploy.scope, deploy.scope_identifier);
            println!("  Trigger Topic:    {}", deploy.trigger_topic);
            println!("  Invoker:          {}", deploy.invoker_principal);
            if unauthenticated {
                println!();
                println!(
                    "Note: the invoker principal 'allUsers' permits unauthenticated \
                     invocation. The endpoint is reached through authenticated event \
                     delivery; set invoker_principal to a named member to restrict it."
                );
            }
        }
        OutputFormat::Table => {
            print_table(&deploy);
        }
    }

    Ok(())
}

fn print_table(deploy: &DeployConfig) {
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
            field: "Project".to_string(),
            value: deploy.project_id.clone(),
        },
        Row {
            field: "Location".to_string(),
            value: deploy.location.clone(),
        },
        Row {
            field: "Scope".to_string(),
            value: format!("{} ({})", deploy.scope, deploy.scope_identifier),
        },
        Row {
            field: "Artifact Bucket".to_string(),
            value: deploy.artifact_bucket.clone(),
        },
        Row {
            field: "Trigger Topic".to_string(),
            value: deploy.trigger_topic.clone(),
        },
        Row {
            field: "Invoker".to_string(),
            value: deploy.invoker_principal.to_string(),
        },
    ];

    println!("{}", Table::new(rows));
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_validate_args_parsing() {
        #[derive(Parser)]
        struct TestCli {
            #[command(flatten)]
            args: ValidateArgs,
        }

        let cli = TestCli::parse_from(["test", "-f", "deploy.json"]);
        assert_eq!(cli.args.config_file, PathBuf::from("deploy.json"));
    }

    #[test]
    fn test_validate_accepts_a_complete_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deploy.json");
        std::fs::write(
            &path,
            r#"{
                "deployment_project_id": "acme-prod",
                "location": "us-central1",
                "artifact_bucket": "acme-prod-cluster-protection",
                "trigger_topic": "cluster-created",
                "service_account_email": "protect@acme-prod.iam.gserviceaccount.com",
                "falcon_client_id": "id",
                "falcon_client_secret": "secret",
                "scope": "projects",
                "scope_identifier": "acme-prod"
            }"#,
        )
        .unwrap();

        let args = ValidateArgs { config_file: path };
        execute(&args, &Config::default()).expect("valid configuration");
    }

    #[test]
    fn test_validate_rejects_empty_required_field() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deploy.json");
        std::fs::write(
            &path,
            r#"{
                "deployment_project_id": "",
                "location": "us-central1",
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

        let args = ValidateArgs { config_file: path };
        let err = execute(&args, &Config::default()).expect_err("must fail");
        assert!(format!("{err:#}").contains("deployment_project_id"));
    }
}
