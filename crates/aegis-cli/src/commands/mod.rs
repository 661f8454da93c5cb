//! CLI command implementations.

pub mod apply;
pub mod package;
pub mod validate;

use std::path::Path;

use anyhow::{Context, Result};

use aegis_core::DeployConfig;

/// Loads a deploy configuration from a JSON file.
///
/// Enum-constrained inputs (`scope`, `falcon_auto_update`) are rejected
/// here, during parsing, before anything else runs.
pub(crate) fn load_config(path: &Path) -> Result<DeployConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
    let config: DeployConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse configuration file: {}", path.display()))?;
    Ok(config)
}
