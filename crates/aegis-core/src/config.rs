//! Deploy configuration: the validated input set for one deployment scope.
//!
//! Every input is checked at the boundary, before the pipeline issues any
//! remote call. Enum-constrained inputs (`scope`, `falcon_auto_update`)
//! reject invalid values during parsing; the remaining constraints are
//! enforced by [`DeployConfig::validate`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use crate::secret::Redacted;

/// Environment variable carrying the Falcon API client ID.
pub const ENV_FALCON_CLIENT_ID: &str = "FALCON_CLIENT_ID";
/// Environment variable carrying the Falcon API client secret.
pub const ENV_FALCON_CLIENT_SECRET: &str = "FALCON_CLIENT_SECRET";
/// Environment variable selecting the sensor auto-update mode.
pub const ENV_FALCON_AUTO_UPDATE: &str = "FALCON_AUTO_UPDATE";
/// Environment variable carrying the sensor update policy name.
pub const ENV_FALCON_UPDATE_POLICY: &str = "FALCON_UPDATE_POLICY";
/// Environment variable pinning the sensor version.
pub const ENV_FALCON_SENSOR_VERSION: &str = "FALCON_SENSOR_VERSION";
/// Environment variable carrying comma-separated sensor tags.
pub const ENV_FALCON_SENSOR_TAGS: &str = "FALCON_SENSOR_TAGS";

/// Errors produced while parsing or validating a deploy configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required field is empty or missing.
    #[error("configuration field '{field}' must not be empty")]
    MissingField {
        /// Name of the offending field.
        field: &'static str,
    },

    /// The protection scope is not one of the allowed values.
    #[error("invalid scope '{value}': expected one of organizations, projects, folders")]
    InvalidScope {
        /// The rejected value.
        value: String,
    },

    /// The auto-update mode is not one of the allowed values.
    #[error("invalid falcon_auto_update '{value}': expected one of off, normal, force")]
    InvalidAutoUpdate {
        /// The rejected value.
        value: String,
    },

    /// The remote call timeout is out of range.
    #[error("remote_timeout_seconds must be at least 1, got {seconds}")]
    InvalidTimeout {
        /// The rejected value.
        seconds: u64,
    },
}

/// The organizational boundary at which the protection policy applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Scope {
    /// Apply across an entire organization.
    Organizations,
    /// Apply to a single project.
    Projects,
    /// Apply to a folder subtree.
    Folders,
}

impl Scope {
    /// Returns the scope as its wire string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organizations => "organizations",
            Self::Projects => "projects",
            Self::Folders => "folders",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "organizations" => Ok(Self::Organizations),
            "projects" => Ok(Self::Projects),
            "folders" => Ok(Self::Folders),
            other => Err(ConfigError::InvalidScope {
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Scope {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.as_str().to_string()
    }
}

/// Sensor auto-update mode, passed through to the function verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AutoUpdate {
    /// No automatic sensor updates.
    #[default]
    Off,
    /// Update during the platform's normal rollout window.
    Normal,
    /// Update as soon as a new sensor version is available.
    Force,
}

impl AutoUpdate {
    /// Returns the mode as its wire string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Normal => "normal",
            Self::Force => "force",
        }
    }
}

impl std::fmt::Display for AutoUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AutoUpdate {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(Self::Off),
            "normal" => Ok(Self::Normal),
            "force" => Ok(Self::Force),
            other => Err(ConfigError::InvalidAutoUpdate {
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for AutoUpdate {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AutoUpdate> for String {
    fn from(mode: AutoUpdate) -> Self {
        mode.as_str().to_string()
    }
}

/// The principal granted invocation rights on the function.
///
/// The default is the unrestricted principal set, which allows
/// unauthenticated invocation. The endpoint is reached through
/// authenticated event delivery, but the grant itself is deliberately
/// surfaced here as configuration rather than hard-coded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Principal {
    /// The unrestricted principal set (`allUsers`).
    AllUsers,
    /// A named member, e.g. `serviceAccount:svc@project.iam.gserviceaccount.com`.
    Member(String),
}

impl Default for Principal {
    fn default() -> Self {
        Self::AllUsers
    }
}

impl Principal {
    /// Returns the principal as its IAM wire string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::AllUsers => "allUsers",
            Self::Member(member) => member,
        }
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Principal {
    fn from(value: String) -> Self {
        if value == "allUsers" {
            Self::AllUsers
        } else {
            Self::Member(value)
        }
    }
}

impl From<Principal> for String {
    fn from(principal: Principal) -> Self {
        principal.as_str().to_string()
    }
}

fn default_timeout_secs() -> u64 {
    60
}

/// The full validated input set for one deployment scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Project that hosts the function, bucket, and topic.
    #[serde(rename = "deployment_project_id")]
    pub project_id: String,

    /// Region the function is deployed into.
    pub location: String,

    /// Pre-provisioned bucket holding published artifacts and deploy state.
    pub artifact_bucket: String,

    /// Pre-provisioned topic whose messages invoke the function.
    pub trigger_topic: String,

    /// Identity the function executes as.
    pub service_account_email: String,

    /// Falcon API client ID (secret-classified).
    pub falcon_client_id: Redacted,

    /// Falcon API client secret (secret-classified).
    pub falcon_client_secret: Redacted,

    /// Organizational boundary the protection policy applies to.
    pub scope: Scope,

    /// Identifier of the organization, project, or folder named by `scope`.
    pub scope_identifier: String,

    /// Sensor auto-update mode.
    #[serde(default)]
    pub falcon_auto_update: AutoUpdate,

    /// Sensor update policy name (free text).
    #[serde(default)]
    pub falcon_update_policy: String,

    /// Pinned sensor version (free text).
    #[serde(default)]
    pub falcon_sensor_version: String,

    /// Comma-separated sensor tags (free text).
    #[serde(default)]
    pub falcon_sensor_tags: String,

    /// Principal granted invocation rights.
    #[serde(default)]
    pub invoker_principal: Principal,

    /// Upper bound, in seconds, on each remote call.
    #[serde(rename = "remote_timeout_seconds", default = "default_timeout_secs")]
    pub remote_timeout_secs: u64,
}

impl DeployConfig {
    /// Checks the constraints that parsing alone cannot enforce.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint. Called before any remote
    /// call is issued; a validation failure has zero side effects.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required: [(&'static str, &str); 6] = [
            ("deployment_project_id", &self.project_id),
            ("location", &self.location),
            ("artifact_bucket", &self.artifact_bucket),
            ("trigger_topic", &self.trigger_topic),
            ("service_account_email", &self.service_account_email),
            ("scope_identifier", &self.scope_identifier),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField { field });
            }
        }

        if self.falcon_client_id.is_empty() {
            return Err(ConfigError::MissingField {
                field: "falcon_client_id",
            });
        }
        if self.falcon_client_secret.is_empty() {
            return Err(ConfigError::MissingField {
                field: "falcon_client_secret",
            });
        }
        if let Principal::Member(member) = &self.invoker_principal {
            if member.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    field: "invoker_principal",
                });
            }
        }
        if self.remote_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout { seconds: 0 });
        }

        Ok(())
    }

    /// Builds the function environment mapping, passed through verbatim.
    ///
    /// All values are string-typed. The secret-classified credentials are
    /// exposed here and nowhere else; the returned map goes straight into
    /// a function deployment payload and must not be logged.
    #[must_use]
    pub fn function_environment(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                ENV_FALCON_CLIENT_ID.to_string(),
                self.falcon_client_id.expose().to_string(),
            ),
            (
                ENV_FALCON_CLIENT_SECRET.to_string(),
                self.falcon_client_secret.expose().to_string(),
            ),
            (
                ENV_FALCON_AUTO_UPDATE.to_string(),
                self.falcon_auto_update.to_string(),
            ),
            (
                ENV_FALCON_UPDATE_POLICY.to_string(),
                self.falcon_update_policy.clone(),
            ),
            (
                ENV_FALCON_SENSOR_VERSION.to_string(),
                self.falcon_sensor_version.clone(),
            ),
            (
                ENV_FALCON_SENSOR_TAGS.to_string(),
                self.falcon_sensor_tags.clone(),
            ),
        ])
    }

    /// The bound on each remote call, as a `Duration`.
    #[must_use]
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> DeployConfig {
        DeployConfig {
            project_id: "acme-prod".to_string(),
            location: "us-central1".to_string(),
            artifact_bucket: "acme-prod-cluster-protection".to_string(),
            trigger_topic: "cluster-created".to_string(),
            service_account_email: "protect@acme-prod.iam.gserviceaccount.com".to_string(),
            falcon_client_id: Redacted::new("client-id"),
            falcon_client_secret: Redacted::new("client-secret"),
            scope: Scope::Projects,
            scope_identifier: "acme-prod".to_string(),
            falcon_auto_update: AutoUpdate::Off,
            falcon_update_policy: String::new(),
            falcon_sensor_version: String::new(),
            falcon_sensor_tags: String::new(),
            invoker_principal: Principal::AllUsers,
            remote_timeout_secs: 60,
        }
    }

    #[test]
    fn valid_config_passes() {
        sample_config().validate().expect("valid config");
    }

    #[test]
    fn scope_rejects_unknown_values() {
        let result: Result<Scope, _> = "region".parse();
        assert!(matches!(result, Err(ConfigError::InvalidScope { value }) if value == "region"));
    }

    #[test]
    fn scope_parses_all_allowed_values() {
        assert_eq!("organizations".parse::<Scope>().unwrap(), Scope::Organizations);
        assert_eq!("projects".parse::<Scope>().unwrap(), Scope::Projects);
        assert_eq!("folders".parse::<Scope>().unwrap(), Scope::Folders);
    }

    #[test]
    fn auto_update_rejects_unknown_values() {
        let result: Result<AutoUpdate, _> = "invalid".parse();
        assert!(matches!(result, Err(ConfigError::InvalidAutoUpdate { .. })));
    }

    #[test]
    fn auto_update_rejected_during_deserialization() {
        let json = r#"{
            "deployment_project_id": "p",
            "location": "l",
            "artifact_bucket": "b",
            "trigger_topic": "t",
            "service_account_email": "s@p.iam",
            "falcon_client_id": "id",
            "falcon_client_secret": "secret",
            "scope": "projects",
            "scope_identifier": "p",
            "falcon_auto_update": "invalid"
        }"#;
        let result: Result<DeployConfig, _> = serde_json::from_str(json);
        let err = result.expect_err("invalid mode must be rejected at the boundary");
        assert!(err.to_string().contains("falcon_auto_update"));
    }

    #[test]
    fn empty_project_id_fails_validation() {
        let mut config = sample_config();
        config.project_id = String::new();
        let err = config.validate().expect_err("must fail");
        assert!(matches!(
            err,
            ConfigError::MissingField {
                field: "deployment_project_id"
            }
        ));
    }

    #[test]
    fn zero_timeout_fails_validation() {
        let mut config = sample_config();
        config.remote_timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout { seconds: 0 })
        ));
    }

    #[test]
    fn environment_is_passed_through_verbatim() {
        let mut config = sample_config();
        config.falcon_auto_update = AutoUpdate::Force;
        config.falcon_sensor_tags = "prod,gke".to_string();

        let env = config.function_environment();
        assert_eq!(env[ENV_FALCON_CLIENT_ID], "client-id");
        assert_eq!(env[ENV_FALCON_CLIENT_SECRET], "client-secret");
        assert_eq!(env[ENV_FALCON_AUTO_UPDATE], "force");
        assert_eq!(env[ENV_FALCON_UPDATE_POLICY], "");
        assert_eq!(env[ENV_FALCON_SENSOR_TAGS], "prod,gke");
        assert_eq!(env.len(), 6);
    }

    #[test]
    fn defaults_apply_on_deserialization() {
        let json = r#"{
            "deployment_project_id": "p",
            "location": "l",
            "artifact_bucket": "b",
            "trigger_topic": "t",
            "service_account_email": "s@p.iam",
            "falcon_client_id": "id",
            "falcon_client_secret": "secret",
            "scope": "organizations",
            "scope_identifier": "123456"
        }"#;
        let config: DeployConfig = serde_json::from_str(json).expect("deserialize");
        assert_eq!(config.falcon_auto_update, AutoUpdate::Off);
        assert_eq!(config.invoker_principal, Principal::AllUsers);
        assert_eq!(config.remote_timeout_secs, 60);
        assert!(config.falcon_update_policy.is_empty());
    }

    #[test]
    fn principal_parses_all_users_and_members() {
        let p: Principal = "allUsers".to_string().into();
        assert_eq!(p, Principal::AllUsers);

        let m: Principal = "user:ops@acme.example".to_string().into();
        assert_eq!(m, Principal::Member("user:ops@acme.example".to_string()));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = sample_config();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("client-secret"));
        assert!(!rendered.contains("client-id"));
    }
}
