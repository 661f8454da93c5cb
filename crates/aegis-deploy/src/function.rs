//! Function resource model: desired state, observed state, and the diff
//! between them.
//!
//! The diff result is a tagged variant that drives which imperative calls
//! the reconciler issues. Attribute drift updates in place; only a changed
//! deployment suffix (and therefore a changed name) forces a recreate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use aegis_core::{DeployConfig, DeploySuffix};

use crate::publisher::PublishedArtifact;

/// Base name of the deployed function; the deploy suffix is appended.
pub const FUNCTION_BASE_NAME: &str = "cluster-protection";

/// Runtime the function source targets.
pub const RUNTIME: &str = "python310";

/// Symbol invoked on trigger.
pub const ENTRY_POINT: &str = "main";

/// Memory available to each instance, in MB.
pub const AVAILABLE_MEMORY_MB: u32 = 512;

/// Hard execution deadline. Cluster readiness polling inside the function
/// can take several minutes, so this sits at the platform maximum for
/// event-driven functions.
pub const TIMEOUT_SECONDS: u32 = 540;

/// Upper bound on concurrent instances, capping burst concurrency when
/// many clusters are created at once.
pub const MAX_INSTANCE_COUNT: u32 = 10;

/// Environment keys whose values are secret-classified and never rendered.
const SECRET_ENV_KEYS: [&str; 2] = ["FALCON_CLIENT_ID", "FALCON_CLIENT_SECRET"];

/// Fully-qualified name of a function within a project and region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionName {
    /// Owning project.
    pub project: String,
    /// Region.
    pub location: String,
    /// Short function ID, e.g. `cluster-protection-1a2b3c4d`.
    pub function_id: String,
}

impl FunctionName {
    /// Derives the function name for a deployment.
    #[must_use]
    pub fn for_deployment(project: &str, location: &str, suffix: DeploySuffix) -> Self {
        Self {
            project: project.to_string(),
            location: location.to_string(),
            function_id: format!("{FUNCTION_BASE_NAME}-{suffix}"),
        }
    }

    /// Returns the platform resource name,
    /// `projects/{project}/locations/{location}/functions/{id}`.
    #[must_use]
    pub fn resource_name(&self) -> String {
        format!(
            "projects/{}/locations/{}/functions/{}",
            self.project, self.location, self.function_id
        )
    }
}

impl std::fmt::Display for FunctionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.function_id)
    }
}

/// Reference to a published source artifact in the bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Bucket holding the artifact.
    pub bucket: String,
    /// Object name within the bucket.
    pub object: String,
}

impl From<&PublishedArtifact> for SourceRef {
    fn from(artifact: &PublishedArtifact) -> Self {
        Self {
            bucket: artifact.bucket.clone(),
            object: artifact.object_name.clone(),
        }
    }
}

/// Desired state of the function resource.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpec {
    /// Language runtime identifier for the hosting platform.
    pub runtime: String,
    /// Symbol invoked on trigger.
    pub entry_point: String,
    /// Memory available to each instance, in MB.
    pub available_memory_mb: u32,
    /// Hard execution deadline in seconds.
    pub timeout_seconds: u32,
    /// Upper bound on concurrent instances.
    pub max_instance_count: u32,
    /// Identity the function executes as.
    pub service_account_email: String,
    /// Environment mapping, passed through verbatim to the runtime.
    pub environment: BTreeMap<String, String>,
    /// The published source artifact.
    pub source: SourceRef,
}

impl FunctionSpec {
    /// Builds the desired state for a deployment from its configuration
    /// and published artifact.
    #[must_use]
    pub fn from_config(config: &DeployConfig, artifact: &PublishedArtifact) -> Self {
        Self {
            runtime: RUNTIME.to_string(),
            entry_point: ENTRY_POINT.to_string(),
            available_memory_mb: AVAILABLE_MEMORY_MB,
            timeout_seconds: TIMEOUT_SECONDS,
            max_instance_count: MAX_INSTANCE_COUNT,
            service_account_email: config.service_account_email.clone(),
            environment: config.function_environment(),
            source: SourceRef::from(artifact),
        }
    }
}

// The environment carries credentials; render values redacted for the
// secret-classified keys.
impl std::fmt::Debug for FunctionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let environment: BTreeMap<&str, &str> = self
            .environment
            .iter()
            .map(|(k, v)| {
                if SECRET_ENV_KEYS.contains(&k.as_str()) {
                    (k.as_str(), "[REDACTED]")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect();

        f.debug_struct("FunctionSpec")
            .field("runtime", &self.runtime)
            .field("entry_point", &self.entry_point)
            .field("available_memory_mb", &self.available_memory_mb)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_instance_count", &self.max_instance_count)
            .field("service_account_email", &self.service_account_email)
            .field("environment", &environment)
            .field("source", &self.source)
            .finish()
    }
}

/// Observed state of a deployed function, as reported by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservedFunction {
    /// The function's name.
    pub name: FunctionName,
    /// The platform's view of the attribute set.
    pub spec: FunctionSpec,
    /// Invocation endpoint, once the platform has assigned one.
    pub uri: Option<String>,
}

/// An attribute whose desired and observed values differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangedField {
    /// Runtime identifier changed.
    Runtime,
    /// Entry point changed.
    EntryPoint,
    /// Memory limit changed.
    AvailableMemory,
    /// Execution deadline changed.
    TimeoutSeconds,
    /// Instance bound changed.
    MaxInstanceCount,
    /// Execution identity changed.
    ServiceAccount,
    /// Environment mapping changed.
    Environment,
    /// Source artifact changed.
    Source,
}

/// Result of diffing desired state against observed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionDiff {
    /// Observed state already matches; no mutating call.
    NoChange,
    /// No function exists under the desired name (or any name with the
    /// deployment's base prefix); create it.
    Create,
    /// The named function exists but attributes differ; update in place.
    Update {
        /// The attributes that differ.
        fields: Vec<ChangedField>,
    },
    /// A function with the base prefix exists under a different suffix;
    /// delete it and create the desired one.
    Recreate {
        /// Name of the function being replaced.
        previous: FunctionName,
    },
}

/// Diffs desired state against what the platform reported.
///
/// `observed` is the function found by prefix discovery, if any.
#[must_use]
pub fn diff_function(
    desired_name: &FunctionName,
    desired: &FunctionSpec,
    observed: Option<&ObservedFunction>,
) -> FunctionDiff {
    let Some(observed) = observed else {
        return FunctionDiff::Create;
    };

    if observed.name.function_id != desired_name.function_id {
        return FunctionDiff::Recreate {
            previous: observed.name.clone(),
        };
    }

    let mut fields = Vec::new();
    if observed.spec.runtime != desired.runtime {
        fields.push(ChangedField::Runtime);
    }
    if observed.spec.entry_point != desired.entry_point {
        fields.push(ChangedField::EntryPoint);
    }
    if observed.spec.available_memory_mb != desired.available_memory_mb {
        fields.push(ChangedField::AvailableMemory);
    }
    if observed.spec.timeout_seconds != desired.timeout_seconds {
        fields.push(ChangedField::TimeoutSeconds);
    }
    if observed.spec.max_instance_count != desired.max_instance_count {
        fields.push(ChangedField::MaxInstanceCount);
    }
    if observed.spec.service_account_email != desired.service_account_email {
        fields.push(ChangedField::ServiceAccount);
    }
    if observed.spec.environment != desired.environment {
        fields.push(ChangedField::Environment);
    }
    if observed.spec.source != desired.source {
        fields.push(ChangedField::Source);
    }

    if fields.is_empty() {
        FunctionDiff::NoChange
    } else {
        FunctionDiff::Update { fields }
    }
}
