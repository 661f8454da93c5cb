//! Function reconciler: drives observed state toward desired state.
//!
//! Discovery is by name prefix within the deployment's project and region,
//! so a function left behind by an earlier deployment suffix is found and
//! replaced rather than orphaned. The diff decides which imperative calls
//! run; an unchanged configuration issues zero mutating calls.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cloud::{CloudError, FunctionService};
use crate::error::{DeployError, Result};
use crate::function::{
    diff_function, ChangedField, FunctionDiff, FunctionName, FunctionSpec, ObservedFunction,
    FUNCTION_BASE_NAME,
};

/// The mutating calls one reconciliation issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppliedAction {
    /// Observed state already matched desired state.
    Unchanged,
    /// The function was created.
    Created,
    /// The function was updated in place.
    Updated {
        /// The attributes that were updated.
        fields: Vec<ChangedField>,
    },
    /// A function with an old suffix was deleted and the desired one
    /// created.
    Recreated,
}

/// Result of one function reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    /// What the reconciler did.
    pub action: AppliedAction,
    /// The function as the platform reports it after reconciliation.
    pub function: ObservedFunction,
}

/// Reconciles the function resource against the hosting platform.
pub struct FunctionReconciler<F: FunctionService + ?Sized> {
    service: Arc<F>,
}

impl<F: FunctionService + ?Sized> FunctionReconciler<F> {
    /// Creates a new reconciler.
    #[must_use]
    pub fn new(service: Arc<F>) -> Self {
        Self { service }
    }

    /// Drives the function to the desired state.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Reconcile` on an invalid runtime, missing
    /// identity, or platform rejection. Errors are terminal for the run;
    /// retry happens by re-running the whole pipeline.
    pub async fn reconcile(
        &self,
        name: &FunctionName,
        desired: &FunctionSpec,
    ) -> Result<ReconcileOutcome> {
        let observed = self.observe(name).await?;
        let diff = diff_function(name, desired, observed.as_ref());

        match diff {
            FunctionDiff::NoChange => {
                let Some(function) = observed else {
                    return Err(DeployError::reconcile(
                        "diff reported no change without an observed function",
                    ));
                };
                tracing::info!(function = %name, "function already matches desired state");
                Ok(ReconcileOutcome {
                    action: AppliedAction::Unchanged,
                    function,
                })
            }
            FunctionDiff::Create => {
                tracing::info!(function = %name, "creating function");
                let function = self
                    .service
                    .create_function(name, desired)
                    .await
                    .map_err(reconcile_err)?;
                Ok(ReconcileOutcome {
                    action: AppliedAction::Created,
                    function,
                })
            }
            FunctionDiff::Update { fields } => {
                tracing::info!(function = %name, changed = ?fields, "updating function in place");
                let function = self
                    .service
                    .update_function(name, desired)
                    .await
                    .map_err(reconcile_err)?;
                Ok(ReconcileOutcome {
                    action: AppliedAction::Updated { fields },
                    function,
                })
            }
            FunctionDiff::Recreate { previous } => {
                tracing::info!(
                    old = %previous,
                    new = %name,
                    "deployment suffix changed; recreating function"
                );
                self.service
                    .delete_function(&previous)
                    .await
                    .map_err(reconcile_err)?;
                let function = self
                    .service
                    .create_function(name, desired)
                    .await
                    .map_err(reconcile_err)?;
                Ok(ReconcileOutcome {
                    action: AppliedAction::Recreated,
                    function,
                })
            }
        }
    }

    /// Finds the deployment's function, under the desired name or an
    /// earlier suffix.
    async fn observe(&self, name: &FunctionName) -> Result<Option<ObservedFunction>> {
        let prefix = format!("{FUNCTION_BASE_NAME}-");
        let mut candidates = self
            .service
            .list_functions(&name.project, &name.location, &prefix)
            .await
            .map_err(reconcile_err)?;

        if let Some(index) = candidates
            .iter()
            .position(|f| f.name.function_id == name.function_id)
        {
            return Ok(Some(candidates.swap_remove(index)));
        }
        Ok(candidates.into_iter().next())
    }
}

fn reconcile_err(err: CloudError) -> DeployError {
    DeployError::reconcile(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::MemoryCloud;
    use crate::function::SourceRef;
    use aegis_core::DeploySuffix;
    use std::collections::BTreeMap;

    fn name(suffix: [u8; 4]) -> FunctionName {
        FunctionName::for_deployment("p", "r", DeploySuffix::from_bytes(suffix))
    }

    fn spec() -> FunctionSpec {
        FunctionSpec {
            runtime: "python310".to_string(),
            entry_point: "main".to_string(),
            available_memory_mb: 512,
            timeout_seconds: 540,
            max_instance_count: 10,
            service_account_email: "svc@p.iam".to_string(),
            environment: BTreeMap::from([("FALCON_AUTO_UPDATE".to_string(), "off".to_string())]),
            source: SourceRef {
                bucket: "b".to_string(),
                object: "function-source.aaaa.zip".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn creates_when_absent() {
        let cloud = Arc::new(MemoryCloud::new());
        let reconciler = FunctionReconciler::new(Arc::clone(&cloud));

        let outcome = reconciler
            .reconcile(&name([1, 2, 3, 4]), &spec())
            .await
            .expect("reconcile");
        assert_eq!(outcome.action, AppliedAction::Created);
        assert!(outcome.function.uri.is_some());
        assert_eq!(cloud.function_writes(), 1);
    }

    #[tokio::test]
    async fn unchanged_config_issues_zero_mutating_calls() {
        let cloud = Arc::new(MemoryCloud::new());
        let reconciler = FunctionReconciler::new(Arc::clone(&cloud));

        reconciler
            .reconcile(&name([1, 2, 3, 4]), &spec())
            .await
            .expect("create");
        let writes = cloud.function_writes();

        let outcome = reconciler
            .reconcile(&name([1, 2, 3, 4]), &spec())
            .await
            .expect("re-reconcile");
        assert_eq!(outcome.action, AppliedAction::Unchanged);
        assert_eq!(cloud.function_writes(), writes, "pure idempotence");
    }

    #[tokio::test]
    async fn drift_updates_in_place() {
        let cloud = Arc::new(MemoryCloud::new());
        let reconciler = FunctionReconciler::new(Arc::clone(&cloud));

        reconciler
            .reconcile(&name([1, 2, 3, 4]), &spec())
            .await
            .expect("create");

        let mut changed = spec();
        changed
            .environment
            .insert("FALCON_AUTO_UPDATE".to_string(), "force".to_string());
        let outcome = reconciler
            .reconcile(&name([1, 2, 3, 4]), &changed)
            .await
            .expect("update");
        assert_eq!(
            outcome.action,
            AppliedAction::Updated {
                fields: vec![ChangedField::Environment]
            }
        );
        assert_eq!(
            outcome.function.spec.environment["FALCON_AUTO_UPDATE"],
            "force"
        );
    }

    #[tokio::test]
    async fn suffix_change_recreates() {
        let cloud = Arc::new(MemoryCloud::new());
        let reconciler = FunctionReconciler::new(Arc::clone(&cloud));

        reconciler
            .reconcile(&name([1, 2, 3, 4]), &spec())
            .await
            .expect("create");

        let outcome = reconciler
            .reconcile(&name([5, 6, 7, 8]), &spec())
            .await
            .expect("recreate");
        assert_eq!(outcome.action, AppliedAction::Recreated);

        let remaining = cloud
            .list_functions("p", "r", "cluster-protection-")
            .await
            .expect("list");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name.function_id, "cluster-protection-05060708");
    }

    #[tokio::test]
    async fn invalid_runtime_is_a_reconcile_error() {
        let cloud = Arc::new(MemoryCloud::new());
        let reconciler = FunctionReconciler::new(Arc::clone(&cloud));

        let mut bad = spec();
        bad.runtime = "fortran77".to_string();
        let err = reconciler
            .reconcile(&name([1, 2, 3, 4]), &bad)
            .await
            .expect_err("invalid runtime");
        assert!(matches!(err, DeployError::Reconcile { .. }));
    }

    #[tokio::test]
    async fn missing_identity_is_a_reconcile_error() {
        let cloud = Arc::new(MemoryCloud::new());
        let reconciler = FunctionReconciler::new(Arc::clone(&cloud));

        let mut bad = spec();
        bad.service_account_email = String::new();
        let err = reconciler
            .reconcile(&name([1, 2, 3, 4]), &bad)
            .await
            .expect_err("missing identity");
        assert!(matches!(err, DeployError::Reconcile { .. }));
    }
}
