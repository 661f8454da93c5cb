//! The reconciliation pipeline.
//!
//! One run executes the stages in order, each stage consuming the previous
//! stage's typed output:
//!
//! ```text
//! validate → identity → package → publish → reconcile-function
//!          → bind-trigger → grant-access → resolve-output
//! ```
//!
//! Validation happens synchronously before any remote call. Every remote
//! stage is bounded by the configured timeout and tagged with its own
//! error kind, so a failed run reports which stage failed and why. There
//! are no internal retries and no compensating transactions: partial
//! completion is resolved by re-running the whole pipeline and relying on
//! per-stage idempotence.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use aegis_core::observability::{run_span, stage_span};
use aegis_core::{DeployConfig, ObjectStore, RunId};

use crate::access::{AccessBinder, AccessGrant, AccessOutcome};
use crate::bundle::package_source;
use crate::cloud::{FunctionService, IamService, TriggerService};
use crate::error::{DeployError, Result};
use crate::function::{FunctionName, FunctionSpec};
use crate::publisher::{ArtifactPublisher, PublishedArtifact};
use crate::reconciler::{AppliedAction, FunctionReconciler};
use crate::state::StateStore;
use crate::trigger::{TriggerBinder, TriggerOutcome, TriggerSpec};

/// The resolved outputs of a successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployOutputs {
    /// Identifier of this run.
    pub run_id: String,
    /// The function's short name.
    pub function_name: String,
    /// The function's invocation endpoint.
    pub function_uri: String,
    /// The published source artifact.
    pub artifact: PublishedArtifact,
    /// What the function reconciler did.
    pub action: AppliedAction,
    /// What the trigger binder did.
    pub trigger: TriggerOutcome,
    /// What the access binder did.
    pub access: AccessOutcome,
}

/// The full pipeline over a set of cloud collaborators.
pub struct Pipeline<S, F, T, I>
where
    S: ObjectStore + ?Sized,
    F: FunctionService + ?Sized,
    T: TriggerService + ?Sized,
    I: IamService + ?Sized,
{
    storage: Arc<S>,
    functions: Arc<F>,
    triggers: Arc<T>,
    iam: Arc<I>,
}

impl<S, F, T, I> Pipeline<S, F, T, I>
where
    S: ObjectStore + ?Sized,
    F: FunctionService + ?Sized,
    T: TriggerService + ?Sized,
    I: IamService + ?Sized,
{
    /// Creates a pipeline over the given collaborators.
    #[must_use]
    pub fn new(storage: Arc<S>, functions: Arc<F>, triggers: Arc<T>, iam: Arc<I>) -> Self {
        Self {
            storage,
            functions,
            triggers,
            iam,
        }
    }

    /// Runs one reconciliation.
    ///
    /// `source_dir` holds the function source; `staging_dir` receives the
    /// packaged archive.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure. Validation errors abort before any
    /// remote call with zero side effects.
    pub async fn run(
        &self,
        config: &DeployConfig,
        source_dir: &Path,
        staging_dir: &Path,
    ) -> Result<DeployOutputs> {
        config.validate()?;

        let run_id = RunId::generate();
        let span = run_span(&run_id.to_string(), &config.project_id, &config.location);
        self.run_validated(config, source_dir, staging_dir, run_id)
            .instrument(span)
            .await
    }

    async fn run_validated(
        &self,
        config: &DeployConfig,
        source_dir: &Path,
        staging_dir: &Path,
        run_id: RunId,
    ) -> Result<DeployOutputs> {
        let timeout = config.remote_timeout();
        let project = config.project_id.clone();

        // Deployment identity first: the suffix decides every resource name
        // downstream.
        let state = StateStore::new(Arc::clone(&self.storage));
        let suffix = bounded(
            timeout,
            "identity",
            &project,
            |m| DeployError::reconcile(m),
            state.load_or_init(),
        )
        .await?;

        let bundle = package_source(source_dir, staging_dir)?;

        let publisher = ArtifactPublisher::new(Arc::clone(&self.storage), &config.artifact_bucket);
        let artifact = bounded(
            timeout,
            "publish",
            &project,
            |m| DeployError::upload(m),
            publisher.ensure_published(&bundle),
        )
        .await?;

        let name = FunctionName::for_deployment(&config.project_id, &config.location, suffix);
        let desired = FunctionSpec::from_config(config, &artifact);
        let reconciler = FunctionReconciler::new(Arc::clone(&self.functions));
        let outcome = bounded(
            timeout,
            "reconcile-function",
            &project,
            |m| DeployError::reconcile(m),
            reconciler.reconcile(&name, &desired),
        )
        .await?;

        let binder = TriggerBinder::new(Arc::clone(&self.triggers));
        let trigger_spec =
            TriggerSpec::no_retry(&config.project_id, &config.trigger_topic, &config.location);
        let trigger = bounded(
            timeout,
            "bind-trigger",
            &project,
            |m| DeployError::binding(m),
            binder.ensure(&name, &trigger_spec),
        )
        .await?;

        let access_binder = AccessBinder::new(Arc::clone(&self.iam));
        let grant = AccessGrant::invoker(config.invoker_principal.clone());
        let access = bounded(
            timeout,
            "grant-access",
            &project,
            |m| DeployError::permission(m),
            access_binder.ensure(&name, &grant),
        )
        .await?;

        let function_uri = resolve_output(outcome.function.uri.as_deref())?;

        tracing::info!(
            function = %name,
            uri = %function_uri,
            action = ?outcome.action,
            "reconciliation complete"
        );

        Ok(DeployOutputs {
            run_id: run_id.to_string(),
            function_name: name.function_id,
            function_uri,
            artifact,
            action: outcome.action,
            trigger,
            access,
        })
    }
}

/// Exposes the function's invocation endpoint as the run output.
///
/// Fails rather than returning an empty or partial value: a run never
/// reports success without a resolved endpoint.
fn resolve_output(uri: Option<&str>) -> Result<String> {
    match uri {
        Some(uri) if !uri.is_empty() => Ok(uri.to_string()),
        _ => Err(DeployError::reconcile(
            "reconciliation did not produce an invocation endpoint",
        )),
    }
}

/// Bounds a remote stage by the configured timeout, attributing a timeout
/// to the stage's own error kind.
async fn bounded<T, Fut, E>(
    timeout: Duration,
    stage: &'static str,
    project: &str,
    make_err: E,
    fut: Fut,
) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
    E: FnOnce(String) -> DeployError,
{
    match tokio::time::timeout(timeout, fut.instrument(stage_span(stage, project))).await {
        Ok(result) => result,
        Err(_) => Err(make_err(format!(
            "stage {stage} exceeded its {}s deadline",
            timeout.as_secs()
        ))),
    }
}
