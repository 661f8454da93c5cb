//! Event trigger binding: topic → function, with a pinned retry policy.
//!
//! One binding per function. A failed invocation is dropped, not
//! redelivered; any application-level retry lives downstream of this tool.
//! The binding is recreated only when the event source changes; an equal
//! binding is left untouched.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cloud::{CloudError, TriggerService};
use crate::error::{DeployError, Result};
use crate::function::FunctionName;

/// Redelivery policy for failed invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetryPolicy {
    /// Drop failed invocations.
    DoNotRetry,
    /// Redeliver failed invocations. Defined for wire completeness; this
    /// tool always pins [`RetryPolicy::DoNotRetry`].
    Retry,
}

/// Desired trigger state for the function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSpec {
    /// Project owning the topic.
    pub project: String,
    /// Short topic ID.
    pub topic: String,
    /// Region the trigger fires in.
    pub region: String,
    /// Redelivery policy.
    pub retry_policy: RetryPolicy,
}

impl TriggerSpec {
    /// Builds the pinned no-retry trigger for a deployment.
    #[must_use]
    pub fn no_retry(project: &str, topic: &str, region: &str) -> Self {
        Self {
            project: project.to_string(),
            topic: topic.to_string(),
            region: region.to_string(),
            retry_policy: RetryPolicy::DoNotRetry,
        }
    }

    /// Returns the full topic resource name,
    /// `projects/{project}/topics/{topic}`.
    #[must_use]
    pub fn topic_resource_name(&self) -> String {
        format!("projects/{}/topics/{}", self.project, self.topic)
    }
}

/// What the binder did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// No trigger existed; one was attached.
    Bound,
    /// The existing trigger already matched; nothing written.
    Unchanged,
    /// The event source changed; the trigger was replaced.
    Rebound,
}

/// Attaches the event subscription to the function.
pub struct TriggerBinder<T: TriggerService + ?Sized> {
    service: Arc<T>,
}

impl<T: TriggerService + ?Sized> TriggerBinder<T> {
    /// Creates a new binder.
    #[must_use]
    pub fn new(service: Arc<T>) -> Self {
        Self { service }
    }

    /// Ensures exactly one subscription binds the topic to the function.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Binding` if the referenced topic does not
    /// exist or the platform rejects the binding.
    pub async fn ensure(
        &self,
        function: &FunctionName,
        spec: &TriggerSpec,
    ) -> Result<TriggerOutcome> {
        let exists = self
            .service
            .topic_exists(&spec.project, &spec.topic)
            .await
            .map_err(binding_err)?;
        if !exists {
            return Err(DeployError::binding(format!(
                "trigger topic {} does not exist",
                spec.topic_resource_name()
            )));
        }

        let current = self.service.get_trigger(function).await.map_err(binding_err)?;

        match current {
            Some(existing) if existing == *spec => {
                tracing::debug!(function = %function, topic = %spec.topic, "trigger already bound");
                Ok(TriggerOutcome::Unchanged)
            }
            Some(existing) => {
                tracing::info!(
                    function = %function,
                    old_topic = %existing.topic,
                    new_topic = %spec.topic,
                    "replacing trigger"
                );
                self.service
                    .delete_trigger(function)
                    .await
                    .map_err(binding_err)?;
                self.service
                    .create_trigger(function, spec)
                    .await
                    .map_err(binding_err)?;
                Ok(TriggerOutcome::Rebound)
            }
            None => {
                tracing::info!(function = %function, topic = %spec.topic, "binding trigger");
                self.service
                    .create_trigger(function, spec)
                    .await
                    .map_err(binding_err)?;
                Ok(TriggerOutcome::Bound)
            }
        }
    }
}

fn binding_err(err: CloudError) -> DeployError {
    DeployError::binding(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{FunctionService, MemoryCloud};
    use crate::function::{FunctionName, FunctionSpec, SourceRef};
    use aegis_core::DeploySuffix;
    use std::collections::BTreeMap;

    fn name() -> FunctionName {
        FunctionName::for_deployment("p", "r", DeploySuffix::from_bytes([1, 2, 3, 4]))
    }

    async fn cloud_with_function() -> Arc<MemoryCloud> {
        let cloud = Arc::new(MemoryCloud::new());
        let spec = FunctionSpec {
            runtime: "python310".to_string(),
            entry_point: "main".to_string(),
            available_memory_mb: 512,
            timeout_seconds: 540,
            max_instance_count: 10,
            service_account_email: "svc@p.iam".to_string(),
            environment: BTreeMap::new(),
            source: SourceRef {
                bucket: "b".to_string(),
                object: "o.zip".to_string(),
            },
        };
        cloud.create_function(&name(), &spec).await.expect("create");
        cloud
    }

    #[tokio::test]
    async fn missing_topic_is_a_binding_error() {
        let cloud = cloud_with_function().await;
        let binder = TriggerBinder::new(Arc::clone(&cloud));

        let err = binder
            .ensure(&name(), &TriggerSpec::no_retry("p", "absent", "r"))
            .await
            .expect_err("topic missing");
        assert!(matches!(err, DeployError::Binding { .. }));
        assert_eq!(cloud.trigger_writes(), 0);
    }

    #[tokio::test]
    async fn binds_once_then_leaves_unchanged() {
        let cloud = cloud_with_function().await;
        cloud.add_topic("p", "clusters");
        let binder = TriggerBinder::new(Arc::clone(&cloud));
        let spec = TriggerSpec::no_retry("p", "clusters", "r");

        let outcome = binder.ensure(&name(), &spec).await.expect("bind");
        assert_eq!(outcome, TriggerOutcome::Bound);
        assert_eq!(cloud.trigger_writes(), 1);

        let outcome = binder.ensure(&name(), &spec).await.expect("rebind");
        assert_eq!(outcome, TriggerOutcome::Unchanged);
        assert_eq!(cloud.trigger_writes(), 1, "no writes on unchanged binding");
    }

    #[tokio::test]
    async fn changed_topic_rebinds() {
        let cloud = cloud_with_function().await;
        cloud.add_topic("p", "clusters");
        cloud.add_topic("p", "clusters-v2");
        let binder = TriggerBinder::new(Arc::clone(&cloud));

        binder
            .ensure(&name(), &TriggerSpec::no_retry("p", "clusters", "r"))
            .await
            .expect("bind");
        let outcome = binder
            .ensure(&name(), &TriggerSpec::no_retry("p", "clusters-v2", "r"))
            .await
            .expect("rebind");
        assert_eq!(outcome, TriggerOutcome::Rebound);

        let current = cloud.get_trigger(&name()).await.expect("get");
        assert_eq!(current.expect("trigger").topic, "clusters-v2");
    }

    #[test]
    fn retry_policy_serializes_to_wire_form() {
        let json = serde_json::to_string(&RetryPolicy::DoNotRetry).expect("serialize");
        assert_eq!(json, "\"DO_NOT_RETRY\"");
    }
}
