//! End-to-end pipeline contracts over in-memory collaborators.
//!
//! These tests pin the externally observable behavior of one
//! reconciliation run: what a first run creates, what an unchanged re-run
//! does (nothing), and how partial completion surfaces.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use aegis_core::{AutoUpdate, DeployConfig, MemoryStore, ObjectStore, Principal, Redacted, Scope};
use aegis_deploy::{
    AccessOutcome, AppliedAction, DeployError, FunctionService, IamService, MemoryCloud, Pipeline,
    PublishOutcome, TriggerOutcome, TriggerService,
};
use tempfile::TempDir;

fn config() -> DeployConfig {
    DeployConfig {
        project_id: "acme-prod".to_string(),
        location: "us-central1".to_string(),
        artifact_bucket: "acme-prod-cluster-protection".to_string(),
        trigger_topic: "cluster-created".to_string(),
        service_account_email: "protect@acme-prod.iam.gserviceaccount.com".to_string(),
        falcon_client_id: Redacted::new("falcon-id"),
        falcon_client_secret: Redacted::new("falcon-secret"),
        scope: Scope::Organizations,
        scope_identifier: "123456789".to_string(),
        falcon_auto_update: AutoUpdate::Off,
        falcon_update_policy: String::new(),
        falcon_sensor_version: String::new(),
        falcon_sensor_tags: String::new(),
        invoker_principal: Principal::AllUsers,
        remote_timeout_secs: 5,
    }
}

struct Harness {
    storage: Arc<MemoryStore>,
    cloud: Arc<MemoryCloud>,
    source: TempDir,
    staging: TempDir,
}

impl Harness {
    fn new() -> Self {
        let source = TempDir::new().unwrap();
        std::fs::write(source.path().join("main.py"), b"def main(): pass").unwrap();

        let cloud = Arc::new(MemoryCloud::new());
        cloud.add_topic("acme-prod", "cluster-created");

        Self {
            storage: Arc::new(MemoryStore::new()),
            cloud,
            source,
            staging: TempDir::new().unwrap(),
        }
    }

    fn pipeline(&self) -> Pipeline<MemoryStore, MemoryCloud, MemoryCloud, MemoryCloud> {
        Pipeline::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.cloud),
            Arc::clone(&self.cloud),
            Arc::clone(&self.cloud),
        )
    }
}

#[tokio::test]
async fn first_run_provisions_the_whole_stack() {
    let harness = Harness::new();
    let outputs = harness
        .pipeline()
        .run(&config(), harness.source.path(), harness.staging.path())
        .await
        .expect("first run");

    // Output resolver: a real endpoint, never empty.
    assert!(outputs.function_uri.starts_with("https://"));
    assert!(outputs.function_name.starts_with("cluster-protection-"));
    assert_eq!(outputs.action, AppliedAction::Created);
    assert_eq!(outputs.artifact.outcome, PublishOutcome::Uploaded);
    assert_eq!(outputs.trigger, TriggerOutcome::Bound);
    assert_eq!(outputs.access, AccessOutcome::Granted);

    // Artifact: content-addressed name, present in the bucket.
    assert_eq!(
        outputs.artifact.object_name,
        format!("function-source.{}.zip", outputs.artifact.digest)
    );
    let meta = harness
        .storage
        .head(&outputs.artifact.object_name)
        .await
        .unwrap()
        .expect("artifact exists");
    assert_eq!(meta.size, outputs.artifact.size_bytes);

    // Function: configured runtime, entry point, and verbatim environment.
    let functions = harness
        .cloud
        .list_functions("acme-prod", "us-central1", "cluster-protection-")
        .await
        .unwrap();
    assert_eq!(functions.len(), 1);
    let function = &functions[0];
    assert_eq!(function.spec.runtime, "python310");
    assert_eq!(function.spec.entry_point, "main");
    assert_eq!(function.spec.environment["FALCON_CLIENT_ID"], "falcon-id");
    assert_eq!(function.spec.environment["FALCON_CLIENT_SECRET"], "falcon-secret");
    assert_eq!(function.spec.environment["FALCON_AUTO_UPDATE"], "off");

    // Trigger: the named topic, pinned no-retry.
    let trigger = harness
        .cloud
        .get_trigger(&function.name)
        .await
        .unwrap()
        .expect("trigger bound");
    assert_eq!(trigger.topic, "cluster-created");
    assert_eq!(trigger.retry_policy, aegis_deploy::RetryPolicy::DoNotRetry);

    // Access: the unrestricted principal holds the invoker role.
    let grants = harness.cloud.invoker_grants(&function.name).await.unwrap();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].principal, Principal::AllUsers);
}

#[tokio::test]
async fn unchanged_rerun_performs_zero_mutating_calls() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();

    let first = pipeline
        .run(&config(), harness.source.path(), harness.staging.path())
        .await
        .expect("first run");
    let writes_after_first = harness.cloud.total_writes();

    let second = pipeline
        .run(&config(), harness.source.path(), harness.staging.path())
        .await
        .expect("second run");

    // Stable naming across runs: the persisted suffix is reused.
    assert_eq!(first.function_name, second.function_name);

    // Zero upload calls: the artifact object was written exactly once.
    assert_eq!(second.artifact.outcome, PublishOutcome::AlreadyPresent);
    let meta = harness
        .storage
        .head(&second.artifact.object_name)
        .await
        .unwrap()
        .expect("artifact exists");
    assert_eq!(meta.version, "1", "no second write to the artifact object");

    // Zero mutating calls against the platform.
    assert_eq!(second.action, AppliedAction::Unchanged);
    assert_eq!(second.trigger, TriggerOutcome::Unchanged);
    assert_eq!(second.access, AccessOutcome::AlreadyGranted);
    assert_eq!(harness.cloud.total_writes(), writes_after_first);
}

#[tokio::test]
async fn changed_configuration_updates_in_place_without_reupload() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();

    let first = pipeline
        .run(&config(), harness.source.path(), harness.staging.path())
        .await
        .expect("first run");

    let mut changed = config();
    changed.falcon_auto_update = AutoUpdate::Force;
    changed.falcon_sensor_tags = "prod,gke".to_string();

    let second = pipeline
        .run(&changed, harness.source.path(), harness.staging.path())
        .await
        .expect("second run");

    assert_eq!(first.function_name, second.function_name);
    assert_eq!(second.artifact.outcome, PublishOutcome::AlreadyPresent);
    let AppliedAction::Updated { fields } = &second.action else {
        panic!("expected update, got {:?}", second.action);
    };
    assert!(fields.contains(&aegis_deploy::ChangedField::Environment));

    let functions = harness
        .cloud
        .list_functions("acme-prod", "us-central1", "cluster-protection-")
        .await
        .unwrap();
    assert_eq!(functions[0].spec.environment["FALCON_AUTO_UPDATE"], "force");
    assert_eq!(functions[0].spec.environment["FALCON_SENSOR_TAGS"], "prod,gke");
}

#[tokio::test]
async fn changed_source_publishes_a_new_artifact() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();

    let first = pipeline
        .run(&config(), harness.source.path(), harness.staging.path())
        .await
        .expect("first run");

    std::fs::write(
        harness.source.path().join("main.py"),
        b"def main(): return 'v2'",
    )
    .unwrap();

    let second = pipeline
        .run(&config(), harness.source.path(), harness.staging.path())
        .await
        .expect("second run");

    assert_ne!(first.artifact.object_name, second.artifact.object_name);
    assert_eq!(second.artifact.outcome, PublishOutcome::Uploaded);
    let AppliedAction::Updated { fields } = &second.action else {
        panic!("expected update, got {:?}", second.action);
    };
    assert_eq!(fields, &[aegis_deploy::ChangedField::Source]);

    // The superseded artifact is never deleted by this workflow.
    assert!(harness
        .storage
        .head(&first.artifact.object_name)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn missing_topic_fails_binding_after_publish_and_reconcile() {
    let harness = Harness::new();
    let mut cfg = config();
    cfg.trigger_topic = "never-created".to_string();

    let err = harness
        .pipeline()
        .run(&cfg, harness.source.path(), harness.staging.path())
        .await
        .expect_err("binding must fail");

    assert!(matches!(err, DeployError::Binding { .. }));
    assert_eq!(err.stage(), "bind-trigger");

    // Partial completion is acceptable: artifact and function exist and the
    // next run will pick up from there.
    let artifacts = harness.storage.list("function-source.").await.unwrap();
    assert_eq!(artifacts.len(), 1);
    let functions = harness
        .cloud
        .list_functions("acme-prod", "us-central1", "cluster-protection-")
        .await
        .unwrap();
    assert_eq!(functions.len(), 1);
}

#[tokio::test]
async fn failed_reconcile_recovers_on_rerun_without_reupload() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();

    harness.cloud.set_fail_function_writes(true);
    let err = pipeline
        .run(&config(), harness.source.path(), harness.staging.path())
        .await
        .expect_err("function write must fail");
    assert!(matches!(err, DeployError::Reconcile { .. }));
    assert_eq!(err.stage(), "reconcile-function");

    // The artifact landed before the failure; the re-run reuses it.
    harness.cloud.set_fail_function_writes(false);
    let outputs = pipeline
        .run(&config(), harness.source.path(), harness.staging.path())
        .await
        .expect("re-run succeeds");
    assert_eq!(outputs.artifact.outcome, PublishOutcome::AlreadyPresent);
    assert_eq!(outputs.action, AppliedAction::Created);
}

#[tokio::test]
async fn invalid_scope_is_rejected_at_the_parse_boundary() {
    let json = r#"{
        "deployment_project_id": "acme-prod",
        "location": "us-central1",
        "artifact_bucket": "b",
        "trigger_topic": "t",
        "service_account_email": "s@p.iam",
        "falcon_client_id": "id",
        "falcon_client_secret": "secret",
        "scope": "region",
        "scope_identifier": "x"
    }"#;

    let err = serde_json::from_str::<DeployConfig>(json).expect_err("invalid scope");
    assert!(err.to_string().contains("invalid scope"));
}

#[tokio::test]
async fn validation_failure_leaves_no_trace() {
    let harness = Harness::new();
    let mut cfg = config();
    cfg.artifact_bucket = String::new();

    let err = harness
        .pipeline()
        .run(&cfg, harness.source.path(), harness.staging.path())
        .await
        .expect_err("validation must fail");
    assert!(matches!(err, DeployError::Validation { .. }));

    assert!(harness.storage.list("").await.unwrap().is_empty());
    assert_eq!(harness.cloud.total_writes(), 0);
}
