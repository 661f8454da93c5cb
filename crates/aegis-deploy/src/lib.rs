//! # aegis-deploy
//!
//! The reconciliation pipeline for the cluster protection function: one
//! linear, idempotent pass from source directory to resolved invocation
//! endpoint.
//!
//! - **Bundle**: deterministic, content-addressed source archives
//! - **Publisher**: existence-checked upload into the artifact bucket
//! - **Reconciler**: desired/observed diff driving create, update, or
//!   recreate of the function resource
//! - **Trigger**: one topic subscription with a pinned no-retry policy
//! - **Access**: idempotent invoker grants
//! - **State**: the persisted deployment suffix behind an advisory lock
//! - **Pipeline**: sequential stage composition with per-stage timeouts
//!
//! Cloud collaborators are consumed through the traits in [`cloud`];
//! [`gcp`] provides the REST-backed implementations and
//! [`cloud::MemoryCloud`] the in-memory one for tests.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod access;
pub mod bundle;
pub mod cloud;
pub mod error;
pub mod function;
pub mod gcp;
pub mod pipeline;
pub mod publisher;
pub mod reconciler;
pub mod state;
pub mod trigger;

pub use access::{AccessBinder, AccessGrant, AccessOutcome, INVOKER_ROLE};
pub use bundle::{package_source, SourceBundle, OBJECT_PREFIX};
pub use cloud::{CloudError, CloudResult, FunctionService, IamService, MemoryCloud, TriggerService};
pub use error::{DeployError, Result};
pub use function::{
    diff_function, ChangedField, FunctionDiff, FunctionName, FunctionSpec, ObservedFunction,
    SourceRef, FUNCTION_BASE_NAME,
};
pub use pipeline::{DeployOutputs, Pipeline};
pub use publisher::{ArtifactPublisher, PublishOutcome, PublishedArtifact};
pub use reconciler::{AppliedAction, FunctionReconciler, ReconcileOutcome};
pub use state::{DeployState, StateStore, LOCK_OBJECT, STATE_OBJECT};
pub use trigger::{RetryPolicy, TriggerBinder, TriggerOutcome, TriggerSpec};
