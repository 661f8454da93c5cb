//! Persisted deployment identity.
//!
//! The deploy suffix is process-wide, persisted state: generated on the
//! first run, reused by every later run so resource names stay stable.
//! It lives in the artifact bucket next to the artifacts it names, and the
//! read-modify-write is serialized by the advisory lock so two first runs
//! against the same scope cannot mint different suffixes. Losing the
//! first-write race is benign: the loser adopts the winner's suffix.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aegis_core::lock::{AdvisoryLock, DEFAULT_LOCK_TTL, DEFAULT_MAX_RETRIES};
use aegis_core::{DeploySuffix, Error as CoreError, ObjectStore, WritePrecondition, WriteResult};

use crate::error::{DeployError, Result};

/// Object holding the persisted deployment identity.
pub const STATE_OBJECT: &str = "state/deploy-suffix.json";

/// Lock object serializing runs against one deployment scope.
pub const LOCK_OBJECT: &str = "state/deploy.lock";

/// The persisted identity record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployState {
    /// The stable per-deployment suffix.
    pub suffix: DeploySuffix,
    /// When the suffix was first generated.
    pub created_at: DateTime<Utc>,
}

/// Reads and initializes the persisted deployment identity.
pub struct StateStore<S: ObjectStore + ?Sized> {
    storage: Arc<S>,
}

impl<S: ObjectStore + ?Sized> StateStore<S> {
    /// Creates a state store over the artifact bucket.
    #[must_use]
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Loads the deployment suffix, generating and persisting it on the
    /// first run.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Reconcile` if the lock cannot be acquired or
    /// the state object cannot be read or written.
    pub async fn load_or_init(&self) -> Result<DeploySuffix> {
        let lock = AdvisoryLock::new(Arc::clone(&self.storage), LOCK_OBJECT);
        let guard = lock
            .acquire(DEFAULT_LOCK_TTL, DEFAULT_MAX_RETRIES)
            .await
            .map_err(state_err)?;

        let result = self.load_or_init_locked().await;

        if let Err(e) = guard.release().await {
            tracing::warn!(error = %e, "failed to release deploy lock; it will expire by TTL");
        }
        result
    }

    async fn load_or_init_locked(&self) -> Result<DeploySuffix> {
        match self.storage.get(STATE_OBJECT).await {
            Ok(data) => {
                let state: DeployState = serde_json::from_slice(&data).map_err(|e| {
                    DeployError::reconcile(format!("corrupt deployment identity: {e}"))
                })?;
                tracing::debug!(suffix = %state.suffix, "loaded deployment identity");
                return Ok(state.suffix);
            }
            Err(CoreError::NotFound(_)) => {}
            Err(e) => return Err(state_err(e)),
        }

        // First run for this scope: mint and persist a suffix. Write-back
        // happens on first generation only.
        let state = DeployState {
            suffix: DeploySuffix::generate(),
            created_at: Utc::now(),
        };
        let bytes = Bytes::from(serde_json::to_vec(&state).map_err(|e| {
            DeployError::reconcile(format!("serialize deployment identity: {e}"))
        })?);

        match self
            .storage
            .put(STATE_OBJECT, bytes, WritePrecondition::DoesNotExist)
            .await
            .map_err(state_err)?
        {
            WriteResult::Success { .. } => {
                tracing::info!(suffix = %state.suffix, "generated deployment identity");
                Ok(state.suffix)
            }
            WriteResult::PreconditionFailed { .. } => {
                // Another run won the first write; adopt its suffix.
                let data = self.storage.get(STATE_OBJECT).await.map_err(state_err)?;
                let winner: DeployState = serde_json::from_slice(&data).map_err(|e| {
                    DeployError::reconcile(format!("corrupt deployment identity: {e}"))
                })?;
                tracing::debug!(suffix = %winner.suffix, "adopted concurrently generated identity");
                Ok(winner.suffix)
            }
        }
    }
}

fn state_err(err: CoreError) -> DeployError {
    DeployError::reconcile(format!("deployment identity: {err}"))
}
