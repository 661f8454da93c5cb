//! Artifact publishing: content-addressed upload with an existence check.
//!
//! The object name is a pure function of the bundle digest, so "already
//! exists" means "already published this exact content". Re-invoking the
//! publisher with an unchanged bundle performs zero upload calls. The
//! existence-check/upload pair is not atomic, so the upload carries a
//! does-not-exist precondition; losing that race to another run publishing
//! identical bytes counts as success.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use aegis_core::{Error as CoreError, ObjectStore, WritePrecondition, WriteResult};

use crate::bundle::SourceBundle;
use crate::error::{DeployError, Result};

/// How the artifact came to exist in the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishOutcome {
    /// This run uploaded the artifact.
    Uploaded,
    /// The artifact was already present; no upload call was made.
    AlreadyPresent,
}

/// A source bundle that exists in the bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedArtifact {
    /// Bucket holding the artifact.
    pub bucket: String,
    /// Object name, `function-source.<digest>.zip`.
    pub object_name: String,
    /// SHA-256 hex digest of the archive.
    pub digest: String,
    /// Archive size in bytes.
    pub size_bytes: u64,
    /// How the artifact came to exist.
    pub outcome: PublishOutcome,
}

/// Publishes source bundles into the artifact bucket.
pub struct ArtifactPublisher<S: ObjectStore + ?Sized> {
    storage: Arc<S>,
    bucket: String,
}

impl<S: ObjectStore + ?Sized> ArtifactPublisher<S> {
    /// Creates a publisher writing into the given bucket.
    #[must_use]
    pub fn new(storage: Arc<S>, bucket: impl Into<String>) -> Self {
        Self {
            storage,
            bucket: bucket.into(),
        }
    }

    /// Ensures an artifact with the bundle's content hash exists.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Upload` on storage failure. A failed upload
    /// never registers as published; the caller re-runs the pipeline and
    /// the existence check starts over.
    pub async fn ensure_published(&self, bundle: &SourceBundle) -> Result<PublishedArtifact> {
        let object_name = bundle.object_name();

        let existing = self
            .storage
            .head(&object_name)
            .await
            .map_err(|e| upload_err("existence check failed", e))?;

        if let Some(meta) = existing {
            if meta.size != bundle.size_bytes {
                // Same digest, different size: the store holds something that
                // cannot be this bundle.
                return Err(DeployError::upload(format!(
                    "object {object_name} exists with size {} but bundle is {} bytes",
                    meta.size, bundle.size_bytes
                )));
            }
            tracing::debug!(object = %object_name, "artifact already published");
            return Ok(self.published(bundle, PublishOutcome::AlreadyPresent));
        }

        let data = std::fs::read(&bundle.archive_path).map_err(|e| {
            DeployError::upload_with_source(
                format!("failed to read archive {}", bundle.archive_path.display()),
                e,
            )
        })?;

        let result = self
            .storage
            .put(&object_name, Bytes::from(data), WritePrecondition::DoesNotExist)
            .await
            .map_err(|e| upload_err("upload failed", e))?;

        match result {
            WriteResult::Success { .. } => {
                tracing::info!(
                    object = %object_name,
                    size_bytes = bundle.size_bytes,
                    "published artifact"
                );
                Ok(self.published(bundle, PublishOutcome::Uploaded))
            }
            WriteResult::PreconditionFailed { .. } => {
                // Another run published identical content first.
                tracing::debug!(object = %object_name, "artifact published concurrently");
                Ok(self.published(bundle, PublishOutcome::AlreadyPresent))
            }
        }
    }

    fn published(&self, bundle: &SourceBundle, outcome: PublishOutcome) -> PublishedArtifact {
        PublishedArtifact {
            bucket: self.bucket.clone(),
            object_name: bundle.object_name(),
            digest: bundle.digest.clone(),
            size_bytes: bundle.size_bytes,
            outcome,
        }
    }
}

fn upload_err(context: &str, err: CoreError) -> DeployError {
    DeployError::upload_with_source(context.to_string(), err)
}
