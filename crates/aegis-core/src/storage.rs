//! Object storage abstraction for the artifact bucket.
//!
//! The deploy pipeline uses one bucket for three things: published source
//! archives, the persisted deployment suffix, and the advisory lock that
//! serializes concurrent runs. All three need the same narrow contract:
//! whole-object reads and writes, existence checks, and conditional writes.
//!
//! The version token is an opaque `String` so backends can map it to their
//! native semantics (GCS object generation, S3 `ETag`). The existence-check
//! and upload pair in the publisher is not atomic on its own; conditional
//! writes are what make it safe under concurrent runs.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};

/// Precondition for conditional writes.
#[derive(Debug, Clone)]
pub enum WritePrecondition {
    /// Write only if the object does not exist.
    DoesNotExist,
    /// Write only if the object's version matches the given token.
    MatchesVersion(String),
    /// Write unconditionally.
    None,
}

/// Result of a conditional write.
///
/// A failed precondition is a normal result, never an error: the publisher
/// treats it as "someone else already published identical content".
#[derive(Debug, Clone)]
pub enum WriteResult {
    /// Write succeeded.
    Success {
        /// The new version token after the write.
        version: String,
    },
    /// Precondition failed.
    PreconditionFailed {
        /// The current version that caused the precondition to fail.
        current_version: String,
    },
}

/// Metadata about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Object name (key within the bucket).
    pub name: String,
    /// Object size in bytes.
    pub size: u64,
    /// Opaque version token for conditional writes.
    pub version: String,
    /// Last modification timestamp.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Object store contract for the artifact bucket.
///
/// Implemented by the in-memory store below (tests) and by the GCS backend
/// in `aegis-deploy`.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Reads an entire object.
    ///
    /// Returns `Error::NotFound` if the object doesn't exist.
    async fn get(&self, name: &str) -> Result<Bytes>;

    /// Writes an object with an optional precondition.
    ///
    /// Returns `WriteResult::PreconditionFailed` if the precondition is not
    /// met; never returns an error for that case.
    async fn put(&self, name: &str, data: Bytes, precondition: WritePrecondition)
        -> Result<WriteResult>;

    /// Gets object metadata without reading content.
    ///
    /// Returns `None` if the object doesn't exist.
    async fn head(&self, name: &str) -> Result<Option<ObjectMeta>>;

    /// Lists objects with the given name prefix, in arbitrary order.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>>;

    /// Deletes an object. Succeeds even if the object doesn't exist.
    async fn delete(&self, name: &str) -> Result<()>;
}

/// In-memory object store for testing.
///
/// Thread-safe via `RwLock`. Uses numeric versions internally (exposed as
/// strings) to simulate GCS generation semantics.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    version: i64,
    last_modified: DateTime<Utc>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, name: &str) -> Result<Bytes> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        objects
            .get(name)
            .map(|o| o.data.clone())
            .ok_or_else(|| Error::NotFound(format!("object not found: {name}")))
    }

    async fn put(
        &self,
        name: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        let mut objects = self.objects.write().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        let current = objects.get(name);

        match precondition {
            WritePrecondition::DoesNotExist => {
                if let Some(obj) = current {
                    return Ok(WriteResult::PreconditionFailed {
                        current_version: obj.version.to_string(),
                    });
                }
            }
            WritePrecondition::MatchesVersion(expected) => {
                let expected_num: i64 = expected.parse().unwrap_or(-1);
                match current {
                    Some(obj) if obj.version != expected_num => {
                        return Ok(WriteResult::PreconditionFailed {
                            current_version: obj.version.to_string(),
                        });
                    }
                    None => {
                        return Ok(WriteResult::PreconditionFailed {
                            current_version: "0".to_string(),
                        });
                    }
                    _ => {}
                }
            }
            WritePrecondition::None => {}
        }

        let new_version = current.map_or(1, |o| o.version + 1);
        objects.insert(
            name.to_string(),
            StoredObject {
                data,
                version: new_version,
                last_modified: Utc::now(),
            },
        );
        drop(objects);

        Ok(WriteResult::Success {
            version: new_version.to_string(),
        })
    }

    async fn head(&self, name: &str) -> Result<Option<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        Ok(objects.get(name).map(|obj| ObjectMeta {
            name: name.to_string(),
            size: obj.data.len() as u64,
            version: obj.version.to_string(),
            last_modified: Some(obj.last_modified),
        }))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        Ok(objects
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, obj)| ObjectMeta {
                name: name.clone(),
                size: obj.data.len() as u64,
                version: obj.version.to_string(),
                last_modified: Some(obj.last_modified),
            })
            .collect())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.objects
            .write()
            .map_err(|_| Error::Internal {
                message: "lock poisoned".into(),
            })?
            .remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        let data = Bytes::from("archive bytes");

        let result = store
            .put("function-source.abc.zip", data.clone(), WritePrecondition::None)
            .await
            .expect("put should succeed");
        assert!(matches!(result, WriteResult::Success { ref version } if version == "1"));

        let retrieved = store
            .get("function-source.abc.zip")
            .await
            .expect("get should succeed");
        assert_eq!(retrieved, data);
    }

    #[tokio::test]
    async fn head_reports_metadata() {
        let store = MemoryStore::new();
        store
            .put("state/deploy-suffix.json", Bytes::from("data"), WritePrecondition::None)
            .await
            .expect("put should succeed");

        let meta = store
            .head("state/deploy-suffix.json")
            .await
            .expect("head should succeed")
            .expect("object should exist");
        assert_eq!(meta.name, "state/deploy-suffix.json");
        assert_eq!(meta.size, 4);
        assert!(!meta.version.is_empty());
        assert!(meta.last_modified.is_some());
    }

    #[tokio::test]
    async fn head_missing_returns_none() {
        let store = MemoryStore::new();
        let meta = store.head("absent").await.expect("head should succeed");
        assert!(meta.is_none());
    }

    #[tokio::test]
    async fn precondition_does_not_exist() {
        let store = MemoryStore::new();

        let result = store
            .put("once.json", Bytes::from("a"), WritePrecondition::DoesNotExist)
            .await
            .expect("should succeed");
        assert!(matches!(result, WriteResult::Success { .. }));

        let result = store
            .put("once.json", Bytes::from("b"), WritePrecondition::DoesNotExist)
            .await
            .expect("should succeed");
        assert!(matches!(result, WriteResult::PreconditionFailed { .. }));

        // Losing the race must not clobber the original content.
        let data = store.get("once.json").await.expect("get");
        assert_eq!(data, Bytes::from("a"));
    }

    #[tokio::test]
    async fn precondition_matches_version() {
        let store = MemoryStore::new();

        let result = store
            .put("state.json", Bytes::from("v1"), WritePrecondition::None)
            .await
            .expect("should succeed");
        let WriteResult::Success { version } = result else {
            panic!("expected success");
        };

        let result = store
            .put(
                "state.json",
                Bytes::from("v2"),
                WritePrecondition::MatchesVersion(version),
            )
            .await
            .expect("should succeed");
        assert!(matches!(result, WriteResult::Success { .. }));

        let result = store
            .put(
                "state.json",
                Bytes::from("v3"),
                WritePrecondition::MatchesVersion("1".to_string()),
            )
            .await
            .expect("should succeed");
        assert!(matches!(result, WriteResult::PreconditionFailed { .. }));
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let store = MemoryStore::new();
        for name in ["state/a", "state/b", "other/c"] {
            store
                .put(name, Bytes::from("x"), WritePrecondition::None)
                .await
                .expect("put");
        }

        let listed = store.list("state/").await.expect("list");
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new();
        store
            .put("gone", Bytes::from("x"), WritePrecondition::None)
            .await
            .expect("put");

        store.delete("gone").await.expect("delete");
        store.delete("gone").await.expect("second delete is a no-op");
        assert!(store.head("gone").await.expect("head").is_none());
    }
}
