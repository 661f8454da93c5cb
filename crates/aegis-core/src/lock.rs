//! Advisory lock backed by object storage.
//!
//! Concurrent reconciliation runs against the same deployment scope race on
//! resource naming and on the publisher's existence-check/upload pair. The
//! lock serializes them using the bucket itself as the coordination point:
//!
//! 1. Acquisition writes a lock record with a `DoesNotExist` precondition,
//!    so only one writer can succeed.
//! 2. If the lock exists but has expired, takeover uses a version-matched
//!    write bound to the version observed at the expiry check.
//! 3. Release writes an expired record (never an unconditional delete), so
//!    a stale holder cannot delete a new holder's lock.
//!
//! TTL expiry keeps a crashed run from blocking the scope forever.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{Error, Result};
use crate::storage::{ObjectStore, WritePrecondition, WriteResult};

/// Default lock TTL.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(60);

/// Default maximum retry attempts for lock acquisition.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Base backoff duration for retries.
const BACKOFF_BASE: Duration = Duration::from_millis(100);

/// Maximum backoff duration.
const BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Lock record contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    /// Unique lock holder ID.
    pub holder_id: String,

    /// When the lock expires.
    pub expires_at: DateTime<Utc>,

    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,

    /// Optional description of the operation holding the lock.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

impl LockInfo {
    /// Creates a new lock record with the given holder ID and TTL.
    #[must_use]
    pub fn new(holder_id: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            holder_id: holder_id.into(),
            expires_at: now
                + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(60)),
            acquired_at: now,
            operation: None,
        }
    }

    /// Returns whether this lock has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Internal error distinguishing contention from storage failure.
enum LockError {
    AlreadyHeld(String),
    Storage(Error),
}

/// An advisory lock on one deployment scope.
pub struct AdvisoryLock<S: ObjectStore + ?Sized> {
    storage: Arc<S>,
    lock_path: String,
    holder_id: String,
}

impl<S: ObjectStore + ?Sized> Clone for AdvisoryLock<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            lock_path: self.lock_path.clone(),
            holder_id: self.holder_id.clone(),
        }
    }
}

impl<S: ObjectStore + ?Sized> AdvisoryLock<S> {
    /// Creates a new lock. Each instance gets a unique holder ID.
    #[must_use]
    pub fn new(storage: Arc<S>, lock_path: impl Into<String>) -> Self {
        Self {
            storage,
            lock_path: lock_path.into(),
            holder_id: Ulid::new().to_string(),
        }
    }

    /// Returns the holder ID for this lock instance.
    #[must_use]
    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    /// Attempts to acquire the lock, retrying with backoff on contention.
    ///
    /// # Errors
    ///
    /// Returns `Error::PreconditionFailed` if the lock is still held after
    /// all retries, or a storage error if the backend fails.
    pub async fn acquire(&self, ttl: Duration, max_retries: u32) -> Result<LockGuard<S>> {
        let mut attempts = 0;
        let mut backoff = BACKOFF_BASE;

        loop {
            match self.try_acquire(ttl).await {
                Ok(guard) => return Ok(guard),
                Err(LockError::AlreadyHeld(holder)) => {
                    attempts += 1;
                    if attempts >= max_retries {
                        return Err(Error::PreconditionFailed {
                            message: format!("lock held by {holder} after {max_retries} retries"),
                        });
                    }

                    let jitter = Duration::from_millis(u64::from(rand::random::<u8>()));
                    tokio::time::sleep(backoff.min(BACKOFF_MAX) + jitter).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(LockError::Storage(e)) => return Err(e),
            }
        }
    }

    /// Attempts to acquire the lock once (no retries).
    async fn try_acquire(&self, ttl: Duration) -> std::result::Result<LockGuard<S>, LockError> {
        let lock_info = LockInfo::new(&self.holder_id, ttl);
        let lock_bytes = Bytes::from(serde_json::to_vec(&lock_info).map_err(|e| {
            LockError::Storage(Error::Internal {
                message: format!("serialize lock: {e}"),
            })
        })?);

        match self
            .storage
            .put(&self.lock_path, lock_bytes, WritePrecondition::DoesNotExist)
            .await
            .map_err(LockError::Storage)?
        {
            WriteResult::Success { .. } => {
                return Ok(LockGuard {
                    storage: Arc::clone(&self.storage),
                    lock_path: self.lock_path.clone(),
                    holder_id: self.holder_id.clone(),
                    released: false,
                });
            }
            WriteResult::PreconditionFailed { .. } => {
                // Lock exists - check if expired below.
            }
        }

        // Take the version before reading contents so the expiry decision is
        // bound to the same version used for the takeover write. If another
        // holder intervenes, the version-matched write fails and we retry.
        let meta = self
            .storage
            .head(&self.lock_path)
            .await
            .map_err(LockError::Storage)?;

        let Some(meta) = meta else {
            // Lock disappeared between the write attempt and now - retry.
            return Err(LockError::AlreadyHeld("race".into()));
        };

        let existing = self.read_lock().await.map_err(LockError::Storage)?;

        match existing {
            Some(info) if info.is_expired() => {
                let new_info = LockInfo::new(&self.holder_id, ttl);
                let new_bytes = Bytes::from(serde_json::to_vec(&new_info).map_err(|e| {
                    LockError::Storage(Error::Internal {
                        message: format!("serialize lock: {e}"),
                    })
                })?);

                match self
                    .storage
                    .put(
                        &self.lock_path,
                        new_bytes,
                        WritePrecondition::MatchesVersion(meta.version),
                    )
                    .await
                    .map_err(LockError::Storage)?
                {
                    WriteResult::Success { .. } => Ok(LockGuard {
                        storage: Arc::clone(&self.storage),
                        lock_path: self.lock_path.clone(),
                        holder_id: self.holder_id.clone(),
                        released: false,
                    }),
                    WriteResult::PreconditionFailed { .. } => {
                        Err(LockError::AlreadyHeld("unknown".into()))
                    }
                }
            }
            Some(info) => Err(LockError::AlreadyHeld(info.holder_id)),
            None => Err(LockError::AlreadyHeld("race".into())),
        }
    }

    /// Reads the current lock record, if any.
    async fn read_lock(&self) -> Result<Option<LockInfo>> {
        match self.storage.get(&self.lock_path).await {
            Ok(data) => {
                let info: LockInfo = serde_json::from_slice(&data).map_err(|e| Error::Internal {
                    message: format!("parse lock: {e}"),
                })?;
                Ok(Some(info))
            }
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Returns whether the lock is currently held (by anyone).
    ///
    /// # Errors
    ///
    /// Returns an error if the lock state could not be read.
    pub async fn is_locked(&self) -> Result<bool> {
        Ok(self
            .read_lock()
            .await?
            .is_some_and(|info| !info.is_expired()))
    }
}

/// Guard for a held lock.
///
/// Call [`LockGuard::release`] when done; an unreleased guard expires by
/// TTL.
pub struct LockGuard<S: ObjectStore + ?Sized> {
    storage: Arc<S>,
    lock_path: String,
    holder_id: String,
    released: bool,
}

impl<S: ObjectStore + ?Sized> LockGuard<S> {
    /// Returns the holder ID for this lock.
    #[must_use]
    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    /// Releases the lock by writing an expired record.
    ///
    /// Ownership is re-verified first: if another holder took the lock over
    /// after our TTL lapsed, their record is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock state could not be read or written.
    pub async fn release(mut self) -> Result<()> {
        self.released = true;

        let current = match self.storage.get(&self.lock_path).await {
            Ok(data) => serde_json::from_slice::<LockInfo>(&data).map_err(|e| Error::Internal {
                message: format!("parse lock: {e}"),
            })?,
            Err(Error::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        if current.holder_id != self.holder_id {
            return Ok(());
        }

        let expired = LockInfo {
            holder_id: self.holder_id.clone(),
            expires_at: Utc::now() - chrono::Duration::seconds(1),
            acquired_at: current.acquired_at,
            operation: None,
        };
        let bytes = Bytes::from(serde_json::to_vec(&expired).map_err(|e| Error::Internal {
            message: format!("serialize expired lock: {e}"),
        })?);

        self.storage
            .put(&self.lock_path, bytes, WritePrecondition::None)
            .await?;
        Ok(())
    }
}

impl<S: ObjectStore + ?Sized> Drop for LockGuard<S> {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(
                lock_path = %self.lock_path,
                holder_id = %self.holder_id,
                "lock guard dropped without release; lock will expire by TTL"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn acquire_and_release() {
        let storage = Arc::new(MemoryStore::new());
        let lock = AdvisoryLock::new(storage, "state/deploy.lock");

        let guard = lock
            .acquire(Duration::from_secs(30), 3)
            .await
            .expect("acquire");
        assert!(lock.is_locked().await.expect("is_locked"));

        guard.release().await.expect("release");
        assert!(!lock.is_locked().await.expect("is_locked"));
    }

    #[tokio::test]
    async fn contended_lock_fails_after_retries() {
        let storage = Arc::new(MemoryStore::new());
        let first = AdvisoryLock::new(Arc::clone(&storage), "state/deploy.lock");
        let second = AdvisoryLock::new(storage, "state/deploy.lock");

        let _guard = first
            .acquire(Duration::from_secs(30), 3)
            .await
            .expect("first acquire");

        let result = second.acquire(Duration::from_secs(30), 2).await;
        assert!(matches!(result, Err(Error::PreconditionFailed { .. })));
    }

    #[tokio::test]
    async fn expired_lock_is_taken_over() {
        let storage = Arc::new(MemoryStore::new());
        let first = AdvisoryLock::new(Arc::clone(&storage), "state/deploy.lock");
        let second = AdvisoryLock::new(storage, "state/deploy.lock");

        let _guard = first
            .acquire(Duration::from_millis(10), 3)
            .await
            .expect("first acquire");
        tokio::time::sleep(Duration::from_millis(30)).await;

        let guard = second
            .acquire(Duration::from_secs(30), 3)
            .await
            .expect("takeover of expired lock");
        assert_eq!(guard.holder_id(), second.holder_id());
    }

    #[tokio::test]
    async fn release_allows_reacquisition() {
        let storage = Arc::new(MemoryStore::new());
        let lock = AdvisoryLock::new(storage, "state/deploy.lock");

        let guard = lock
            .acquire(Duration::from_secs(30), 3)
            .await
            .expect("acquire");
        guard.release().await.expect("release");

        let guard = lock
            .acquire(Duration::from_secs(30), 3)
            .await
            .expect("reacquire after release");
        guard.release().await.expect("release");
    }

    #[tokio::test]
    async fn stale_holder_release_leaves_new_holder_untouched() {
        let storage = Arc::new(MemoryStore::new());
        let first = AdvisoryLock::new(Arc::clone(&storage), "state/deploy.lock");
        let second = AdvisoryLock::new(Arc::clone(&storage), "state/deploy.lock");

        let stale_guard = first
            .acquire(Duration::from_millis(10), 3)
            .await
            .expect("first acquire");
        tokio::time::sleep(Duration::from_millis(30)).await;

        let _new_guard = second
            .acquire(Duration::from_secs(30), 3)
            .await
            .expect("takeover");

        stale_guard.release().await.expect("stale release is a no-op");
        assert!(second.is_locked().await.expect("is_locked"));
    }
}
