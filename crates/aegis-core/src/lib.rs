//! # aegis-core
//!
//! Core abstractions for Aegis, a tool that provisions one event-driven
//! cluster protection function by reconciling declared desired state
//! against observed cloud state.
//!
//! This crate provides the primitives shared across the workspace:
//!
//! - **Configuration**: The validated deploy input set, enum-constrained
//!   at the parse boundary
//! - **Identifiers**: The persisted per-deployment suffix and per-run IDs
//! - **Object Storage**: The artifact bucket contract with conditional
//!   writes, plus an in-memory backend for tests
//! - **Locking**: An advisory lock serializing concurrent runs against one
//!   deployment scope
//! - **Secrets**: A redaction wrapper keeping credentials out of logs
//! - **Error Types**: Shared error definitions and result aliases

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod id;
pub mod lock;
pub mod observability;
pub mod secret;
pub mod storage;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{AutoUpdate, ConfigError, DeployConfig, Principal, Scope};
    pub use crate::error::{Error, Result};
    pub use crate::id::{DeploySuffix, RunId};
    pub use crate::lock::{AdvisoryLock, LockGuard, LockInfo};
    pub use crate::secret::Redacted;
    pub use crate::storage::{
        MemoryStore, ObjectMeta, ObjectStore, WritePrecondition, WriteResult,
    };
}

pub use config::{AutoUpdate, ConfigError, DeployConfig, Principal, Scope};
pub use error::{Error, Result};
pub use id::{DeploySuffix, RunId};
pub use lock::{AdvisoryLock, LockGuard, LockInfo};
pub use observability::{init_logging, LogFormat};
pub use secret::Redacted;
pub use storage::{MemoryStore, ObjectMeta, ObjectStore, WritePrecondition, WriteResult};
