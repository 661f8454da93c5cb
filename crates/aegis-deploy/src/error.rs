//! Error types for the deploy pipeline.
//!
//! Each variant corresponds to one pipeline stage, so a failed run can
//! report which stage failed and why. Validation errors are raised at the
//! boundary, before any remote call; every other variant aborts the
//! remaining pipeline with no internal retry.

use thiserror::Error;

/// Result type alias for deploy operations.
pub type Result<T> = std::result::Result<T, DeployError>;

/// Errors that can occur during a reconciliation run.
#[derive(Debug, Error)]
pub enum DeployError {
    /// A configuration input violated its declared constraint.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the violated constraint.
        message: String,
    },

    /// Archiving the source directory failed.
    #[error("packaging error: {message}")]
    Packaging {
        /// Description of the packaging failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Publishing the artifact to the bucket failed.
    #[error("upload error: {message}")]
    Upload {
        /// Description of the upload failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Reconciling the function resource failed.
    #[error("reconcile error: {message}")]
    Reconcile {
        /// Description of the reconcile failure.
        message: String,
    },

    /// Attaching the event trigger failed.
    #[error("binding error: {message}")]
    Binding {
        /// Description of the binding failure.
        message: String,
    },

    /// Modifying the invocation policy failed.
    #[error("permission error: {message}")]
    Permission {
        /// Description of the permission failure.
        message: String,
    },
}

impl DeployError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a packaging error.
    #[must_use]
    pub fn packaging(message: impl Into<String>) -> Self {
        Self::Packaging {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a packaging error with a source cause.
    #[must_use]
    pub fn packaging_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Packaging {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates an upload error.
    #[must_use]
    pub fn upload(message: impl Into<String>) -> Self {
        Self::Upload {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an upload error with a source cause.
    #[must_use]
    pub fn upload_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Upload {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a reconcile error.
    #[must_use]
    pub fn reconcile(message: impl Into<String>) -> Self {
        Self::Reconcile {
            message: message.into(),
        }
    }

    /// Creates a binding error.
    #[must_use]
    pub fn binding(message: impl Into<String>) -> Self {
        Self::Binding {
            message: message.into(),
        }
    }

    /// Creates a permission error.
    #[must_use]
    pub fn permission(message: impl Into<String>) -> Self {
        Self::Permission {
            message: message.into(),
        }
    }

    /// Returns the pipeline stage this error is attributed to.
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validate",
            Self::Packaging { .. } => "package",
            Self::Upload { .. } => "publish",
            Self::Reconcile { .. } => "reconcile-function",
            Self::Binding { .. } => "bind-trigger",
            Self::Permission { .. } => "grant-access",
        }
    }
}

impl From<aegis_core::ConfigError> for DeployError {
    fn from(err: aegis_core::ConfigError) -> Self {
        Self::Validation {
            message: err.to_string(),
        }
    }
}
