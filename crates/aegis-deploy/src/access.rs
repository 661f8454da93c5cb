//! Invocation access grants.
//!
//! The function's invoker role is granted to a configured principal. The
//! default principal is the unrestricted set (`allUsers`), equivalent to
//! allowing unauthenticated invocation; the endpoint is reached through
//! authenticated event delivery, and the grant is an explicit configuration
//! choice, not an implicit one. Granting is idempotent and non-escalating:
//! the same (principal, role) pair is never added twice.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use aegis_core::Principal;

use crate::cloud::{CloudError, IamService};
use crate::error::{DeployError, Result};
use crate::function::FunctionName;

/// Role granting permission to invoke the function.
pub const INVOKER_ROLE: &str = "roles/cloudfunctions.invoker";

/// A (principal, role) pair granted on the function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    /// The principal receiving the role.
    pub principal: Principal,
    /// The granted role.
    pub role: String,
}

impl AccessGrant {
    /// The invoker grant for a principal.
    #[must_use]
    pub fn invoker(principal: Principal) -> Self {
        Self {
            principal,
            role: INVOKER_ROLE.to_string(),
        }
    }
}

/// What the binder did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessOutcome {
    /// The grant was added.
    Granted,
    /// The grant was already present; nothing written.
    AlreadyGranted,
}

/// Grants invocation permission on the function.
pub struct AccessBinder<I: IamService + ?Sized> {
    service: Arc<I>,
}

impl<I: IamService + ?Sized> AccessBinder<I> {
    /// Creates a new binder.
    #[must_use]
    pub fn new(service: Arc<I>) -> Self {
        Self { service }
    }

    /// Ensures the grant is present on the function's policy.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Permission` if the policy cannot be read or
    /// written.
    pub async fn ensure(
        &self,
        function: &FunctionName,
        grant: &AccessGrant,
    ) -> Result<AccessOutcome> {
        let mut grants = self
            .service
            .invoker_grants(function)
            .await
            .map_err(permission_err)?;

        if grants.contains(grant) {
            tracing::debug!(
                function = %function,
                principal = %grant.principal,
                "grant already present"
            );
            return Ok(AccessOutcome::AlreadyGranted);
        }

        tracing::info!(
            function = %function,
            principal = %grant.principal,
            role = %grant.role,
            "granting invocation access"
        );
        grants.push(grant.clone());
        self.service
            .set_invoker_grants(function, grants)
            .await
            .map_err(permission_err)?;
        Ok(AccessOutcome::Granted)
    }
}

fn permission_err(err: CloudError) -> DeployError {
    DeployError::permission(err.to_string())
}
