//! Service contracts for the cloud collaborators.
//!
//! The pipeline never talks to the hosting platform, message bus, or IAM
//! service directly; it goes through these traits. Tests run against
//! [`MemoryCloud`], which also counts mutating calls so idempotence can be
//! asserted as "zero mutations on a repeated run". The REST-backed
//! implementations live in [`crate::gcp`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::access::AccessGrant;
use crate::function::{FunctionName, FunctionSpec, ObservedFunction};
use crate::trigger::TriggerSpec;

/// Result type for cloud service calls.
pub type CloudResult<T> = std::result::Result<T, CloudError>;

/// Errors reported by a cloud collaborator.
///
/// The pipeline maps these onto stage error kinds; the service layer only
/// distinguishes the classes that change behavior.
#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    /// The referenced resource does not exist.
    #[error("not found: {resource}")]
    NotFound {
        /// The missing resource.
        resource: String,
    },

    /// The caller lacks permission for the operation.
    #[error("permission denied: {message}")]
    Denied {
        /// Description of the denial.
        message: String,
    },

    /// The request was rejected as invalid (bad runtime, missing identity).
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the rejection.
        message: String,
    },

    /// The platform rejected or failed the call (quota, server error).
    #[error("platform error ({status}): {message}")]
    Platform {
        /// Platform status code.
        status: u16,
        /// Description of the failure.
        message: String,
    },

    /// The request never reached the platform.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },
}

/// Hosting platform operations on managed functions.
#[async_trait]
pub trait FunctionService: Send + Sync + 'static {
    /// Lists functions in a project/region whose ID starts with `prefix`.
    async fn list_functions(
        &self,
        project: &str,
        location: &str,
        prefix: &str,
    ) -> CloudResult<Vec<ObservedFunction>>;

    /// Creates a function. Fails if one already exists under the name.
    async fn create_function(
        &self,
        name: &FunctionName,
        spec: &FunctionSpec,
    ) -> CloudResult<ObservedFunction>;

    /// Updates an existing function in place.
    async fn update_function(
        &self,
        name: &FunctionName,
        spec: &FunctionSpec,
    ) -> CloudResult<ObservedFunction>;

    /// Deletes a function. Fails with `NotFound` if it doesn't exist.
    async fn delete_function(&self, name: &FunctionName) -> CloudResult<()>;
}

/// Message-bus operations for the event trigger.
#[async_trait]
pub trait TriggerService: Send + Sync + 'static {
    /// Returns whether the topic exists in the project.
    async fn topic_exists(&self, project: &str, topic: &str) -> CloudResult<bool>;

    /// Returns the function's current trigger, if any.
    async fn get_trigger(&self, function: &FunctionName) -> CloudResult<Option<TriggerSpec>>;

    /// Attaches a trigger to the function, replacing none.
    async fn create_trigger(
        &self,
        function: &FunctionName,
        spec: &TriggerSpec,
    ) -> CloudResult<()>;

    /// Detaches the function's trigger. A no-op if none exists.
    async fn delete_trigger(&self, function: &FunctionName) -> CloudResult<()>;
}

/// IAM operations on the function's invocation policy.
#[async_trait]
pub trait IamService: Send + Sync + 'static {
    /// Reads the current invoker grants on the function.
    async fn invoker_grants(&self, function: &FunctionName) -> CloudResult<Vec<AccessGrant>>;

    /// Replaces the invoker grants on the function.
    async fn set_invoker_grants(
        &self,
        function: &FunctionName,
        grants: Vec<AccessGrant>,
    ) -> CloudResult<()>;
}

/// Runtimes the in-memory platform accepts.
const SUPPORTED_RUNTIMES: [&str; 3] = ["python310", "python311", "python312"];

/// In-memory implementation of all three service traits, for tests.
///
/// Mutating calls are counted so idempotence properties can be asserted
/// directly. Write failures can be injected for crash-recovery tests.
#[derive(Debug, Default)]
pub struct MemoryCloud {
    functions: RwLock<HashMap<String, ObservedFunction>>,
    topics: RwLock<Vec<(String, String)>>,
    triggers: RwLock<HashMap<String, TriggerSpec>>,
    grants: RwLock<HashMap<String, Vec<AccessGrant>>>,
    function_writes: AtomicU64,
    trigger_writes: AtomicU64,
    policy_writes: AtomicU64,
    fail_function_writes: AtomicBool,
}

impl MemoryCloud {
    /// Creates an empty in-memory platform.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a topic so `topic_exists` reports it.
    pub fn add_topic(&self, project: &str, topic: &str) {
        self.topics
            .write()
            .expect("lock poisoned")
            .push((project.to_string(), topic.to_string()));
    }

    /// Number of function create/update/delete calls so far.
    #[must_use]
    pub fn function_writes(&self) -> u64 {
        self.function_writes.load(Ordering::SeqCst)
    }

    /// Number of trigger create/delete calls so far.
    #[must_use]
    pub fn trigger_writes(&self) -> u64 {
        self.trigger_writes.load(Ordering::SeqCst)
    }

    /// Number of policy writes so far.
    #[must_use]
    pub fn policy_writes(&self) -> u64 {
        self.policy_writes.load(Ordering::SeqCst)
    }

    /// Total mutating calls across all services.
    #[must_use]
    pub fn total_writes(&self) -> u64 {
        self.function_writes() + self.trigger_writes() + self.policy_writes()
    }

    /// Makes subsequent function writes fail with a server error.
    pub fn set_fail_function_writes(&self, fail: bool) {
        self.fail_function_writes.store(fail, Ordering::SeqCst);
    }

    fn check_function_write(&self) -> CloudResult<()> {
        if self.fail_function_writes.load(Ordering::SeqCst) {
            return Err(CloudError::Platform {
                status: 503,
                message: "injected function write failure".to_string(),
            });
        }
        Ok(())
    }

    fn validate_spec(spec: &FunctionSpec) -> CloudResult<()> {
        if !SUPPORTED_RUNTIMES.contains(&spec.runtime.as_str()) {
            return Err(CloudError::InvalidArgument {
                message: format!("unsupported runtime '{}'", spec.runtime),
            });
        }
        if spec.service_account_email.trim().is_empty() {
            return Err(CloudError::InvalidArgument {
                message: "missing service account".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl FunctionService for MemoryCloud {
    async fn list_functions(
        &self,
        project: &str,
        location: &str,
        prefix: &str,
    ) -> CloudResult<Vec<ObservedFunction>> {
        let functions = self.functions.read().expect("lock poisoned");
        Ok(functions
            .values()
            .filter(|f| {
                f.name.project == project
                    && f.name.location == location
                    && f.name.function_id.starts_with(prefix)
            })
            .cloned()
            .collect())
    }

    async fn create_function(
        &self,
        name: &FunctionName,
        spec: &FunctionSpec,
    ) -> CloudResult<ObservedFunction> {
        self.check_function_write()?;
        Self::validate_spec(spec)?;
        self.function_writes.fetch_add(1, Ordering::SeqCst);

        let mut functions = self.functions.write().expect("lock poisoned");
        let key = name.resource_name();
        if functions.contains_key(&key) {
            return Err(CloudError::Platform {
                status: 409,
                message: format!("function {key} already exists"),
            });
        }

        let observed = ObservedFunction {
            name: name.clone(),
            spec: spec.clone(),
            uri: Some(format!(
                "https://{}-{}.cloudfunctions.net/{}",
                name.location, name.project, name.function_id
            )),
        };
        functions.insert(key, observed.clone());
        Ok(observed)
    }

    async fn update_function(
        &self,
        name: &FunctionName,
        spec: &FunctionSpec,
    ) -> CloudResult<ObservedFunction> {
        self.check_function_write()?;
        Self::validate_spec(spec)?;
        self.function_writes.fetch_add(1, Ordering::SeqCst);

        let mut functions = self.functions.write().expect("lock poisoned");
        let key = name.resource_name();
        let Some(existing) = functions.get_mut(&key) else {
            return Err(CloudError::NotFound { resource: key });
        };

        existing.spec = spec.clone();
        Ok(existing.clone())
    }

    async fn delete_function(&self, name: &FunctionName) -> CloudResult<()> {
        self.check_function_write()?;
        self.function_writes.fetch_add(1, Ordering::SeqCst);

        let mut functions = self.functions.write().expect("lock poisoned");
        let key = name.resource_name();
        if functions.remove(&key).is_none() {
            return Err(CloudError::NotFound { resource: key });
        }
        // The trigger goes with the function.
        self.triggers.write().expect("lock poisoned").remove(&name.resource_name());
        Ok(())
    }
}

#[async_trait]
impl TriggerService for MemoryCloud {
    async fn topic_exists(&self, project: &str, topic: &str) -> CloudResult<bool> {
        let topics = self.topics.read().expect("lock poisoned");
        Ok(topics
            .iter()
            .any(|(p, t)| p == project && t == topic))
    }

    async fn get_trigger(&self, function: &FunctionName) -> CloudResult<Option<TriggerSpec>> {
        let triggers = self.triggers.read().expect("lock poisoned");
        Ok(triggers.get(&function.resource_name()).cloned())
    }

    async fn create_trigger(
        &self,
        function: &FunctionName,
        spec: &TriggerSpec,
    ) -> CloudResult<()> {
        if !self.topic_exists(&spec.project, &spec.topic).await? {
            return Err(CloudError::NotFound {
                resource: spec.topic_resource_name(),
            });
        }
        self.trigger_writes.fetch_add(1, Ordering::SeqCst);
        self.triggers
            .write()
            .expect("lock poisoned")
            .insert(function.resource_name(), spec.clone());
        Ok(())
    }

    async fn delete_trigger(&self, function: &FunctionName) -> CloudResult<()> {
        self.trigger_writes.fetch_add(1, Ordering::SeqCst);
        self.triggers
            .write()
            .expect("lock poisoned")
            .remove(&function.resource_name());
        Ok(())
    }
}

#[async_trait]
impl IamService for MemoryCloud {
    async fn invoker_grants(&self, function: &FunctionName) -> CloudResult<Vec<AccessGrant>> {
        let grants = self.grants.read().expect("lock poisoned");
        Ok(grants
            .get(&function.resource_name())
            .cloned()
            .unwrap_or_default())
    }

    async fn set_invoker_grants(
        &self,
        function: &FunctionName,
        grants: Vec<AccessGrant>,
    ) -> CloudResult<()> {
        self.policy_writes.fetch_add(1, Ordering::SeqCst);
        self.grants
            .write()
            .expect("lock poisoned")
            .insert(function.resource_name(), grants);
        Ok(())
    }
}
