//! REST backends for the cloud collaborators.
//!
//! Implements the [`crate::cloud`] service traits and the core
//! [`ObjectStore`] contract against the platform's JSON APIs with
//! bearer-token auth. Each HTTP call carries the connection's timeout;
//! the pipeline adds its own per-stage bound on top.
//!
//! Function create/update are long-running on the platform, so both poll
//! the resource until it reports `ACTIVE`. Conditional object writes map
//! to generation-match preconditions, which is what makes the publisher's
//! check-then-upload pair safe under concurrent runs.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use aegis_core::{
    Error as CoreError, ObjectMeta, ObjectStore, Principal, Redacted, WritePrecondition,
    WriteResult,
};

use crate::access::{AccessGrant, INVOKER_ROLE};
use crate::cloud::{CloudError, CloudResult, FunctionService, IamService, TriggerService};
use crate::function::{FunctionName, FunctionSpec, ObservedFunction, SourceRef};
use crate::trigger::{RetryPolicy, TriggerSpec};

/// Object storage JSON API root.
const STORAGE_API: &str = "https://storage.googleapis.com";

/// Managed functions API root.
const FUNCTIONS_API: &str = "https://cloudfunctions.googleapis.com/v2";

/// Message bus API root.
const PUBSUB_API: &str = "https://pubsub.googleapis.com/v1";

/// Event type for bus-triggered invocation.
const PUBSUB_EVENT_TYPE: &str = "google.cloud.pubsub.topic.v1.messagePublished";

/// Poll interval while waiting for a function to become active.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Upper bound on readiness polls per create/update.
const MAX_POLLS: u32 = 150;

/// An authenticated connection to the platform APIs.
#[derive(Clone)]
pub struct GcpConnection {
    client: reqwest::Client,
    token: Redacted,
}

impl GcpConnection {
    /// Creates a connection with the given bearer token and per-call
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the HTTP client cannot be built.
    pub fn new(token: Redacted, timeout: Duration) -> CloudResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CloudError::Transport {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, token })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.get(url).bearer_auth(self.token.expose())
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.post(url).bearer_auth(self.token.expose())
    }

    fn patch(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.patch(url).bearer_auth(self.token.expose())
    }

    fn delete(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.delete(url).bearer_auth(self.token.expose())
    }
}

/// Maps a platform response status to the service error classes.
fn map_status(status: StatusCode, message: String) -> CloudError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CloudError::Denied { message },
        StatusCode::NOT_FOUND => CloudError::NotFound { resource: message },
        StatusCode::BAD_REQUEST => CloudError::InvalidArgument { message },
        other => CloudError::Platform {
            status: other.as_u16(),
            message,
        },
    }
}

async fn cloud_error(context: &str, response: reqwest::Response) -> CloudError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    map_status(status, format!("{context}: {body}"))
}

fn transport(context: &str, err: reqwest::Error) -> CloudError {
    CloudError::Transport {
        message: format!("{context}: {err}"),
    }
}

/// Percent-encodes an object name for use as one path segment.
fn encode_segment(name: &str) -> String {
    name.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                char::from(b).to_string()
            }
            other => format!("%{other:02X}"),
        })
        .collect()
}

// ============================================================================
// Object storage
// ============================================================================

/// GCS-backed implementation of the [`ObjectStore`] contract, scoped to
/// one bucket.
pub struct GcsStore {
    conn: GcpConnection,
    bucket: String,
}

impl GcsStore {
    /// Creates a store over the given bucket.
    #[must_use]
    pub fn new(conn: GcpConnection, bucket: impl Into<String>) -> Self {
        Self {
            conn,
            bucket: bucket.into(),
        }
    }

    fn object_url(&self, name: &str) -> String {
        format!(
            "{STORAGE_API}/storage/v1/b/{}/o/{}",
            self.bucket,
            encode_segment(name)
        )
    }
}

/// Object metadata as the storage API reports it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcsObject {
    name: String,
    /// The API serializes sizes as strings.
    size: String,
    generation: String,
    #[serde(default)]
    updated: Option<DateTime<Utc>>,
}

impl GcsObject {
    fn into_meta(self) -> ObjectMeta {
        ObjectMeta {
            name: self.name,
            size: self.size.parse().unwrap_or(0),
            version: self.generation,
            last_modified: self.updated,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GcsListResponse {
    #[serde(default)]
    items: Vec<GcsObject>,
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn get(&self, name: &str) -> aegis_core::Result<Bytes> {
        let url = format!("{}?alt=media", self.object_url(name));
        let response = self
            .conn
            .get(&url)
            .send()
            .await
            .map_err(|e| CoreError::storage_with_source("object read failed", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(CoreError::NotFound(format!("object not found: {name}")));
        }
        if !response.status().is_success() {
            return Err(CoreError::storage(format!(
                "object read failed with status {}",
                response.status()
            )));
        }
        response
            .bytes()
            .await
            .map_err(|e| CoreError::storage_with_source("object read failed", e))
    }

    async fn put(
        &self,
        name: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> aegis_core::Result<WriteResult> {
        let mut url = format!(
            "{STORAGE_API}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.bucket,
            encode_segment(name)
        );
        match &precondition {
            WritePrecondition::DoesNotExist => url.push_str("&ifGenerationMatch=0"),
            WritePrecondition::MatchesVersion(version) => {
                url.push_str(&format!("&ifGenerationMatch={version}"));
            }
            WritePrecondition::None => {}
        }

        let response = self
            .conn
            .post(&url)
            .header("content-type", "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(|e| CoreError::storage_with_source("object write failed", e))?;

        if response.status() == StatusCode::PRECONDITION_FAILED {
            let current = self
                .head(name)
                .await?
                .map_or_else(|| "0".to_string(), |meta| meta.version);
            return Ok(WriteResult::PreconditionFailed {
                current_version: current,
            });
        }
        if !response.status().is_success() {
            return Err(CoreError::storage(format!(
                "object write failed with status {}",
                response.status()
            )));
        }

        let object: GcsObject = response
            .json()
            .await
            .map_err(|e| CoreError::storage_with_source("object write response invalid", e))?;
        Ok(WriteResult::Success {
            version: object.generation,
        })
    }

    async fn head(&self, name: &str) -> aegis_core::Result<Option<ObjectMeta>> {
        let response = self
            .conn
            .get(&self.object_url(name))
            .send()
            .await
            .map_err(|e| CoreError::storage_with_source("object metadata read failed", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(CoreError::storage(format!(
                "object metadata read failed with status {}",
                response.status()
            )));
        }

        let object: GcsObject = response
            .json()
            .await
            .map_err(|e| CoreError::storage_with_source("object metadata invalid", e))?;
        Ok(Some(object.into_meta()))
    }

    async fn list(&self, prefix: &str) -> aegis_core::Result<Vec<ObjectMeta>> {
        let url = format!(
            "{STORAGE_API}/storage/v1/b/{}/o?prefix={}",
            self.bucket,
            encode_segment(prefix)
        );
        let response = self
            .conn
            .get(&url)
            .send()
            .await
            .map_err(|e| CoreError::storage_with_source("object list failed", e))?;

        if !response.status().is_success() {
            return Err(CoreError::storage(format!(
                "object list failed with status {}",
                response.status()
            )));
        }

        let listing: GcsListResponse = response
            .json()
            .await
            .map_err(|e| CoreError::storage_with_source("object list response invalid", e))?;
        Ok(listing.items.into_iter().map(GcsObject::into_meta).collect())
    }

    async fn delete(&self, name: &str) -> aegis_core::Result<()> {
        let response = self
            .conn
            .delete(&self.object_url(name))
            .send()
            .await
            .map_err(|e| CoreError::storage_with_source("object delete failed", e))?;

        if response.status() == StatusCode::NOT_FOUND || response.status().is_success() {
            return Ok(());
        }
        Err(CoreError::storage(format!(
            "object delete failed with status {}",
            response.status()
        )))
    }
}

// ============================================================================
// Managed functions
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcfStorageSource {
    bucket: String,
    object: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcfSource {
    storage_source: GcfStorageSource,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcfBuildConfig {
    runtime: String,
    entry_point: String,
    source: GcfSource,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcfServiceConfig {
    available_memory: String,
    timeout_seconds: u32,
    max_instance_count: u32,
    service_account_email: String,
    #[serde(default)]
    environment_variables: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uri: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcfEventTrigger {
    event_type: String,
    pubsub_topic: String,
    trigger_region: String,
    retry_policy: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcfFunction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    build_config: GcfBuildConfig,
    service_config: GcfServiceConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    event_trigger: Option<GcfEventTrigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcfListResponse {
    #[serde(default)]
    functions: Vec<GcfFunction>,
}

/// Renders a memory limit the way the API expects it.
fn format_memory(mb: u32) -> String {
    format!("{mb}M")
}

/// Parses the API's memory rendering back into MB.
fn parse_memory(value: &str) -> Option<u32> {
    value
        .strip_suffix("Mi")
        .or_else(|| value.strip_suffix('M'))
        .and_then(|n| n.parse().ok())
}

/// Parses `projects/{p}/locations/{l}/functions/{id}`.
fn parse_function_name(resource: &str) -> Option<FunctionName> {
    let mut parts = resource.split('/');
    match (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) {
        (
            Some("projects"),
            Some(project),
            Some("locations"),
            Some(location),
            Some("functions"),
            Some(id),
            None,
        ) => Some(FunctionName {
            project: project.to_string(),
            location: location.to_string(),
            function_id: id.to_string(),
        }),
        _ => None,
    }
}

fn to_wire(spec: &FunctionSpec) -> GcfFunction {
    GcfFunction {
        name: None,
        build_config: GcfBuildConfig {
            runtime: spec.runtime.clone(),
            entry_point: spec.entry_point.clone(),
            source: GcfSource {
                storage_source: GcfStorageSource {
                    bucket: spec.source.bucket.clone(),
                    object: spec.source.object.clone(),
                },
            },
        },
        service_config: GcfServiceConfig {
            available_memory: format_memory(spec.available_memory_mb),
            timeout_seconds: spec.timeout_seconds,
            max_instance_count: spec.max_instance_count,
            service_account_email: spec.service_account_email.clone(),
            environment_variables: spec.environment.clone(),
            uri: None,
        },
        event_trigger: None,
        state: None,
    }
}

fn from_wire(wire: GcfFunction) -> CloudResult<ObservedFunction> {
    let resource = wire.name.as_deref().unwrap_or_default();
    let name = parse_function_name(resource).ok_or_else(|| CloudError::Platform {
        status: 500,
        message: format!("unparseable function resource name '{resource}'"),
    })?;

    let memory = parse_memory(&wire.service_config.available_memory).ok_or_else(|| {
        CloudError::Platform {
            status: 500,
            message: format!(
                "unparseable memory limit '{}'",
                wire.service_config.available_memory
            ),
        }
    })?;

    Ok(ObservedFunction {
        name,
        spec: FunctionSpec {
            runtime: wire.build_config.runtime,
            entry_point: wire.build_config.entry_point,
            available_memory_mb: memory,
            timeout_seconds: wire.service_config.timeout_seconds,
            max_instance_count: wire.service_config.max_instance_count,
            service_account_email: wire.service_config.service_account_email,
            environment: wire.service_config.environment_variables,
            source: SourceRef {
                bucket: wire.build_config.source.storage_source.bucket,
                object: wire.build_config.source.storage_source.object,
            },
        },
        uri: wire.service_config.uri,
    })
}

/// REST-backed [`FunctionService`].
pub struct GcfFunctions {
    conn: GcpConnection,
}

impl GcfFunctions {
    /// Creates the service over a connection.
    #[must_use]
    pub fn new(conn: GcpConnection) -> Self {
        Self { conn }
    }

    async fn get_wire(&self, name: &FunctionName) -> CloudResult<Option<GcfFunction>> {
        let url = format!("{FUNCTIONS_API}/{}", name.resource_name());
        let response = self
            .conn
            .get(&url)
            .send()
            .await
            .map_err(|e| transport("function read", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(cloud_error("function read", response).await);
        }
        let wire: GcfFunction = response
            .json()
            .await
            .map_err(|e| transport("function read", e))?;
        Ok(Some(wire))
    }

    /// Polls until the function reports `ACTIVE` with an endpoint.
    async fn wait_active(&self, name: &FunctionName) -> CloudResult<ObservedFunction> {
        for _ in 0..MAX_POLLS {
            if let Some(wire) = self.get_wire(name).await? {
                let state = wire.state.clone().unwrap_or_default();
                match state.as_str() {
                    "ACTIVE" => return from_wire(wire),
                    "FAILED" => {
                        return Err(CloudError::Platform {
                            status: 500,
                            message: format!("function {} entered FAILED state", name),
                        })
                    }
                    _ => {}
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Err(CloudError::Platform {
            status: 504,
            message: format!("function {name} did not become active"),
        })
    }
}

#[async_trait]
impl FunctionService for GcfFunctions {
    async fn list_functions(
        &self,
        project: &str,
        location: &str,
        prefix: &str,
    ) -> CloudResult<Vec<ObservedFunction>> {
        let url = format!("{FUNCTIONS_API}/projects/{project}/locations/{location}/functions");
        let response = self
            .conn
            .get(&url)
            .send()
            .await
            .map_err(|e| transport("function list", e))?;

        if !response.status().is_success() {
            return Err(cloud_error("function list", response).await);
        }

        let listing: GcfListResponse = response
            .json()
            .await
            .map_err(|e| transport("function list", e))?;

        let mut functions = Vec::new();
        for wire in listing.functions {
            let observed = from_wire(wire)?;
            if observed.name.function_id.starts_with(prefix) {
                functions.push(observed);
            }
        }
        Ok(functions)
    }

    async fn create_function(
        &self,
        name: &FunctionName,
        spec: &FunctionSpec,
    ) -> CloudResult<ObservedFunction> {
        let url = format!(
            "{FUNCTIONS_API}/projects/{}/locations/{}/functions?functionId={}",
            name.project, name.location, name.function_id
        );
        let response = self
            .conn
            .post(&url)
            .json(&to_wire(spec))
            .send()
            .await
            .map_err(|e| transport("function create", e))?;

        if !response.status().is_success() {
            return Err(cloud_error("function create", response).await);
        }
        self.wait_active(name).await
    }

    async fn update_function(
        &self,
        name: &FunctionName,
        spec: &FunctionSpec,
    ) -> CloudResult<ObservedFunction> {
        let url = format!(
            "{FUNCTIONS_API}/{}?updateMask=buildConfig,serviceConfig",
            name.resource_name()
        );
        let response = self
            .conn
            .patch(&url)
            .json(&to_wire(spec))
            .send()
            .await
            .map_err(|e| transport("function update", e))?;

        if !response.status().is_success() {
            return Err(cloud_error("function update", response).await);
        }
        self.wait_active(name).await
    }

    async fn delete_function(&self, name: &FunctionName) -> CloudResult<()> {
        let url = format!("{FUNCTIONS_API}/{}", name.resource_name());
        let response = self
            .conn
            .delete(&url)
            .send()
            .await
            .map_err(|e| transport("function delete", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(CloudError::NotFound {
                resource: name.resource_name(),
            });
        }
        if !response.status().is_success() {
            return Err(cloud_error("function delete", response).await);
        }
        Ok(())
    }
}

// ============================================================================
// Event triggers
// ============================================================================

fn retry_policy_to_wire(policy: RetryPolicy) -> &'static str {
    match policy {
        RetryPolicy::DoNotRetry => "RETRY_POLICY_DO_NOT_RETRY",
        RetryPolicy::Retry => "RETRY_POLICY_RETRY",
    }
}

fn retry_policy_from_wire(value: &str) -> RetryPolicy {
    if value == "RETRY_POLICY_RETRY" {
        RetryPolicy::Retry
    } else {
        RetryPolicy::DoNotRetry
    }
}

/// Parses `projects/{p}/topics/{t}`.
fn parse_topic(resource: &str) -> Option<(String, String)> {
    let mut parts = resource.split('/');
    match (parts.next(), parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("projects"), Some(project), Some("topics"), Some(topic), None) => {
            Some((project.to_string(), topic.to_string()))
        }
        _ => None,
    }
}

/// REST-backed [`TriggerService`].
///
/// The platform models the trigger as a field of the function resource, so
/// create/delete patch that field; topic existence goes through the
/// message bus API.
pub struct GcfTriggers {
    conn: GcpConnection,
    functions: GcfFunctions,
}

impl GcfTriggers {
    /// Creates the service over a connection.
    #[must_use]
    pub fn new(conn: GcpConnection) -> Self {
        Self {
            functions: GcfFunctions::new(conn.clone()),
            conn,
        }
    }

    async fn patch_trigger(
        &self,
        function: &FunctionName,
        body: &serde_json::Value,
    ) -> CloudResult<()> {
        let url = format!(
            "{FUNCTIONS_API}/{}?updateMask=eventTrigger",
            function.resource_name()
        );
        let response = self
            .conn
            .patch(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| transport("trigger update", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(CloudError::NotFound {
                resource: function.resource_name(),
            });
        }
        if !response.status().is_success() {
            return Err(cloud_error("trigger update", response).await);
        }
        self.functions.wait_active(function).await?;
        Ok(())
    }
}

#[async_trait]
impl TriggerService for GcfTriggers {
    async fn topic_exists(&self, project: &str, topic: &str) -> CloudResult<bool> {
        let url = format!("{PUBSUB_API}/projects/{project}/topics/{topic}");
        let response = self
            .conn
            .get(&url)
            .send()
            .await
            .map_err(|e| transport("topic read", e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(cloud_error("topic read", response).await),
        }
    }

    async fn get_trigger(&self, function: &FunctionName) -> CloudResult<Option<TriggerSpec>> {
        let Some(wire) = self.functions.get_wire(function).await? else {
            return Ok(None);
        };
        let Some(trigger) = wire.event_trigger else {
            return Ok(None);
        };

        let Some((project, topic)) = parse_topic(&trigger.pubsub_topic) else {
            return Err(CloudError::Platform {
                status: 500,
                message: format!("unparseable topic resource '{}'", trigger.pubsub_topic),
            });
        };

        Ok(Some(TriggerSpec {
            project,
            topic,
            region: trigger.trigger_region,
            retry_policy: retry_policy_from_wire(&trigger.retry_policy),
        }))
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

        let body = serde_json::json!({
            "eventTrigger": {
                "eventType": PUBSUB_EVENT_TYPE,
                "pubsubTopic": spec.topic_resource_name(),
                "triggerRegion": spec.region,
                "retryPolicy": retry_policy_to_wire(spec.retry_policy),
            }
        });
        self.patch_trigger(function, &body).await
    }

    async fn delete_trigger(&self, function: &FunctionName) -> CloudResult<()> {
        let body = serde_json::json!({ "eventTrigger": null });
        self.patch_trigger(function, &body).await
    }
}

// ============================================================================
// Invocation policy
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct IamBinding {
    role: String,
    #[serde(default)]
    members: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IamPolicy {
    #[serde(default)]
    bindings: Vec<IamBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    etag: Option<String>,
}

/// Replaces the invoker bindings in a policy, preserving all other roles.
fn replace_invoker_bindings(mut policy: IamPolicy, grants: &[AccessGrant]) -> IamPolicy {
    policy.bindings.retain(|b| b.role != INVOKER_ROLE);

    let mut by_role: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for grant in grants {
        by_role
            .entry(grant.role.clone())
            .or_default()
            .push(grant.principal.as_str().to_string());
    }
    for (role, members) in by_role {
        policy.bindings.push(IamBinding { role, members });
    }
    policy
}

/// REST-backed [`IamService`] over the function's invocation policy.
pub struct GcfIam {
    conn: GcpConnection,
}

impl GcfIam {
    /// Creates the service over a connection.
    #[must_use]
    pub fn new(conn: GcpConnection) -> Self {
        Self { conn }
    }

    async fn get_policy(&self, function: &FunctionName) -> CloudResult<IamPolicy> {
        let url = format!("{FUNCTIONS_API}/{}:getIamPolicy", function.resource_name());
        let response = self
            .conn
            .get(&url)
            .send()
            .await
            .map_err(|e| transport("policy read", e))?;

        if !response.status().is_success() {
            return Err(cloud_error("policy read", response).await);
        }
        response.json().await.map_err(|e| transport("policy read", e))
    }
}

#[async_trait]
impl IamService for GcfIam {
    async fn invoker_grants(&self, function: &FunctionName) -> CloudResult<Vec<AccessGrant>> {
        let policy = self.get_policy(function).await?;
        Ok(policy
            .bindings
            .into_iter()
            .filter(|b| b.role == INVOKER_ROLE)
            .flat_map(|b| {
                b.members.into_iter().map(|member| AccessGrant {
                    principal: Principal::from(member),
                    role: INVOKER_ROLE.to_string(),
                })
            })
            .collect())
    }

    async fn set_invoker_grants(
        &self,
        function: &FunctionName,
        grants: Vec<AccessGrant>,
    ) -> CloudResult<()> {
        let policy = self.get_policy(function).await?;
        let updated = replace_invoker_bindings(policy, &grants);

        let url = format!("{FUNCTIONS_API}/{}:setIamPolicy", function.resource_name());
        let response = self
            .conn
            .post(&url)
            .json(&serde_json::json!({ "policy": updated }))
            .send()
            .await
            .map_err(|e| transport("policy write", e))?;

        if !response.status().is_success() {
            return Err(cloud_error("policy write", response).await);
        }
        Ok(())
    }
}
