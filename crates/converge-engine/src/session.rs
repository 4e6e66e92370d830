//! Provider façade consumed by the lifecycle
//!
//! One method per remote operation. Implementations classify every failure
//! into a [`ClientError`] so the engine can decide what to retry without
//! knowing the transport.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use converge_core::{AttributeMap, PatchOperation, ResourceHandle, ResourceKind};

/// Result type for façade calls
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Classified façade failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The resource does not exist (HTTP 404 or equivalent)
    #[error("not found: {0}")]
    NotFound(String),

    /// Server-side uniqueness or version conflict
    #[error("conflict: {0}")]
    Conflict(String),

    /// Transport failure, throttling or a temporary server error
    #[error("transient error: {0}")]
    Transient(String),

    /// The provider refused the request
    #[error("rejected: {0}")]
    Rejected(String),
}

impl ClientError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transient(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

/// A resource as returned by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    pub id: String,

    /// Raw provider state string
    pub state: String,

    /// Full provider document, including undeclared and computed fields
    pub document: JsonValue,
}

/// A sub-resource in the provider's own words
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependentState {
    pub id: String,
    pub kind: ResourceKind,
    pub state: String,
}

/// Request to attach one sub-resource to a primary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependentRequest {
    pub kind: ResourceKind,

    /// Declaration name, e.g. `routes`
    pub name: String,

    /// Position within a per-element declaration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,

    pub spec: JsonValue,
}

/// Remote control plane operations
///
/// Implementations must be Send + Sync; the lifecycle shares them behind an
/// `Arc`.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Issue the primary creation call
    async fn create(&self, kind: &ResourceKind, spec: &AttributeMap) -> ClientResult<RemoteObject>;

    /// Fetch the current remote representation
    async fn get(&self, handle: &ResourceHandle) -> ClientResult<RemoteObject>;

    /// Apply ordered patch operations
    async fn update(
        &self,
        handle: &ResourceHandle,
        patch: &[PatchOperation],
    ) -> ClientResult<RemoteObject>;

    /// Request deletion; returns once the request is accepted
    async fn delete(&self, handle: &ResourceHandle) -> ClientResult<()>;

    /// Sub-resources of a primary with their current states
    async fn list_dependents(&self, handle: &ResourceHandle) -> ClientResult<Vec<DependentState>>;

    /// Create one sub-resource under a primary
    async fn attach_dependent(
        &self,
        handle: &ResourceHandle,
        request: &DependentRequest,
    ) -> ClientResult<DependentState>;

    /// Look up an existing resource id by its natural key
    async fn find_by_natural_key(
        &self,
        kind: &ResourceKind,
        key: &str,
    ) -> ClientResult<Option<String>>;
}
