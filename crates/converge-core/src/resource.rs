//! Resource identity and observed state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attributes::AttributeMap;

/// Resource kind name, e.g. `cluster` or `Deployment`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKind(String);

impl ResourceKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceKind {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for ResourceKind {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Identity of a created resource
///
/// Returned by a successful create and the only input to read, update,
/// delete and existence checks. Delete takes it by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHandle {
    /// Provider-assigned identifier
    pub id: String,

    pub kind: ResourceKind,
}

impl ResourceHandle {
    pub fn new(kind: impl Into<ResourceKind>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
        }
    }
}

impl std::fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Snapshot of a resource as last reported by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedState {
    /// Declared attributes, projected through the kind's mutability table
    pub attributes: AttributeMap,

    /// Raw provider state string, e.g. `normal` or `pending_deletion`
    pub state: String,

    pub observed_at: DateTime<Utc>,
}

impl ObservedState {
    pub fn new(attributes: AttributeMap, state: impl Into<String>) -> Self {
        Self {
            attributes,
            state: state.into(),
            observed_at: Utc::now(),
        }
    }
}
