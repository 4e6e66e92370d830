//! Error types for converge-kube

use thiserror::Error;

use converge_engine::ClientError;

/// Result type for converge-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while talking to a cluster
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Kubeconfig could not be loaded or inferred
    #[error("invalid kubeconfig: {0}")]
    Config(String),

    /// Kind not served by the cluster
    #[error("resource kind '{kind}' is not served by the cluster\nHint: check the CRD is installed and the kind is spelled as in `kubectl api-resources`")]
    UnknownKind { kind: String },

    /// Object cannot be addressed
    #[error("invalid object: {0}")]
    InvalidObject(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 409)
    }
}

impl From<KubeError> for ClientError {
    fn from(e: KubeError) -> Self {
        match e {
            KubeError::Api(e) => classify(e),
            other => ClientError::Rejected(other.to_string()),
        }
    }
}

/// Map a client error onto the façade's retry classes
///
/// 404 is not found, 409 a conflict. Throttling, server errors and
/// transport failures are transient. Anything else is a rejection.
pub fn classify(e: kube::Error) -> ClientError {
    match &e {
        kube::Error::Api(resp) => match resp.code {
            404 => ClientError::NotFound(resp.message.clone()),
            409 => ClientError::Conflict(resp.message.clone()),
            429 | 500..=599 => ClientError::Transient(resp.message.clone()),
            _ => ClientError::Rejected(resp.message.clone()),
        },
        kube::Error::HyperError(_) | kube::Error::Service(_) | kube::Error::ReadEvents(_) => {
            ClientError::Transient(e.to_string())
        }
        _ => ClientError::Rejected(e.to_string()),
    }
}
