//! Error types for converge-engine

use std::time::Duration;
use thiserror::Error;

use converge_core::{AttributePath, CoreError, ResourceHandle, ResourceKind};

use crate::session::ClientError;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while reconciling a resource
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Duplicate guard found a resource with the same natural key
    #[error("{kind} '{key}' already exists{}\nHint: import the existing resource or choose another name", id_suffix(.id))]
    AlreadyExists {
        kind: ResourceKind,
        key: String,
        id: Option<String>,
    },

    #[error("resource {handle} not found")]
    NotFound { handle: ResourceHandle },

    #[error(
        "cannot change immutable field(s) {}\nHint: the resource must be destroyed and recreated to apply this change",
        join_paths(.paths)
    )]
    ImmutableFieldChanged { paths: Vec<AttributePath> },

    #[error("field '{path}' cannot be updated: {reason}")]
    UnpatchableField { path: AttributePath, reason: String },

    /// Resource reached a failed state
    #[error("{resource} failed to converge: reached state '{state}'")]
    ConvergenceFailed { resource: String, state: String },

    /// Resource was still pending when the timeout elapsed
    #[error(
        "{resource} did not converge within {}{}{}",
        whole_seconds(.elapsed),
        last_state_suffix(.last_state),
        last_error_suffix(.last_error)
    )]
    ConvergenceTimeout {
        resource: String,
        last_state: Option<String>,
        last_error: Option<String>,
        elapsed: Duration,
    },

    #[error("wait for {resource} cancelled")]
    Cancelled { resource: String },

    /// Remote call failure, tagged with the operation and resource
    #[error("{operation} {resource}: {source}")]
    Remote {
        operation: &'static str,
        resource: String,
        #[source]
        source: ClientError,
    },

    /// Create succeeded but a later sub-step failed; nothing is rolled back
    #[error("{handle} was created but {step} failed: {source}")]
    PartialCreate {
        handle: ResourceHandle,
        step: String,
        #[source]
        source: Box<EngineError>,
    },

    #[error("invalid convergence target: {0}")]
    InvalidTarget(String),

    #[error("unknown resource kind '{kind}'{}", suggestion_suffix(.suggestion))]
    UnknownKind {
        kind: String,
        suggestion: Option<String>,
    },

    #[error("core error: {0}")]
    Core(CoreError),

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CoreError> for EngineError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::ImmutableFieldChanged { paths } => EngineError::ImmutableFieldChanged { paths },
            CoreError::UnpatchableField { path, reason } => {
                EngineError::UnpatchableField { path, reason }
            }
            other => EngineError::Core(other),
        }
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(e: serde_yaml::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}

impl EngineError {
    pub(crate) fn remote(
        operation: &'static str,
        resource: impl std::fmt::Display,
        source: ClientError,
    ) -> Self {
        EngineError::Remote {
            operation,
            resource: resource.to_string(),
            source,
        }
    }

    /// Transient transport or API failures
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Remote { source, .. } => source.is_retryable(),
            EngineError::PartialCreate { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            EngineError::NotFound { .. } => true,
            EngineError::Remote { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// The failure behind any partial-create wrapping
    pub fn root_cause(&self) -> &EngineError {
        match self {
            EngineError::PartialCreate { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

fn join_paths(paths: &[AttributePath]) -> String {
    paths
        .iter()
        .map(|p| format!("'{}'", p))
        .collect::<Vec<_>>()
        .join(", ")
}

fn id_suffix(id: &Option<String>) -> String {
    match id {
        Some(id) => format!(" (id {})", id),
        None => String::new(),
    }
}

fn whole_seconds(elapsed: &Duration) -> String {
    format!("{}s", elapsed.as_secs())
}

fn last_state_suffix(state: &Option<String>) -> String {
    match state {
        Some(state) => format!(" (last state '{}')", state),
        None => String::new(),
    }
}

fn last_error_suffix(error: &Option<String>) -> String {
    match error {
        Some(error) => format!("\nLast error: {}", error),
        None => String::new(),
    }
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!("\nHint: did you mean '{}'?", s),
        None => String::new(),
    }
}
