//! CLI error types with exit code handling
//!
//! Library errors are folded into one diagnostic type so `main` can render
//! them with miette and exit with the matching code.

use miette::Diagnostic;
use thiserror::Error;

use converge_core::CoreError;
use converge_engine::EngineError;
use converge_kube::KubeError;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Invalid arguments or manifest content
    #[error("{message}")]
    #[diagnostic(code(converge::cli::usage))]
    Usage {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// The change cannot be applied in place
    #[error("{message}")]
    #[diagnostic(code(converge::cli::validation))]
    Validation {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Resource never reached a ready state
    #[error("{message}")]
    #[diagnostic(code(converge::cli::convergence))]
    Convergence {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("{message}")]
    #[diagnostic(code(converge::cli::not_found))]
    NotFound { message: String },

    #[error("{message}")]
    #[diagnostic(code(converge::cli::conflict))]
    Conflict {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Control plane call failed
    #[error("{message}")]
    #[diagnostic(code(converge::cli::remote))]
    Remote {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(converge::cli::io))]
    Io { message: String },

    /// Wrapped error for passthrough (stores the formatted message)
    #[error("{message}")]
    #[diagnostic(code(converge::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage { .. } => exit_codes::USAGE_ERROR,
            CliError::Validation { .. } => exit_codes::VALIDATION_ERROR,
            CliError::Convergence { .. } => exit_codes::CONVERGENCE_ERROR,
            CliError::NotFound { .. } => exit_codes::NOT_FOUND,
            CliError::Conflict { .. } => exit_codes::CONFLICT,
            CliError::Remote { .. } => exit_codes::REMOTE_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    /// Create a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
            help: None,
        }
    }

    /// Create a usage error with help text
    pub fn usage_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }
}

/// Split a library message at its `Hint:` line
fn split_hint(message: String) -> (String, Option<String>) {
    match message.split_once("\nHint: ") {
        Some((message, hint)) => (message.to_string(), Some(hint.to_string())),
        None => (message, None),
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        let (message, help) = split_hint(err.to_string());

        match err.root_cause() {
            EngineError::UnknownKind { .. } | EngineError::InvalidTarget(_) => CliError::Usage {
                message,
                help: help.or_else(|| Some("run `converge kinds` to list known kinds".to_string())),
            },
            EngineError::InvalidConfig { .. } | EngineError::Serialization(_) => {
                CliError::Usage { message, help }
            }
            EngineError::ImmutableFieldChanged { .. } | EngineError::UnpatchableField { .. } => {
                CliError::Validation { message, help }
            }
            EngineError::ConvergenceFailed { .. }
            | EngineError::ConvergenceTimeout { .. }
            | EngineError::Cancelled { .. } => CliError::Convergence {
                message,
                help: help.or_else(|| {
                    Some("the resource was left in place; inspect it with `converge status`".to_string())
                }),
            },
            EngineError::NotFound { .. } => CliError::NotFound { message },
            EngineError::AlreadyExists { .. } => CliError::Conflict { message, help },
            EngineError::Remote { .. } => CliError::Remote {
                message,
                help: err
                    .is_retryable()
                    .then(|| "the failure looks transient; retrying may succeed".to_string()),
            },
            EngineError::Io(_) => CliError::Io { message },
            _ => CliError::Other { message },
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => CliError::from(e),
            e if e.is_schema_error() => CliError::from(EngineError::from(e)),
            e => CliError::Usage {
                message: e.to_string(),
                help: None,
            },
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        let not_found = err.is_not_found();
        let (message, help) = split_hint(err.to_string());
        match err {
            KubeError::UnknownKind { .. } => CliError::Usage { message, help },
            KubeError::Config(_) => CliError::Usage {
                message,
                help: Some("set KUBECONFIG or pass --context".to_string()),
            },
            _ if not_found => CliError::NotFound { message },
            _ => CliError::Remote { message, help },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Other {
            message: format!("failed to render JSON: {}", err),
        }
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        CliError::Other {
            message: format!("failed to render YAML: {}", err),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
