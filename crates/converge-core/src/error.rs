//! Core error types

use thiserror::Error;

use crate::path::AttributePath;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error(
        "cannot change immutable field(s) {}\nHint: the resource must be destroyed and recreated to apply this change",
        join_paths(.paths)
    )]
    ImmutableFieldChanged { paths: Vec<AttributePath> },

    #[error("field '{path}' has no patch mapping: {reason}")]
    UnpatchableField { path: AttributePath, reason: String },

    #[error("invalid attribute path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("cannot apply patch at '{path}': {reason}")]
    PatchFailed { path: AttributePath, reason: String },

    #[error("invalid assignment '{0}': expected path=value")]
    InvalidAssignment(String),

    #[error("cannot set '{path}' to '{value}': expected {expected}")]
    InvalidValue {
        path: AttributePath,
        value: String,
        expected: &'static str,
    },

    #[error("invalid attribute document: {message}")]
    InvalidDocument { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Schema-level defects and replacement requirements are never worth retrying
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            CoreError::ImmutableFieldChanged { .. } | CoreError::UnpatchableField { .. }
        )
    }
}

fn join_paths(paths: &[AttributePath]) -> String {
    paths
        .iter()
        .map(|p| format!("'{}'", p))
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, CoreError>;
