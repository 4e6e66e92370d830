//! Converge Core - attribute model and update translation
//!
//! This crate holds the pure half of the reconciliation engine:
//! - `AttributeMap`: desired and observed attribute documents
//! - `ResourceSchema`: per-field mutability table
//! - `AttributeDiff`: observed vs desired comparison
//! - `PatchBuilder`: changes to ordered wire-level patch operations
//! - `Plan`: side-effect free update preview

pub mod attributes;
pub mod diff;
pub mod error;
pub mod patch;
pub mod path;
pub mod plan;
pub mod resource;
pub mod schema;

pub use attributes::{AttributeMap, DesiredState, Override};
pub use diff::{AttributeChange, AttributeDiff, diff};
pub use error::{CoreError, Result};
pub use patch::{PatchBuilder, PatchOperation, PatchOperationKind, apply_patch, coalesce};
pub use path::AttributePath;
pub use plan::{Plan, plan};
pub use resource::{ObservedState, ResourceHandle, ResourceKind};
pub use schema::{FieldSchema, FieldType, Mutability, PatchMapping, ResourceSchema};
