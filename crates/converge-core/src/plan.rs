//! Side-effect free update preview

use serde::Serialize;

use crate::attributes::AttributeMap;
use crate::diff::{AttributeChange, AttributeDiff};
use crate::error::{CoreError, Result};
use crate::patch::{PatchBuilder, PatchOperation};
use crate::path::AttributePath;
use crate::schema::ResourceSchema;

/// What an update from `observed` to `desired` would do
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Plan {
    /// Documents already agree on every declared field
    NoChange,

    /// In-place update
    #[serde(rename_all = "camelCase")]
    Update {
        changes: Vec<AttributeChange>,
        operations: Vec<PatchOperation>,
        /// At least one change triggers asynchronous re-provisioning
        reprovisions: bool,
    },

    /// Immutable fields differ; the resource must be recreated
    Replace { paths: Vec<AttributePath> },
}

impl Plan {
    pub fn is_no_change(&self) -> bool {
        matches!(self, Plan::NoChange)
    }

    pub fn operations(&self) -> &[PatchOperation] {
        match self {
            Plan::Update { operations, .. } => operations,
            _ => &[],
        }
    }
}

/// Diff and build without touching any remote system
///
/// Immutable changes are reported as [`Plan::Replace`] rather than an
/// error; unpatchable fields still fail.
pub fn plan(schema: &ResourceSchema, observed: &AttributeMap, desired: &AttributeMap) -> Result<Plan> {
    let changes = match AttributeDiff::new(schema).diff(observed, desired) {
        Ok(changes) => changes,
        Err(CoreError::ImmutableFieldChanged { paths }) => return Ok(Plan::Replace { paths }),
        Err(e) => return Err(e),
    };

    if changes.is_empty() {
        return Ok(Plan::NoChange);
    }

    let operations = PatchBuilder::new(schema).build(&changes, observed)?;
    let reprovisions = changes.iter().any(|c| schema.reprovisions(&c.path));

    Ok(Plan::Update {
        changes,
        operations,
        reprovisions,
    })
}
