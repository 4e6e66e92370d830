//! Translation of attribute changes into wire-level patch operations
//!
//! Operations follow JSON Patch (RFC 6902) semantics and serialize in that
//! format. The builder guarantees two properties providers rely on when
//! they apply patches non-atomically:
//!
//! - every operation's parent exists by the time it is applied, because
//!   additions under a missing object are folded into one addition of the
//!   outermost missing object, and additions under a scalar are folded into
//!   one replacement of it;
//! - no operation targets a path inside one already replaced, added or
//!   removed by an earlier operation.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::attributes::{AttributeMap, lookup, lookup_mut, set_nested, type_name};
use crate::diff::AttributeChange;
use crate::error::{CoreError, Result};
use crate::path::AttributePath;
use crate::schema::{Mutability, PatchMapping, ResourceSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOperationKind {
    Add,
    Remove,
    Replace,
}

impl std::fmt::Display for PatchOperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatchOperationKind::Add => write!(f, "add"),
            PatchOperationKind::Remove => write!(f, "remove"),
            PatchOperationKind::Replace => write!(f, "replace"),
        }
    }
}

/// A single path-addressed mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    #[serde(rename = "op")]
    pub kind: PatchOperationKind,

    pub path: AttributePath,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
}

impl PatchOperation {
    pub fn add(path: AttributePath, value: JsonValue) -> Self {
        Self {
            kind: PatchOperationKind::Add,
            path,
            value: Some(value),
        }
    }

    pub fn replace(path: AttributePath, value: JsonValue) -> Self {
        Self {
            kind: PatchOperationKind::Replace,
            path,
            value: Some(value),
        }
    }

    pub fn remove(path: AttributePath) -> Self {
        Self {
            kind: PatchOperationKind::Remove,
            path,
            value: None,
        }
    }
}

impl std::fmt::Display for PatchOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{} {} = {}", self.kind, self.path, value),
            None => write!(f, "{} {}", self.kind, self.path),
        }
    }
}

/// Patch builder bound to one mutability table
pub struct PatchBuilder<'a> {
    schema: &'a ResourceSchema,
}

impl<'a> PatchBuilder<'a> {
    pub fn new(schema: &'a ResourceSchema) -> Self {
        Self { schema }
    }

    /// Build the ordered operation list for a set of changes
    ///
    /// `observed` is the document the changes were computed against; it
    /// decides between `add` and `replace`.
    pub fn build(
        &self,
        changes: &[AttributeChange],
        observed: &AttributeMap,
    ) -> Result<Vec<PatchOperation>> {
        let mut operations = Vec::with_capacity(changes.len());

        for change in changes {
            if change.mutability == Mutability::ImmutableForcesReplace {
                return Err(CoreError::ImmutableFieldChanged {
                    paths: vec![change.path.clone()],
                });
            }

            let field = self
                .schema
                .lookup(&change.path)
                .ok_or_else(|| CoreError::UnpatchableField {
                    path: change.path.clone(),
                    reason: format!("not declared in the '{}' table", self.schema.kind),
                })?;

            let wire_path = match &field.patch {
                PatchMapping::SamePath => change.path.clone(),
                PatchMapping::At(path) => path.clone(),
                PatchMapping::Unsupported => {
                    return Err(CoreError::UnpatchableField {
                        path: change.path.clone(),
                        reason: "the provider exposes no update for it".to_string(),
                    });
                }
            };

            let exists = observed.contains(&change.path);

            if change.clears(field.field_type) && field.omit_if_empty {
                // Present before, absent now; nothing to do if the provider
                // never reported it
                if exists {
                    operations.push(PatchOperation::remove(wire_path));
                }
                continue;
            }

            let value = if change.new_value.is_null() {
                field.field_type.zero_value()
            } else {
                change.new_value.clone()
            };

            if exists {
                operations.push(PatchOperation::replace(wire_path, value));
                continue;
            }

            // Only same-path mappings can be checked against the observed
            // document; remapped wire paths are assumed to have a parent
            let blocked = match field.patch {
                PatchMapping::SamePath => outermost_unusable_ancestor(observed, &change.path),
                _ => None,
            };

            match blocked {
                Some((ancestor, kind)) => {
                    let rest = change.path.relative_to(&ancestor).unwrap_or_default();
                    let pending = operations
                        .iter_mut()
                        .find(|op: &&mut PatchOperation| op.kind == kind && op.path == ancestor);
                    match pending.and_then(|op| op.value.as_mut()) {
                        Some(container) => set_nested(container, rest, value),
                        None => {
                            let mut wrapped = JsonValue::Object(serde_json::Map::new());
                            set_nested(&mut wrapped, rest, value);
                            operations.push(PatchOperation {
                                kind,
                                path: ancestor,
                                value: Some(wrapped),
                            });
                        }
                    }
                }
                None => operations.push(PatchOperation::add(wire_path, value)),
            }
        }

        Ok(coalesce(operations))
    }
}

/// Outermost ancestor that cannot take the change as a child
///
/// An absent or null ancestor is created with `add`; one holding a scalar
/// or list where the table declares an object is overwritten with
/// `replace`.
fn outermost_unusable_ancestor(
    observed: &AttributeMap,
    path: &AttributePath,
) -> Option<(AttributePath, PatchOperationKind)> {
    (1..path.len())
        .map(|len| path.truncate(len))
        .find_map(|ancestor| match observed.get(&ancestor) {
            None | Some(JsonValue::Null) => Some((ancestor, PatchOperationKind::Add)),
            Some(JsonValue::Object(_)) => None,
            Some(_) => Some((ancestor, PatchOperationKind::Replace)),
        })
}

/// Enforce the ordering invariant
///
/// An operation whose path lies under an earlier add or replace is folded
/// into that operation's value; one under an earlier remove is dropped. An
/// operation on an ancestor of earlier operations supersedes them.
pub fn coalesce(operations: Vec<PatchOperation>) -> Vec<PatchOperation> {
    let mut out: Vec<PatchOperation> = Vec::with_capacity(operations.len());

    for op in operations {
        if let Some(parent) = out.iter_mut().find(|p| p.path.is_ancestor_of(&op.path)) {
            let rest = op.path.relative_to(&parent.path).unwrap_or_default().to_vec();
            match (parent.kind, parent.value.as_mut()) {
                (PatchOperationKind::Remove, _) | (_, None) => {}
                (_, Some(container)) => match op.kind {
                    PatchOperationKind::Remove => {
                        if let Some((last, init)) = rest.split_last()
                            && let Some(JsonValue::Object(map)) = lookup_mut(container, init)
                        {
                            map.remove(last);
                        }
                    }
                    _ => set_nested(container, &rest, op.value.unwrap_or(JsonValue::Null)),
                },
            }
            continue;
        }

        out.retain(|earlier| !op.path.is_prefix_of(&earlier.path));
        out.push(op);
    }

    out
}

/// Apply operations to a document with RFC 6902 semantics
pub fn apply_patch(document: &mut JsonValue, operations: &[PatchOperation]) -> Result<()> {
    for op in operations {
        apply_one(document, op)?;
    }
    Ok(())
}

fn apply_one(document: &mut JsonValue, op: &PatchOperation) -> Result<()> {
    let fail = |reason: String| CoreError::PatchFailed {
        path: op.path.clone(),
        reason,
    };

    let Some((key, parent_path)) = op.path.segments().split_last() else {
        // Whole-document operations
        return match op.kind {
            PatchOperationKind::Remove => Err(fail("cannot remove the document root".into())),
            _ => {
                *document = op.value.clone().unwrap_or(JsonValue::Null);
                Ok(())
            }
        };
    };

    if op.kind == PatchOperationKind::Replace && lookup(document, op.path.segments()).is_none() {
        return Err(fail("target does not exist".into()));
    }

    let parent = lookup_mut(document, parent_path)
        .ok_or_else(|| fail("parent does not exist".into()))?;

    match (op.kind, parent) {
        (PatchOperationKind::Remove, JsonValue::Object(map)) => map
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| fail("target does not exist".into())),
        (PatchOperationKind::Remove, JsonValue::Array(items)) => {
            let index = array_index(key, items.len(), false)
                .ok_or_else(|| fail("index out of range".into()))?;
            items.remove(index);
            Ok(())
        }
        (_, JsonValue::Object(map)) => {
            map.insert(key.clone(), op.value.clone().unwrap_or(JsonValue::Null));
            Ok(())
        }
        (kind, JsonValue::Array(items)) => {
            let value = op.value.clone().unwrap_or(JsonValue::Null);
            let appending = kind == PatchOperationKind::Add;
            let index = array_index(key, items.len(), appending)
                .ok_or_else(|| fail("index out of range".into()))?;
            if appending {
                items.insert(index, value);
            } else {
                items[index] = value;
            }
            Ok(())
        }
        (_, other) => Err(fail(format!("parent is a {}, not a container", type_name(other)))),
    }
}

/// Resolve an array segment; `-` and `len` are only valid when inserting
fn array_index(segment: &str, len: usize, inserting: bool) -> Option<usize> {
    if segment == "-" {
        return inserting.then_some(len);
    }
    let index = segment.parse::<usize>().ok()?;
    let bound = if inserting { len } else { len.saturating_sub(1) };
    (len > 0 || inserting).then_some(index).filter(|i| *i <= bound)
}
