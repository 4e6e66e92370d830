//! Attribute diffing between observed and desired state
//!
//! The diff walks the mutability table, not the documents: attributes the
//! table does not declare are ignored, and computed fields are skipped since
//! the provider owns them. An absent attribute compares equal to its type's
//! zero value, except on defaulted fields, where it matches whatever the
//! provider filled in.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::attributes::AttributeMap;
use crate::error::{CoreError, Result};
use crate::path::AttributePath;
use crate::schema::{
    FieldSchema, FieldType, Mutability, ResourceSchema, covers, overlay, sets_equal, values_equal,
};

/// A single changed field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeChange {
    pub path: AttributePath,

    /// Observed value, `null` when absent
    pub old_value: JsonValue,

    /// Desired value, `null` when absent
    pub new_value: JsonValue,

    pub mutability: Mutability,
}

impl AttributeChange {
    /// Whether the desired value removes the attribute
    pub fn clears(&self, field_type: FieldType) -> bool {
        field_type.is_zero(&self.new_value)
    }
}

/// Diff engine bound to one mutability table
pub struct AttributeDiff<'a> {
    schema: &'a ResourceSchema,
}

impl<'a> AttributeDiff<'a> {
    pub fn new(schema: &'a ResourceSchema) -> Self {
        Self { schema }
    }

    /// Compute the changes needed to move `observed` to `desired`
    ///
    /// Fails with [`CoreError::ImmutableFieldChanged`] when any immutable
    /// field differs, in which case no changes are returned at all.
    pub fn diff(
        &self,
        observed: &AttributeMap,
        desired: &AttributeMap,
    ) -> Result<Vec<AttributeChange>> {
        let mut walk = Walk::default();
        walk.fields(
            &self.schema.fields,
            Some(observed.inner()),
            Some(desired.inner()),
            &AttributePath::root(),
            Mutability::Mutable,
        );

        if !walk.immutable.is_empty() {
            return Err(CoreError::ImmutableFieldChanged {
                paths: walk.immutable,
            });
        }

        Ok(walk.changes)
    }
}

/// Convenience wrapper around [`AttributeDiff`]
pub fn diff(
    schema: &ResourceSchema,
    observed: &AttributeMap,
    desired: &AttributeMap,
) -> Result<Vec<AttributeChange>> {
    AttributeDiff::new(schema).diff(observed, desired)
}

#[derive(Default)]
struct Walk {
    changes: Vec<AttributeChange>,
    immutable: Vec<AttributePath>,
}

impl Walk {
    fn fields(
        &mut self,
        fields: &IndexMap<String, FieldSchema>,
        old: Option<&JsonValue>,
        new: Option<&JsonValue>,
        prefix: &AttributePath,
        inherited: Mutability,
    ) {
        for (name, field) in fields {
            if field.computed {
                continue;
            }

            let path = prefix.child(name);
            let old_value = old.and_then(|node| node.get(name.as_str()));
            let new_value = new.and_then(|node| node.get(name.as_str()));

            if field.defaulted && new_value.is_none_or(JsonValue::is_null) {
                continue;
            }

            let mutability = match (inherited, field.mutability) {
                (Mutability::Mutable, Mutability::Mutable) => Mutability::Mutable,
                _ => Mutability::ImmutableForcesReplace,
            };

            if field.recurses() {
                self.fields(&field.fields, old_value, new_value, &path, mutability);
                continue;
            }

            if field_equal(field, old_value, new_value) {
                continue;
            }

            let old_value = old_value.cloned().unwrap_or(JsonValue::Null);
            let new_value = new_value.cloned().unwrap_or(JsonValue::Null);
            match mutability {
                Mutability::ImmutableForcesReplace => self.immutable.push(path),
                Mutability::Mutable => self.changes.push(AttributeChange {
                    path,
                    new_value: if field.defaulted {
                        overlay(&old_value, &new_value)
                    } else {
                        new_value
                    },
                    old_value,
                    mutability,
                }),
            }
        }
    }
}

fn field_equal(field: &FieldSchema, old: Option<&JsonValue>, new: Option<&JsonValue>) -> bool {
    let old = old.filter(|v| !v.is_null());
    let new = new.filter(|v| !v.is_null());

    if field.defaulted {
        return match (old, new) {
            (_, None) => true,
            (None, Some(v)) => field.field_type.is_zero(v),
            (Some(a), Some(b)) if field.field_type == FieldType::Set => sets_equal(a, b),
            (Some(a), Some(b)) => covers(a, b),
        };
    }

    match (old, new) {
        (None, None) => true,
        (Some(v), None) | (None, Some(v)) => field.field_type.is_zero(v),
        (Some(a), Some(b)) if field.field_type == FieldType::Set => sets_equal(a, b),
        (Some(a), Some(b)) => values_equal(a, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn server_schema() -> ResourceSchema {
        ResourceSchema::new("server")
            .field("name", FieldSchema::string())
            .field("datacenter", FieldSchema::string().immutable())
            .field("tags", FieldSchema::set())
            .field("ssh_keys", FieldSchema::list())
            .field(
                "network",
                FieldSchema::object([
                    ("public_bandwidth", FieldSchema::integer()),
                    ("private_only", FieldSchema::boolean()),
                ]),
            )
            .field("status", FieldSchema::string().computed())
    }

    fn attrs(yaml: &str) -> AttributeMap {
        AttributeMap::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_identical_documents_have_no_changes() {
        let schema = server_schema();
        let doc = attrs(
            r#"
name: web-1
datacenter: ams01
tags: [web, prod]
network:
  public_bandwidth: 1000
"#,
        );

        assert!(diff(&schema, &doc, &doc).unwrap().is_empty());
    }

    #[test]
    fn test_scalar_change() {
        let schema = server_schema();
        let old = attrs("name: web-1\ndatacenter: ams01\n");
        let new = attrs("name: web-2\ndatacenter: ams01\n");

        let changes = diff(&schema, &old, &new).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, AttributePath::new(["name"]));
        assert_eq!(changes[0].old_value, json!("web-1"));
        assert_eq!(changes[0].new_value, json!("web-2"));
        assert_eq!(changes[0].mutability, Mutability::Mutable);
    }

    #[test]
    fn test_absent_equals_zero_value() {
        let schema = server_schema();
        let old = attrs("name: web-1\ntags: []\nnetwork:\n  private_only: false\n");
        let new = attrs("name: web-1\n");

        assert!(diff(&schema, &old, &new).unwrap().is_empty());
    }

    #[test]
    fn test_set_ignores_order_list_does_not() {
        let schema = server_schema();
        let old = attrs("tags: [a, b]\nssh_keys: [k1, k2]\n");
        let new = attrs("tags: [b, a]\nssh_keys: [k2, k1]\n");

        let changes = diff(&schema, &old, &new).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, AttributePath::new(["ssh_keys"]));
        assert_eq!(changes[0].new_value, json!(["k2", "k1"]));
    }

    #[test]
    fn test_nested_object_recurses_per_child() {
        let schema = server_schema();
        let old = attrs("network:\n  public_bandwidth: 100\n  private_only: false\n");
        let new = attrs("network:\n  public_bandwidth: 1000\n  private_only: false\n");

        let changes = diff(&schema, &old, &new).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(
            changes[0].path,
            AttributePath::new(["network", "public_bandwidth"])
        );
    }

    #[test]
    fn test_immutable_change_returns_error_and_no_changes() {
        let schema = server_schema();
        let old = attrs("name: web-1\ndatacenter: ams01\n");
        let new = attrs("name: web-2\ndatacenter: dal10\n");

        match diff(&schema, &old, &new) {
            Err(CoreError::ImmutableFieldChanged { paths }) => {
                assert_eq!(paths, vec![AttributePath::new(["datacenter"])]);
            }
            other => panic!("expected ImmutableFieldChanged, got {:?}", other),
        }
    }

    #[test]
    fn test_computed_and_undeclared_fields_ignored() {
        let schema = server_schema();
        let old = attrs("name: web-1\nstatus: active\nnotes: old\n");
        let new = attrs("name: web-1\nstatus: provisioning\nnotes: new\n");

        assert!(diff(&schema, &old, &new).unwrap().is_empty());
    }

    #[test]
    fn test_immutability_inherited_by_children() {
        let schema = ResourceSchema::new("app").field(
            "placement",
            FieldSchema::object([("zone", FieldSchema::string())]).immutable(),
        );
        let old = attrs("placement:\n  zone: a\n");
        let new = attrs("placement:\n  zone: b\n");

        let err = diff(&schema, &old, &new).unwrap_err();
        assert!(err.is_schema_error());
    }

    #[test]
    fn test_atomic_object_compared_whole() {
        let schema = ResourceSchema::new("deployment").field(
            "template",
            FieldSchema::object([
                ("image", FieldSchema::string()),
                ("command", FieldSchema::list()),
            ])
            .atomic(),
        );
        let old = attrs("template:\n  image: nginx:1.25\n  command: [nginx]\n");
        let new = attrs("template:\n  image: nginx:1.27\n  command: [nginx]\n");

        let changes = diff(&schema, &old, &new).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, AttributePath::new(["template"]));
        assert_eq!(changes[0].new_value["image"], "nginx:1.27");
    }

    fn deployment_schema() -> ResourceSchema {
        ResourceSchema::new("Deployment")
            .field(
                "annotations",
                FieldSchema::map().omit_if_empty().defaulted(),
            )
            .field("replicas", FieldSchema::integer().defaulted())
            .field("revision_history_limit", FieldSchema::integer().defaulted())
            .field("template", FieldSchema::any().defaulted())
    }

    #[test]
    fn test_defaulted_fields_absent_from_desired_are_kept() {
        let schema = deployment_schema();
        let old = attrs(
            r#"
annotations:
  revision: "3"
replicas: 1
revision_history_limit: 10
template:
  image: nginx
  pull_policy: IfNotPresent
"#,
        );
        let new = attrs("template:\n  image: nginx\n");

        assert!(diff(&schema, &old, &new).unwrap().is_empty());
    }

    #[test]
    fn test_defaulted_change_overlays_observed() {
        let schema = deployment_schema();
        let old = attrs(
            r#"
annotations:
  revision: "3"
template:
  image: nginx:1.25
  pull_policy: IfNotPresent
"#,
        );
        let new = attrs("annotations:\n  team: web\ntemplate:\n  image: nginx:1.27\n");

        let changes = diff(&schema, &old, &new).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].path, AttributePath::new(["annotations"]));
        assert_eq!(changes[0].new_value, json!({"revision": "3", "team": "web"}));
        assert_eq!(changes[1].path, AttributePath::new(["template"]));
        assert_eq!(
            changes[1].new_value,
            json!({"image": "nginx:1.27", "pull_policy": "IfNotPresent"})
        );
    }

    #[test]
    fn test_defaulted_lists_compared_per_element() {
        let schema = ResourceSchema::new("Service").field("ports", FieldSchema::list().defaulted());
        let old = attrs("ports:\n  - port: 80\n    protocol: TCP\n    targetPort: 80\n");

        assert!(diff(&schema, &old, &attrs("ports:\n  - port: 80\n")).unwrap().is_empty());
        assert_eq!(
            diff(&schema, &old, &attrs("ports:\n  - port: 8080\n")).unwrap().len(),
            1
        );
        assert_eq!(
            diff(&schema, &old, &attrs("ports:\n  - port: 80\n  - port: 443\n")).unwrap().len(),
            1
        );
    }
}
