//! Mutability tables
//!
//! The schema layer proper (types, defaults, validation) lives outside this
//! crate. What the reconciliation engine consumes is a table telling it, per
//! field, how to compare it, whether it may change in place, and where a
//! change lands on the wire.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::attributes::AttributeMap;
use crate::error::{CoreError, Result};
use crate::path::AttributePath;

/// Comparison type of a field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    /// Ordered collection, compared as a whole
    List,
    /// Unordered collection, compared as a whole ignoring order
    Set,
    /// String-keyed mapping, compared as a whole
    Map,
    /// Nested object with declared children
    Object,
    Any,
}

impl FieldType {
    /// Value an absent attribute is equivalent to
    pub fn zero_value(&self) -> JsonValue {
        match self {
            FieldType::String => JsonValue::String(String::new()),
            FieldType::Integer | FieldType::Number => JsonValue::from(0),
            FieldType::Boolean => JsonValue::Bool(false),
            FieldType::List | FieldType::Set => JsonValue::Array(Vec::new()),
            FieldType::Map | FieldType::Object => JsonValue::Object(serde_json::Map::new()),
            FieldType::Any => JsonValue::Null,
        }
    }

    pub fn is_zero(&self, value: &JsonValue) -> bool {
        value.is_null() || values_equal(value, &self.zero_value())
    }
}

/// Update eligibility of a field
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Mutability {
    #[default]
    Mutable,
    /// Changing the field requires destroying and recreating the resource
    ImmutableForcesReplace,
}

/// Where a change to a field is sent
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PatchMapping {
    /// Wire path equals the attribute path
    #[default]
    SamePath,
    /// Wire path differs from the attribute path
    At(AttributePath),
    /// No update call exists for this field
    Unsupported,
}

/// One row of the mutability table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default)]
    pub mutability: Mutability,

    /// Zero values are sent as removals rather than explicit zeros
    #[serde(default)]
    pub omit_if_empty: bool,

    /// Populated by the provider, never diffed
    #[serde(default)]
    pub computed: bool,

    /// Object compared and patched as one value
    #[serde(default)]
    pub atomic: bool,

    /// Changing the field triggers asynchronous re-provisioning
    #[serde(default)]
    pub reprovisions: bool,

    /// The provider fills in whatever the desired state leaves unset
    ///
    /// Only what the desired state declares is compared: an absent desired
    /// value matches anything, and keys or object members the desired state
    /// never names are kept as observed.
    #[serde(default)]
    pub defaulted: bool,

    #[serde(default)]
    pub patch: PatchMapping,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub fields: IndexMap<String, FieldSchema>,
}

impl FieldSchema {
    pub fn of(field_type: FieldType) -> Self {
        Self {
            field_type,
            mutability: Mutability::Mutable,
            omit_if_empty: false,
            computed: false,
            atomic: false,
            reprovisions: false,
            defaulted: false,
            patch: PatchMapping::SamePath,
            description: None,
            fields: IndexMap::new(),
        }
    }

    pub fn string() -> Self {
        Self::of(FieldType::String)
    }

    pub fn integer() -> Self {
        Self::of(FieldType::Integer)
    }

    pub fn number() -> Self {
        Self::of(FieldType::Number)
    }

    pub fn boolean() -> Self {
        Self::of(FieldType::Boolean)
    }

    pub fn list() -> Self {
        Self::of(FieldType::List)
    }

    pub fn set() -> Self {
        Self::of(FieldType::Set)
    }

    pub fn map() -> Self {
        Self::of(FieldType::Map)
    }

    pub fn any() -> Self {
        Self::of(FieldType::Any)
    }

    /// Nested object with the given children, in declaration order
    pub fn object<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, FieldSchema)>,
        S: Into<String>,
    {
        let mut schema = Self::of(FieldType::Object);
        schema.fields = fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
        schema
    }

    pub fn immutable(mut self) -> Self {
        self.mutability = Mutability::ImmutableForcesReplace;
        self
    }

    pub fn omit_if_empty(mut self) -> Self {
        self.omit_if_empty = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn atomic(mut self) -> Self {
        self.atomic = true;
        self
    }

    pub fn reprovisions(mut self) -> Self {
        self.reprovisions = true;
        self
    }

    pub fn defaulted(mut self) -> Self {
        self.defaulted = true;
        self
    }

    pub fn patch_at(mut self, wire_path: AttributePath) -> Self {
        self.patch = PatchMapping::At(wire_path);
        self
    }

    pub fn unpatchable(mut self) -> Self {
        self.patch = PatchMapping::Unsupported;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_mutable(&self) -> bool {
        self.mutability == Mutability::Mutable
    }

    /// Whether children are diffed individually
    pub fn recurses(&self) -> bool {
        self.field_type == FieldType::Object && !self.atomic && !self.fields.is_empty()
    }
}

/// Mutability table for one resource kind
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSchema {
    pub kind: String,
    pub fields: IndexMap<String, FieldSchema>,
}

impl ResourceSchema {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: IndexMap::new(),
        }
    }

    /// Declare a top-level field
    pub fn field(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.fields.insert(name.into(), schema);
        self
    }

    /// Find the schema row for a path, descending through objects
    pub fn lookup(&self, path: &AttributePath) -> Option<&FieldSchema> {
        let (first, rest) = path.segments().split_first()?;
        let mut field = self.fields.get(first)?;
        for segment in rest {
            field = field.fields.get(segment)?;
        }
        Some(field)
    }

    /// Type a raw command-line value by the row at `path`
    ///
    /// Entries below a `map` row stay strings. Other paths the table does
    /// not reach, and `any` rows, take the value's YAML reading.
    pub fn coerce(&self, path: &AttributePath, raw: &str) -> Result<JsonValue> {
        let invalid = |expected: &'static str| CoreError::InvalidValue {
            path: path.clone(),
            value: raw.to_string(),
            expected,
        };

        let Some(field) = self.lookup(path) else {
            let under_map = (1..path.len()).any(|depth| {
                self.lookup(&AttributePath::new(path.segments()[..depth].iter().cloned()))
                    .is_some_and(|f| f.field_type == FieldType::Map)
            });
            if under_map {
                return Ok(JsonValue::String(raw.to_string()));
            }
            return read_yaml_scalar(raw);
        };

        match field.field_type {
            FieldType::String => Ok(JsonValue::String(raw.to_string())),
            FieldType::Integer => raw
                .trim()
                .parse::<i64>()
                .map(JsonValue::from)
                .map_err(|_| invalid("an integer")),
            FieldType::Number => raw
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(JsonValue::Number)
                .ok_or_else(|| invalid("a number")),
            FieldType::Boolean => match raw.trim() {
                "true" => Ok(JsonValue::Bool(true)),
                "false" => Ok(JsonValue::Bool(false)),
                _ => Err(invalid("true or false")),
            },
            FieldType::List | FieldType::Set => match read_yaml_scalar(raw)? {
                list @ JsonValue::Array(_) => Ok(list),
                _ => Err(invalid("a list such as [a, b]")),
            },
            FieldType::Map | FieldType::Object => match read_yaml_scalar(raw)? {
                map @ JsonValue::Object(_) => Ok(map),
                _ => Err(invalid("a mapping such as {key: value}")),
            },
            FieldType::Any => read_yaml_scalar(raw),
        }
    }

    /// Schema rows from the root down to `path`, in order
    pub fn ancestry(&self, path: &AttributePath) -> Vec<&FieldSchema> {
        let mut chain = Vec::new();
        let mut fields = &self.fields;
        for segment in path.segments() {
            match fields.get(segment) {
                Some(field) => {
                    chain.push(field);
                    fields = &field.fields;
                }
                None => break,
            }
        }
        chain
    }

    /// A change at `path` triggers re-provisioning when the field or any
    /// enclosing object is marked so
    pub fn reprovisions(&self, path: &AttributePath) -> bool {
        self.ancestry(path).iter().any(|f| f.reprovisions)
    }

    /// Effective mutability: immutability is inherited from enclosing objects
    pub fn mutability(&self, path: &AttributePath) -> Mutability {
        if self.ancestry(path).iter().any(|f| !f.is_mutable()) {
            Mutability::ImmutableForcesReplace
        } else {
            Mutability::Mutable
        }
    }

    /// Restrict a raw provider document to the declared fields
    pub fn project(&self, document: &JsonValue) -> AttributeMap {
        AttributeMap::from_value(project_fields(&self.fields, document, false))
            .unwrap_or_default()
    }

    /// Restrict a document to mutable, non-computed fields
    pub fn project_mutable(&self, document: &JsonValue) -> AttributeMap {
        AttributeMap::from_value(project_fields(&self.fields, document, true))
            .unwrap_or_default()
    }
}

fn read_yaml_scalar(raw: &str) -> Result<JsonValue> {
    if raw.trim().is_empty() {
        return Ok(JsonValue::String(raw.to_string()));
    }
    Ok(serde_yaml::from_str(raw)?)
}

fn project_fields(
    fields: &IndexMap<String, FieldSchema>,
    node: &JsonValue,
    mutable_only: bool,
) -> JsonValue {
    let mut out = serde_json::Map::new();
    let Some(map) = node.as_object() else {
        return JsonValue::Object(out);
    };

    for (name, field) in fields {
        if mutable_only && (field.computed || !field.is_mutable()) {
            continue;
        }
        let Some(value) = map.get(name) else {
            continue;
        };
        let projected = if field.recurses() {
            project_fields(&field.fields, value, mutable_only)
        } else {
            value.clone()
        };
        out.insert(name.clone(), projected);
    }

    JsonValue::Object(out)
}

/// Whether `observed` agrees with everything `desired` states
///
/// Object members missing from `desired` are ignored; members missing from
/// `observed` match only zero values. A `null` member asks for removal.
/// Lists must have the same length and agree element by element.
pub fn covers(observed: &JsonValue, desired: &JsonValue) -> bool {
    match (observed, desired) {
        (_, JsonValue::Null) => true,
        (JsonValue::Object(have), JsonValue::Object(want)) => want.iter().all(|(key, value)| {
            match have.get(key) {
                Some(found) if value.is_null() => found.is_null(),
                Some(found) => covers(found, value),
                None => is_empty_value(value),
            }
        }),
        (JsonValue::Array(have), JsonValue::Array(want)) => {
            have.len() == want.len() && have.iter().zip(want).all(|(h, w)| covers(h, w))
        }
        (JsonValue::Null, want) => is_empty_value(want),
        (have, want) => values_equal(have, want),
    }
}

/// Lay `desired` over `observed`, keeping members `desired` never names
///
/// Lists and scalars come from `desired` whole; a `null` member removes the
/// observed one.
pub fn overlay(observed: &JsonValue, desired: &JsonValue) -> JsonValue {
    match (observed, desired) {
        (JsonValue::Object(have), JsonValue::Object(want)) => {
            let mut merged = have.clone();
            for (key, value) in want {
                if value.is_null() {
                    merged.remove(key);
                    continue;
                }
                let next = match have.get(key) {
                    Some(found) => overlay(found, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            JsonValue::Object(merged)
        }
        (_, want) => want.clone(),
    }
}

fn is_empty_value(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::Bool(b) => !b,
        JsonValue::Number(n) => n.as_f64() == Some(0.0),
        JsonValue::String(s) => s.is_empty(),
        JsonValue::Array(items) => items.is_empty(),
        JsonValue::Object(map) => map.values().all(is_empty_value),
    }
}

/// Deep equality that compares numbers by value (`3 == 3.0`)
pub fn values_equal(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (JsonValue::Array(xs), JsonValue::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (JsonValue::Object(xs), JsonValue::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Multiset equality for set-typed fields
pub fn sets_equal(a: &JsonValue, b: &JsonValue) -> bool {
    let (Some(xs), Some(ys)) = (a.as_array(), b.as_array()) else {
        return values_equal(a, b);
    };
    if xs.len() != ys.len() {
        return false;
    }
    let mut used = vec![false; ys.len()];
    xs.iter().all(|x| {
        let found = ys
            .iter()
            .enumerate()
            .position(|(i, y)| !used[i] && values_equal(x, y));
        match found {
            Some(i) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cluster_schema() -> ResourceSchema {
        ResourceSchema::new("cluster")
            .field("name", FieldSchema::string())
            .field("datacenter", FieldSchema::string().immutable())
            .field(
                "workers",
                FieldSchema::object([
                    ("count", FieldSchema::integer().reprovisions()),
                    ("flavor", FieldSchema::string().immutable()),
                ]),
            )
            .field("state", FieldSchema::string().computed())
    }

    #[test]
    fn test_lookup_nested() {
        let schema = cluster_schema();
        let count = schema
            .lookup(&AttributePath::parse("workers.count").unwrap())
            .unwrap();
        assert_eq!(count.field_type, FieldType::Integer);
        assert!(schema.lookup(&AttributePath::parse("workers.zone").unwrap()).is_none());
        assert!(schema.lookup(&AttributePath::root()).is_none());
    }

    #[test]
    fn test_reprovision_and_mutability_inheritance() {
        let schema = ResourceSchema::new("app").field(
            "placement",
            FieldSchema::object([("zone", FieldSchema::string())])
                .immutable()
                .reprovisions(),
        );

        let zone = AttributePath::parse("placement.zone").unwrap();
        assert!(schema.reprovisions(&zone));
        assert_eq!(schema.mutability(&zone), Mutability::ImmutableForcesReplace);
    }

    #[test]
    fn test_zero_values() {
        assert!(FieldType::String.is_zero(&json!("")));
        assert!(FieldType::Integer.is_zero(&json!(0.0)));
        assert!(FieldType::List.is_zero(&json!([])));
        assert!(FieldType::Map.is_zero(&JsonValue::Null));
        assert!(!FieldType::Boolean.is_zero(&json!(true)));
        assert!(!FieldType::Any.is_zero(&json!(0)));
    }

    #[test]
    fn test_values_equal_numeric() {
        assert!(values_equal(&json!({"a": [1, 2.0]}), &json!({"a": [1.0, 2]})));
        assert!(!values_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
    }

    #[test]
    fn test_sets_equal_ignores_order() {
        assert!(sets_equal(&json!(["a", "b", "a"]), &json!(["a", "a", "b"])));
        assert!(!sets_equal(&json!(["a", "b", "b"]), &json!(["a", "a", "b"])));
        assert!(!sets_equal(&json!(["a"]), &json!(["a", "b"])));
    }

    #[test]
    fn test_project_drops_undeclared_fields() {
        let schema = cluster_schema();
        let raw = json!({
            "name": "prod",
            "datacenter": "dal10",
            "workers": {"count": 3, "flavor": "b3c.4x16", "zone": "a"},
            "state": "normal",
            "ingressHostname": "prod.example.com"
        });

        let projected = schema.project(&raw);
        assert_eq!(
            projected.inner(),
            &json!({
                "name": "prod",
                "datacenter": "dal10",
                "workers": {"count": 3, "flavor": "b3c.4x16"},
                "state": "normal"
            })
        );

        let mutable = schema.project_mutable(&raw);
        assert_eq!(
            mutable.inner(),
            &json!({"name": "prod", "workers": {"count": 3}})
        );
    }

    #[test]
    fn test_schema_serializes_as_table() {
        let schema = ResourceSchema::new("server")
            .field("hostname", FieldSchema::string().patch_at(AttributePath::new(["host", "name"])));
        let json = serde_json::to_value(&schema).unwrap();

        assert_eq!(json["fields"]["hostname"]["type"], "string");
        assert_eq!(json["fields"]["hostname"]["patch"]["at"], "/host/name");
        assert_eq!(json["fields"]["hostname"]["mutability"], "mutable");
    }

    #[test]
    fn test_coerce_follows_field_type() {
        let schema = ResourceSchema::new("server")
            .field("hostname", FieldSchema::string())
            .field("cores", FieldSchema::integer())
            .field("hourly", FieldSchema::boolean())
            .field("tags", FieldSchema::set())
            .field("labels", FieldSchema::map())
            .field("spec", FieldSchema::object([("template", FieldSchema::any())]));
        let path = |p: &str| AttributePath::parse(p).unwrap();

        assert_eq!(schema.coerce(&path("hostname"), "123").unwrap(), json!("123"));
        assert_eq!(schema.coerce(&path("cores"), "8").unwrap(), json!(8));
        assert_eq!(schema.coerce(&path("hourly"), "false").unwrap(), json!(false));
        assert_eq!(schema.coerce(&path("tags"), "[web, prod]").unwrap(), json!(["web", "prod"]));
        assert_eq!(
            schema.coerce(&path("spec.template.spec.containers.0.ports"), "[80]").unwrap(),
            json!([80])
        );
        assert_eq!(schema.coerce(&path("undeclared"), "3").unwrap(), json!(3));
        assert_eq!(schema.coerce(&path("labels.tier"), "3").unwrap(), json!("3"));

        let err = schema.coerce(&path("cores"), "eight").unwrap_err();
        assert!(matches!(err, CoreError::InvalidValue { expected: "an integer", .. }));
        assert!(schema.coerce(&path("tags"), "web").is_err());
    }

    #[test]
    fn test_covers_ignores_provider_defaults() {
        let observed = json!({
            "containers": [{"name": "web", "image": "nginx", "imagePullPolicy": "IfNotPresent"}],
            "restartPolicy": "Always",
        });

        assert!(covers(&observed, &json!({"containers": [{"name": "web", "image": "nginx"}]})));
        assert!(covers(&observed, &json!({"paused": false})));
        assert!(!covers(&observed, &json!({"containers": [{"image": "nginx:1.27"}]})));
        assert!(!covers(&observed, &json!({"containers": []})));
        assert!(!covers(&observed, &json!({"restartPolicy": "Never"})));
        assert!(!covers(&observed, &json!({"restartPolicy": null})));
        assert!(covers(&observed, &json!({"schedulerName": null})));
    }

    #[test]
    fn test_overlay_keeps_unnamed_members() {
        let observed = json!({"revision": "3", "team": "api", "owner": "ops"});
        let desired = json!({"team": "web", "owner": null});

        assert_eq!(overlay(&observed, &desired), json!({"revision": "3", "team": "web"}));
    }
}
