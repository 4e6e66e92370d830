//! Attribute documents: desired and observed resource state

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::Path;
use std::str::FromStr;

use crate::error::{CoreError, Result};
use crate::path::AttributePath;
use crate::schema::{ResourceSchema, overlay};

/// Attribute document with path-addressed access
///
/// Both the caller's desired state and the attribute half of an observed
/// state are attribute maps. The root is always a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeMap(JsonValue);

/// Caller-declared target configuration
pub type DesiredState = AttributeMap;

impl Default for AttributeMap {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeMap {
    /// Create an empty document
    pub fn new() -> Self {
        Self(JsonValue::Object(serde_json::Map::new()))
    }

    /// Wrap a JSON value; `null` becomes an empty document
    pub fn from_value(value: JsonValue) -> Result<Self> {
        match value {
            JsonValue::Object(_) => Ok(Self(value)),
            JsonValue::Null => Ok(Self::new()),
            other => Err(CoreError::InvalidDocument {
                message: format!("expected a mapping at the document root, found {}", type_name(&other)),
            }),
        }
    }

    /// Load a document from a YAML or JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse a document from a YAML string (JSON is valid YAML)
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse a document from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let value: JsonValue = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Get the value at a path
    pub fn get(&self, path: &AttributePath) -> Option<&JsonValue> {
        lookup(&self.0, path.segments())
    }

    /// Get the value at a dotted or pointer path, e.g. `spec.replicas`
    pub fn lookup(&self, path: &str) -> Option<&JsonValue> {
        AttributePath::parse(path).ok().and_then(|p| self.get(&p))
    }

    /// Whether the path holds a non-null value
    pub fn contains(&self, path: &AttributePath) -> bool {
        self.get(path).is_some_and(|v| !v.is_null())
    }

    /// Set the value at a path, creating intermediate mappings
    pub fn set(&mut self, path: &AttributePath, value: JsonValue) -> Result<()> {
        if path.is_root() {
            *self = Self::from_value(value)?;
            return Ok(());
        }
        set_nested(&mut self.0, path.segments(), value);
        Ok(())
    }

    /// Remove and return the value at a path
    pub fn remove(&mut self, path: &AttributePath) -> Option<JsonValue> {
        let parent = path.parent()?;
        let key = path.last()?;
        match lookup_mut(&mut self.0, parent.segments())? {
            JsonValue::Object(map) => map.remove(key),
            _ => None,
        }
    }

    /// Lay another document over this one
    ///
    /// Mappings merge recursively and a `null` member removes the key.
    /// Scalars and lists from `other` win.
    pub fn merge(&mut self, other: &AttributeMap) {
        self.0 = overlay(&self.0, &other.0);
    }

    /// Apply command-line assignments, typing each value by `schema`
    ///
    /// The literal `null` removes the attribute.
    pub fn apply_overrides(&mut self, schema: &ResourceSchema, overrides: &[Override]) -> Result<()> {
        for Override { path, raw } in overrides {
            if raw == "null" {
                self.remove(path);
                continue;
            }
            let value = schema.coerce(path, raw)?;
            self.set(path, value)?;
        }
        Ok(())
    }

    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    pub fn into_inner(self) -> JsonValue {
        self.0
    }

    /// Check if the document has no attributes
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Object(map) => map.is_empty(),
            _ => true,
        }
    }

    /// Top-level attribute names
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0
            .as_object()
            .into_iter()
            .flat_map(|map| map.keys().map(String::as_str))
    }
}

/// One `path=value` assignment from the command line
///
/// The value stays raw until a schema types it.
#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    pub path: AttributePath,
    pub raw: String,
}

impl FromStr for Override {
    type Err = CoreError;

    fn from_str(arg: &str) -> Result<Self> {
        let (key, raw) = arg
            .split_once('=')
            .ok_or_else(|| CoreError::InvalidAssignment(arg.to_string()))?;
        let path = AttributePath::parse(key.trim())?;
        if path.is_root() {
            return Err(CoreError::InvalidAssignment(arg.to_string()));
        }
        Ok(Self {
            path,
            raw: raw.to_string(),
        })
    }
}

impl TryFrom<JsonValue> for AttributeMap {
    type Error = CoreError;

    fn try_from(value: JsonValue) -> Result<Self> {
        Self::from_value(value)
    }
}

pub(crate) fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "list",
        JsonValue::Object(_) => "mapping",
    }
}

/// Resolve a segment path, indexing into lists by position
pub(crate) fn lookup<'a>(value: &'a JsonValue, path: &[String]) -> Option<&'a JsonValue> {
    path.iter().try_fold(value, |node, segment| match node {
        JsonValue::Object(map) => map.get(segment),
        JsonValue::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

pub(crate) fn lookup_mut<'a>(value: &'a mut JsonValue, path: &[String]) -> Option<&'a mut JsonValue> {
    path.iter().try_fold(value, |node, segment| match node {
        JsonValue::Object(map) => map.get_mut(segment),
        JsonValue::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(move |i| items.get_mut(i)),
        _ => None,
    })
}

/// Set a nested value, replacing scalar intermediates with mappings
///
/// A numeric segment indexes into an existing list. One past the end,
/// or `-`, appends.
pub(crate) fn set_nested(value: &mut JsonValue, path: &[String], new_value: JsonValue) {
    let Some((key, remaining)) = path.split_first() else {
        *value = new_value;
        return;
    };

    if let JsonValue::Array(items) = value {
        let index = if key == "-" { Some(items.len()) } else { key.parse::<usize>().ok() };
        if let Some(index) = index.filter(|&i| i <= items.len()) {
            if index == items.len() {
                items.push(JsonValue::Null);
            }
            set_nested(&mut items[index], remaining, new_value);
            return;
        }
    }

    if !value.is_object() {
        *value = JsonValue::Object(serde_json::Map::new());
    }

    if let JsonValue::Object(map) = value {
        if remaining.is_empty() {
            map.insert(key.clone(), new_value);
        } else {
            let entry = map
                .entry(key.clone())
                .or_insert_with(|| JsonValue::Object(serde_json::Map::new()));
            set_nested(entry, remaining, new_value);
        }
    }
}
