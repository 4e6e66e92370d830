//! Registry of resource definitions by kind name

use indexmap::IndexMap;

use crate::definition::ResourceDefinition;
use crate::error::{EngineError, Result};
use crate::kinds;

/// Maximum Levenshtein distance to consider for suggestions
const MAX_SUGGESTION_DISTANCE: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct DefinitionRegistry {
    definitions: IndexMap<String, ResourceDefinition>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in kinds
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for definition in kinds::builtin() {
            registry.register(definition);
        }
        registry
    }

    /// Add or replace a definition
    pub fn register(&mut self, definition: ResourceDefinition) {
        self.definitions
            .insert(definition.kind.as_str().to_string(), definition);
    }

    /// Exact match first, then case-insensitive
    pub fn get(&self, kind: &str) -> Option<&ResourceDefinition> {
        self.definitions.get(kind).or_else(|| {
            self.definitions
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(kind))
                .map(|(_, definition)| definition)
        })
    }

    /// Like [`get`](Self::get), with a suggestion for unknown kinds
    pub fn resolve(&self, kind: &str) -> Result<&ResourceDefinition> {
        self.get(kind).ok_or_else(|| EngineError::UnknownKind {
            kind: kind.to_string(),
            suggestion: self.suggest(kind),
        })
    }

    /// Closest registered kind name within a small edit distance
    pub fn suggest(&self, kind: &str) -> Option<String> {
        let wanted = kind.to_ascii_lowercase();
        self.definitions
            .keys()
            .map(|name| (strsim::levenshtein(&wanted, &name.to_ascii_lowercase()), name))
            .filter(|(distance, _)| *distance <= MAX_SUGGESTION_DISTANCE)
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, name)| name.clone())
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceDefinition> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
