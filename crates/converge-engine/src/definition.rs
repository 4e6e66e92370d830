//! Resource kind definitions
//!
//! A definition bundles everything the lifecycle needs to know about one
//! kind: its mutability table, how to recognise duplicates, which raw
//! states mean ready or failed, and which sub-resources hang off it.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use converge_core::{AttributeMap, AttributePath, ResourceKind, ResourceSchema};

use crate::error::{EngineError, Result};
use crate::poller::{StateClass, StateSets};
use crate::session::{DependentRequest, DependentState};

/// How many sub-resources one declaration produces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Cardinality {
    /// One sub-resource from the whole source value
    #[default]
    Single,
    /// One sub-resource per element of a list-valued source
    PerElement,
}

/// Who creates the sub-resources
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Provisioning {
    /// Created through the façade after the primary
    #[default]
    Attach,
    /// Created by the provider itself; only polled
    Implicit,
}

/// One declared group of sub-resources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependentDefinition {
    pub name: String,

    pub kind: ResourceKind,

    /// Attribute holding the desired spec of the group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<AttributePath>,

    #[serde(default)]
    pub cardinality: Cardinality,

    #[serde(default)]
    pub provisioning: Provisioning,

    /// Integer attribute holding the expected member count, for implicit groups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_from: Option<AttributePath>,

    /// States to wait for; `None` means the group is never polled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness: Option<StateSets>,
}

impl DependentDefinition {
    /// Explicitly attached group sourced from `source`
    pub fn attached(
        name: impl Into<String>,
        kind: impl Into<ResourceKind>,
        source: AttributePath,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            source: Some(source),
            cardinality,
            provisioning: Provisioning::Attach,
            count_from: None,
            readiness: None,
        }
    }

    /// Provider-created group, optionally counted from an attribute
    pub fn implicit(
        name: impl Into<String>,
        kind: impl Into<ResourceKind>,
        count_from: Option<AttributePath>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            source: None,
            cardinality: Cardinality::PerElement,
            provisioning: Provisioning::Implicit,
            count_from,
            readiness: None,
        }
    }

    pub fn with_readiness(mut self, states: StateSets) -> Self {
        self.readiness = Some(states);
        self
    }

    /// Attach requests implied by the desired state, in declaration order
    ///
    /// Absent or null sources produce no requests.
    pub fn requests(&self, desired: &AttributeMap) -> Vec<DependentRequest> {
        if self.provisioning == Provisioning::Implicit {
            return Vec::new();
        }

        let Some(value) = self.source.as_ref().and_then(|p| desired.get(p)) else {
            return Vec::new();
        };

        match (self.cardinality, value) {
            (_, JsonValue::Null) => Vec::new(),
            (Cardinality::PerElement, JsonValue::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, spec)| self.request(Some(i), spec.clone()))
                .collect(),
            (_, spec) => vec![self.request(None, spec.clone())],
        }
    }

    fn request(&self, index: Option<usize>, spec: JsonValue) -> DependentRequest {
        DependentRequest {
            kind: self.kind.clone(),
            name: self.name.clone(),
            index,
            spec,
        }
    }

    /// Number of members the group should settle at, when derivable
    pub fn expected_count(&self, desired: &AttributeMap) -> Result<Option<usize>> {
        match self.provisioning {
            Provisioning::Attach => Ok(Some(self.requests(desired).len())),
            Provisioning::Implicit => {
                let Some(count) = self
                    .count_from
                    .as_ref()
                    .and_then(|p| desired.get(p))
                    .and_then(JsonValue::as_u64)
                else {
                    return Ok(None);
                };
                usize::try_from(count).map(Some).map_err(|_| {
                    EngineError::InvalidTarget(format!(
                        "{} count {} exceeds what this platform can track",
                        self.name, count
                    ))
                })
            }
        }
    }
}

/// Aggregate readiness of a dependent group
///
/// Failed as soon as any member reports a failed state. Ready when every
/// member is ready and, if the expected count is known, that many members
/// have been reported. Pending otherwise.
pub fn aggregate(
    members: &[DependentState],
    states: &StateSets,
    expected: Option<usize>,
) -> (StateClass, String) {
    if let Some(failed) = members
        .iter()
        .find(|m| states.classify(&m.state) == StateClass::Failed)
    {
        return (StateClass::Failed, format!("{} {}", failed.id, failed.state));
    }

    let ready = members
        .iter()
        .filter(|m| states.classify(&m.state) == StateClass::Ready)
        .count();
    let wanted = expected.unwrap_or(members.len());
    let summary = format!("{}/{} ready", ready, wanted);

    if ready == members.len() && members.len() >= wanted {
        (StateClass::Ready, summary)
    } else {
        (StateClass::Pending, summary)
    }
}

/// Everything the lifecycle knows about one kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    pub kind: ResourceKind,

    #[serde(default)]
    pub description: String,

    pub schema: ResourceSchema,

    /// Attribute identifying duplicates for the create guard
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub natural_key: Option<AttributePath>,

    /// Primary readiness; `None` means create and update never wait
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness: Option<StateSets>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependents: Vec<DependentDefinition>,
}

impl ResourceDefinition {
    pub fn new(schema: ResourceSchema) -> Self {
        Self {
            kind: ResourceKind::new(schema.kind.clone()),
            description: String::new(),
            schema,
            natural_key: None,
            readiness: None,
            dependents: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn natural_key(mut self, path: AttributePath) -> Self {
        self.natural_key = Some(path);
        self
    }

    pub fn readiness(mut self, states: StateSets) -> Self {
        self.readiness = Some(states);
        self
    }

    pub fn dependent(mut self, dependent: DependentDefinition) -> Self {
        self.dependents.push(dependent);
        self
    }

    /// Natural key value in a desired document, if declared and a string
    pub fn natural_key_of(&self, desired: &AttributeMap) -> Option<String> {
        let path = self.natural_key.as_ref()?;
        match desired.get(path)? {
            JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
            JsonValue::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str, state: &str) -> DependentState {
        DependentState {
            id: id.to_string(),
            kind: ResourceKind::from("app_instance"),
            state: state.to_string(),
        }
    }

    fn instance_states() -> StateSets {
        StateSets::ready(["RUNNING"])
            .pending(["STARTING"])
            .failed(["CRASHED"])
    }

    #[test]
    fn test_aggregate_failed_wins() {
        let members = [member("i-0", "RUNNING"), member("i-1", "CRASHED")];
        let (class, summary) = aggregate(&members, &instance_states(), Some(2));
        assert_eq!(class, StateClass::Failed);
        assert_eq!(summary, "i-1 CRASHED");
    }

    #[test]
    fn test_aggregate_waits_for_expected_count() {
        let members = [member("i-0", "RUNNING")];
        let (class, summary) = aggregate(&members, &instance_states(), Some(3));
        assert_eq!(class, StateClass::Pending);
        assert_eq!(summary, "1/3 ready");

        let members = [member("i-0", "RUNNING"), member("i-1", "RUNNING"), member("i-2", "RUNNING")];
        assert_eq!(aggregate(&members, &instance_states(), Some(3)).0, StateClass::Ready);
    }

    #[test]
    fn test_aggregate_unknown_count() {
        let members = [member("i-0", "RUNNING"), member("i-1", "STARTING")];
        assert_eq!(aggregate(&members, &instance_states(), None).0, StateClass::Pending);
        assert_eq!(aggregate(&[], &instance_states(), None).0, StateClass::Ready);
    }

    #[test]
    fn test_per_element_requests() {
        let routes = DependentDefinition::attached(
            "routes",
            "route",
            AttributePath::new(["routes"]),
            Cardinality::PerElement,
        );
        let desired = AttributeMap::from_yaml("routes: [a.example.com, b.example.com]\n").unwrap();

        let requests = routes.requests(&desired);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].index, Some(1));
        assert_eq!(requests[1].spec, "b.example.com");
        assert_eq!(routes.expected_count(&desired).unwrap(), Some(2));

        assert!(routes.requests(&AttributeMap::new()).is_empty());
    }

    #[test]
    fn test_implicit_expected_count() {
        let instances = DependentDefinition::implicit(
            "instances",
            "app_instance",
            Some(AttributePath::new(["instances"])),
        );
        let desired = AttributeMap::from_yaml("instances: 4\n").unwrap();

        assert!(instances.requests(&desired).is_empty());
        assert_eq!(instances.expected_count(&desired).unwrap(), Some(4));
        assert_eq!(instances.expected_count(&AttributeMap::new()).unwrap(), None);
    }

    #[test]
    #[cfg(target_pointer_width = "32")]
    fn test_implicit_count_beyond_usize_rejected() {
        let instances = DependentDefinition::implicit(
            "instances",
            "app_instance",
            Some(AttributePath::new(["instances"])),
        );
        let desired = AttributeMap::from_yaml("instances: 8589934592\n").unwrap();

        let err = instances.expected_count(&desired).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTarget(_)));
    }

    #[test]
    fn test_natural_key_of() {
        let definition = ResourceDefinition::new(ResourceSchema::new("cluster"))
            .natural_key(AttributePath::new(["name"]));

        let desired = AttributeMap::from_yaml("name: prod\n").unwrap();
        assert_eq!(definition.natural_key_of(&desired).as_deref(), Some("prod"));
        assert_eq!(definition.natural_key_of(&AttributeMap::new()), None);
    }
}
