//! In-memory façade for testing and offline simulation
//!
//! Objects live in memory and report scripted state sequences: every read
//! returns the current state and then advances, staying on the last entry
//! once the script is exhausted. Failures can be injected per operation.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use converge_core::{
    AttributeMap, AttributePath, PatchOperation, ResourceHandle, ResourceKind, apply_patch,
};

use crate::definition::{Provisioning, ResourceDefinition};
use crate::session::{
    ClientError, ClientResult, DependentRequest, DependentState, RemoteObject, ResourceClient,
};

const UNSCRIPTED_STATE: &str = "created";

/// Façade operations, for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    Create,
    Get,
    Update,
    Delete,
    ListDependents,
    AttachDependent,
    FindByNaturalKey,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub creates: usize,
    pub gets: usize,
    pub updates: usize,
    pub deletes: usize,
    pub list_dependents: usize,
    pub attaches: usize,
    pub lookups: usize,
}

impl OperationCounts {
    pub fn total(&self) -> usize {
        self.creates
            + self.gets
            + self.updates
            + self.deletes
            + self.list_dependents
            + self.attaches
            + self.lookups
    }

    /// Calls that change remote state
    pub fn mutations(&self) -> usize {
        self.creates + self.updates + self.deletes + self.attaches
    }
}

#[derive(Debug, Clone)]
struct Script(VecDeque<String>);

impl Script {
    fn new(states: &[String]) -> Self {
        if states.is_empty() {
            Self(VecDeque::from([UNSCRIPTED_STATE.to_string()]))
        } else {
            Self(states.iter().cloned().collect())
        }
    }

    fn current(&self) -> String {
        self.0.front().cloned().unwrap_or_else(|| UNSCRIPTED_STATE.to_string())
    }

    /// Current state, then move to the next one
    fn advance(&mut self) -> String {
        let state = self.current();
        if self.0.len() > 1 {
            self.0.pop_front();
        }
        state
    }
}

#[derive(Debug, Clone)]
struct MockObject {
    kind: ResourceKind,
    document: JsonValue,
    script: Script,
    deleting: bool,
}

#[derive(Debug, Clone)]
struct MockDependent {
    parent: String,
    id: String,
    kind: ResourceKind,
    script: Script,
    implicit: bool,
}

#[derive(Debug, Clone)]
struct ImplicitGroup {
    kind: ResourceKind,
    count_from: Option<AttributePath>,
    fixed: usize,
}

#[derive(Default)]
struct Inner {
    objects: IndexMap<String, MockObject>,
    dependents: Vec<MockDependent>,
    create_scripts: HashMap<ResourceKind, Vec<String>>,
    update_scripts: HashMap<ResourceKind, Vec<String>>,
    dependent_scripts: HashMap<ResourceKind, Vec<String>>,
    implicit: HashMap<ResourceKind, Vec<ImplicitGroup>>,
    deletion_states: HashMap<ResourceKind, String>,
    natural_keys: HashMap<ResourceKind, AttributePath>,
    failures: HashMap<MockOperation, VecDeque<ClientError>>,
    counts: OperationCounts,
    patches: Vec<(ResourceHandle, Vec<PatchOperation>)>,
    next_id: u64,
}

impl Inner {
    fn injected(&mut self, op: MockOperation) -> ClientResult<()> {
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn object_mut(&mut self, handle: &ResourceHandle) -> ClientResult<&mut MockObject> {
        self.objects
            .get_mut(&handle.id)
            .filter(|o| o.kind == handle.kind)
            .ok_or_else(|| ClientError::NotFound(handle.to_string()))
    }

    fn key_matches(&self, kind: &ResourceKind, document: &JsonValue, key: &str) -> bool {
        let Some(path) = self.natural_keys.get(kind) else {
            return false;
        };
        match AttributeMap::from_value(document.clone()).ok().as_ref().and_then(|d| d.get(path)) {
            Some(JsonValue::String(s)) => s == key,
            Some(JsonValue::Number(n)) => n.to_string() == key,
            _ => false,
        }
    }

    fn find_live(&self, kind: &ResourceKind, key: &str) -> Option<String> {
        self.objects
            .iter()
            .find(|(_, o)| &o.kind == kind && !o.deleting && self.key_matches(kind, &o.document, key))
            .map(|(id, _)| id.clone())
    }

    fn script_for(&self, scripts: &HashMap<ResourceKind, Vec<String>>, kind: &ResourceKind) -> Script {
        Script::new(scripts.get(kind).map(Vec::as_slice).unwrap_or_default())
    }

    /// Bring provider-created dependents in line with the parent document
    fn sync_implicit(&mut self, parent: &str) {
        let Some(object) = self.objects.get(parent) else {
            return;
        };
        let groups = self.implicit.get(&object.kind).cloned().unwrap_or_default();
        let document = object.document.clone();

        for group in groups {
            let wanted = match &group.count_from {
                Some(path) => AttributeMap::from_value(document.clone())
                    .ok()
                    .and_then(|d| d.get(path).and_then(JsonValue::as_u64))
                    .and_then(|n| usize::try_from(n).ok())
                    .unwrap_or(0),
                None => group.fixed,
            };

            let current = self
                .dependents
                .iter()
                .filter(|d| d.parent == parent && d.kind == group.kind && d.implicit)
                .count();

            if current > wanted {
                let mut seen = 0;
                self.dependents.retain(|d| {
                    if d.parent == parent && d.kind == group.kind && d.implicit {
                        seen += 1;
                        seen <= wanted
                    } else {
                        true
                    }
                });
            }

            for i in current..wanted {
                let script = self.script_for(&self.dependent_scripts, &group.kind);
                self.dependents.push(MockDependent {
                    parent: parent.to_string(),
                    id: format!("{}-{}-{}", group.kind, parent, i),
                    kind: group.kind.clone(),
                    script,
                    implicit: true,
                });
            }
        }
    }
}

/// In-memory façade for testing
#[derive(Clone, Default)]
pub struct MockResourceClient {
    inner: Arc<Mutex<Inner>>,
}

impl MockResourceClient {
    /// Create a new empty mock façade
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock whose kinds converge after one pending read
    ///
    /// Every definition gets a script of its first pending state (when it
    /// has one) followed by its first ready state, for the primary and each
    /// dependent group. Implicit dependents are spawned from their count
    /// attribute.
    pub fn simulating<'a>(definitions: impl IntoIterator<Item = &'a ResourceDefinition>) -> Self {
        let mut mock = Self::new();
        for definition in definitions {
            if let Some(states) = &definition.readiness {
                mock = mock.with_states(definition.kind.clone(), converging_script(states));
            }
            if let Some(key) = &definition.natural_key {
                mock = mock.with_natural_key(definition.kind.clone(), key.clone());
            }
            for dependent in &definition.dependents {
                if let Some(states) = &dependent.readiness {
                    mock = mock.with_dependent_states(dependent.kind.clone(), converging_script(states));
                }
                if dependent.provisioning == Provisioning::Implicit {
                    mock = mock.with_implicit_dependents(
                        definition.kind.clone(),
                        dependent.kind.clone(),
                        dependent.count_from.clone(),
                    );
                }
            }
        }
        mock
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// States reported after create, in order
    pub fn with_states<I, S>(self, kind: impl Into<ResourceKind>, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let states = states.into_iter().map(Into::into).collect();
        self.lock().create_scripts.insert(kind.into(), states);
        self
    }

    /// States reported after an update, in order
    pub fn with_update_states<I, S>(self, kind: impl Into<ResourceKind>, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let states = states.into_iter().map(Into::into).collect();
        self.lock().update_scripts.insert(kind.into(), states);
        self
    }

    /// States reported by each dependent of `kind`, in order
    pub fn with_dependent_states<I, S>(self, kind: impl Into<ResourceKind>, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let states = states.into_iter().map(Into::into).collect();
        self.lock().dependent_scripts.insert(kind.into(), states);
        self
    }

    /// Spawn dependents on create, one per unit of the integer at `count_from`
    pub fn with_implicit_dependents(
        self,
        parent: impl Into<ResourceKind>,
        kind: impl Into<ResourceKind>,
        count_from: Option<AttributePath>,
    ) -> Self {
        let group = ImplicitGroup {
            kind: kind.into(),
            fixed: if count_from.is_some() { 0 } else { 1 },
            count_from,
        };
        self.lock().implicit.entry(parent.into()).or_default().push(group);
        self
    }

    /// Keep deleted objects of `kind` readable in `state`
    pub fn with_deletion_state(self, kind: impl Into<ResourceKind>, state: impl Into<String>) -> Self {
        self.lock().deletion_states.insert(kind.into(), state.into());
        self
    }

    /// Enforce server-side uniqueness of the attribute at `path`
    pub fn with_natural_key(self, kind: impl Into<ResourceKind>, path: AttributePath) -> Self {
        self.lock().natural_keys.insert(kind.into(), path);
        self
    }

    /// Pre-populate an object
    pub fn with_object(
        self,
        kind: impl Into<ResourceKind>,
        id: impl Into<String>,
        document: JsonValue,
        state: impl Into<String>,
    ) -> Self {
        let object = MockObject {
            kind: kind.into(),
            document,
            script: Script::new(&[state.into()]),
            deleting: false,
        };
        self.lock().objects.insert(id.into(), object);
        self
    }

    /// Fail the next call of `op` with `error`; queued failures are used in order
    pub fn fail_next(&self, op: MockOperation, error: ClientError) {
        self.lock().failures.entry(op).or_default().push_back(error);
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.lock().counts.clone()
    }

    /// Reset operation counts
    pub fn reset_counts(&self) {
        self.lock().counts = OperationCounts::default();
    }

    /// Every patch received, in order
    pub fn patches(&self) -> Vec<(ResourceHandle, Vec<PatchOperation>)> {
        self.lock().patches.clone()
    }

    /// Current stored document of an object
    pub fn document(&self, id: &str) -> Option<JsonValue> {
        self.lock().objects.get(id).map(|o| o.document.clone())
    }

    /// Count objects still stored, including those being deleted
    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }
}

fn converging_script(states: &crate::poller::StateSets) -> Vec<String> {
    states
        .pending
        .first()
        .into_iter()
        .chain(states.ready.first())
        .cloned()
        .collect()
}

#[async_trait]
impl ResourceClient for MockResourceClient {
    async fn create(&self, kind: &ResourceKind, spec: &AttributeMap) -> ClientResult<RemoteObject> {
        let mut inner = self.lock();
        inner.counts.creates += 1;
        inner.injected(MockOperation::Create)?;

        if inner.natural_keys.contains_key(kind) {
            let key = inner
                .natural_keys
                .get(kind)
                .and_then(|path| spec.get(path))
                .and_then(|v| v.as_str().map(str::to_string));
            if let Some(key) = key
                && inner.find_live(kind, &key).is_some()
            {
                return Err(ClientError::Conflict(format!("{} '{}' already exists", kind, key)));
            }
        }

        inner.next_id += 1;
        let id = format!("{}-{}", kind, inner.next_id);
        let script = inner.script_for(&inner.create_scripts, kind);
        let state = script.current();

        inner.objects.insert(
            id.clone(),
            MockObject {
                kind: kind.clone(),
                document: spec.inner().clone(),
                script,
                deleting: false,
            },
        );
        inner.sync_implicit(&id);

        Ok(RemoteObject {
            id,
            state,
            document: spec.inner().clone(),
        })
    }

    async fn get(&self, handle: &ResourceHandle) -> ClientResult<RemoteObject> {
        let mut inner = self.lock();
        inner.counts.gets += 1;
        inner.injected(MockOperation::Get)?;

        let object = inner.object_mut(handle)?;
        Ok(RemoteObject {
            id: handle.id.clone(),
            state: object.script.advance(),
            document: object.document.clone(),
        })
    }

    async fn update(
        &self,
        handle: &ResourceHandle,
        patch: &[PatchOperation],
    ) -> ClientResult<RemoteObject> {
        let mut inner = self.lock();
        inner.counts.updates += 1;
        inner.injected(MockOperation::Update)?;
        inner.patches.push((handle.clone(), patch.to_vec()));

        let restart = inner
            .update_scripts
            .get(&handle.kind)
            .map(|states| Script::new(states));

        let object = inner.object_mut(handle)?;
        let mut document = object.document.clone();
        apply_patch(&mut document, patch).map_err(|e| ClientError::Rejected(e.to_string()))?;
        object.document = document.clone();
        if let Some(script) = restart {
            object.script = script;
        }
        let state = object.script.current();

        inner.sync_implicit(&handle.id);

        Ok(RemoteObject {
            id: handle.id.clone(),
            state,
            document,
        })
    }

    async fn delete(&self, handle: &ResourceHandle) -> ClientResult<()> {
        let mut inner = self.lock();
        inner.counts.deletes += 1;
        inner.injected(MockOperation::Delete)?;

        let lingering = inner.deletion_states.get(&handle.kind).cloned();
        let object = inner.object_mut(handle)?;

        match lingering {
            Some(state) => {
                object.deleting = true;
                object.script = Script::new(&[state]);
            }
            None => {
                inner.objects.shift_remove(&handle.id);
                inner.dependents.retain(|d| d.parent != handle.id);
            }
        }
        Ok(())
    }

    async fn list_dependents(&self, handle: &ResourceHandle) -> ClientResult<Vec<DependentState>> {
        let mut inner = self.lock();
        inner.counts.list_dependents += 1;
        inner.injected(MockOperation::ListDependents)?;
        inner.object_mut(handle)?;

        Ok(inner
            .dependents
            .iter_mut()
            .filter(|d| d.parent == handle.id)
            .map(|d| DependentState {
                id: d.id.clone(),
                kind: d.kind.clone(),
                state: d.script.advance(),
            })
            .collect())
    }

    async fn attach_dependent(
        &self,
        handle: &ResourceHandle,
        request: &DependentRequest,
    ) -> ClientResult<DependentState> {
        let mut inner = self.lock();
        inner.counts.attaches += 1;
        inner.injected(MockOperation::AttachDependent)?;
        inner.object_mut(handle)?;

        let id = match request.index {
            Some(i) => format!("{}-{}-{}", request.name, handle.id, i),
            None => format!("{}-{}", request.name, handle.id),
        };
        let script = inner.script_for(&inner.dependent_scripts, &request.kind);
        let state = script.current();

        inner.dependents.push(MockDependent {
            parent: handle.id.clone(),
            id: id.clone(),
            kind: request.kind.clone(),
            script,
            implicit: false,
        });

        Ok(DependentState {
            id,
            kind: request.kind.clone(),
            state,
        })
    }

    async fn find_by_natural_key(
        &self,
        kind: &ResourceKind,
        key: &str,
    ) -> ClientResult<Option<String>> {
        let mut inner = self.lock();
        inner.counts.lookups += 1;
        inner.injected(MockOperation::FindByNaturalKey)?;
        Ok(inner.find_live(kind, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn handle(id: &str) -> ResourceHandle {
        ResourceHandle::new("server", id)
    }

    #[tokio::test]
    async fn test_scripted_states_advance_and_stick() {
        let mock = MockResourceClient::new().with_states("server", ["provisioning", "active"]);
        let created = mock
            .create(&"server".into(), &AttributeMap::from_yaml("hostname: web\n").unwrap())
            .await
            .unwrap();
        assert_eq!(created.state, "provisioning");

        let h = handle(&created.id);
        assert_eq!(mock.get(&h).await.unwrap().state, "provisioning");
        assert_eq!(mock.get(&h).await.unwrap().state, "active");
        assert_eq!(mock.get(&h).await.unwrap().state, "active");
        assert_eq!(mock.operation_counts().gets, 3);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let mock = MockResourceClient::new().with_object("server", "s-1", json!({}), "active");
        mock.fail_next(MockOperation::Get, ClientError::Transient("timeout".into()));

        assert!(mock.get(&handle("s-1")).await.unwrap_err().is_retryable());
        assert!(mock.get(&handle("s-1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_applies_patch() {
        let mock = MockResourceClient::new().with_object(
            "server",
            "s-1",
            json!({"hostname": "web", "cores": 2}),
            "active",
        );

        mock.update(
            &handle("s-1"),
            &[PatchOperation::replace(AttributePath::new(["cores"]), json!(4))],
        )
        .await
        .unwrap();

        assert_eq!(mock.document("s-1").unwrap()["cores"], 4);
        assert_eq!(mock.patches().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_with_lingering_state() {
        let mock = MockResourceClient::new()
            .with_object("server", "s-1", json!({}), "active")
            .with_deletion_state("server", "pending_deletion");

        mock.delete(&handle("s-1")).await.unwrap();
        assert_eq!(mock.get(&handle("s-1")).await.unwrap().state, "pending_deletion");

        let plain = MockResourceClient::new().with_object("server", "s-1", json!({}), "active");
        plain.delete(&handle("s-1")).await.unwrap();
        assert!(plain.get(&handle("s-1")).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_implicit_dependents_follow_count() {
        let mock = MockResourceClient::new()
            .with_dependent_states("app_instance", ["STARTING", "RUNNING"])
            .with_implicit_dependents("app", "app_instance", Some(AttributePath::new(["instances"])));

        let created = mock
            .create(&"app".into(), &AttributeMap::from_yaml("instances: 2\n").unwrap())
            .await
            .unwrap();
        let app = ResourceHandle::new("app", created.id);

        assert_eq!(mock.list_dependents(&app).await.unwrap().len(), 2);

        mock.update(&app, &[PatchOperation::replace(AttributePath::new(["instances"]), json!(3))])
            .await
            .unwrap();
        let members = mock.list_dependents(&app).await.unwrap();
        assert_eq!(members.len(), 3);
        assert_eq!(members[2].state, "STARTING");
    }

    #[tokio::test]
    async fn test_server_side_uniqueness() {
        let mock = MockResourceClient::new().with_natural_key("cluster", AttributePath::new(["name"]));
        let spec = AttributeMap::from_yaml("name: prod\n").unwrap();

        let created = mock.create(&"cluster".into(), &spec).await.unwrap();
        assert!(matches!(
            mock.create(&"cluster".into(), &spec).await,
            Err(ClientError::Conflict(_))
        ));
        assert_eq!(
            mock.find_by_natural_key(&"cluster".into(), "prod").await.unwrap(),
            Some(created.id)
        );
    }
}
