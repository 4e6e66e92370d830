//! Kubernetes implementation of the provider façade
//!
//! Kinds are resolved through API discovery into dynamic APIs, so any kind
//! the cluster serves can be driven. Handle ids are `namespace/name` for
//! namespaced objects and `name` otherwise.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    Client, Config,
    api::{Api, DeleteParams, DynamicObject, ListParams, PostParams, PropagationPolicy},
    config::KubeConfigOptions,
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
};
use serde_json::Value as JsonValue;
use tracing::debug;

use converge_core::{AttributeMap, PatchOperation, ResourceHandle, ResourceKind, apply_patch};
use converge_engine::{
    ClientError, ClientResult, DependentRequest, DependentState, RemoteObject, ResourceClient,
};

use crate::error::{KubeError, Result, classify};
use crate::kinds::POD;
use crate::state::{derive_state, pod_selector};

/// Façade over one cluster
pub struct KubeSession {
    client: Client,
    discovery: Discovery,
    namespace: String,
}

impl KubeSession {
    /// Create a session with an existing client, running discovery once
    pub async fn new(client: Client, namespace: impl Into<String>) -> Result<Self> {
        let discovery = Discovery::new(client.clone()).run().await?;
        Ok(Self {
            client,
            discovery,
            namespace: namespace.into(),
        })
    }

    /// Connect using the kubeconfig, optionally selecting a context
    pub async fn connect(context: Option<&str>, namespace: impl Into<String>) -> Result<Self> {
        let config = match context {
            Some(context) => {
                let options = KubeConfigOptions {
                    context: Some(context.to_string()),
                    ..Default::default()
                };
                Config::from_kubeconfig(&options)
                    .await
                    .map_err(|e| KubeError::Config(e.to_string()))?
            }
            None => Config::infer()
                .await
                .map_err(|e| KubeError::Config(e.to_string()))?,
        };
        let client = Client::try_from(config)?;
        Self::new(client, namespace).await
    }

    /// Default namespace for ids without one
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Refresh discovery cache (call after CRD changes)
    pub async fn refresh_discovery(&mut self) -> Result<()> {
        self.discovery = Discovery::new(self.client.clone()).run().await?;
        Ok(())
    }

    /// Handle for a named object in the default namespace
    pub fn handle(&self, kind: impl Into<ResourceKind>, name: &str) -> ResourceHandle {
        ResourceHandle::new(kind, format!("{}/{}", self.namespace, name))
    }

    fn resolve(&self, kind: &ResourceKind) -> Result<(ApiResource, ApiCapabilities)> {
        self.discovery
            .groups()
            .flat_map(|group| group.recommended_resources())
            .find(|(resource, _)| resource.kind.eq_ignore_ascii_case(kind.as_str()))
            .ok_or_else(|| KubeError::UnknownKind {
                kind: kind.to_string(),
            })
    }

    fn api(
        &self,
        resource: &ApiResource,
        capabilities: &ApiCapabilities,
        namespace: Option<&str>,
    ) -> Api<DynamicObject> {
        match capabilities.scope {
            Scope::Namespaced => Api::namespaced_with(
                self.client.clone(),
                namespace.unwrap_or(&self.namespace),
                resource,
            ),
            Scope::Cluster => Api::all_with(self.client.clone(), resource),
        }
    }

    /// Api and object name for a handle
    fn locate(&self, handle: &ResourceHandle) -> Result<(Api<DynamicObject>, ApiResource, String)> {
        let (resource, capabilities) = self.resolve(&handle.kind)?;
        let (namespace, name) = split_id(&handle.id)?;
        let api = self.api(&resource, &capabilities, namespace);
        Ok((api, resource, name.to_string()))
    }

    fn remote(&self, resource: &ApiResource, object: &DynamicObject) -> ClientResult<RemoteObject> {
        let name = object.metadata.name.clone().unwrap_or_default();
        let id = match &object.metadata.namespace {
            Some(namespace) => format!("{}/{}", namespace, name),
            None => name,
        };
        let document = serde_json::to_value(object).map_err(KubeError::from)?;
        Ok(RemoteObject {
            id,
            state: derive_state(&resource.kind, &document),
            document,
        })
    }
}

/// Split `namespace/name` or a bare `name`
fn split_id(id: &str) -> Result<(Option<&str>, &str)> {
    let (namespace, name) = match id.split_once('/') {
        Some((namespace, name)) => (Some(namespace), name),
        None => (None, id),
    };
    if name.is_empty() || name.contains('/') || namespace.is_some_and(str::is_empty) {
        return Err(KubeError::InvalidObject(format!(
            "'{}' is not a namespace/name id",
            id
        )));
    }
    Ok((namespace, name))
}

/// Fill type metadata and the namespace into a desired manifest
fn prepare(
    spec: &AttributeMap,
    resource: &ApiResource,
    capabilities: &ApiCapabilities,
    namespace: &str,
) -> Result<DynamicObject> {
    let mut document = spec.inner().clone();
    let object = document
        .as_object_mut()
        .ok_or_else(|| KubeError::InvalidObject("manifest is not a mapping".to_string()))?;

    object
        .entry("apiVersion")
        .or_insert_with(|| JsonValue::from(resource.api_version.clone()));
    object.insert("kind".to_string(), JsonValue::from(resource.kind.clone()));

    let mut object: DynamicObject = serde_json::from_value(document)?;
    if object.metadata.name.as_deref().is_none_or(str::is_empty) {
        return Err(KubeError::InvalidObject(
            "metadata.name is required".to_string(),
        ));
    }
    if capabilities.scope == Scope::Namespaced && object.metadata.namespace.is_none() {
        object.metadata.namespace = Some(namespace.to_string());
    }
    Ok(object)
}

#[async_trait]
impl ResourceClient for KubeSession {
    async fn create(&self, kind: &ResourceKind, spec: &AttributeMap) -> ClientResult<RemoteObject> {
        let (resource, capabilities) = self.resolve(kind)?;
        let object = prepare(spec, &resource, &capabilities, &self.namespace)?;
        let api = self.api(&resource, &capabilities, object.metadata.namespace.as_deref());

        debug!(kind = %resource.kind, name = ?object.metadata.name, "Creating object");
        let created = api
            .create(&PostParams::default(), &object)
            .await
            .map_err(classify)?;
        self.remote(&resource, &created)
    }

    async fn get(&self, handle: &ResourceHandle) -> ClientResult<RemoteObject> {
        let (api, resource, name) = self.locate(handle)?;
        let object = api.get(&name).await.map_err(classify)?;
        self.remote(&resource, &object)
    }

    /// Fetch, patch locally, replace with the fetched resourceVersion
    async fn update(
        &self,
        handle: &ResourceHandle,
        patch: &[PatchOperation],
    ) -> ClientResult<RemoteObject> {
        let (api, resource, name) = self.locate(handle)?;
        let current = api.get(&name).await.map_err(classify)?;

        let mut document = serde_json::to_value(&current).map_err(KubeError::from)?;
        apply_patch(&mut document, patch).map_err(|e| ClientError::Rejected(e.to_string()))?;
        let mut desired: DynamicObject =
            serde_json::from_value(document).map_err(KubeError::from)?;
        desired.metadata.resource_version = current.metadata.resource_version.clone();

        debug!(
            resource = %handle,
            operations = patch.len(),
            resource_version = ?desired.metadata.resource_version,
            "Replacing object"
        );
        let replaced = api
            .replace(&name, &PostParams::default(), &desired)
            .await
            .map_err(|e| match classify(e) {
                // Someone else wrote in between; a fresh read will succeed
                ClientError::Conflict(message) => ClientError::Transient(message),
                other => other,
            })?;
        self.remote(&resource, &replaced)
    }

    async fn delete(&self, handle: &ResourceHandle) -> ClientResult<()> {
        let (api, _, name) = self.locate(handle)?;
        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            ..Default::default()
        };
        api.delete(&name, &params).await.map_err(classify)?;
        debug!(resource = %handle, "Deletion requested");
        Ok(())
    }

    /// Live pods matched by the object's selector
    async fn list_dependents(&self, handle: &ResourceHandle) -> ClientResult<Vec<DependentState>> {
        let parent = self.get(handle).await?;
        let Some(selector) = pod_selector(handle.kind.as_str(), &parent.document) else {
            return Ok(Vec::new());
        };

        let namespace = parent
            .document
            .pointer("/metadata/namespace")
            .and_then(JsonValue::as_str)
            .unwrap_or(&self.namespace);
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(classify)?;

        Ok(list
            .items
            .into_iter()
            .filter(|pod| pod.metadata.deletion_timestamp.is_none())
            .map(|pod| {
                let name = pod.metadata.name.clone().unwrap_or_default();
                let state = pod
                    .status
                    .and_then(|s| s.phase)
                    .unwrap_or_else(|| "Pending".to_string());
                DependentState {
                    id: format!("{}/{}", namespace, name),
                    kind: ResourceKind::new(POD),
                    state,
                }
            })
            .collect())
    }

    async fn attach_dependent(
        &self,
        handle: &ResourceHandle,
        request: &DependentRequest,
    ) -> ClientResult<DependentState> {
        Err(ClientError::Rejected(format!(
            "{} cannot attach {}: Kubernetes controllers create their own dependents",
            handle, request.name
        )))
    }

    async fn find_by_natural_key(
        &self,
        kind: &ResourceKind,
        key: &str,
    ) -> ClientResult<Option<String>> {
        let (resource, capabilities) = self.resolve(kind)?;
        let (namespace, name) = match key.split_once('/') {
            Some((namespace, name)) => (Some(namespace), name),
            None => (None, key),
        };
        let api = self.api(&resource, &capabilities, namespace);
        let found = api.get_opt(name).await.map_err(classify)?;
        found
            .map(|object| self.remote(&resource, &object).map(|remote| remote.id))
            .transpose()
    }
}
