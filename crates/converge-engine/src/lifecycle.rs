//! Resource lifecycle orchestration
//!
//! Create runs strictly in order: duplicate guard, primary creation, each
//! declared dependent, readiness of the primary, readiness of dependent
//! groups, read-back. A failure after the primary exists is returned as
//! [`EngineError::PartialCreate`] carrying the handle; nothing is rolled
//! back.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use converge_core::{
    DesiredState, ObservedState, PatchBuilder, Plan, ResourceHandle, ResourceKind, diff, plan,
};

use crate::actions::{CreateOptions, DeleteOptions, UpdateOptions};
use crate::definition::{DependentDefinition, ResourceDefinition, aggregate};
use crate::error::{EngineError, Result};
use crate::poller::{Converged, ConvergencePoller, ConvergenceTarget, Observation, StateSets, Timing};
use crate::session::{ClientError, RemoteObject, ResourceClient};

/// Outcome of [`ResourceLifecycle::apply`]
#[derive(Debug, Clone)]
pub enum Applied {
    Created {
        handle: ResourceHandle,
        observed: ObservedState,
    },
    Updated {
        handle: ResourceHandle,
        observed: ObservedState,
    },
    Unchanged {
        handle: ResourceHandle,
        observed: ObservedState,
    },
}

impl Applied {
    pub fn handle(&self) -> &ResourceHandle {
        match self {
            Applied::Created { handle, .. }
            | Applied::Updated { handle, .. }
            | Applied::Unchanged { handle, .. } => handle,
        }
    }

    pub fn observed(&self) -> &ObservedState {
        match self {
            Applied::Created { observed, .. }
            | Applied::Updated { observed, .. }
            | Applied::Unchanged { observed, .. } => observed,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Applied::Created { .. } => "created",
            Applied::Updated { .. } => "updated",
            Applied::Unchanged { .. } => "unchanged",
        }
    }
}

/// Lifecycle of one resource kind against one façade
pub struct ResourceLifecycle<C: ResourceClient + ?Sized> {
    client: Arc<C>,
    definition: ResourceDefinition,
    timing: Timing,
}

impl<C: ResourceClient + ?Sized> ResourceLifecycle<C> {
    pub fn new(client: Arc<C>, definition: ResourceDefinition) -> Self {
        Self {
            client,
            definition,
            timing: Timing::default(),
        }
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn definition(&self) -> &ResourceDefinition {
        &self.definition
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.definition.kind
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Create the resource and wait for it to converge
    pub async fn create(
        &self,
        desired: &DesiredState,
        options: &CreateOptions,
    ) -> Result<(ResourceHandle, ObservedState)> {
        let kind = &self.definition.kind;
        let key = self.definition.natural_key_of(desired);

        if options.guard_duplicates
            && let Some(key) = &key
        {
            debug!(kind = %kind, key = %key, "Checking for an existing resource");
            let existing = self
                .client
                .find_by_natural_key(kind, key)
                .await
                .map_err(|e| EngineError::remote("find", format!("{} '{}'", kind, key), e))?;
            if let Some(id) = existing {
                return Err(EngineError::AlreadyExists {
                    kind: kind.clone(),
                    key: key.clone(),
                    id: Some(id),
                });
            }
        }

        let remote = match self.client.create(kind, desired).await {
            Ok(remote) => remote,
            Err(ClientError::Conflict(_)) => {
                return Err(EngineError::AlreadyExists {
                    kind: kind.clone(),
                    key: key.unwrap_or_default(),
                    id: None,
                });
            }
            Err(e) => return Err(EngineError::remote("create", kind, e)),
        };

        let handle = ResourceHandle::new(kind.clone(), remote.id);
        info!(kind = %kind, id = %handle.id, state = %remote.state, "Resource created");

        let partial = |step: String, source: EngineError| EngineError::PartialCreate {
            handle: handle.clone(),
            step,
            source: Box::new(source),
        };

        for dependent in &self.definition.dependents {
            for request in dependent.requests(desired) {
                let step = match request.index {
                    Some(i) => format!("attaching {}[{}]", dependent.name, i),
                    None => format!("attaching {}", dependent.name),
                };
                let attached = self
                    .client
                    .attach_dependent(&handle, &request)
                    .await
                    .map_err(|e| partial(step, EngineError::remote("attach_dependent", &handle, e)))?;
                debug!(
                    resource = %handle,
                    dependent = %dependent.name,
                    id = %attached.id,
                    state = %attached.state,
                    "Dependent attached"
                );
            }
        }

        if options.wait {
            let timing = self.timing_for(options.timeout);

            if let Some(states) = &self.definition.readiness {
                self.await_primary(&handle, states, timing, &options.cancel)
                    .await
                    .map_err(|e| partial("waiting for readiness".to_string(), e))?;
            }

            for dependent in &self.definition.dependents {
                if let Some(states) = &dependent.readiness {
                    let expected = dependent
                        .expected_count(desired)
                        .map_err(|e| partial(format!("counting {}", dependent.name), e))?;
                    self.await_dependents(&handle, dependent, states, expected, timing, &options.cancel)
                        .await
                        .map_err(|e| partial(format!("waiting for {}", dependent.name), e))?;
                }
            }
        }

        let observed = self
            .read(&handle)
            .await
            .map_err(|e| partial("reading back".to_string(), e))?;

        Ok((handle, observed))
    }

    /// Single fetch of the current state
    pub async fn read(&self, handle: &ResourceHandle) -> Result<ObservedState> {
        let remote = self
            .client
            .get(handle)
            .await
            .map_err(|e| lookup_error("get", handle, e))?;
        Ok(self.observe(remote))
    }

    /// Move a resource from `old` to `desired` in place
    ///
    /// No remote call is made when nothing changed. Waits only when a
    /// changed field triggers re-provisioning.
    pub async fn update(
        &self,
        handle: &ResourceHandle,
        old: &ObservedState,
        desired: &DesiredState,
        options: &UpdateOptions,
    ) -> Result<ObservedState> {
        let schema = &self.definition.schema;
        let changes = diff(schema, &old.attributes, desired)?;

        if changes.is_empty() {
            debug!(resource = %handle, "No changes to apply");
            return Ok(old.clone());
        }

        let operations = PatchBuilder::new(schema).build(&changes, &old.attributes)?;
        let reprovisions = changes.iter().any(|c| schema.reprovisions(&c.path));

        info!(
            resource = %handle,
            changes = changes.len(),
            operations = operations.len(),
            reprovisions,
            "Updating resource"
        );

        let remote = self
            .client
            .update(handle, &operations)
            .await
            .map_err(|e| lookup_error("update", handle, e))?;

        if !(reprovisions && options.wait) {
            return Ok(self.observe(remote));
        }

        let timing = self.timing_for(options.timeout);
        if let Some(states) = &self.definition.readiness {
            self.await_primary(handle, states, timing, &options.cancel).await?;
        }
        for dependent in &self.definition.dependents {
            if let Some(states) = &dependent.readiness {
                let expected = dependent.expected_count(desired)?;
                self.await_dependents(handle, dependent, states, expected, timing, &options.cancel)
                    .await?;
            }
        }

        self.read(handle).await
    }

    /// Request deletion; succeeds once the provider accepts it
    pub async fn delete(&self, handle: ResourceHandle, options: &DeleteOptions) -> Result<()> {
        if options.cancel.is_cancelled() {
            return Err(EngineError::Cancelled {
                resource: handle.to_string(),
            });
        }

        match self.client.delete(&handle).await {
            Ok(()) => {
                info!(resource = %handle, "Deletion accepted");
                Ok(())
            }
            Err(ClientError::NotFound(_)) if options.ignore_not_found => {
                debug!(resource = %handle, "Resource already gone");
                Ok(())
            }
            Err(ClientError::NotFound(_)) => Err(EngineError::NotFound { handle }),
            Err(e) => Err(EngineError::remote("delete", &handle, e)),
        }
    }

    /// Only a definitive not-found yields false
    pub async fn exists(&self, handle: &ResourceHandle) -> Result<bool> {
        match self.client.get(handle).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(EngineError::remote("get", handle, e)),
        }
    }

    /// Preview an update without calling the provider
    pub fn plan(&self, old: &ObservedState, desired: &DesiredState) -> Result<Plan> {
        Ok(plan(&self.definition.schema, &old.attributes, desired)?)
    }

    /// Create the resource, or update the one sharing its natural key
    pub async fn apply(&self, desired: &DesiredState, options: &CreateOptions) -> Result<Applied> {
        let existing = match self.definition.natural_key_of(desired) {
            Some(key) => self
                .client
                .find_by_natural_key(&self.definition.kind, &key)
                .await
                .map_err(|e| EngineError::remote("find", format!("{} '{}'", self.definition.kind, key), e))?,
            None => None,
        };

        let Some(id) = existing else {
            let create = options.clone().with_duplicate_guard(false);
            let (handle, observed) = self.create(desired, &create).await?;
            return Ok(Applied::Created { handle, observed });
        };

        let handle = ResourceHandle::new(self.definition.kind.clone(), id);
        let old = self.read(&handle).await?;

        if diff(&self.definition.schema, &old.attributes, desired)?.is_empty() {
            return Ok(Applied::Unchanged {
                handle,
                observed: old,
            });
        }

        let update = UpdateOptions {
            wait: options.wait,
            timeout: options.timeout,
            cancel: options.cancel.clone(),
        };
        let observed = self.update(&handle, &old, desired, &update).await?;
        Ok(Applied::Updated { handle, observed })
    }

    fn observe(&self, remote: RemoteObject) -> ObservedState {
        ObservedState::new(self.definition.schema.project(&remote.document), remote.state)
    }

    fn timing_for(&self, timeout: Option<std::time::Duration>) -> Timing {
        match timeout {
            Some(timeout) => self.timing.with_timeout(timeout),
            None => self.timing,
        }
    }

    async fn await_primary(
        &self,
        handle: &ResourceHandle,
        states: &StateSets,
        timing: Timing,
        cancel: &CancellationToken,
    ) -> Result<Converged> {
        let poller = ConvergencePoller::new(ConvergenceTarget::new(states.clone(), timing)?);
        let client = &self.client;

        poller
            .await_state(&handle.to_string(), cancel, move || async move {
                client
                    .get(handle)
                    .await
                    .map(|remote| remote.state)
                    .map_err(|e| lookup_error("get", handle, e))
            })
            .await
    }

    async fn await_dependents(
        &self,
        handle: &ResourceHandle,
        dependent: &DependentDefinition,
        states: &StateSets,
        expected: Option<usize>,
        timing: Timing,
        cancel: &CancellationToken,
    ) -> Result<Converged> {
        let poller = ConvergencePoller::new(ConvergenceTarget::new(states.clone(), timing)?);
        let client = &self.client;
        let subject = format!("{} {}", handle, dependent.name);

        poller
            .await_classified(&subject, cancel, move || async move {
                match client.list_dependents(handle).await {
                    Ok(members) => {
                        let members: Vec<_> =
                            members.into_iter().filter(|m| m.kind == dependent.kind).collect();
                        let (class, state) = aggregate(&members, states, expected);
                        Ok(Observation { class, state })
                    }
                    Err(e) => Err(lookup_error("list_dependents", handle, e)),
                }
            })
            .await
    }
}

fn lookup_error(operation: &'static str, handle: &ResourceHandle, e: ClientError) -> EngineError {
    match e {
        ClientError::NotFound(_) => EngineError::NotFound {
            handle: handle.clone(),
        },
        other => EngineError::remote(operation, handle, other),
    }
}
