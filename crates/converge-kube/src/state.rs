//! Raw state strings derived from Kubernetes objects
//!
//! Kubernetes has no single state field, so each supported kind gets a
//! derived one:
//!
//! | kind | states |
//! |---|---|
//! | Pod | `status.phase` |
//! | Deployment | `Available`, `Progressing`, `ScaledDown`, `Failed` |
//! | ReplicationController | `Ready`, `Progressing` |
//! | Service | `Active` |
//!
//! Other kinds report `status.phase` when present and `Active` otherwise.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, ReplicationController};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

pub const AVAILABLE: &str = "Available";
pub const PROGRESSING: &str = "Progressing";
pub const SCALED_DOWN: &str = "ScaledDown";
pub const FAILED: &str = "Failed";
pub const READY: &str = "Ready";
pub const ACTIVE: &str = "Active";

/// Reason reported on the Progressing condition once the deadline passed
const PROGRESS_DEADLINE_EXCEEDED: &str = "ProgressDeadlineExceeded";

/// Derived state for an object document of `kind`
pub fn derive_state(kind: &str, document: &JsonValue) -> String {
    match kind {
        "Pod" => typed::<Pod>(document)
            .and_then(|pod| pod.status?.phase)
            .unwrap_or_else(|| "Pending".to_string()),
        "Deployment" => typed::<Deployment>(document)
            .map(|d| deployment_state(&d))
            .unwrap_or(PROGRESSING)
            .to_string(),
        "ReplicationController" => typed::<ReplicationController>(document)
            .map(|rc| replication_controller_state(&rc))
            .unwrap_or(PROGRESSING)
            .to_string(),
        "Service" => ACTIVE.to_string(),
        _ => document
            .pointer("/status/phase")
            .and_then(JsonValue::as_str)
            .unwrap_or(ACTIVE)
            .to_string(),
    }
}

fn deployment_state(deployment: &Deployment) -> &'static str {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let Some(status) = &deployment.status else {
        return PROGRESSING;
    };

    let deadline_exceeded = status.conditions.iter().flatten().any(|c| {
        c.type_ == "Progressing" && c.reason.as_deref() == Some(PROGRESS_DEADLINE_EXCEEDED)
    });
    if deadline_exceeded {
        return FAILED;
    }

    if !generation_observed(
        deployment.metadata.generation,
        status.observed_generation,
    ) {
        return PROGRESSING;
    }

    if desired == 0 {
        return SCALED_DOWN;
    }

    let ready = status.ready_replicas.unwrap_or(0);
    let updated = status.updated_replicas.unwrap_or(0);
    let available = status.available_replicas.unwrap_or(0);

    if ready == desired && updated == desired && available == desired {
        AVAILABLE
    } else {
        PROGRESSING
    }
}

fn replication_controller_state(rc: &ReplicationController) -> &'static str {
    let desired = rc.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let Some(status) = &rc.status else {
        return PROGRESSING;
    };

    if !generation_observed(rc.metadata.generation, status.observed_generation) {
        return PROGRESSING;
    }

    if status.replicas == desired && status.ready_replicas.unwrap_or(0) == desired {
        READY
    } else {
        PROGRESSING
    }
}

/// A status written for an older generation says nothing about the current spec
fn generation_observed(generation: Option<i64>, observed: Option<i64>) -> bool {
    match (generation, observed) {
        (Some(generation), Some(observed)) => observed >= generation,
        (Some(_), None) => false,
        (None, _) => true,
    }
}

/// Label selector for the pods an object manages, as `k=v,k2=v2`
pub fn pod_selector(kind: &str, document: &JsonValue) -> Option<String> {
    let labels = match kind {
        "Deployment" => typed::<Deployment>(document)?.spec?.selector.match_labels?,
        "ReplicationController" => typed::<ReplicationController>(document)?.spec?.selector?,
        _ => return None,
    };
    render_selector(&labels)
}

fn render_selector(labels: &BTreeMap<String, String>) -> Option<String> {
    if labels.is_empty() {
        return None;
    }
    Some(
        labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// Deserialize a document as `K`, tolerating missing type metadata
fn typed<K>(document: &JsonValue) -> Option<K>
where
    K: k8s_openapi::Resource + DeserializeOwned,
{
    let mut document = document.clone();
    let object = document.as_object_mut()?;
    object.insert("apiVersion".to_string(), JsonValue::from(K::API_VERSION));
    object.insert("kind".to_string(), JsonValue::from(K::KIND));
    serde_json::from_value(document).ok()
}
