//! Kubernetes resource kinds
//!
//! Schemas cover the fields an operator manages; `status` and server-set
//! metadata are computed or left undeclared so they never show up in a diff.
//! Fields the API server defaults are marked `defaulted`: a manifest that
//! leaves them out, or names only part of them, is not a change.

use converge_core::{AttributePath, FieldSchema, ResourceSchema};
use converge_engine::{DefinitionRegistry, DependentDefinition, ResourceDefinition, StateSets};

use crate::state;

pub const POD: &str = "Pod";
pub const DEPLOYMENT: &str = "Deployment";
pub const REPLICATION_CONTROLLER: &str = "ReplicationController";
pub const SERVICE: &str = "Service";

fn metadata() -> FieldSchema {
    FieldSchema::object([
        ("name", FieldSchema::string().immutable()),
        ("namespace", FieldSchema::string().immutable().defaulted()),
        ("labels", FieldSchema::map().omit_if_empty().defaulted()),
        ("annotations", FieldSchema::map().omit_if_empty().defaulted()),
    ])
}

fn base(kind: &str) -> ResourceSchema {
    ResourceSchema::new(kind)
        .field("apiVersion", FieldSchema::string().immutable())
        .field("kind", FieldSchema::string().immutable())
        .field("metadata", metadata())
}

fn pod_readiness() -> StateSets {
    StateSets::ready(["Running"])
        .pending(["Pending"])
        .failed(["Failed"])
}

fn managed_pods() -> DependentDefinition {
    DependentDefinition::implicit("pods", POD, Some(AttributePath::new(["spec", "replicas"])))
        .with_readiness(pod_readiness())
}

fn by_name(definition: ResourceDefinition) -> ResourceDefinition {
    definition.natural_key(AttributePath::new(["metadata", "name"]))
}

pub fn pod() -> ResourceDefinition {
    let schema = base(POD)
        .field(
            "spec",
            FieldSchema::any()
                .immutable()
                .defaulted()
                .describe("Pod spec; the API rejects nearly every change"),
        )
        .field("status", FieldSchema::any().computed());

    by_name(ResourceDefinition::new(schema))
        .describe("Single pod")
        .readiness(pod_readiness())
}

pub fn deployment() -> ResourceDefinition {
    let schema = base(DEPLOYMENT)
        .field(
            "spec",
            FieldSchema::object([
                ("replicas", FieldSchema::integer().reprovisions().defaulted()),
                ("selector", FieldSchema::any().immutable().defaulted()),
                ("template", FieldSchema::any().reprovisions().defaulted()),
                ("strategy", FieldSchema::any().defaulted()),
                ("minReadySeconds", FieldSchema::integer().defaulted()),
                ("revisionHistoryLimit", FieldSchema::integer().defaulted()),
                ("progressDeadlineSeconds", FieldSchema::integer().defaulted()),
                ("paused", FieldSchema::boolean().reprovisions()),
            ]),
        )
        .field("status", FieldSchema::any().computed());

    by_name(ResourceDefinition::new(schema))
        .describe("Deployment; replica and template changes roll out new pods")
        .readiness(
            StateSets::ready([state::AVAILABLE, state::SCALED_DOWN])
                .pending([state::PROGRESSING])
                .failed([state::FAILED]),
        )
        .dependent(managed_pods())
}

pub fn replication_controller() -> ResourceDefinition {
    let schema = base(REPLICATION_CONTROLLER)
        .field(
            "spec",
            FieldSchema::object([
                ("replicas", FieldSchema::integer().reprovisions().defaulted()),
                ("selector", FieldSchema::map().immutable().defaulted()),
                ("template", FieldSchema::any().reprovisions().defaulted()),
                ("minReadySeconds", FieldSchema::integer().defaulted()),
            ]),
        )
        .field("status", FieldSchema::any().computed());

    by_name(ResourceDefinition::new(schema))
        .describe("Replication controller")
        .readiness(StateSets::ready([state::READY]).pending([state::PROGRESSING]))
        .dependent(managed_pods())
}

pub fn service() -> ResourceDefinition {
    let schema = base(SERVICE)
        .field(
            "spec",
            FieldSchema::object([
                ("type", FieldSchema::string().defaulted()),
                ("ports", FieldSchema::list().defaulted()),
                ("selector", FieldSchema::map().omit_if_empty().defaulted()),
                ("sessionAffinity", FieldSchema::string().defaulted()),
                ("externalTrafficPolicy", FieldSchema::string().omit_if_empty().defaulted()),
                (
                    "clusterIP",
                    FieldSchema::string().computed().describe("Allocated by the API server"),
                ),
            ]),
        )
        .field("status", FieldSchema::any().computed());

    by_name(ResourceDefinition::new(schema))
        .describe("Service")
        .readiness(StateSets::ready([state::ACTIVE]))
}

pub fn definitions() -> Vec<ResourceDefinition> {
    vec![pod(), deployment(), replication_controller(), service()]
}

/// Add the Kubernetes kinds to a registry
pub fn register(registry: &mut DefinitionRegistry) {
    for definition in definitions() {
        registry.register(definition);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_core::{AttributeMap, PatchOperation, Plan, plan};
    use serde_json::json;

    const WEB: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  labels:
    app: web
spec:
  replicas: 2
  selector:
    matchLabels:
      app: web
  template:
    metadata:
      labels:
        app: web
    spec:
      containers:
        - name: nginx
          image: nginx:1.27
"#;

    #[test]
    fn test_scaling_reprovisions() {
        let old = AttributeMap::from_yaml(WEB).unwrap();
        let mut new = old.clone();
        new.set(&AttributePath::new(["spec", "replicas"]), 4.into()).unwrap();

        match plan(&deployment().schema, &old, &new).unwrap() {
            Plan::Update {
                operations,
                reprovisions,
                ..
            } => {
                assert!(reprovisions);
                assert_eq!(operations.len(), 1);
                assert_eq!(operations[0].path.to_pointer(), "/spec/replicas");
            }
            other => panic!("expected update, got {:?}", other),
        }
    }

    /// What the API server hands back for `WEB` once it has filled in its defaults
    fn web_as_served() -> AttributeMap {
        AttributeMap::from_yaml(
            r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: default
  uid: 6f1c2a8e-3f0b-4c1e-9d7a-52a1b8c0d001
  resourceVersion: "48213"
  generation: 1
  labels:
    app: web
  annotations:
    deployment.kubernetes.io/revision: "1"
spec:
  replicas: 2
  selector:
    matchLabels:
      app: web
  template:
    metadata:
      creationTimestamp: null
      labels:
        app: web
    spec:
      containers:
        - name: nginx
          image: nginx:1.27
          imagePullPolicy: IfNotPresent
          resources: {}
          terminationMessagePath: /dev/termination-log
          terminationMessagePolicy: File
      dnsPolicy: ClusterFirst
      restartPolicy: Always
      schedulerName: default-scheduler
      securityContext: {}
      terminationGracePeriodSeconds: 30
  strategy:
    type: RollingUpdate
    rollingUpdate:
      maxSurge: 25%
      maxUnavailable: 25%
  revisionHistoryLimit: 10
  progressDeadlineSeconds: 600
status:
  availableReplicas: 2
  readyReplicas: 2
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_reapplying_unchanged_deployment_is_no_change() {
        let desired = AttributeMap::from_yaml(WEB).unwrap();

        let result = plan(&deployment().schema, &web_as_served(), &desired).unwrap();
        assert!(matches!(result, Plan::NoChange), "got {:?}", result);
    }

    #[test]
    fn test_scaling_served_deployment_patches_only_replicas() {
        let mut desired = AttributeMap::from_yaml(WEB).unwrap();
        desired.set(&AttributePath::new(["spec", "replicas"]), 3.into()).unwrap();

        match plan(&deployment().schema, &web_as_served(), &desired).unwrap() {
            Plan::Update { operations, .. } => assert_eq!(
                operations,
                vec![PatchOperation::replace(
                    AttributePath::new(["spec", "replicas"]),
                    json!(3)
                )]
            ),
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[test]
    fn test_template_change_keeps_server_defaults() {
        let mut desired = AttributeMap::from_yaml(WEB).unwrap();
        desired
            .set(
                &AttributePath::parse("spec.template.spec.containers.0.image").unwrap(),
                "nginx:1.28".into(),
            )
            .unwrap();

        match plan(&deployment().schema, &web_as_served(), &desired).unwrap() {
            Plan::Update { operations, .. } => {
                assert_eq!(operations.len(), 1);
                assert_eq!(operations[0].path.to_pointer(), "/spec/template");
                let template = operations[0].value.as_ref().unwrap();
                assert_eq!(template["spec"]["containers"][0]["image"], "nginx:1.28");
                assert_eq!(template["spec"]["restartPolicy"], "Always");
            }
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[test]
    fn test_annotation_change_keeps_server_annotations() {
        let mut desired = AttributeMap::from_yaml(WEB).unwrap();
        desired
            .set(
                &AttributePath::new(["metadata", "annotations", "team"]),
                "platform".into(),
            )
            .unwrap();

        let Plan::Update { operations, .. } =
            plan(&deployment().schema, &web_as_served(), &desired).unwrap()
        else {
            panic!("expected update");
        };

        let mut patched = web_as_served().into_inner();
        converge_core::apply_patch(&mut patched, &operations).unwrap();
        assert_eq!(
            patched["metadata"]["annotations"],
            json!({"deployment.kubernetes.io/revision": "1", "team": "platform"})
        );
    }

    #[test]
    fn test_reapplying_unchanged_pod_is_no_change() {
        let desired = AttributeMap::from_yaml(
            r#"
apiVersion: v1
kind: Pod
metadata:
  name: sleeper
spec:
  containers:
    - name: busybox
      image: busybox:1.36
      command: [sleep, "3600"]
"#,
        )
        .unwrap();
        let mut observed = desired.clone();
        observed
            .set(&AttributePath::parse("metadata.namespace").unwrap(), "default".into())
            .unwrap();
        for (path, value) in [
            ("spec.restartPolicy", json!("Always")),
            ("spec.dnsPolicy", json!("ClusterFirst")),
            ("spec.serviceAccountName", json!("default")),
            ("spec.tolerations", json!([{"key": "node.kubernetes.io/not-ready", "operator": "Exists"}])),
            ("spec.containers.0.imagePullPolicy", json!("IfNotPresent")),
            ("status.phase", json!("Running")),
        ] {
            observed.set(&AttributePath::parse(path).unwrap(), value).unwrap();
        }

        let result = plan(&pod().schema, &observed, &desired).unwrap();
        assert!(matches!(result, Plan::NoChange), "got {:?}", result);

        let mut moved = desired.clone();
        moved
            .set(&AttributePath::parse("spec.containers.0.image").unwrap(), "busybox:1.37".into())
            .unwrap();
        assert!(matches!(
            plan(&pod().schema, &observed, &moved).unwrap(),
            Plan::Replace { .. }
        ));
    }

    #[test]
    fn test_reapplying_unchanged_service_is_no_change() {
        let desired = AttributeMap::from_yaml(
            r#"
apiVersion: v1
kind: Service
metadata:
  name: web
spec:
  selector:
    app: web
  ports:
    - port: 80
"#,
        )
        .unwrap();
        let observed = AttributeMap::from_yaml(
            r#"
apiVersion: v1
kind: Service
metadata:
  name: web
  namespace: default
spec:
  type: ClusterIP
  clusterIP: 10.96.14.2
  sessionAffinity: None
  selector:
    app: web
  ports:
    - port: 80
      protocol: TCP
      targetPort: 80
"#,
        )
        .unwrap();

        let result = plan(&service().schema, &observed, &desired).unwrap();
        assert!(matches!(result, Plan::NoChange), "got {:?}", result);
    }

    #[test]
    fn test_rename_forces_replacement() {
        let old = AttributeMap::from_yaml(WEB).unwrap();
        let mut new = old.clone();
        new.set(&AttributePath::new(["metadata", "name"]), "web-v2".into()).unwrap();

        assert!(matches!(
            plan(&deployment().schema, &old, &new).unwrap(),
            Plan::Replace { .. }
        ));
    }

    #[test]
    fn test_status_never_diffed() {
        let old = AttributeMap::from_yaml(WEB).unwrap();
        let mut observed = old.clone();
        observed
            .set(&AttributePath::new(["status"]), serde_json::json!({"readyReplicas": 2}))
            .unwrap();

        assert!(plan(&deployment().schema, &observed, &old).unwrap().is_no_change());
    }

    #[test]
    fn test_register_alongside_builtins() {
        let mut registry = DefinitionRegistry::builtin();
        register(&mut registry);

        assert!(registry.get("deployment").is_some());
        assert_eq!(registry.suggest("Deploymnt").as_deref(), Some(DEPLOYMENT));
        assert_eq!(registry.len(), 7);
    }
}
