//! Managed container cluster with a default worker pool

use converge_core::{AttributePath, FieldSchema, ResourceSchema};

use crate::definition::{Cardinality, DependentDefinition, ResourceDefinition};
use crate::poller::StateSets;

pub const KIND: &str = "cluster";
pub const WORKER_POOL_KIND: &str = "worker_pool";

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(KIND)
        .field("name", FieldSchema::string().describe("Cluster name, unique per account"))
        .field("datacenter", FieldSchema::string().immutable())
        .field("kube_version", FieldSchema::string().reprovisions())
        .field("public_vlan_id", FieldSchema::string().immutable())
        .field("private_vlan_id", FieldSchema::string().immutable())
        .field("no_subnet", FieldSchema::boolean().immutable())
        .field(
            "workers",
            FieldSchema::object([
                ("count", FieldSchema::integer().reprovisions()),
                ("machine_type", FieldSchema::string().immutable()),
                ("isolation", FieldSchema::string().immutable()),
                ("labels", FieldSchema::map().omit_if_empty()),
            ])
            .describe("Default worker pool"),
        )
        .field("tags", FieldSchema::set())
        .field(
            "webhook",
            FieldSchema::object([("level", FieldSchema::string()), ("url", FieldSchema::string())])
                .atomic()
                .omit_if_empty(),
        )
        .field("state", FieldSchema::string().computed())
        .field("ingress_hostname", FieldSchema::string().computed())
        .field("server_url", FieldSchema::string().computed())
}

pub fn definition() -> ResourceDefinition {
    ResourceDefinition::new(schema())
        .describe("Managed container cluster; the default worker pool is attached after the master")
        .natural_key(AttributePath::new(["name"]))
        .readiness(
            StateSets::ready(["normal", "warning"])
                .pending(["requested", "deploying", "deployed", "pending"])
                .failed(["critical", "deploy_failed", "delete_failed"]),
        )
        .dependent(
            DependentDefinition::attached(
                "workers",
                WORKER_POOL_KIND,
                AttributePath::new(["workers"]),
                Cardinality::Single,
            )
            .with_readiness(
                StateSets::ready(["normal"])
                    .pending(["provision_pending", "provisioning", "deploying"])
                    .failed(["provision_failed", "critical"]),
            ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_core::{AttributeMap, Mutability};

    #[test]
    fn test_worker_flavor_is_immutable() {
        let schema = schema();
        let path = AttributePath::parse("workers.machine_type").unwrap();
        assert_eq!(schema.mutability(&path), Mutability::ImmutableForcesReplace);
        assert!(schema.reprovisions(&AttributePath::parse("workers.count").unwrap()));
    }

    #[test]
    fn test_worker_pool_request() {
        let desired = AttributeMap::from_yaml(
            "name: prod\nworkers:\n  count: 3\n  machine_type: b3c.4x16\n",
        )
        .unwrap();

        let requests = definition().dependents[0].requests(&desired);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].spec["count"], 3);
    }
}
