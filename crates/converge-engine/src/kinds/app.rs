//! PaaS application with routes, service bindings and running instances

use converge_core::{AttributePath, FieldSchema, ResourceSchema};

use crate::definition::{Cardinality, DependentDefinition, ResourceDefinition};
use crate::poller::StateSets;

pub const KIND: &str = "app";
pub const ROUTE_KIND: &str = "route";
pub const BINDING_KIND: &str = "service_binding";
pub const INSTANCE_KIND: &str = "app_instance";

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(KIND)
        .field("name", FieldSchema::string())
        .field("space_guid", FieldSchema::string().immutable())
        .field("instances", FieldSchema::integer().reprovisions())
        .field("memory", FieldSchema::integer().reprovisions())
        .field("disk_quota", FieldSchema::integer().reprovisions())
        .field("buildpack", FieldSchema::string().omit_if_empty().reprovisions())
        .field("command", FieldSchema::string().omit_if_empty().reprovisions())
        .field("docker_image", FieldSchema::string().omit_if_empty().reprovisions())
        .field(
            "environment_json",
            FieldSchema::map().omit_if_empty().reprovisions(),
        )
        .field("health_check_type", FieldSchema::string())
        .field("health_check_http_endpoint", FieldSchema::string().omit_if_empty())
        .field("health_check_timeout", FieldSchema::integer())
        .field("route_hostnames", FieldSchema::set())
        .field("service_instance_guids", FieldSchema::set())
        .field(
            "stack",
            FieldSchema::string()
                .unpatchable()
                .describe("Changing the stack requires a restage outside this engine"),
        )
        .field("state", FieldSchema::string().patch_at(AttributePath::new(["desired_state"])))
        .field("guid", FieldSchema::string().computed())
        .field("package_state", FieldSchema::string().computed())
}

pub fn definition() -> ResourceDefinition {
    ResourceDefinition::new(schema())
        .describe("PaaS application; routes and service bindings are attached, instances are started by the platform")
        .readiness(
            StateSets::ready(["STAGED"])
                .pending(["PENDING"])
                .failed(["FAILED"]),
        )
        .dependent(DependentDefinition::attached(
            "routes",
            ROUTE_KIND,
            AttributePath::new(["route_hostnames"]),
            Cardinality::PerElement,
        ))
        .dependent(DependentDefinition::attached(
            "service_bindings",
            BINDING_KIND,
            AttributePath::new(["service_instance_guids"]),
            Cardinality::PerElement,
        ))
        .dependent(
            DependentDefinition::implicit(
                "instances",
                INSTANCE_KIND,
                Some(AttributePath::new(["instances"])),
            )
            .with_readiness(
                StateSets::ready(["RUNNING"])
                    .pending(["STARTING", "DOWN"])
                    .failed(["CRASHED", "FLAPPING"]),
            ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_core::{AttributeMap, PatchBuilder, PatchOperationKind, diff};

    #[test]
    fn test_state_patched_at_desired_state() {
        let schema = schema();
        let old = AttributeMap::from_yaml("name: api\nstate: STOPPED\n").unwrap();
        let new = AttributeMap::from_yaml("name: api\nstate: STARTED\n").unwrap();

        let changes = diff(&schema, &old, &new).unwrap();
        let ops = PatchBuilder::new(&schema).build(&changes, &old).unwrap();

        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, PatchOperationKind::Replace);
        assert_eq!(ops[0].path.to_pointer(), "/desired_state");
    }

    #[test]
    fn test_one_route_per_hostname() {
        let desired = AttributeMap::from_yaml(
            "name: api\nroute_hostnames: [api.example.com, api.internal]\ninstances: 2\n",
        )
        .unwrap();
        let definition = definition();

        assert_eq!(definition.dependents[0].requests(&desired).len(), 2);
        assert!(definition.dependents[1].requests(&desired).is_empty());
        assert_eq!(definition.dependents[2].expected_count(&desired).unwrap(), Some(2));
    }
}
