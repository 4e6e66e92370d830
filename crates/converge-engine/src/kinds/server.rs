//! Bare-metal or virtual server

use converge_core::{AttributePath, FieldSchema, ResourceSchema};

use crate::definition::ResourceDefinition;
use crate::poller::StateSets;

pub const KIND: &str = "server";

/// Raw state reported while a deletion request is being processed
pub const PENDING_DELETION: &str = "pending_deletion";

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(KIND)
        .field("hostname", FieldSchema::string())
        .field("domain", FieldSchema::string())
        .field("datacenter", FieldSchema::string().immutable())
        .field("os_reference_code", FieldSchema::string().immutable())
        .field("image_id", FieldSchema::string().immutable())
        .field("hourly_billing", FieldSchema::boolean().immutable())
        .field("private_network_only", FieldSchema::boolean().immutable())
        .field("dedicated_host", FieldSchema::boolean().immutable())
        .field("cores", FieldSchema::integer().reprovisions())
        .field("memory", FieldSchema::integer().reprovisions())
        .field("network_speed", FieldSchema::integer())
        .field("disks", FieldSchema::list().immutable())
        .field("ssh_key_ids", FieldSchema::set().immutable())
        .field("tags", FieldSchema::set())
        .field("notes", FieldSchema::string().omit_if_empty())
        .field("user_metadata", FieldSchema::string().unpatchable())
        .field(
            "public_ipv4",
            FieldSchema::string().computed().describe("Assigned during provisioning"),
        )
        .field("private_ipv4", FieldSchema::string().computed())
        .field("status", FieldSchema::string().computed())
}

pub fn definition() -> ResourceDefinition {
    ResourceDefinition::new(schema())
        .describe("Server; core and memory changes trigger an upgrade transaction")
        .natural_key(AttributePath::new(["hostname"]))
        .readiness(
            StateSets::ready(["active"])
                .pending(["provisioning", "upgrading", "reloading"])
                .failed(["failed", "reclaimed"]),
        )
}
