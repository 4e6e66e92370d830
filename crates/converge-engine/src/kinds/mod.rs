//! Built-in resource kinds
//!
//! - `cluster`: managed container cluster with an attached worker pool
//! - `app`: PaaS application with routes, bindings and instances
//! - `server`: bare-metal or virtual server

pub mod app;
pub mod cluster;
pub mod server;

use crate::definition::ResourceDefinition;

/// Definitions for every built-in kind
pub fn builtin() -> Vec<ResourceDefinition> {
    vec![cluster::definition(), app::definition(), server::definition()]
}
