//! Converge Engine - convergence and lifecycle orchestration
//!
//! This crate provides:
//! - **ConvergencePoller**: bounded polling until a state set is reached
//! - **ResourceLifecycle**: create, read, update, delete and exists over a façade
//! - **ResourceClient**: the façade contract providers implement
//! - **MockResourceClient**: scripted in-memory façade for tests and simulation
//! - **Definitions**: per-kind schema, readiness and dependent declarations
//! - **EngineConfig**: timing defaults and per-kind overrides

pub mod actions;
pub mod config;
pub mod definition;
pub mod error;
pub mod kinds;
pub mod lifecycle;
pub mod mock;
pub mod poller;
pub mod registry;
pub mod session;
pub mod testing;

pub use actions::{CreateOptions, DeleteOptions, UpdateOptions};
pub use config::{EngineConfig, TimingOverride};
pub use definition::{
    Cardinality, DependentDefinition, Provisioning, ResourceDefinition, aggregate,
};
pub use error::{EngineError, Result};
pub use lifecycle::{Applied, ResourceLifecycle};
pub use mock::{MockOperation, MockResourceClient, OperationCounts};
pub use poller::{
    Converged, ConvergencePoller, ConvergenceTarget, Observation, StateClass, StateSets, Timing,
};
pub use registry::DefinitionRegistry;
pub use session::{
    ClientError, ClientResult, DependentRequest, DependentState, RemoteObject, ResourceClient,
};
pub use testing::TestEnvironment;

pub use tokio_util::sync::CancellationToken;
