//! Converge Kube - Kubernetes façade for the reconciliation engine
//!
//! This crate provides:
//! - **KubeSession**: `ResourceClient` over dynamic APIs resolved by discovery
//! - **Kinds**: Pod, Deployment, ReplicationController and Service definitions
//! - **State derivation**: a raw state string per object, for the poller

pub mod error;
pub mod kinds;
pub mod session;
pub mod state;

pub use error::{KubeError, Result, classify};
pub use kinds::register;
pub use session::KubeSession;
pub use state::{derive_state, pod_selector};
