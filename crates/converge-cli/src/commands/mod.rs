//! CLI commands

pub mod apply;
pub mod delete;
pub mod kinds;
pub mod plan;
pub mod status;

use std::path::Path;

use converge_engine::{CancellationToken, DefinitionRegistry, EngineConfig};
use converge_kube::KubeSession;

use crate::error::Result;

/// State shared by every command
pub struct Context {
    pub config: EngineConfig,
    pub registry: DefinitionRegistry,
}

impl Context {
    /// Load the configuration and register every known kind
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => EngineConfig::load_from(path)?,
            None => EngineConfig::load()?,
        };

        let mut registry = DefinitionRegistry::builtin();
        converge_kube::register(&mut registry);

        Ok(Self { config, registry })
    }

    /// Namespace from the flag, then the config
    pub fn namespace(&self, flag: Option<&str>) -> String {
        flag.map(str::to_string)
            .unwrap_or_else(|| self.config.namespace.clone())
    }

    pub async fn connect(&self, namespace: &str) -> Result<KubeSession> {
        Ok(KubeSession::connect(None, namespace).await?)
    }
}

/// Token cancelled on Ctrl-C
pub fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; abandoning the wait");
            trigger.cancel();
        }
    });
    token
}
