//! Engine configuration management
//!
//! Stored in `~/.config/converge/config.yaml`. A missing file yields the
//! defaults.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::poller::Timing;

/// Per-kind timing overrides; unset fields fall back to the defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingOverride {
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<Duration>,

    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub min_poll_interval: Option<Duration>,

    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub initial_delay: Option<Duration>,
}

impl TimingOverride {
    pub fn apply(&self, base: Timing) -> Timing {
        Timing {
            poll_interval: self.poll_interval.unwrap_or(base.poll_interval),
            min_poll_interval: self.min_poll_interval.unwrap_or(base.min_poll_interval),
            timeout: self.timeout.unwrap_or(base.timeout),
            initial_delay: self.initial_delay.unwrap_or(base.initial_delay),
        }
    }
}

/// Engine configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// API version
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Default convergence timing
    #[serde(default)]
    pub timing: Timing,

    /// Timing overrides keyed by kind name
    #[serde(default)]
    pub kinds: IndexMap<String, TimingOverride>,

    /// Check natural keys before creating
    #[serde(default = "default_true")]
    pub guard_duplicates: bool,

    /// Namespace used when a manifest names none
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_api_version() -> String {
    "converge.io/v1".to_string()
}

fn default_true() -> bool {
    true
}

fn default_namespace() -> String {
    "default".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            timing: Timing::default(),
            kinds: IndexMap::new(),
            guard_duplicates: true,
            namespace: default_namespace(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from default location
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default configuration path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| EngineError::InvalidConfig {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("converge").join("config.yaml"))
    }

    /// Effective timing for a kind
    pub fn timing_for(&self, kind: &str) -> Timing {
        match self.kinds.get(kind) {
            Some(overrides) => overrides.apply(self.timing),
            None => self.timing,
        }
    }

    fn validate(&self) -> Result<()> {
        let check = |scope: &str, timing: Timing| {
            if timing.timeout.is_zero() {
                return Err(EngineError::InvalidConfig {
                    message: format!("{}: timeout must be positive", scope),
                });
            }
            if timing.interval().is_zero() {
                return Err(EngineError::InvalidConfig {
                    message: format!("{}: poll interval must be positive", scope),
                });
            }
            Ok(())
        };

        check("timing", self.timing)?;
        for kind in self.kinds.keys() {
            check(&format!("kinds.{}", kind), self.timing_for(kind))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_fields_missing() {
        let config: EngineConfig = serde_yaml::from_str("namespace: prod\n").unwrap();
        assert_eq!(config.namespace, "prod");
        assert!(config.guard_duplicates);
        assert_eq!(config.timing, Timing::default());
    }

    #[test]
    fn test_per_kind_override() {
        let yaml = r#"
timing:
  pollInterval: 15s
  timeout: 45m
kinds:
  server:
    pollInterval: 1m
    initialDelay: 2m
"#;
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();

        let server = config.timing_for("server");
        assert_eq!(server.poll_interval, Duration::from_secs(60));
        assert_eq!(server.initial_delay, Duration::from_secs(120));
        assert_eq!(server.timeout, Duration::from_secs(45 * 60));

        let cluster = config.timing_for("cluster");
        assert_eq!(cluster.poll_interval, Duration::from_secs(15));
        assert_eq!(cluster.initial_delay, Duration::ZERO);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("converge").join("config.yaml");

        let mut config = EngineConfig::default();
        config.namespace = "staging".to_string();
        config.kinds.insert(
            "cluster".to_string(),
            TimingOverride {
                timeout: Some(Duration::from_secs(5400)),
                ..Default::default()
            },
        );
        config.save_to(&path).unwrap();

        let loaded = EngineConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "kinds:\n  app:\n    timeout: 0s\n").unwrap();

        let err = EngineConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("kinds.app"));
    }
}
