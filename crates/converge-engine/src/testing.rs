//! Explicit fixtures for lifecycle tests
//!
//! Tests build a [`TestEnvironment`] and pass it into setup; nothing is read
//! from globals after construction.

use std::sync::Arc;
use std::time::Duration;

use crate::definition::ResourceDefinition;
use crate::lifecycle::ResourceLifecycle;
use crate::poller::Timing;
use crate::session::ResourceClient;

/// Settings shared by one test run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestEnvironment {
    pub timing: Timing,

    /// Namespace for live-cluster tests
    pub namespace: String,

    /// Leave created resources behind for inspection
    pub keep_resources: bool,

    /// Kubeconfig context; `None` uses the current one
    pub kube_context: Option<String>,
}

impl TestEnvironment {
    /// Fast timing for in-memory runs
    pub fn offline() -> Self {
        Self {
            timing: Timing {
                poll_interval: Duration::from_secs(1),
                min_poll_interval: Duration::from_secs(1),
                timeout: Duration::from_secs(60),
                initial_delay: Duration::ZERO,
            },
            namespace: "default".to_string(),
            keep_resources: false,
            kube_context: None,
        }
    }

    /// Read `CONVERGE_TEST_*` variables on top of the offline defaults
    ///
    /// - `CONVERGE_TEST_NAMESPACE`
    /// - `CONVERGE_TEST_CONTEXT`
    /// - `CONVERGE_TEST_TIMEOUT` (seconds)
    /// - `CONVERGE_TEST_KEEP` (any value but `0` or `false`)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut env = Self::offline();
        env.timing.poll_interval = Duration::from_secs(2);
        env.timing.timeout = Duration::from_secs(300);

        if let Some(namespace) = lookup("CONVERGE_TEST_NAMESPACE") {
            env.namespace = namespace;
        }
        env.kube_context = lookup("CONVERGE_TEST_CONTEXT");
        if let Some(secs) = lookup("CONVERGE_TEST_TIMEOUT").and_then(|s| s.parse().ok()) {
            env.timing.timeout = Duration::from_secs(secs);
        }
        env.keep_resources = lookup("CONVERGE_TEST_KEEP")
            .is_some_and(|v| !matches!(v.as_str(), "" | "0" | "false"));
        env
    }

    /// Lifecycle for `definition` over `client`, with this environment's timing
    pub fn lifecycle<C: ResourceClient + ?Sized>(
        &self,
        client: Arc<C>,
        definition: ResourceDefinition,
    ) -> ResourceLifecycle<C> {
        ResourceLifecycle::new(client, definition).with_timing(self.timing)
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::offline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CONVERGE_TEST_NAMESPACE", "e2e"),
            ("CONVERGE_TEST_TIMEOUT", "90"),
            ("CONVERGE_TEST_KEEP", "1"),
        ]
        .into_iter()
        .collect();

        let env = TestEnvironment::from_lookup(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(env.namespace, "e2e");
        assert_eq!(env.timing.timeout, Duration::from_secs(90));
        assert!(env.keep_resources);
        assert!(env.kube_context.is_none());
    }

    #[test]
    fn test_keep_flag_false_values() {
        let env = TestEnvironment::from_lookup(|name| {
            (name == "CONVERGE_TEST_KEEP").then(|| "false".to_string())
        });
        assert!(!env.keep_resources);
        assert_eq!(env.namespace, "default");
    }
}
