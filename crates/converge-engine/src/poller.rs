//! Convergence polling
//!
//! The poller drives a caller-supplied probe until it reports a ready or
//! failed state, the timeout elapses, or the wait is cancelled. It never
//! runs two probes at once, and never waits longer than the timeout plus
//! one poll interval.
//!
//! States that appear in none of the target's sets are treated as pending.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};

/// Classification of a probed state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateClass {
    Pending,
    Ready,
    Failed,
}

impl std::fmt::Display for StateClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateClass::Pending => write!(f, "pending"),
            StateClass::Ready => write!(f, "ready"),
            StateClass::Failed => write!(f, "failed"),
        }
    }
}

/// The raw state strings a kind reports, grouped by meaning
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSets {
    #[serde(default)]
    pub pending: Vec<String>,

    pub ready: Vec<String>,

    #[serde(default)]
    pub failed: Vec<String>,
}

impl StateSets {
    /// Sets with the given ready states and nothing else
    pub fn ready<I, S>(states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ready: states.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn pending<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending = states.into_iter().map(Into::into).collect();
        self
    }

    pub fn failed<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failed = states.into_iter().map(Into::into).collect();
        self
    }

    pub fn classify(&self, state: &str) -> StateClass {
        if self.ready.iter().any(|s| s == state) {
            StateClass::Ready
        } else if self.failed.iter().any(|s| s == state) {
            StateClass::Failed
        } else {
            StateClass::Pending
        }
    }

    fn validate(&self) -> Result<()> {
        if self.ready.is_empty() {
            return Err(EngineError::InvalidTarget(
                "at least one ready state is required".to_string(),
            ));
        }

        let groups = [("pending", &self.pending), ("ready", &self.ready), ("failed", &self.failed)];
        for (i, (name, states)) in groups.iter().enumerate() {
            for (other, other_states) in &groups[i + 1..] {
                if let Some(shared) = states.iter().find(|s| other_states.contains(s)) {
                    return Err(EngineError::InvalidTarget(format!(
                        "state '{}' is listed as both {} and {}",
                        shared, name, other
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Poll timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Floor applied to `poll_interval`
    #[serde(with = "humantime_serde", default = "default_min_poll_interval")]
    pub min_poll_interval: Duration,

    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,

    /// Delay before the first probe
    #[serde(with = "humantime_serde", default)]
    pub initial_delay: Duration,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_min_poll_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            min_poll_interval: default_min_poll_interval(),
            timeout: default_timeout(),
            initial_delay: Duration::ZERO,
        }
    }
}

impl Timing {
    /// Effective delay between probes
    pub fn interval(&self) -> Duration {
        self.poll_interval.max(self.min_poll_interval)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// What one poller invocation waits for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergenceTarget {
    states: StateSets,
    timing: Timing,
}

impl ConvergenceTarget {
    /// Rejects targets without ready states, with a state in more than one
    /// set, or with a zero timeout
    pub fn new(states: StateSets, timing: Timing) -> Result<Self> {
        states.validate()?;
        if timing.timeout.is_zero() {
            return Err(EngineError::InvalidTarget("timeout must be positive".to_string()));
        }
        Ok(Self { states, timing })
    }

    pub fn states(&self) -> &StateSets {
        &self.states
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn classify(&self, state: &str) -> StateClass {
        self.states.classify(state)
    }
}

/// Successful wait outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converged {
    /// Raw state that satisfied the target
    pub state: String,

    /// Number of probes issued
    pub probes: u32,

    pub elapsed: Duration,
}

/// A probe result already classified by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub class: StateClass,

    /// Raw state or summary reported in errors and logs
    pub state: String,
}

/// Bounded polling loop
pub struct ConvergencePoller {
    target: ConvergenceTarget,
}

impl ConvergencePoller {
    pub fn new(target: ConvergenceTarget) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &ConvergenceTarget {
        &self.target
    }

    /// Poll until the probed state is ready or failed
    ///
    /// `subject` names the resource in logs and errors.
    pub async fn await_state<F, Fut>(
        &self,
        subject: &str,
        cancel: &CancellationToken,
        mut probe: F,
    ) -> Result<Converged>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let target = &self.target;
        self.await_classified(subject, cancel, || {
            let fut = probe();
            async move {
                fut.await.map(|state| Observation {
                    class: target.classify(&state),
                    state,
                })
            }
        })
        .await
    }

    /// Poll a probe that classifies its own result
    ///
    /// Used for aggregate readiness of dependent groups, where no single
    /// raw state decides the outcome.
    pub async fn await_classified<F, Fut>(
        &self,
        subject: &str,
        cancel: &CancellationToken,
        mut probe: F,
    ) -> Result<Converged>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Observation>>,
    {
        let timing = self.target.timing;
        let start = Instant::now();
        let deadline = start + timing.timeout;
        let interval = timing.interval();

        let mut probes = 0u32;
        let mut last_state: Option<String> = None;
        let mut last_error: Option<String> = None;

        let timed_out = |probes: u32, last_state: Option<String>, last_error: Option<String>| {
            warn!(resource = %subject, probes, ?last_state, "Convergence timed out");
            EngineError::ConvergenceTimeout {
                resource: subject.to_string(),
                last_state,
                last_error,
                elapsed: start.elapsed(),
            }
        };
        let cancelled = |probes: u32| {
            info!(resource = %subject, probes, "Convergence wait cancelled");
            EngineError::Cancelled {
                resource: subject.to_string(),
            }
        };

        if !timing.initial_delay.is_zero() {
            let wake = (start + timing.initial_delay).min(deadline);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(probes)),
                _ = sleep_until(wake) => {}
            }
        }

        loop {
            if Instant::now() >= deadline {
                return Err(timed_out(probes, last_state, last_error));
            }

            probes += 1;
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(probes)),
                _ = sleep_until(deadline) => None,
                outcome = probe() => Some(outcome),
            };

            match outcome {
                None => return Err(timed_out(probes, last_state, last_error)),
                Some(Ok(observation)) => match observation.class {
                    StateClass::Ready => {
                        let elapsed = start.elapsed();
                        info!(
                            resource = %subject,
                            state = %observation.state,
                            probes,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Resource converged"
                        );
                        return Ok(Converged {
                            state: observation.state,
                            probes,
                            elapsed,
                        });
                    }
                    StateClass::Failed => {
                        warn!(resource = %subject, state = %observation.state, probes, "Resource failed");
                        return Err(EngineError::ConvergenceFailed {
                            resource: subject.to_string(),
                            state: observation.state,
                        });
                    }
                    StateClass::Pending => {
                        debug!(resource = %subject, state = %observation.state, attempt = probes, "Still pending");
                        last_state = Some(observation.state);
                    }
                },
                Some(Err(e)) if e.is_retryable() => {
                    warn!(resource = %subject, attempt = probes, error = %e, "Probe failed, retrying");
                    last_error = Some(e.to_string());
                }
                Some(Err(e)) => return Err(e),
            }

            let wake = (Instant::now() + interval).min(deadline);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(probes)),
                _ = sleep_until(wake) => {}
            }
        }
    }
}
