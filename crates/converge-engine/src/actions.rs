//! Options for create, update and delete operations

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Options for create operation
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Wait for the resource and its dependents to be ready
    pub wait: bool,

    /// Override for the kind's convergence timeout
    pub timeout: Option<Duration>,

    /// Look up the natural key before creating
    pub guard_duplicates: bool,

    /// Cancels the wait loop only
    pub cancel: CancellationToken,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            wait: true,
            timeout: None,
            guard_duplicates: true,
            cancel: CancellationToken::new(),
        }
    }
}

impl CreateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return as soon as the creation calls are accepted
    pub fn no_wait(mut self) -> Self {
        self.wait = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_duplicate_guard(mut self, enabled: bool) -> Self {
        self.guard_duplicates = enabled;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Options for update operation
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// Wait for re-provisioning when a changed field triggers it
    pub wait: bool,

    pub timeout: Option<Duration>,

    pub cancel: CancellationToken,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            wait: true,
            timeout: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl UpdateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_wait(mut self) -> Self {
        self.wait = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Options for delete operation
#[derive(Debug, Clone)]
pub struct DeleteOptions {
    /// Treat a resource that is already gone as deleted
    pub ignore_not_found: bool,

    /// Checked once before the request is sent
    pub cancel: CancellationToken,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            ignore_not_found: true,
            cancel: CancellationToken::new(),
        }
    }
}

impl DeleteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Surface a missing resource as an error
    pub fn strict(mut self) -> Self {
        self.ignore_not_found = false;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}
