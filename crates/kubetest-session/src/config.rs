//! Session configuration

use std::time::Duration;

use kubetest_common::{Error, DEFAULT_NAMESPACE};
use serde::{Deserialize, Serialize};

/// Default readiness timeout (5 minutes)
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default readiness poll interval
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Immutable input to a session start.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Optional single configuration document, applied after the dependencies
    pub config_url: Option<String>,
    /// Dependency documents; the dependency resolver is consulted when empty
    pub dependencies: Vec<String>,
    /// How long to wait for readiness
    pub timeout_secs: u64,
    /// Time between readiness checks
    pub poll_interval_secs: u64,
    /// Require a ready endpoint behind every service, not only its existence
    pub wait_for_connectivity: bool,
    /// Namespace the session's resources live in
    pub namespace: String,
    /// Register the process-exit fallback cleanup after a successful start
    pub register_fallback: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            config_url: None,
            dependencies: Vec::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            wait_for_connectivity: true,
            namespace: DEFAULT_NAMESPACE.to_string(),
            register_fallback: true,
        }
    }
}

impl SessionConfig {
    /// Readiness timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Readiness poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Reject configurations that cannot drive a session
    pub fn validate(&self) -> Result<(), Error> {
        if self.namespace.trim().is_empty() {
            return Err(Error::validation_for_field(
                "namespace",
                "namespace must not be empty",
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(Error::validation_for_field(
                "pollIntervalSecs",
                "poll interval must be at least one second",
            ));
        }
        if let Some(url) = &self.config_url {
            if url.trim().is_empty() {
                return Err(Error::validation_for_field(
                    "configUrl",
                    "config url must not be blank",
                ));
            }
        }
        Ok(())
    }
}
