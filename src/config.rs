//! Provider configuration
//!
//! Connection settings for the appliance. Loaded from a YAML file and
//! overridden by CLI flags / environment in `main.rs`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default wait for an asynchronous job to finish
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(300);
/// Default interval between job status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Upper bound on `job_timeout_secs` (one week)
pub const MAX_JOB_TIMEOUT_SECS: u64 = 7 * 24 * 3600;

/// Connection settings for a TrueNAS appliance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Hostname or address, optionally with port
    pub host: String,
    /// API key sent as a bearer token
    pub api_key: String,
    /// Verify the appliance's TLS certificate
    pub verify_tls: bool,
    /// Use plain HTTP instead of HTTPS
    pub insecure_http: bool,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Job completion timeout in seconds
    pub job_timeout_secs: u64,
    /// Job poll interval in seconds
    pub poll_interval_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            api_key: String::new(),
            verify_tls: true,
            insecure_http: false,
            request_timeout_secs: 30,
            job_timeout_secs: DEFAULT_JOB_TIMEOUT.as_secs(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
        }
    }
}

impl ProviderConfig {
    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: ProviderConfig = serde_yaml::from_str(&text)?;
        Ok(config)
    }

    /// Check that the configuration can be used to connect
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Configuration("host must be set".into()));
        }
        if self.api_key.trim().is_empty() {
            return Err(Error::Configuration("api_key must be set".into()));
        }
        if self.poll_interval_secs == 0 {
            return Err(Error::Configuration("poll_interval_secs must be positive".into()));
        }
        if self.job_timeout_secs > MAX_JOB_TIMEOUT_SECS {
            return Err(Error::Configuration(format!(
                "job_timeout_secs ({}) must not exceed {}",
                self.job_timeout_secs, MAX_JOB_TIMEOUT_SECS
            )));
        }
        if self.job_timeout_secs < self.poll_interval_secs {
            return Err(Error::Configuration(format!(
                "job_timeout_secs ({}) must be at least poll_interval_secs ({})",
                self.job_timeout_secs, self.poll_interval_secs
            )));
        }
        Ok(())
    }

    /// JSON-RPC endpoint URL
    pub fn endpoint(&self) -> String {
        let scheme = if self.insecure_http { "http" } else { "https" };
        format!("{}://{}/api/current", scheme, self.host.trim_end_matches('/'))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
