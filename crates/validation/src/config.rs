//! Harness configuration.
//!
//! Everything has a working default; env vars override for non-standard
//! clusters or local runs.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration consumed from the environment by the validation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Local JSON reference file with Windows platform version metadata.
    pub windows_settings_path: PathBuf,
    /// Namespace the network-debug pods run in.
    pub debug_pod_namespace: String,
    /// Label selector identifying the network-debug pods.
    pub debug_pod_label: String,
    /// Default interval between condition poll ticks, in seconds.
    pub poll_interval_secs: u64,
    /// Default condition poll deadline, in seconds.
    pub poll_timeout_secs: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            windows_settings_path: PathBuf::from("config/windows_settings.json"),
            debug_pod_namespace: "default".to_string(),
            debug_pod_label: "app=node-debug".to_string(),
            poll_interval_secs: 2,
            poll_timeout_secs: 180, // 3 minutes
        }
    }
}

impl HarnessConfig {
    /// Build the config from `VALIDATION_*` environment variables, falling
    /// back to defaults for anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            windows_settings_path: env::var("VALIDATION_WINDOWS_SETTINGS")
                .map_or(defaults.windows_settings_path, PathBuf::from),
            debug_pod_namespace: env::var("VALIDATION_DEBUG_NAMESPACE")
                .unwrap_or(defaults.debug_pod_namespace),
            debug_pod_label: env::var("VALIDATION_DEBUG_LABEL").unwrap_or(defaults.debug_pod_label),
            poll_interval_secs: env_u64("VALIDATION_POLL_INTERVAL_SECS", defaults.poll_interval_secs),
            poll_timeout_secs: env_u64("VALIDATION_POLL_TIMEOUT_SECS", defaults.poll_timeout_secs),
        }
    }

    /// Default poll interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Default poll deadline as a [`Duration`].
    #[must_use]
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
