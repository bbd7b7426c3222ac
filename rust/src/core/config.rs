use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use super::AppCore;
use crate::transport::ReconnectPolicy;

const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";
const DEFAULT_SOCKET_URL: &str = "http://localhost:5000";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

pub(crate) const CONFIG_FILE_NAME: &str = "teamwork_config.json";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub(crate) api_base_url: Option<String>,
    pub(crate) socket_url: Option<String>,
    pub(crate) disable_network: Option<bool>,
    pub(crate) request_timeout_secs: Option<u64>,
    pub(crate) reconnect_base_delay_ms: Option<u64>,
    pub(crate) reconnect_max_delay_ms: Option<u64>,
    pub(crate) reconnect_max_attempts: Option<u32>,
    // Only polls while the push channel is not connected.
    pub(crate) poll_interval_secs: Option<u64>,
}

pub(crate) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE_NAME);
    if !path.exists() {
        return AppConfig::default();
    }
    match read_app_config(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(err = %format!("{e:#}"), "config unreadable, using defaults");
            AppConfig::default()
        }
    }
}

fn read_app_config(path: &Path) -> anyhow::Result<AppConfig> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl AppConfig {
    pub(crate) fn api_base_url(&self) -> String {
        env_non_empty("TEAMWORK_API_URL")
            .or_else(|| self.api_base_url.clone().filter(|u| !u.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
    }

    pub(crate) fn socket_url(&self) -> String {
        env_non_empty("TEAMWORK_SOCKET_URL")
            .or_else(|| self.socket_url.clone().filter(|u| !u.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_SOCKET_URL.to_string())
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        let secs = self
            .request_timeout_secs
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    pub(crate) fn reconnect_policy(&self) -> ReconnectPolicy {
        let defaults = ReconnectPolicy::default();
        ReconnectPolicy {
            base_delay: self
                .reconnect_base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
            max_delay: self
                .reconnect_max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            max_attempts: self.reconnect_max_attempts.unwrap_or(defaults.max_attempts),
        }
    }

    pub(crate) fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }
}

impl AppCore {
    pub(super) fn network_enabled(&self) -> bool {
        // Used to keep Rust tests deterministic and offline.
        if let Some(disable) = self.config.disable_network {
            return !disable;
        }
        std::env::var("TEAMWORK_DISABLE_NETWORK").ok().as_deref() != Some("1")
    }
}
