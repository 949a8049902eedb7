//! Configuration management for the query engine, using the `prefer` crate for discovery.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Tunable knobs for the execution engine, per SPEC_FULL §10.2 (sourced from §6's tunable
/// list). All fields have defaults so a deployment can run with zero configuration.
#[derive(Debug, Clone, Serialize, Deserialize, prefer::FromValue)]
pub struct EngineConfig {
    /// Wall-clock budget for a single `api` (and `system_log`) step, in seconds.
    #[serde(default = "default_api_step_timeout_seconds")]
    #[prefer(default = "180")]
    pub api_step_timeout_seconds: u64,

    /// Wall-clock budget for a single `sql` step, in seconds.
    #[serde(default = "default_sql_step_timeout_seconds")]
    #[prefer(default = "60")]
    pub sql_step_timeout_seconds: u64,

    /// Wall-clock budget for a `script_execution` subprocess, in seconds.
    #[serde(default = "default_script_timeout_seconds")]
    #[prefer(default = "180")]
    pub script_timeout_seconds: u64,

    /// Maximum number of concurrent in-flight requests to the Okta collaborator.
    #[serde(default = "default_okta_concurrent_limit")]
    #[prefer(default = "15")]
    pub okta_concurrent_limit: usize,

    /// Row count per chunk in the Chunked Result Streamer.
    #[serde(default = "default_batch_size")]
    #[prefer(default = "500")]
    pub batch_size: usize,

    /// Minimum total row count before results are streamed as batches instead of being
    /// folded into a single `COMPLETE` event.
    #[serde(default = "default_batch_threshold")]
    #[prefer(default = "500")]
    pub batch_threshold: usize,

    /// Event Bus buffer capacity per Process.
    #[serde(default = "default_event_bus_capacity")]
    #[prefer(default = "256")]
    pub event_bus_capacity: usize,

    /// How long a terminal Process is retained before the reaper evicts it, in seconds.
    #[serde(default = "default_process_grace_seconds")]
    #[prefer(default = "600")]
    pub process_grace_seconds: u64,

    /// Maximum concurrently active (non-terminal) Processes per owner.
    #[serde(default = "default_owner_quota")]
    #[prefer(default = "10")]
    pub owner_quota: usize,

    /// Whether `Subscribe` replays buffered-but-undelivered events on reconnect (always
    /// true in this implementation; kept as a config knob per §4.2's Open Question).
    #[serde(default = "default_subscribe_replay")]
    #[prefer(default = "true")]
    pub subscribe_replay: bool,
}

fn default_api_step_timeout_seconds() -> u64 {
    180
}
fn default_sql_step_timeout_seconds() -> u64 {
    60
}
fn default_script_timeout_seconds() -> u64 {
    180
}
fn default_okta_concurrent_limit() -> usize {
    15
}
fn default_batch_size() -> usize {
    500
}
fn default_batch_threshold() -> usize {
    500
}
fn default_event_bus_capacity() -> usize {
    256
}
fn default_process_grace_seconds() -> u64 {
    600
}
fn default_owner_quota() -> usize {
    10
}
fn default_subscribe_replay() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_step_timeout_seconds: default_api_step_timeout_seconds(),
            sql_step_timeout_seconds: default_sql_step_timeout_seconds(),
            script_timeout_seconds: default_script_timeout_seconds(),
            okta_concurrent_limit: default_okta_concurrent_limit(),
            batch_size: default_batch_size(),
            batch_threshold: default_batch_threshold(),
            event_bus_capacity: default_event_bus_capacity(),
            process_grace_seconds: default_process_grace_seconds(),
            owner_quota: default_owner_quota(),
            subscribe_replay: default_subscribe_replay(),
        }
    }
}

/// Top-level application settings: the engine's tunables plus the HTTP surface's bind info.
#[derive(Debug, Clone)]
pub struct Settings {
    pub engine: EngineConfig,
    pub bind_addr: String,
    pub sqlite_path: PathBuf,
    pub okta_org_url: Option<String>,
    pub okta_api_token: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            bind_addr: "127.0.0.1:8080".to_string(),
            sqlite_path: PathBuf::from("query-engine.db"),
            okta_org_url: None,
            okta_api_token: None,
        }
    }
}

/// Configuration file structure, discovered via `prefer` (TOML in standard locations) and
/// overlaid with environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize, prefer::FromValue)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<String>,
    #[serde(default)]
    #[prefer(default)]
    pub engine: EngineConfig,
}

impl Config {
    /// Discover a `query-engine.toml` in standard locations; fall back to in-code defaults
    /// if none is found or it fails to parse.
    pub async fn load() -> Self {
        match prefer::load("query-engine").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => Self::load_from_path(path).await.unwrap_or_default(),
                None => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    async fn load_from_path(path: &std::path::Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("failed to read config file: {}", e))?;
        toml::from_str(&contents).map_err(|e| format!("failed to parse config file: {}", e))
    }

    /// Fold this config and the process environment into a `Settings`, with environment
    /// variables taking highest precedence over file values, which take precedence over
    /// in-code defaults.
    pub fn into_settings(self) -> Settings {
        let mut settings = Settings {
            engine: self.engine,
            ..Settings::default()
        };

        if let Some(bind_addr) = self.bind_addr {
            settings.bind_addr = bind_addr;
        }
        if let Some(sqlite_path) = self.sqlite_path {
            settings.sqlite_path = PathBuf::from(sqlite_path);
        }

        if let Ok(bind_addr) = std::env::var("QUERY_ENGINE_BIND_ADDR") {
            settings.bind_addr = bind_addr;
        }
        if let Ok(sqlite_path) = std::env::var("QUERY_ENGINE_SQLITE_PATH") {
            settings.sqlite_path = PathBuf::from(sqlite_path);
        }
        settings.okta_org_url = std::env::var("OKTA_ORG_URL").ok();
        settings.okta_api_token = std::env::var("OKTA_API_TOKEN").ok();

        settings
    }
}

/// Load settings from the discovered config file plus environment overrides.
pub async fn load_settings() -> Settings {
    Config::load().await.into_settings()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_engine_config_matches_spec_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.batch_threshold, 500);
        assert_eq!(config.owner_quota, 10);
    }
}
