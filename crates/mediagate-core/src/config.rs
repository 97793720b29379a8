//! Configuration resolution for MediaGate.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Settings file (explicit path, or ~/.config/mediagate/settings.json)
//! 3. Environment variables
//! 4. CLI arguments (highest priority, applied by the binary)
//!
//! Configuration is resolved once at startup and never re-read.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Complete MediaGate configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Inbound HTTP surface configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Relay non-2xx worker responses with their own status code instead of
    /// collapsing them into a 500 error envelope.
    pub preserve_worker_status: bool,
    /// Overall timeout for one forwarded request. `None` leaves the HTTP
    /// client default in place.
    pub request_timeout_secs: Option<u64>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            preserve_worker_status: false,
            request_timeout_secs: None,
        }
    }
}

impl GatewayConfig {
    /// `host:port` string suitable for binding a listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// Supervised worker process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Base URL the worker serves its API on.
    pub endpoint: String,
    /// Executable launched as the worker.
    pub program: String,
    /// Arguments passed to the worker executable.
    pub args: Vec<String>,
    /// Working directory for the worker. Inherited when unset.
    pub working_directory: Option<PathBuf>,
    /// Extra environment variables for the worker process.
    pub env: BTreeMap<String, String>,
    /// When set, the worker runs as an independent service and the gateway
    /// never spawns or kills it.
    pub externally_managed: bool,
    /// Delay between a worker exit and the next launch.
    pub restart_delay_secs: u64,
    /// Grace period after SIGTERM before the worker is force-killed.
    pub terminate_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5000".to_string(),
            program: "python".to_string(),
            args: vec!["api_server.py".to_string()],
            working_directory: None,
            env: BTreeMap::new(),
            externally_managed: false,
            restart_delay_secs: 5,
            terminate_timeout_secs: 5,
        }
    }
}

impl WorkerConfig {
    pub const fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_secs)
    }

    pub const fn terminate_timeout(&self) -> Duration {
        Duration::from_secs(self.terminate_timeout_secs)
    }
}

impl Config {
    /// Check values that cannot be expressed through the type system.
    pub fn validate(&self) -> Result<()> {
        let endpoint = &self.worker.endpoint;
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(Error::InvalidConfig(format!(
                "worker endpoint must be an http(s) URL, got {endpoint:?}"
            )));
        }
        if !self.worker.externally_managed && self.worker.program.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "worker program is empty and the worker is not externally managed".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load configuration with hierarchical resolution.
///
/// An explicit `path` must exist. Without one, the global settings file is
/// read only if present. The result is not validated: CLI overrides may
/// still replace a bad file or env value, so callers run
/// [`Config::validate`] once every layer is applied.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => load_config_file(path)?,
        None => match global_config_path() {
            Some(global_path) if global_path.exists() => load_config_file(&global_path)?,
            _ => Config::default(),
        },
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".mediagate").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/mediagate/settings.json"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("mediagate").join("settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| Error::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

fn apply_env_overrides(config: &mut Config) {
    apply_env_overrides_from(config, |key| std::env::var(key).ok());
}

/// Apply environment overrides using `lookup` to resolve variable names.
///
/// `PORT`, `PYTHON_API_URL` and `NODE_ENV=production` are honoured as
/// fallbacks for deployments that predate the `MEDIAGATE_*` names.
pub fn apply_env_overrides_from<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("MEDIAGATE_HOST") {
        config.gateway.host = val;
    }
    if let Some(val) = lookup("MEDIAGATE_PORT").or_else(|| lookup("PORT")) {
        if let Ok(n) = val.parse() {
            config.gateway.port = n;
        }
    }
    if let Some(val) = lookup("MEDIAGATE_LOG_LEVEL") {
        config.gateway.log_level = val;
    }
    if let Some(val) = lookup("MEDIAGATE_WORKER_URL").or_else(|| lookup("PYTHON_API_URL")) {
        config.worker.endpoint = val;
    }
    if let Some(val) = lookup("MEDIAGATE_WORKER_PROGRAM") {
        config.worker.program = val;
    }
    if let Some(val) = lookup("MEDIAGATE_EXTERNAL_WORKER") {
        config.worker.externally_managed = parse_flag(&val);
    } else if lookup("NODE_ENV").is_some_and(|env| env.trim() == "production") {
        config.worker.externally_managed = true;
    }
    if let Some(val) = lookup("MEDIAGATE_RESTART_DELAY") {
        if let Ok(n) = val.parse() {
            config.worker.restart_delay_secs = n;
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
