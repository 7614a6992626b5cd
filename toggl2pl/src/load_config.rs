//! Loads the YAML config file and injects secrets from the environment.
//!
//! This is the only place where untrusted YAML is parsed. Each section maps
//! onto a typed struct; the `sync` section is the core's [`SyncConfig`] as is.
//!
//! Secrets (`toggl.api_token`, `pl.user_key`, `pl.app_key`) may be left out
//! of the file and supplied through `TOGGL_API_TOKEN`, `PL_USER_KEY` and
//! `PL_APP_KEY`. A set environment variable wins over the file.
//!
//! All errors are `anyhow::Error` and surface at the CLI boundary.

use anyhow::{bail, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use toggl2pl_core::config::SyncConfig;
use tracing::{error, info};

pub const TOGGL_API_TOKEN_ENV: &str = "TOGGL_API_TOKEN";
pub const PL_USER_KEY_ENV: &str = "PL_USER_KEY";
pub const PL_APP_KEY_ENV: &str = "PL_APP_KEY";

const DEFAULT_TOGGL_URL: &str = "https://api.track.toggl.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
    pub toggl: TogglSection,
    pub pl: PlSection,
    #[serde(default)]
    pub sync: SyncConfig,
    /// Per-request timeout for both trackers.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TogglSection {
    #[serde(default)]
    pub api_token: String,
    /// Workspace name; exactly one workspace must carry it.
    pub workspace: String,
    #[serde(default = "default_toggl_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlSection {
    pub base_url: String,
    #[serde(default)]
    pub user_key: String,
    #[serde(default)]
    pub app_key: String,
    #[serde(default = "default_verify")]
    pub verify: bool,
    /// PL projects left out of the catalog and out of aggregation.
    #[serde(default)]
    pub excluded_projects: Vec<String>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_toggl_url() -> String {
    DEFAULT_TOGGL_URL.to_string()
}

fn default_verify() -> bool {
    true
}

impl CliConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn excluded_projects(&self) -> BTreeSet<String> {
        self.pl.excluded_projects.iter().cloned().collect()
    }

    pub fn trace_loaded(&self) {
        info!(
            workspace = %self.toggl.workspace,
            toggl_url = %self.toggl.base_url,
            pl_url = %self.pl.base_url,
            verify = self.pl.verify,
            excluded = self.pl.excluded_projects.len(),
            timeout_secs = self.timeout_secs,
            "Loaded CliConfig"
        );
        self.sync.trace_loaded();
    }
}

/// `~/.toggl2pl/config.yml`, if a home directory can be determined.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".toggl2pl").join("config.yml"))
}

fn override_from_env(field: &mut String, var: &str) {
    if let Ok(value) = env::var(var) {
        if !value.is_empty() {
            info!(env = var, "Secret taken from environment");
            *field = value;
        }
    }
}

fn require(value: &str, key: &str, var: &str) -> Result<()> {
    if value.trim().is_empty() {
        error!(key, env = var, "Missing secret in config and environment");
        bail!("Missing {key}: set it in the config file or via {var}");
    }
    Ok(())
}

/// Loads a YAML config file and merges secrets from the environment.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    override_from_env(&mut config.toggl.api_token, TOGGL_API_TOKEN_ENV);
    override_from_env(&mut config.pl.user_key, PL_USER_KEY_ENV);
    override_from_env(&mut config.pl.app_key, PL_APP_KEY_ENV);

    require(&config.toggl.api_token, "toggl.api_token", TOGGL_API_TOKEN_ENV)?;
    require(&config.pl.user_key, "pl.user_key", PL_USER_KEY_ENV)?;
    require(&config.pl.app_key, "pl.app_key", PL_APP_KEY_ENV)?;

    if let Err(e) = config.sync.rounding() {
        error!(error = %e, "Invalid rounding table in config");
        bail!("Invalid sync.rounding_steps: {e}");
    }

    config.trace_loaded();
    Ok(config)
}
