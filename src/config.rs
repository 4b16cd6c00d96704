use anyhow::{Context, Result};
use dirs::home_dir;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::blocking::BlockingCulliganApi;
use crate::client::CulliganApi;
use crate::session::DEFAULT_BASE_URL;

pub const EMAIL_ENV: &str = "CULLIGAN_EMAIL";
pub const PASSWORD_ENV: &str = "CULLIGAN_PASSWORD";
pub const APP_ID_ENV: &str = "CULLIGAN_APP_ID";

/// Connection settings stored in ~/.culligan.yml. Tokens never go in here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub email: String,
    /// Read from the file or `CULLIGAN_PASSWORD`, never written back
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    pub app_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Config {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    /// Overlay values from `lookup` (normally the process environment)
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(email) = lookup(EMAIL_ENV) {
            self.email = email;
        }
        if let Some(password) = lookup(PASSWORD_ENV) {
            self.password = Some(password);
        }
        if let Some(app_id) = lookup(APP_ID_ENV) {
            self.app_id = app_id;
        }
        self
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn password(&self) -> Result<&str> {
        self.password.as_deref().with_context(|| {
            format!(
                "No password configured. Set {} or add it to the config file.",
                PASSWORD_ENV
            )
        })
    }

    pub fn client(&self) -> Result<CulliganApi> {
        Ok(CulliganApi::new_with_base_url(
            &self.email,
            self.password()?,
            &self.app_id,
            None,
            self.base_url(),
        ))
    }

    pub fn blocking_client(&self) -> Result<BlockingCulliganApi> {
        Ok(BlockingCulliganApi::new_with_base_url(
            &self.email,
            self.password()?,
            &self.app_id,
            None,
            self.base_url(),
        ))
    }
}

/// Get the path to the configuration file (~/.culligan.yml)
pub fn get_config_path() -> Result<PathBuf> {
    let home = home_dir().context("Failed to determine home directory")?;
    Ok(home.join(".culligan.yml"))
}

/// Load configuration from ~/.culligan.yml
pub fn load_config() -> Result<Config> {
    load_config_from(&get_config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(anyhow::anyhow!(
            "Configuration file not found: {}",
            path.display()
        ));
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    debug!("Loaded configuration for user: {}", config.email);
    Ok(config)
}

/// Save configuration to ~/.culligan.yml
pub fn save_config(config: &Config) -> Result<()> {
    save_config_to(config, &get_config_path()?)
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<()> {
    let content = serde_yaml::to_string(config).context("Failed to serialize configuration")?;

    fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;

    debug!("Saved configuration for user: {}", config.email);
    Ok(())
}

/// Remove ~/.culligan.yml
pub fn clear_config() -> Result<()> {
    clear_config_at(&get_config_path()?)
}

pub fn clear_config_at(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)
            .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        debug!("Configuration file cleared");
    } else {
        warn!("Configuration file does not exist, nothing to clear");
    }

    Ok(())
}
