//! Configuration loading
//!
//! Settings live in `config.toml` under the platform config directory.
//! Every field has a default, so a missing or partial file is fine.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Identity provider endpoints and client registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityProvider {
    /// OAuth2 client ID (public client)
    pub client_id: String,
    /// Authorization endpoint
    pub auth_url: String,
    /// Token endpoint (refresh and device-code exchange)
    pub token_url: String,
    /// Device authorization endpoint
    pub device_url: String,
    /// OpenID Connect userinfo endpoint
    pub userinfo_url: String,
    /// Scopes requested at login
    pub scopes: Vec<String>,
}

impl Default for IdentityProvider {
    fn default() -> Self {
        Self {
            client_id: "mangablog-reader".to_string(),
            auth_url: "https://oauth2.googleapis.com/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            device_url: "https://oauth2.googleapis.com/device/code".to_string(),
            userinfo_url: "https://openidconnect.googleapis.com/v1/userinfo".to_string(),
            scopes: vec![
                "openid".to_string(),
                "email".to_string(),
                "profile".to_string(),
            ],
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub identity: IdentityProvider,
    /// Upper bound on a single token refresh request
    pub refresh_timeout_secs: u64,
    /// Freshness window for cached API responses
    pub cache_ttl_secs: u64,
    /// Freshness window for the cached user profile
    pub profile_ttl_secs: u64,
    /// Target edge length for normalized thumbnails
    pub thumbnail_size: u32,
    /// Returned when no thumbnail source yields a URL
    pub placeholder_url: String,
    /// Enable the URL-derived thumbnail guess
    pub url_heuristic: bool,
    /// Override for the data directory (defaults to the platform data dir)
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            identity: IdentityProvider::default(),
            refresh_timeout_secs: 10,
            cache_ttl_secs: 60 * 60,
            profile_ttl_secs: 24 * 60 * 60,
            thumbnail_size: 600,
            placeholder_url: crate::thumbnail::DEFAULT_PLACEHOLDER.to_string(),
            url_heuristic: true,
            data_dir: None,
        }
    }
}

impl Config {
    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "mangablog", "mangablog")
            .context("Could not determine config directory")
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    /// Directory backing the persistent key-value store.
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::project_dirs()?.data_dir().join("store")),
        }
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn profile_ttl(&self) -> Duration {
        Duration::from_secs(self.profile_ttl_secs)
    }
}
