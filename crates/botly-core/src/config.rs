//! Application configuration management.
//!
//! Configuration is stored at `~/.config/botly/config.json` (or the
//! platform equivalent). A missing file means defaults.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::{GatewayOptions, DEFAULT_BASE_URL};
use crate::auth::session::DEFAULT_REVALIDATE_INTERVAL;
use crate::auth::{CredentialStore, FileCredentialStore, KeyringCredentialStore, SessionOptions};

/// Application name used for config/data directory paths
const APP_NAME: &str = "botly";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Overrides `api_base_url` when set.
pub const API_URL_ENV: &str = "BOTLY_API_URL";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub revalidate_interval_secs: u64,
    pub max_rate_limit_retries: u32,
    pub credential_backend: CredentialBackend,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let gateway = GatewayOptions::default();
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: gateway.timeout.as_secs(),
            revalidate_interval_secs: DEFAULT_REVALIDATE_INTERVAL.as_secs(),
            max_rate_limit_retries: gateway.max_rate_limit_retries,
            credential_backend: CredentialBackend::default(),
            last_email: None,
        }
    }
}

impl Config {
    /// Load from the default location, then apply `BOTLY_API_URL`.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        if let Ok(url) = std::env::var(API_URL_ENV) {
            config.apply_api_url_override(&url);
        }
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))
        } else {
            debug!(path = ?path, "No config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    fn apply_api_url_override(&mut self, url: &str) {
        let url = url.trim();
        if !url.is_empty() {
            self.api_base_url = url.to_string();
        }
    }

    pub fn gateway_options(&self) -> GatewayOptions {
        GatewayOptions {
            base_url: self.api_base_url.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            max_rate_limit_retries: self.max_rate_limit_retries,
            ..GatewayOptions::default()
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            gateway: self.gateway_options(),
            revalidate_interval: Duration::from_secs(self.revalidate_interval_secs.max(1)),
        }
    }

    /// The configured token store.
    pub fn credential_store(&self) -> Result<Arc<dyn CredentialStore>> {
        Ok(match self.credential_backend {
            CredentialBackend::File => Arc::new(FileCredentialStore::in_dir(&Self::data_dir()?)),
            CredentialBackend::Keyring => Arc::new(KeyringCredentialStore::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::load_from(&dir.path().join("config.json")).expect("load");

        assert_eq!(config.api_base_url, "http://localhost:8000");
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.revalidate_interval_secs, 3600);
        assert_eq!(config.max_rate_limit_retries, 3);
        assert_eq!(config.credential_backend, CredentialBackend::File);
        assert!(config.last_email.is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"api_base_url": "https://api.botly.dev", "credential_backend": "keyring"}"#,
        )
        .expect("write config");

        let config = Config::load_from(&path).expect("load");
        assert_eq!(config.api_base_url, "https://api.botly.dev");
        assert_eq!(config.credential_backend, CredentialBackend::Keyring);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.json");

        let config = Config {
            last_email: Some("x@y.com".to_string()),
            revalidate_interval_secs: 60,
            ..Config::default()
        };
        config.save_to(&path).expect("save");

        let reloaded = Config::load_from(&path).expect("reload");
        assert_eq!(reloaded.last_email.as_deref(), Some("x@y.com"));
        assert_eq!(reloaded.revalidate_interval_secs, 60);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").expect("write config");

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_api_url_override() {
        let mut config = Config::default();
        config.apply_api_url_override("   ");
        assert_eq!(config.api_base_url, DEFAULT_BASE_URL);

        config.apply_api_url_override(" https://bots.example.com ");
        assert_eq!(config.api_base_url, "https://bots.example.com");
    }

    #[test]
    fn test_options_follow_config() {
        let config = Config {
            api_base_url: "http://10.0.0.2:9000".to_string(),
            request_timeout_secs: 0,
            revalidate_interval_secs: 120,
            max_rate_limit_retries: 5,
            ..Config::default()
        };

        let session = config.session_options();
        assert_eq!(session.gateway.base_url, "http://10.0.0.2:9000");
        assert_eq!(session.gateway.timeout, Duration::from_secs(1));
        assert_eq!(session.gateway.max_rate_limit_retries, 5);
        assert_eq!(session.revalidate_interval, Duration::from_secs(120));
    }
}
