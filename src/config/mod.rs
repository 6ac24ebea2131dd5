use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ChatError, Result};
use crate::session::DEFAULT_STATUS_LABEL;
use crate::transport::HttpConfig;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000";
const ENV_PREFIX: &str = "CAMPUS_CHAT";

pub fn get_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .map(|h| h.join("Library/Application Support/campus-chat"))
    }

    #[cfg(target_os = "linux")]
    {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
            .map(|c| c.join("campus-chat"))
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .map(|a| a.join("campus-chat"))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .map(|h| h.join(".config/campus-chat"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the answer service.
    pub endpoint: String,
    /// Shown while waiting for the first fragment. Empty disables it.
    pub thinking_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            thinking_label: Some(DEFAULT_STATUS_LABEL.to_string()),
            connect_timeout_secs: None,
            user_agent: None,
        }
    }
}

impl AppConfig {
    /// Config file (if present) overlaid by `CAMPUS_CHAT_*` variables.
    /// Falls back to defaults when either source is malformed.
    #[must_use]
    pub fn load() -> Self {
        Self::load_layered(
            Self::get_config_path().as_deref(),
            Environment::with_prefix(ENV_PREFIX),
        )
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load config, using defaults");
            Self::default()
        })
    }

    fn load_layered(path: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }

        let config = builder
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path).required(true))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        get_config_dir().map(|dir| dir.join("config.toml"))
    }

    pub fn init_default() -> Result<PathBuf> {
        let path = Self::get_config_path()
            .ok_or_else(|| ChatError::Config("Could not determine config directory".into()))?;
        Self::default().write_new(&path)?;
        Ok(path)
    }

    /// Writes this config to `path`, refusing to overwrite an existing file.
    pub fn write_new(&self, path: &Path) -> Result<()> {
        if path.exists() {
            return Err(ChatError::Config(format!(
                "Config file already exists at {}",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| ChatError::Config(format!("Failed to serialize config: {e}")))?;
        fs::write(path, contents)?;
        Ok(())
    }

    #[must_use]
    pub fn status_label(&self) -> Option<String> {
        self.thinking_label
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    }

    #[must_use]
    pub fn http_config(&self) -> HttpConfig {
        let mut http = HttpConfig::default();
        if let Some(secs) = self.connect_timeout_secs {
            http = http.with_connect_timeout(Duration::from_secs(secs));
        }
        if let Some(ua) = &self.user_agent {
            http = http.with_user_agent(ua.clone());
        }
        http
    }
}
