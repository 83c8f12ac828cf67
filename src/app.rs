use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config directory on this platform")]
    NoConfigDir,
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot encode TOML: {0}")]
    Encode(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    pub ws_url: String,
    pub request_timeout_secs: u64,
    pub reconnect_delay_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            ws_url: "ws://localhost:8080/ws".into(),
            request_timeout_secs: 10,
            reconnect_delay_ms: 3_000,
        }
    }
}

impl AppConfig {
    fn toml_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("evmarket.toml"))
    }

    /// File values, then `EVMARKET_*` environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::toml_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: AppConfig = toml::from_str(text)?;
        config.normalize();
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("EVMARKET_BASE_URL").filter(|v| !v.trim().is_empty()) {
            self.base_url = v;
        }
        if let Some(v) = lookup("EVMARKET_WS_URL").filter(|v| !v.trim().is_empty()) {
            self.ws_url = v;
        }
        if let Some(v) = lookup("EVMARKET_RECONNECT_DELAY_MS").and_then(|v| v.trim().parse().ok()) {
            self.reconnect_delay_ms = v;
        }
        self.normalize();
    }

    fn normalize(&mut self) {
        self.base_url = crate::utils::normalize_url(&self.base_url);
        self.ws_url = crate::utils::normalize_ws_url(&self.ws_url);
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::toml_path().ok_or(ConfigError::NoConfigDir)?;
        write_toml(&path, self)
    }
}

pub(crate) fn write_toml<T: Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let text = toml::to_string_pretty(value)?;
    fs::write(path, text).map_err(io_err)
}
