use crate::api::models::UserId;
use crate::app::{write_toml, ConfigError};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Signed-in identity, kept between runs until logout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

fn session_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("com", "evmarket", "EvMarket")?;
    Some(proj.data_dir().join("session.toml"))
}

impl Session {
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match session_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Some(toml::from_str(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = session_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        write_toml(path, self)
    }

    /// Returns whether a session existed.
    pub fn clear() -> Result<bool, ConfigError> {
        match session_path() {
            Some(path) => Self::clear_at(&path),
            None => Ok(false),
        }
    }

    pub fn clear_at(path: &Path) -> Result<bool, ConfigError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}
