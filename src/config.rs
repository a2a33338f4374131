use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_ENDPOINT: &str = "https://yusufmail31.fly.dev/send";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Failed to create config directory")]
    CreateDirError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UIConfig {
    /// Extensions offered by the file browser. Empty shows every file.
    pub allowed_extensions: Vec<String>,
    /// Directory the file browser opens in.
    pub start_dir: Option<String>,
    pub message_timeout_secs: u64,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: ["pdf", "png", "jpg", "jpeg", "gif", "heic", "txt", "md"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            start_dir: None,
            message_timeout_secs: 4,
        }
    }
}

impl UIConfig {
    pub fn allows(&self, path: &Path) -> bool {
        if self.allowed_extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.allowed_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    /// Starting directory for the file browser: the configured one, then
    /// `~/Downloads`, then the working directory.
    pub fn browser_start_dir(&self) -> PathBuf {
        if let Some(dir) = &self.start_dir {
            return PathBuf::from(shellexpand::tilde(dir).into_owned());
        }
        dirs::download_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub endpoint: String,
    pub ui: UIConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            ui: UIConfig::default(),
        }
    }
}

impl Config {
    /// Default location, `~/.config/mailform/config.json` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mailform")
            .join("config.json")
    }

    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let path = Path::new(path);

        // If the file doesn't exist, return default config
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;

        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let path = Path::new(path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|_| ConfigError::CreateDirError)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }
}
