use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Where a loaded config came from, reported once logging is up.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults(PathBuf),
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "loaded config from {}", path.display()),
            ConfigSource::Defaults(path) => {
                write!(f, "no config file at {}, using defaults", path.display())
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct FacenoteConfig {
    pub storage: StorageConfig,
    pub photos: PhotoConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PhotoConfig {
    /// Longest side kept by `shrink`.
    pub max_side: u32,
    pub jpeg_quality: u8,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.facenote/data".into(),
        }
    }
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            max_side: 1600,
            jpeg_quality: 85,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

/// Returns `~/.facenote/`
pub fn default_facenote_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".facenote")
}

/// `$FACENOTE_CONFIG` if set, otherwise `~/.facenote/config.toml`.
pub fn default_config_path() -> PathBuf {
    match std::env::var_os("FACENOTE_CONFIG") {
        Some(path) => PathBuf::from(path),
        None => default_facenote_dir().join("config.toml"),
    }
}

impl FacenoteConfig {
    /// Load from the default location. Runs before the logger exists, so the
    /// source is returned for the caller to log.
    pub fn load() -> Result<(Self, ConfigSource)> {
        Self::load_from(default_config_path())
    }

    /// Load from `path`; a missing file means defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Result<(Self, ConfigSource)> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok((Self::default(), ConfigSource::Defaults(path.to_path_buf())));
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config TOML {}", path.display()))?;
        Ok((config, ConfigSource::File(path.to_path_buf())))
    }

    pub fn resolved_data_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.data_dir)
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.photos.jpeg_quality.clamp(1, 100)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
