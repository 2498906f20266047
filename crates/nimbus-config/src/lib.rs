use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("Config directory not found")]
    NoDirFound,
}

/// One colormap name, or several to choose from at random per render.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColormapChoice {
    One(String),
    Many(Vec<String>),
}

impl ColormapChoice {
    /// All configured colormap names.
    pub fn names(&self) -> &[String] {
        match self {
            Self::One(name) => std::slice::from_ref(name),
            Self::Many(names) => names,
        }
    }
}

impl Default for ColormapChoice {
    fn default() -> Self {
        Self::One("viridis".to_string())
    }
}

/// Top-level nimbus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NimbusConfig {
    /// Rendered image width in pixels.
    #[serde(default = "default_width")]
    pub width: u32,
    /// Rendered image height in pixels.
    #[serde(default = "default_height")]
    pub height: u32,
    /// Background color name or hex string, passed through to the renderer.
    #[serde(default = "default_background_color")]
    pub background_color: String,
    /// Colormap name(s) for the renderer.
    #[serde(default)]
    pub colormap: ColormapChoice,
    /// Font file for CJK-capable rendering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_path: Option<PathBuf>,
    /// Newline-separated stopword list consumed by the frequency counter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopwords_path: Option<PathBuf>,
    /// IANA timezone name for display and range anchoring.
    /// Host-local timezone is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Default daily trigger time, ISO time with optional offset
    /// (e.g. "22:00:00" or "22:00:00+08:00"). Interpreted in the display
    /// timezone when no offset is given.
    #[serde(default = "default_trigger_time")]
    pub default_trigger_time: String,
    /// Author ids excluded from every word cloud (global, platform-agnostic).
    #[serde(default)]
    pub exclude_author_ids: HashSet<String>,
    /// Command prefixes; messages starting with one are filtered out before
    /// analysis so command text never pollutes its own cloud.
    #[serde(default = "default_command_starts")]
    pub command_starts: Vec<String>,
    /// Arbitrary passthrough options handed to the renderer untouched.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub renderer_options: HashMap<String, serde_json::Value>,
}

fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1200
}

fn default_background_color() -> String {
    "black".to_string()
}

fn default_trigger_time() -> String {
    "22:00:00".to_string()
}

fn default_command_starts() -> Vec<String> {
    vec!["/".to_string()]
}

impl Default for NimbusConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            background_color: default_background_color(),
            colormap: ColormapChoice::default(),
            font_path: None,
            stopwords_path: None,
            timezone: None,
            default_trigger_time: default_trigger_time(),
            exclude_author_ids: HashSet::new(),
            command_starts: default_command_starts(),
            renderer_options: HashMap::new(),
        }
    }
}

impl NimbusConfig {
    /// Mask bitmap path for a target, falling back to the shared default
    /// mask when `key` is `None`.
    pub fn mask_path(&self, data_dir: &Path, key: Option<&str>) -> PathBuf {
        match key {
            Some(key) => data_dir.join(format!("mask-{key}.png")),
            None => data_dir.join("mask.png"),
        }
    }
}

/// Resolve the nimbus config directory (~/.nimbus/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".nimbus"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (~/.nimbus/config.json5).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json5"))
}

/// Resolve the data directory (~/.nimbus/data/), creating it if needed.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = config_dir()?.join("data");
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}

/// Load configuration from the default path, falling back to defaults.
pub fn load_config() -> Result<NimbusConfig, ConfigError> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let path = config_file_path()?;
    load_config_from(&path)
}

/// Load configuration from a specific path, falling back to defaults if not found.
pub fn load_config_from(path: &Path) -> Result<NimbusConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        return Ok(NimbusConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: NimbusConfig = json5::from_str(&content)?;
    Ok(config)
}
