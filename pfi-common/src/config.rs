//! Configuration loading and data folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming an explicit TOML config file
pub const CONFIG_PATH_ENV: &str = "PFI_CONFIG";

/// Environment variable naming the data folder
pub const DATA_FOLDER_ENV: &str = "PFI_DATA_FOLDER";

/// On-disk TOML configuration
///
/// Every field is optional so that resolution can fall through to
/// environment variables and compiled defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Folder holding persistent per-install state (device token)
    pub data_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub sampling: SamplingSection,
    pub recognition: RecognitionSection,
    pub sync: SyncSection,
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing level directive ("error", "warn", "info", "debug", "trace")
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// `[sampling]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingSection {
    /// Execution profile name ("foreground" or "constrained")
    pub profile: Option<String>,
    pub interval_seconds: Option<f64>,
    pub max_frames: Option<u32>,
    pub max_dimension: Option<u32>,
}

/// `[recognition]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionSection {
    pub languages: Option<Vec<String>>,
    pub concurrency: Option<usize>,
}

/// `[sync]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    /// Wait after the first failed attempt; each later wait doubles
    pub initial_backoff_secs: Option<f64>,
}

/// Locate the TOML config file.
///
/// Priority order:
/// 1. Command-line argument (highest priority)
/// 2. `PFI_CONFIG` environment variable
/// 3. `<config_dir>/pfi/pfi-ingest.toml` if it exists
///
/// Returns `None` when no file is configured and the default file does not exist.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join("pfi").join("pfi-ingest.toml"))
        .filter(|p| p.exists())
}

/// Load and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;
    debug!(path = %path.display(), "Loaded TOML config");
    Ok(config)
}

/// Load the TOML config if one is configured, defaults otherwise.
///
/// An explicitly named file that cannot be read is an error; a missing
/// default file is not.
pub fn load_or_default(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    match resolve_config_path(cli_arg) {
        Some(path) => load_toml_config(&path),
        None => Ok(TomlConfig::default()),
    }
}

/// Data folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. `PFI_DATA_FOLDER` environment variable
/// 3. TOML `data_folder`
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_data_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(DATA_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.data_folder {
        return path.clone();
    }

    get_default_data_folder()
}

/// Get OS-dependent default data folder path
fn get_default_data_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/pfi
        dirs::data_local_dir()
            .map(|d| d.join("pfi"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/pfi"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/pfi
        dirs::data_dir()
            .map(|d| d.join("pfi"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/pfi"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\pfi
        dirs::data_local_dir()
            .map(|d| d.join("pfi"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\pfi"))
    } else {
        PathBuf::from("./pfi_data")
    }
}
