//! Configuration
//!
//! Two layers:
//! - [`CoreConfig`]: settings of the property system itself, in TOML
//! - [`ConfigFile`]: ini-style persistence of record fields flagged `CONFIG`
//!
//! # Example
//!
//! ```ignore
//! let core = CoreConfig::load(&core_config_path()?)?;
//!
//! let mut ini = ConfigFile::read(&record_config_path("GameSettings")?)?;
//! let options = ApplyOptions::from(&core);
//! ini.apply_to("GameSettings", &record, value.as_value_mut(), &cx, &options)?;
//! ```

mod ini;
mod loader;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PropertyError;

pub use ini::{ApplyOptions, ConfigFile, ConfigLine, ConfigSection, LineOp, DEFAULT_MAX_ARRAY_LEN};
pub use loader::{configs_dir, core_config_path, record_config_path, CONFIG_DIR_ENV};

/// Configuration system errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read or write config file
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML content
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config to TOML
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Could not determine config directory
    #[error("Config directory not available - set PROPSYS_CONFIG_DIR")]
    NoConfigDirectory,

    /// A config line could not be applied to its field
    #[error("Config key '{key}': {source}")]
    Import {
        key: String,
        #[source]
        source: PropertyError,
    },

    /// A key names no config field of the record (strict mode only)
    #[error("Section [{section}] has unknown key '{key}'")]
    UnknownKey { section: String, key: String },
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Property system configuration.
///
/// Loaded from `<configs>/core.toml` by default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Config version for future migration support
    pub version: u32,

    /// Enable debug logging
    pub debug: bool,

    /// `tracing` filter directive used when no `RUST_LOG` is set
    pub log_filter: String,

    /// Treat unknown config keys and import failures as errors
    pub strict_import: bool,

    /// Warn when a tagged stream converts a number with loss
    pub warn_on_narrowing: bool,

    /// Longest dynamic array an indexed config key (`Key[i]=`) may grow
    pub max_config_array_len: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            version: 1,
            debug: false,
            log_filter: "info".to_string(),
            strict_import: false,
            warn_on_narrowing: true,
            max_config_array_len: DEFAULT_MAX_ARRAY_LEN,
        }
    }
}

impl CoreConfig {
    /// Load config from `path`, creating a default file if missing.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            tracing::debug!("Loaded core config from {:?}", path);
            Ok(config)
        } else {
            let default = Self::default();
            default.save(path)?;
            tracing::info!("Created default core config at {:?}", path);
            Ok(default)
        }
    }

    /// Load from the default location, see [`core_config_path`].
    pub fn load_default() -> ConfigResult<Self> {
        Self::load(&core_config_path()?)
    }

    /// Save config to `path`.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tracing::debug!("Saved core config to {:?}", path);
        Ok(())
    }

    /// Reload config from `path`.
    pub fn reload(&mut self, path: &Path) -> ConfigResult<()> {
        let content = std::fs::read_to_string(path)?;
        *self = toml::from_str(&content)?;
        tracing::debug!("Reloaded core config from {:?}", path);
        Ok(())
    }

    /// Filter directive for the log subscriber
    pub fn effective_log_filter(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.log_filter
        }
    }
}
