// ⚙️ Configuration - parsed once at startup, passed down explicitly
//
// [options]
// data_dir = "/var/lib/platform/filestore"
// log_level = "info"

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub options: Options,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Options {
    /// Store location: one `<db>.sqlite` file per tenant database
    pub data_dir: PathBuf,

    #[serde(default)]
    pub db_host: Option<String>,

    #[serde(default)]
    pub db_port: Option<u16>,

    #[serde(default)]
    pub db_user: Option<String>,

    /// Never logged
    #[serde(default)]
    pub db_password: Option<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load and validate a config file.
    ///
    /// A relative `data_dir` is resolved against the directory holding the file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&raw)?;

        if config.options.data_dir.is_relative() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            config.options.data_dir = base.join(&config.options.data_dir);
        }

        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.options.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "options.data_dir",
                reason: "must not be empty".to_string(),
            });
        }
        let level = self.options.log_level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "options.log_level",
                reason: format!("must be one of {}", LOG_LEVELS.join(", ")),
            });
        }
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.options.data_dir
    }

    pub fn log_level(&self) -> &str {
        &self.options.log_level
    }
}
