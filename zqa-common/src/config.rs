//! Configuration loading and resolution
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument / environment variable (supplied as [`ConfigOverrides`])
//! 2. TOML config file
//! 3. OS-dependent compiled default (fallback)
//!
//! A missing TOML file is not an error: a warning is logged and the
//! compiled defaults apply.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Upload cap applied when nothing else is configured (100 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Ceiling on the inflated size of an uploaded archive during validation (1 GiB)
pub const DEFAULT_MAX_UNCOMPRESSED_BYTES: u64 = 1024 * 1024 * 1024;

/// Archive extension accepted by default
pub const DEFAULT_ACCEPTED_EXTENSION: &str = "zip";

/// Default listen address for zqa-ts
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5730";

/// Where uploaded archives are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobBackend {
    /// One file per blob under `blob_root`
    Fs,
    /// Process memory (lost on restart)
    Memory,
}

impl FromStr for BlobBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fs" | "filesystem" => Ok(BlobBackend::Fs),
            "memory" | "mem" => Ok(BlobBackend::Memory),
            other => Err(format!("unknown blob backend '{}' (expected fs or memory)", other)),
        }
    }
}

/// Logging section of the TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// On-disk TOML configuration. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub bind_addr: Option<String>,
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub blob_backend: Option<BlobBackend>,
    #[serde(default)]
    pub blob_root: Option<PathBuf>,
    #[serde(default)]
    pub max_upload_bytes: Option<u64>,
    #[serde(default)]
    pub max_uncompressed_bytes: Option<u64>,
    #[serde(default)]
    pub accepted_extension: Option<String>,
    #[serde(default)]
    pub auth_tokens: Option<Vec<String>>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Values supplied on the command line or via `ZQA_*` environment variables
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub bind_addr: Option<String>,
    pub database_path: Option<PathBuf>,
    pub blob_backend: Option<BlobBackend>,
    pub blob_root: Option<PathBuf>,
    pub max_upload_bytes: Option<u64>,
    pub auth_tokens: Option<Vec<String>>,
    pub log_level: Option<String>,
}

/// OS-dependent compiled defaults
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub data_dir: PathBuf,
    pub bind_addr: String,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        // ~/.local/share/zqa on Linux, ~/Library/Application Support/zqa on macOS,
        // %LOCALAPPDATA%\zqa on Windows
        let data_dir = dirs::data_local_dir()
            .map(|d| d.join("zqa"))
            .unwrap_or_else(|| PathBuf::from("./zqa_data"));

        Self {
            data_dir,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            log_level: default_log_level(),
        }
    }
}

/// Fully resolved service configuration.
///
/// Constructed once at startup and handed to each component constructor.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub blob_backend: BlobBackend,
    pub blob_root: PathBuf,
    pub max_upload_bytes: u64,
    pub max_uncompressed_bytes: u64,
    /// Lowercase, without a leading dot
    pub accepted_extension: String,
    /// Accepted bearer tokens; empty disables authentication
    pub auth_tokens: Vec<String>,
    pub log_level: String,
}

impl ServiceConfig {
    /// Resolve configuration from overrides, the TOML file and compiled defaults
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self> {
        let toml_config = match overrides.config_path.as_deref() {
            // An explicitly requested file must exist
            Some(path) => load_toml_config(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => load_toml_config(&path)?,
                Some(path) => {
                    warn!(
                        "Config file not found at {} - using compiled defaults",
                        path.display()
                    );
                    TomlConfig::default()
                }
                None => {
                    warn!("Could not determine config directory - using compiled defaults");
                    TomlConfig::default()
                }
            },
        };

        Self::merge(overrides, toml_config, CompiledDefaults::for_current_platform())
    }

    /// Merge the three tiers and validate the result
    pub fn merge(
        overrides: &ConfigOverrides,
        toml_config: TomlConfig,
        defaults: CompiledDefaults,
    ) -> Result<Self> {
        let bind_addr = overrides
            .bind_addr
            .clone()
            .or(toml_config.bind_addr)
            .unwrap_or(defaults.bind_addr);

        let database_path = overrides
            .database_path
            .clone()
            .or(toml_config.database_path)
            .unwrap_or_else(|| defaults.data_dir.join("zqa.db"));

        let blob_backend = overrides
            .blob_backend
            .or(toml_config.blob_backend)
            .unwrap_or(BlobBackend::Fs);

        let blob_root = overrides
            .blob_root
            .clone()
            .or(toml_config.blob_root)
            .unwrap_or_else(|| defaults.data_dir.join("blobs"));

        let max_upload_bytes = overrides
            .max_upload_bytes
            .or(toml_config.max_upload_bytes)
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        let max_uncompressed_bytes = toml_config
            .max_uncompressed_bytes
            .unwrap_or(DEFAULT_MAX_UNCOMPRESSED_BYTES);

        let accepted_extension = toml_config
            .accepted_extension
            .unwrap_or_else(|| DEFAULT_ACCEPTED_EXTENSION.to_string())
            .trim()
            .trim_start_matches('.')
            .to_ascii_lowercase();

        let auth_tokens: Vec<String> = overrides
            .auth_tokens
            .clone()
            .or(toml_config.auth_tokens)
            .unwrap_or_default()
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        let log_level = overrides
            .log_level
            .clone()
            .unwrap_or(toml_config.logging.level);

        let config = Self {
            bind_addr,
            database_path,
            blob_backend,
            blob_root,
            max_upload_bytes,
            max_uncompressed_bytes,
            accepted_extension,
            auth_tokens,
            log_level,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.bind_addr.parse::<SocketAddr>().is_err() {
            return Err(Error::Config(format!(
                "bind_addr is not a socket address: {}",
                self.bind_addr
            )));
        }
        if self.max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_bytes must be positive".to_string()));
        }
        if self.max_uncompressed_bytes == 0 {
            return Err(Error::Config(
                "max_uncompressed_bytes must be positive".to_string(),
            ));
        }
        if self.accepted_extension.is_empty() {
            return Err(Error::Config("accepted_extension must not be empty".to_string()));
        }
        Ok(())
    }

    /// Whether bearer-token authentication is enforced
    pub fn auth_enabled(&self) -> bool {
        !self.auth_tokens.is_empty()
    }
}

/// Default TOML path: `<config_dir>/zqa/zqa-ts.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("zqa").join("zqa-ts.toml"))
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    info!("Loaded config file: {}", path.display());
    Ok(config)
}
