//! Configuration loading and resolution
//!
//! Every setting is resolved in this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const ENV_CONFIG: &str = "QF_CONFIG";
pub const ENV_HOST: &str = "QF_HOST";
pub const ENV_PORT: &str = "QF_PORT";
pub const ENV_DATABASE: &str = "QF_DATABASE";

/// Compiled defaults
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_CLIENT_URL: &str = "http://localhost:5173";
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;
pub const DEFAULT_CONFUSION_WINDOW_SECS: u64 = 300;
pub const DEFAULT_CONNECTION_BUFFER: usize = 256;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// How incoming questions are compared against existing doubts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicyKind {
    /// Normalized lexical overlap above a threshold
    #[default]
    Lexical,
    /// Extracted topic tags are equal
    Topic,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub client_url: Option<String>,
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DoubtsSection {
    pub match_policy: Option<MatchPolicyKind>,
    pub similarity_threshold: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfusionSection {
    pub window_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RoomsSection {
    pub connection_buffer: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: Option<String>,
}

/// Contents of the optional TOML config file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerSection,
    pub doubts: DoubtsSection,
    pub confusion: ConfusionSection,
    pub rooms: RoomsSection,
    pub logging: LoggingSection,
}

impl TomlConfig {
    /// Parse TOML text
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Read and parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::parse(&text)
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<PathBuf>,
}

/// Fully resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub client_url: String,
    pub database_path: PathBuf,
    pub match_policy: MatchPolicyKind,
    pub similarity_threshold: f64,
    pub confusion_window: Duration,
    pub connection_buffer: usize,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            client_url: DEFAULT_CLIENT_URL.to_string(),
            database_path: default_database_path(),
            match_policy: MatchPolicyKind::default(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            confusion_window: Duration::from_secs(DEFAULT_CONFUSION_WINDOW_SECS),
            connection_buffer: DEFAULT_CONNECTION_BUFFER,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl ServerConfig {
    /// Resolve configuration from CLI, environment, TOML file and defaults
    ///
    /// A config file named on the command line must exist. One named in
    /// `QF_CONFIG` or the per-user default file is skipped with a warning when
    /// missing.
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let toml_config = match &cli.config {
            Some(path) => {
                info!("Loading config file: {}", path.display());
                TomlConfig::load(path)?
            }
            None => {
                let candidate = std::env::var(ENV_CONFIG)
                    .ok()
                    .map(PathBuf::from)
                    .or_else(default_config_file);
                match candidate {
                    Some(path) if path.exists() => {
                        info!("Loading config file: {}", path.display());
                        TomlConfig::load(&path)?
                    }
                    Some(path) => {
                        warn!("Config file {} not found, using defaults", path.display());
                        TomlConfig::default()
                    }
                    None => {
                        warn!("No config file found, using defaults");
                        TomlConfig::default()
                    }
                }
            }
        };

        Self::from_sources(cli, &toml_config)
    }

    /// Merge already-loaded sources; environment variables are read here
    pub fn from_sources(cli: &CliOverrides, file: &TomlConfig) -> Result<Self> {
        let defaults = Self::default();

        let host = cli
            .host
            .clone()
            .or_else(|| std::env::var(ENV_HOST).ok())
            .or_else(|| file.server.host.clone())
            .unwrap_or(defaults.host);

        let env_port = match std::env::var(ENV_PORT) {
            Ok(value) => Some(value.parse::<u16>().map_err(|_| {
                Error::Config(format!("{} must be a port number, got {:?}", ENV_PORT, value))
            })?),
            Err(_) => None,
        };
        let port = cli
            .port
            .or(env_port)
            .or(file.server.port)
            .unwrap_or(defaults.port);

        let database_path = cli
            .database
            .clone()
            .or_else(|| std::env::var(ENV_DATABASE).ok().map(PathBuf::from))
            .or_else(|| file.server.database.clone())
            .unwrap_or(defaults.database_path);

        let config = Self {
            host,
            port,
            client_url: file.server.client_url.clone().unwrap_or(defaults.client_url),
            database_path,
            match_policy: file.doubts.match_policy.unwrap_or(defaults.match_policy),
            similarity_threshold: file
                .doubts
                .similarity_threshold
                .unwrap_or(defaults.similarity_threshold),
            confusion_window: file
                .confusion
                .window_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.confusion_window),
            connection_buffer: file
                .rooms
                .connection_buffer
                .unwrap_or(defaults.connection_buffer),
            log_level: file.logging.level.clone().unwrap_or(defaults.log_level),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::Config(format!(
                "doubts.similarity_threshold must be within 0.0..=1.0, got {}",
                self.similarity_threshold
            )));
        }
        if self.confusion_window.is_zero() {
            return Err(Error::Config("confusion.window_secs must be positive".to_string()));
        }
        if self.connection_buffer == 0 {
            return Err(Error::Config("rooms.connection_buffer must be positive".to_string()));
        }
        Ok(())
    }

    /// Socket address string for the HTTP listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Per-user config file location (`~/.config/questionflow/config.toml` on Linux)
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("questionflow").join("config.toml"))
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("questionflow"))
        .unwrap_or_else(|| PathBuf::from("./questionflow_data"))
        .join("questionflow.db")
}
