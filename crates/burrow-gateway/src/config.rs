use burrow_storage::{DeleteMode, StorageConfig};
use clap::{Parser, ValueEnum};
use ipnet::IpNet;
use serde::Deserialize;
use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SERVER_ADDRESS_ENV: &str = "SERVER_ADDRESS";
pub const BASE_URL_ENV: &str = "BASE_URL";
pub const FILE_STORAGE_PATH_ENV: &str = "FILE_STORAGE_PATH";
pub const DATABASE_DSN_ENV: &str = "DATABASE_DSN";
pub const TRUSTED_SUBNET_ENV: &str = "TRUSTED_SUBNET";
pub const DELETE_MODE_ENV: &str = "DELETE_MODE";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
pub const CONFIG_ENV: &str = "CONFIG";

pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:8080";
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DeleteModeArg {
    #[value(name = "sync")]
    Sync,
    #[default]
    #[value(name = "deferred")]
    Deferred,
}

impl From<DeleteModeArg> for DeleteMode {
    fn from(value: DeleteModeArg) -> Self {
        match value {
            DeleteModeArg::Sync => DeleteMode::Immediate,
            DeleteModeArg::Deferred => DeleteMode::Deferred,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    #[value(name = "pretty")]
    Pretty,
    #[value(name = "json")]
    Json,
}

impl Display for LogFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Command line flags. Every flag can also come from its environment
/// variable; flags win over the environment.
#[derive(Debug, Parser)]
#[command(name = "burrow", about = "URL shortener HTTP server")]
pub struct CLI {
    #[arg(short = 'a', long, env = SERVER_ADDRESS_ENV)]
    pub server_address: Option<SocketAddr>,

    /// Prefix of the short URLs handed out to clients.
    #[arg(short = 'b', long, env = BASE_URL_ENV)]
    pub base_url: Option<String>,

    #[arg(short = 'f', long, env = FILE_STORAGE_PATH_ENV)]
    pub file_storage_path: Option<PathBuf>,

    /// PostgreSQL connection string. Takes precedence over the file storage.
    #[arg(short = 'd', long, env = DATABASE_DSN_ENV)]
    pub database_dsn: Option<String>,

    /// CIDR allowed to read `/api/internal/stats`.
    #[arg(short = 't', long, env = TRUSTED_SUBNET_ENV)]
    pub trusted_subnet: Option<IpNet>,

    #[arg(long, env = DELETE_MODE_ENV, value_enum)]
    pub delete_mode: Option<DeleteModeArg>,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// JSON config file. Its values apply only where no flag or environment
    /// variable is given.
    #[arg(short = 'c', long = "config", env = CONFIG_ENV)]
    pub config: Option<PathBuf>,
}

/// Settings read from the JSON config file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server_address: Option<SocketAddr>,
    pub base_url: Option<String>,
    #[serde(alias = "storage_path")]
    pub file_storage_path: Option<PathBuf>,
    #[serde(alias = "base_path")]
    pub database_dsn: Option<String>,
    pub trusted_subnet: Option<IpNet>,
    pub delete_mode: Option<DeleteModeArg>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Fully resolved gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub server_address: SocketAddr,
    pub base_url: String,
    pub trusted_subnet: Option<IpNet>,
    pub log_format: LogFormat,
    pub storage: StorageConfig,
}

impl GatewayConfig {
    /// Resolves the configuration with precedence defaults < file < env < flags.
    pub fn resolve(cli: CLI) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::merge(cli, file))
    }

    fn merge(cli: CLI, file: FileConfig) -> Self {
        let server_address = cli
            .server_address
            .or(file.server_address)
            .unwrap_or(SocketAddr::from(([127, 0, 0, 1], 8080)));

        let storage = StorageConfig {
            database_dsn: cli.database_dsn.or(file.database_dsn),
            file_path: cli.file_storage_path.or(file.file_storage_path),
            delete_mode: cli
                .delete_mode
                .or(file.delete_mode)
                .unwrap_or_default()
                .into(),
            ..StorageConfig::default()
        };

        Self {
            server_address,
            base_url: cli
                .base_url
                .or(file.base_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            trusted_subnet: cli.trusted_subnet.or(file.trusted_subnet),
            log_format: cli.log_format,
            storage,
        }
    }
}

impl<'de> Deserialize<'de> for DeleteModeArg {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DeleteModeArg::from_str(&raw, true).map_err(serde::de::Error::custom)
    }
}
