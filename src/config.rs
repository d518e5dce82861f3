//! Configuration module for the framekv server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::protocols::kv::parser::{MAX_ARGS, MAX_PAYLOAD};
use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "framekv")]
#[command(author = "framekv authors")]
#[command(version = "0.1.0")]
#[command(about = "A length-prefixed binary key-value server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:1234)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Maximum number of simultaneously open connections
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Maximum readiness events handled per poll
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Size of the scratch buffer used for each socket read
    #[arg(long)]
    pub read_buffer_size: Option<usize>,

    /// Maximum frame payload in bytes
    #[arg(long)]
    pub max_payload: Option<usize>,

    /// Maximum number of arguments in a single request
    #[arg(long)]
    pub max_args: Option<usize>,

    /// Close a connection whose unsent output exceeds this many bytes (0 = unbounded)
    #[arg(long)]
    pub max_pending_output: Option<usize>,

    /// Log level (trace, debug, info, warn, error) [default: info]
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_connections: default_max_connections(),
            batch_size: default_batch_size(),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

/// Wire protocol limits
#[derive(Debug, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_max_payload")]
    pub max_payload: usize,
    #[serde(default = "default_max_args")]
    pub max_args: usize,
    #[serde(default)]
    pub max_pending_output: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_payload: default_max_payload(),
            max_args: default_max_args(),
            max_pending_output: 0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
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

fn default_listen() -> String {
    "0.0.0.0:1234".to_string()
}

fn default_max_connections() -> usize {
    10_000
}

fn default_batch_size() -> usize {
    1024
}

fn default_read_buffer_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_max_payload() -> usize {
    MAX_PAYLOAD
}

fn default_max_args() -> usize {
    MAX_ARGS
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub max_connections: usize,
    pub batch_size: usize,
    pub read_buffer_size: usize,
    pub max_payload: usize,
    pub max_args: usize,
    pub max_pending_output: usize,
    pub log_level: String,
}

impl Config {
    /// Load configuration from the process arguments and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::resolve(CliArgs::parse())
    }

    /// Merge parsed CLI args with the TOML file they point at, if any.
    /// CLI arguments take precedence over TOML file values.
    pub fn resolve(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let listen = cli.listen.unwrap_or(toml_config.server.listen);
        let listen = listen
            .parse()
            .map_err(|_| ConfigError::InvalidListen(listen.clone()))?;

        let config = Config {
            listen,
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections),
            batch_size: cli.batch_size.unwrap_or(toml_config.server.batch_size),
            read_buffer_size: cli
                .read_buffer_size
                .unwrap_or(toml_config.server.read_buffer_size),
            max_payload: cli
                .max_payload
                .unwrap_or(toml_config.protocol.max_payload),
            max_args: cli.max_args.unwrap_or(toml_config.protocol.max_args),
            max_pending_output: cli
                .max_pending_output
                .unwrap_or(toml_config.protocol.max_pending_output),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("max_connections", self.max_connections),
            ("batch_size", self.batch_size),
            ("read_buffer_size", self.read_buffer_size),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }
        // Lengths travel as u32 on the wire.
        if self.max_payload > u32::MAX as usize {
            return Err(ConfigError::PayloadTooLarge(self.max_payload));
        }
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {1}", .0.display())]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {1}", .0.display())]
    TomlParse(PathBuf, #[source] toml::de::Error),
    #[error("Invalid listen address '{0}'")]
    InvalidListen(String),
    #[error("'{0}' must be greater than zero")]
    Zero(&'static str),
    #[error("max_payload {0} does not fit in a 32-bit length prefix")]
    PayloadTooLarge(usize),
}
