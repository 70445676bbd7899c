//! Configuration management for deployc
//!
//! Settings are loaded from environment variables with sensible defaults and
//! can then be overridden from the command line.
//!
//! # Environment Variables
//!
//! - `DEPLOYC_LISTEN_ADDR`: Socket address to listen on - default: "[::]:9393"
//! - `DEPLOYC_REGISTRY`: Registry host images are tagged for - default:
//!   "registry.deployc.svc.cluster.local"
//! - `DEPLOYC_BUILDER`: Image builder executable - default: "img"
//! - `DEPLOYC_STAGING_DIR`: Where per-connection staging directories are
//!   created - default: system temp dir
//! - `DEPLOYC_LOG_LEVEL`: Logging level - default: "info"
//!
//! # Example
//!
//! ```no_run
//! use deployc::DeploycConfig;
//!
//! let config = DeploycConfig::default();
//! config.validate().expect("Invalid configuration");
//! println!("Listening on {}", config.listen_addr);
//! ```

use crate::builder::{Builder, DEFAULT_BUILDER};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Default values for configuration
pub const DEFAULT_LISTEN_ADDR: &str = "[::]:9393";
pub const DEFAULT_REGISTRY: &str = "registry.deployc.svc.cluster.local";
const DEFAULT_LOG_LEVEL: &str = "info";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// Failed to parse configuration value
    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

/// Main configuration structure for deployc
#[derive(Debug, Clone)]
pub struct DeploycConfig {
    /// Address the listener binds to
    pub listen_addr: String,

    /// Registry host prefixed to every image reference
    pub registry: String,

    /// Image builder executable (path or name resolved through `PATH`)
    pub builder: PathBuf,

    /// Parent directory for staging directories
    pub staging_dir: PathBuf,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for DeploycConfig {
    /// Creates a new configuration by loading from environment variables with defaults
    fn default() -> Self {
        let listen_addr =
            env::var("DEPLOYC_LISTEN_ADDR").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());

        let registry = env::var("DEPLOYC_REGISTRY").unwrap_or_else(|_| DEFAULT_REGISTRY.to_string());

        let builder = env::var("DEPLOYC_BUILDER")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_BUILDER));

        let staging_dir = env::var("DEPLOYC_STAGING_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir());

        let log_level = env::var("DEPLOYC_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            listen_addr,
            registry,
            builder,
            staging_dir,
            log_level,
        }
    }
}

impl DeploycConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any validation fails
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;

        if self.registry.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Registry must not be empty".to_string(),
            ));
        }
        if self.registry.contains("://") {
            return Err(ConfigError::ValidationFailed(format!(
                "Registry must be a host, not a URL: {}",
                self.registry
            )));
        }
        if self.registry.ends_with('/') || self.registry.chars().any(char::is_whitespace) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid registry host: {:?}",
                self.registry
            )));
        }

        if self.builder.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Builder executable must not be empty".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    /// Parsed listen address
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::ParseError {
                field: "listen address".to_string(),
                error: format!("{} ({})", e, self.listen_addr),
            })
    }

    pub fn builder(&self) -> Builder {
        Builder::new(self.builder.clone())
    }
}
