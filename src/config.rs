//! Configuration management for the registry and its consumers
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (isr.toml)
//! - Environment variables (ISR__SECTION__KEY)
//!
//! ## Example config file (isr.toml):
//! ```toml
//! [registry]
//! backend = "fs"
//! path = "./registry"
//! git_history = true
//!
//! [server]
//! host = "0.0.0.0"
//! port = 50051
//!
//! [consumer]
//! registry_url = "localhost:50051"
//! schema_target = "1.0"
//! polling_interval_secs = 60
//! request_timeout_secs = 10
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, SchemaError};
use crate::manager::ManagerConfig;
use crate::registry::SchemaRegistry;
use crate::store::{FsStore, FsStoreOptions, MemoryStore, SchemaStore};
use crate::version::SchemaTarget;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IsrConfig {
    /// Registry storage settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Consumer (validator process) settings
    #[serde(default)]
    pub consumer: ConsumerConfig,
}

/// Storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Fs,
    Memory,
}

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub backend: Backend,

    /// Root directory of the fs backend
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,

    /// Commit and tag every registered version in a git repository at `path`
    #[serde(default = "default_true")]
    pub git_history: bool,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Consumer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Registry base URL; `http://` is assumed when no scheme is given
    #[serde(default = "default_registry_url")]
    pub registry_url: String,

    /// The `major.minor` line to follow
    #[serde(default = "default_schema_target")]
    pub schema_target: String,

    #[serde(default = "default_polling_interval_secs")]
    pub polling_interval_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

// Default value functions
fn default_registry_path() -> PathBuf {
    PathBuf::from("./registry")
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    50051
}

fn default_registry_url() -> String {
    "http://localhost:50051".to_string()
}

fn default_schema_target() -> String {
    "1.0".to_string()
}

fn default_polling_interval_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            path: default_registry_path(),
            git_history: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            registry_url: default_registry_url(),
            schema_target: default_schema_target(),
            polling_interval_secs: default_polling_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl IsrConfig {
    /// Load configuration, adding a specific file on top of the default locations
    pub fn load_from(config_path: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = ["isr.toml", ".isr.toml", "config/isr.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "isr") {
            let xdg_config = config_dir.config_dir().join("isr.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (ISR__SECTION__KEY)
        builder = builder.add_source(
            Environment::with_prefix("ISR")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Get the registry path (resolves relative paths)
    pub fn registry_path(&self) -> PathBuf {
        if self.registry.path.is_absolute() {
            self.registry.path.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(&self.registry.path)
        }
    }

    /// Open the configured store and wrap it in a registry
    pub fn open_registry(&self) -> Result<SchemaRegistry> {
        let store: Arc<dyn SchemaStore> = match self.registry.backend {
            Backend::Memory => Arc::new(MemoryStore::new()),
            Backend::Fs => Arc::new(FsStore::open(
                self.registry_path(),
                FsStoreOptions {
                    git_history: self.registry.git_history,
                },
            )?),
        };
        Ok(SchemaRegistry::new(store))
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl ConsumerConfig {
    /// Parse the target and build the reconciliation settings
    pub fn manager_config(&self) -> Result<ManagerConfig> {
        if self.polling_interval_secs == 0 {
            return Err(SchemaError::InvalidArgument(
                "consumer.polling_interval_secs must be greater than zero".to_string(),
            ));
        }
        let target = SchemaTarget::parse(&self.schema_target)?;
        Ok(ManagerConfig::new(target).with_polling_interval(Duration::from_secs(self.polling_interval_secs)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
