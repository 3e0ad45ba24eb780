//! Configuration module for rgate-server.
//!
//! Handles loading configuration from the TOML file and CLI overrides, and
//! converts it into the runtime types the broker core consumes.

pub mod file;
pub mod tokens;

use crate::config::file::FileConfig;
use crate::config::tokens::TokenTable;
use rgate_core::config::{ClusterConfig, RequestConfig};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Server settings that are not part of the broker core.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub listen: SocketAddr,
    pub public_endpoint: Url,
}

/// Loaded configuration result containing all parts.
pub struct LoadedConfig {
    pub server: ServerSettings,
    pub request: RequestConfig,
    pub cluster: Option<ClusterConfig>,
    pub tokens: TokenTable,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
    seed_overrides: Vec<Url>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(
        config_path: impl AsRef<Path>,
        listen_override: Option<SocketAddr>,
        seed_overrides: Vec<Url>,
    ) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
            seed_overrides,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    /// 4. Build the loaded configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        self.load_str(&config_content)
    }

    fn load_str(&self, content: &str) -> Result<LoadedConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }
        if !self.seed_overrides.is_empty() {
            match file_config.cluster.as_mut() {
                Some(cluster) => cluster.seeds = self.seed_overrides.clone(),
                None => {
                    return Err(ConfigError::ValidationError(
                        "--seed given but the config has no [cluster] section".to_owned(),
                    ));
                }
            }
        }

        validate(&file_config)?;
        Ok(build_loaded_config(file_config))
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    if config.request.queue_size == 0 {
        return Err(ConfigError::ValidationError(
            "request.queue_size must be at least 1".to_owned(),
        ));
    }
    if config.request.timeout_secs == 0 || config.request.clear_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "request timeouts must be positive".to_owned(),
        ));
    }

    if let Some(cluster) = &config.cluster {
        if cluster.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "cluster.name must not be empty".to_owned(),
            ));
        }
        if cluster.gossip_interval_secs == 0 || cluster.suspect_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "cluster intervals must be positive".to_owned(),
            ));
        }
    }

    let mut seen = HashSet::new();
    for token in &config.tokens {
        if token.token.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "empty token for account {}",
                token.account
            )));
        }
        if !seen.insert(token.token.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate token for account {}",
                token.account
            )));
        }
    }
    Ok(())
}

fn build_loaded_config(file_config: FileConfig) -> LoadedConfig {
    let public_endpoint = file_config.server.public_endpoint;
    let cluster = file_config.cluster.map(|c| ClusterConfig {
        name: c.name,
        advertise: public_endpoint.clone(),
        seeds: c.seeds,
        peer_token: c.peer_token,
        gossip_interval: Duration::from_secs(c.gossip_interval_secs),
        suspect_timeout: Duration::from_secs(c.suspect_timeout_secs),
        fanout: c.fanout,
    });

    LoadedConfig {
        server: ServerSettings {
            listen: file_config.server.listen,
            public_endpoint,
        },
        request: RequestConfig {
            queue_size: file_config.request.queue_size,
            request_timeout: Duration::from_secs(file_config.request.timeout_secs),
            clear_interval: Duration::from_secs(file_config.request.clear_interval_secs),
        },
        cluster,
        tokens: TokenTable::new(file_config.tokens),
    }
}
