//! Configuration loading from YAML files and the environment

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, RpcError};
use crate::types::{ClientOptions, SessionOptions};

/// Overrides `request_timeout_ms`
pub const ENV_REQUEST_TIMEOUT_MS: &str = "LSPWIRE_REQUEST_TIMEOUT_MS";
/// Overrides `max_frame_size`
pub const ENV_MAX_FRAME_SIZE: &str = "LSPWIRE_MAX_FRAME_SIZE";
/// Overrides `max_concurrent_handlers`
pub const ENV_MAX_CONCURRENT_HANDLERS: &str = "LSPWIRE_MAX_CONCURRENT_HANDLERS";
/// Overrides `shutdown_on_read_error`
pub const ENV_SHUTDOWN_ON_READ_ERROR: &str = "LSPWIRE_SHUTDOWN_ON_READ_ERROR";

/// Top-level configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireConfig {
    /// Defaults for every client
    pub client: ClientOptions,
    /// Named language servers
    pub servers: HashMap<String, SessionOptions>,
}

impl WireConfig {
    /// Look up a named server
    pub fn server(&self, name: &str) -> Option<&SessionOptions> {
        self.servers.get(name)
    }
}

/// Loads lspwire configuration
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub fn load_from_file(path: &Path) -> Result<WireConfig> {
        debug!("Loading lspwire configuration from: {:?}", path);

        let content = std::fs::read_to_string(path)
            .map_err(|e| RpcError::Config(format!("Failed to read config file: {}", e)))?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<WireConfig> {
        let config: WireConfig = serde_yaml::from_str(content)
            .map_err(|e| RpcError::Config(format!("Failed to parse YAML: {}", e)))?;

        Self::validate(&config)?;

        info!(
            servers = config.servers.len(),
            "Successfully loaded lspwire configuration"
        );

        Ok(config)
    }

    /// Apply `LSPWIRE_*` environment variables on top of `options`
    pub fn apply_env_overrides(options: ClientOptions) -> Result<ClientOptions> {
        Self::apply_overrides(options, |key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides<F>(mut options: ClientOptions, lookup: F) -> Result<ClientOptions>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_REQUEST_TIMEOUT_MS) {
            options.request_timeout_ms = parse_var(ENV_REQUEST_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_FRAME_SIZE) {
            options.max_frame_size = parse_var(ENV_MAX_FRAME_SIZE, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_CONCURRENT_HANDLERS) {
            options.max_concurrent_handlers = parse_var(ENV_MAX_CONCURRENT_HANDLERS, &value)?;
        }
        if let Some(value) = lookup(ENV_SHUTDOWN_ON_READ_ERROR) {
            options.shutdown_on_read_error = parse_var(ENV_SHUTDOWN_ON_READ_ERROR, &value)?;
        }

        Self::validate_client(&options, "environment")?;
        Ok(options)
    }

    /// Validate configuration schema
    pub fn validate(config: &WireConfig) -> Result<()> {
        Self::validate_client(&config.client, "client")?;

        for (name, server) in &config.servers {
            if server.executable.is_empty() {
                return Err(RpcError::Config(format!(
                    "Server '{}' has empty executable",
                    name
                )));
            }
            Self::validate_client(&server.client, name)?;
        }

        Ok(())
    }

    fn validate_client(options: &ClientOptions, scope: &str) -> Result<()> {
        if options.request_timeout_ms == 0 {
            return Err(RpcError::Config(format!(
                "'{}' has invalid request_timeout_ms: 0",
                scope
            )));
        }
        if options.max_frame_size == 0 {
            return Err(RpcError::Config(format!(
                "'{}' has invalid max_frame_size: 0",
                scope
            )));
        }
        if options.max_concurrent_handlers == 0 {
            return Err(RpcError::Config(format!(
                "'{}' has invalid max_concurrent_handlers: 0",
                scope
            )));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RpcError::Config(format!("{} has invalid value: {:?}", key, value)))
}
