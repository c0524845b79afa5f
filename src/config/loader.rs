//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles environment detection,
//! layered file discovery and environment-variable overrides.

use super::error::{ConfigResult, ConfigurationError};
use super::StorefrontConfig;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Base name of configuration files inside the configuration directory
const CONFIG_FILE_STEM: &str = "storefront";

/// Loaded configuration plus the context it was loaded from
#[derive(Debug)]
pub struct ConfigManager {
    config: StorefrontConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    ///
    /// Useful for tests that must not depend on process-wide environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading configuration"
        );

        let mut config = Self::load_layers(&config_directory, environment)?;
        config.environment = environment.to_string();

        if let Ok(database_url) = env::var("DATABASE_URL") {
            if !database_url.trim().is_empty() {
                config.database.url = database_url;
            }
        }

        config.validate()?;

        info!(
            environment = %environment,
            max_connections = config.database.max_connections,
            worker_count = config.queue.worker_count,
            queues = ?config.queue.queues,
            "⚙️ Configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration (tests, embedding)
    pub fn from_config(config: StorefrontConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        let environment = if config.environment.is_empty() {
            Self::detect_environment()
        } else {
            config.environment.clone()
        };
        Ok(Arc::new(ConfigManager {
            config,
            environment,
            config_directory: Self::default_config_directory(),
        }))
    }

    fn load_layers(directory: &Path, environment: &str) -> ConfigResult<StorefrontConfig> {
        let defaults = Config::try_from(&StorefrontConfig::default())
            .map_err(|e| ConfigurationError::load_error(environment, e))?;

        let settings = Config::builder()
            .add_source(defaults)
            .add_source(File::from(directory.join(format!("{CONFIG_FILE_STEM}.toml"))).required(false))
            .add_source(
                File::from(directory.join(format!("{CONFIG_FILE_STEM}.{environment}.toml")))
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("STOREFRONT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::load_error(environment, e))?;

        settings
            .try_deserialize::<StorefrontConfig>()
            .map_err(ConfigurationError::deserialize_error)
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &StorefrontConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Configuration as JSON with credentials masked, for logging
    pub fn debug_config(&self) -> serde_json::Value {
        let mut value = serde_json::json!(self.config);
        mask_sensitive(&mut value);
        value
    }

    /// Detect the runtime environment from environment variables
    pub fn detect_environment() -> String {
        env::var("STOREFRONT_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        env::var("STOREFRONT_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }
}

const SENSITIVE_KEYS: [&str; 5] = ["password", "secret", "key", "token", "url"];

fn mask_sensitive(value: &mut serde_json::Value) {
    if let serde_json::Value::Object(map) = value {
        for (key, val) in map.iter_mut() {
            let key_lower = key.to_lowercase();
            let sensitive = SENSITIVE_KEYS.iter().any(|p| key_lower.contains(p));
            match val {
                serde_json::Value::String(s) if sensitive => {
                    *val = serde_json::Value::String(mask(s));
                }
                serde_json::Value::Object(_) => mask_sensitive(val),
                _ => {}
            }
        }
    }
}

fn mask(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    if chars.is_empty() {
        "[EMPTY]".to_string()
    } else if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        format!("[MASKED: {head}***]")
    } else {
        "[MASKED]".to_string()
    }
}
