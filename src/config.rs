// Configuration module for plateprefs
// Loads ~/.config/plateprefs/config.toml, applies environment overrides and
// validates the result into the settings the application is built from

mod types;

pub use types::{CacheConfig, ChainConfig, Config, GeminiConfig, Secret};

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::chain::{Address, ContractBinding, ContractInterface, GatewayConfig, LocalSigner};

/// Environment variables consulted by [`Config::apply_env`]
pub const ENV_CONTRACT_ADDRESS: &str = "CONTRACT_ADDRESS";
pub const ENV_PUBLIC_CONTRACT_ADDRESS: &str = "NEXT_PUBLIC_CONTRACT_ADDRESS";
pub const ENV_RPC_URL: &str = "BASE_SEPOLIA_RPC_URL";
pub const ENV_PRIVATE_KEY: &str = "PRIVATE_KEY";
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";

/// Result of loading configuration
pub struct ConfigResult {
    pub config: Config,
    pub warning: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing {field}. Set '{key}' in [{section}] or the {env} environment variable.")]
    Missing {
        field: &'static str,
        section: &'static str,
        key: &'static str,
        env: &'static str,
    },

    #[error("Invalid {field}: {message}")]
    Invalid { field: &'static str, message: String },

    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Validated settings the application is assembled from
#[derive(Debug)]
pub struct Settings {
    pub gateway: GatewayConfig,
    pub contract: ContractBinding,
    pub signer: LocalSigner,
    pub gemini_api_key: Secret,
    pub gemini_model: String,
    pub temperature: f32,
    pub cache_capacity: Option<NonZeroUsize>,
}

/// Read and parse a config file; `Ok(None)` if it does not exist
pub fn read_config(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!("Config file read successfully, {} bytes", contents.len());

    toml::from_str(&contents)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Loads configuration from `path`, or ~/.config/plateprefs/config.toml
/// Returns default configuration if the file doesn't exist or on read/parse errors
pub fn load_config(path: Option<&Path>) -> ConfigResult {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    log::debug!("Loading config from {:?}", config_path);

    match read_config(&config_path) {
        Ok(Some(config)) => ConfigResult {
            config,
            warning: None,
        },
        Ok(None) => {
            log::debug!("Config file does not exist, using defaults");
            ConfigResult {
                config: Config::default(),
                warning: None,
            }
        }
        Err(e) => ConfigResult {
            config: Config::default(),
            warning: Some(e.to_string()),
        },
    }
}

/// Returns the path to the configuration file
///
/// Always uses ~/.config/plateprefs/config.toml on all platforms for consistency.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("plateprefs")
        .join("config.toml")
}

impl Config {
    /// Override file values with non-blank environment variables
    ///
    /// `lookup` is usually `|name| std::env::var(name).ok()`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(address) = var(ENV_CONTRACT_ADDRESS).or_else(|| var(ENV_PUBLIC_CONTRACT_ADDRESS))
        {
            self.chain.contract_address = Some(address);
        }
        if let Some(url) = var(ENV_RPC_URL) {
            self.chain.rpc_url = Some(url);
        }
        if let Some(key) = var(ENV_PRIVATE_KEY) {
            self.chain.private_key = Some(Secret::new(key));
        }
        if let Some(key) = var(ENV_GEMINI_API_KEY) {
            self.gemini.api_key = Some(Secret::new(key));
        }
    }

    /// Check every required value and build [`Settings`]
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        let rpc_url = required(
            self.chain.rpc_url.as_deref(),
            "RPC URL",
            "chain",
            "rpc_url",
            ENV_RPC_URL,
        )?;
        if !(rpc_url.starts_with("http://") || rpc_url.starts_with("https://")) {
            return Err(invalid("RPC URL", format!("`{}` is not an http(s) URL", rpc_url)));
        }

        let address = required(
            self.chain.contract_address.as_deref(),
            "contract address",
            "chain",
            "contract_address",
            ENV_CONTRACT_ADDRESS,
        )?;
        let address: Address = address
            .parse()
            .map_err(|e| invalid("contract address", format!("`{}`: {}", address, e)))?;

        let private_key = required(
            self.chain.private_key.as_ref().map(Secret::expose),
            "private key",
            "chain",
            "private_key",
            ENV_PRIVATE_KEY,
        )?;
        let signer =
            LocalSigner::from_hex(private_key).map_err(|e| invalid("private key", e.to_string()))?;

        if self.chain.poll_interval_ms == 0 {
            return Err(invalid("poll interval", "must be greater than zero".to_string()));
        }

        let api_key = required(
            self.gemini.api_key.as_ref().map(Secret::expose),
            "Gemini API key",
            "gemini",
            "api_key",
            ENV_GEMINI_API_KEY,
        )?;
        if self.gemini.model.trim().is_empty() {
            return Err(invalid("Gemini model", "must not be empty".to_string()));
        }
        if !(0.0..=2.0).contains(&self.gemini.temperature) {
            return Err(invalid(
                "Gemini temperature",
                format!("{} is outside 0.0..=2.0", self.gemini.temperature),
            ));
        }

        let cache_capacity = match self.cache.max_entries {
            None => None,
            Some(max) => Some(
                NonZeroUsize::new(max)
                    .ok_or_else(|| invalid("cache max_entries", "must be greater than zero".to_string()))?,
            ),
        };

        Ok(Settings {
            gateway: GatewayConfig {
                rpc_url: rpc_url.to_string(),
                chain_id: self.chain.chain_id,
                poll_interval: Duration::from_millis(self.chain.poll_interval_ms),
            },
            contract: ContractBinding {
                address,
                interface: ContractInterface::user_preferences(),
            },
            signer,
            gemini_api_key: Secret::new(api_key),
            gemini_model: self.gemini.model.trim().to_string(),
            temperature: self.gemini.temperature,
            cache_capacity,
        })
    }
}

fn required<'a>(
    value: Option<&'a str>,
    field: &'static str,
    section: &'static str,
    key: &'static str,
    env: &'static str,
) -> Result<&'a str, ConfigError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing {
            field,
            section,
            key,
            env,
        })
}

fn invalid(field: &'static str, message: String) -> ConfigError {
    ConfigError::Invalid { field, message }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
