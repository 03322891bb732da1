// Configuration type definitions

use std::fmt;

use serde::Deserialize;

/// Base Sepolia
fn default_chain_id() -> u64 {
    84532
}

/// Event polling interval in milliseconds
fn default_poll_interval_ms() -> u64 {
    4000
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

/// A credential that never shows up in debug output
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Ledger connection section
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint (required)
    pub rpc_url: Option<String>,
    /// Address of the preferences contract (required)
    pub contract_address: Option<String>,
    /// Hex private key of the signing account (required)
    pub private_key: Option<Secret>,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            rpc_url: None,
            contract_address: None,
            private_key: None,
            chain_id: default_chain_id(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Gemini provider section
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    /// API key (required)
    pub api_key: Option<Secret>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        GeminiConfig {
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
        }
    }
}

/// Suggestion cache section
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CacheConfig {
    /// Maximum cached pairs; unbounded when absent
    pub max_entries: Option<usize>,
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;
