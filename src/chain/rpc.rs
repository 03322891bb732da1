//! JSON-RPC 2.0 over HTTP
//!
//! Uses reqwest for async HTTP. One client instance is shared by reads,
//! writes and event polling.

use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;

use super::types::decode_hex;

#[derive(Debug, Error)]
pub enum RpcError {
    /// Connection, TLS or timeout failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-2xx HTTP status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Error object returned by the node
    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<String>,
    },

    /// Response body or result had an unexpected shape
    #[error("invalid response: {0}")]
    Decode(String),
}

impl RpcError {
    /// Revert payload attached to an execution error, if any
    pub fn revert_data(&self) -> Option<Vec<u8>> {
        match self {
            RpcError::Rpc {
                data: Some(data), ..
            } => decode_hex(data).ok().filter(|bytes| !bytes.is_empty()),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ErrorObject>,
}

/// Async JSON-RPC client bound to one endpoint
#[derive(Debug)]
pub struct RpcClient {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: String) -> Self {
        Self {
            client: Client::new(),
            url,
            next_id: AtomicU64::new(1),
        }
    }

    /// Send one request and deserialize its `result`
    ///
    /// A missing `result` is treated as JSON `null`, so `T = Option<_>` can
    /// express "not found" answers.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        log::trace!("rpc #{} -> {}", id, method);

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RpcError::Http { status, body });
        }

        let response: Response = response
            .json()
            .await
            .map_err(|e| RpcError::Decode(e.to_string()))?;

        if let Some(error) = response.error {
            let data = error.data.map(|d| match d {
                Value::String(s) => s,
                other => other.to_string(),
            });
            return Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
                data,
            });
        }

        serde_json::from_value(response.result.unwrap_or(Value::Null))
            .map_err(|e| RpcError::Decode(format!("{}: {}", method, e)))
    }
}
