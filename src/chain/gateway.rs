//! JSON-RPC backed chain gateway
//!
//! Reads go through `eth_call`. Writes are dry-run with `eth_call` and
//! `eth_estimateGas` from the signing account before an EIP-1559 transaction
//! is signed locally and broadcast with `eth_sendRawTransaction`. Event
//! subscriptions poll `eth_getLogs` on a background task.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::abi::{self, ContractBinding, Token};
use super::rpc::{RpcClient, RpcError};
use super::signer::{Eip1559Transaction, LocalSigner};
use super::subscription::{ErrorCallback, Subscription};
use super::types::{
    Address, Log, RpcLog, TxHash, decode_hex, encode_hex, format_quantity, parse_quantity,
};
use super::{ChainError, ChainGateway};

/// Batches buffered between the polling task and the subscriber
const SUBSCRIPTION_BUFFER: usize = 16;

/// Network settings for [`RpcGateway`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub poll_interval: Duration,
}

/// Chain gateway talking to a JSON-RPC node
///
/// One instance per process: it owns the RPC client and the signing key.
#[derive(Debug)]
pub struct RpcGateway {
    rpc: Arc<RpcClient>,
    signer: LocalSigner,
    binding: ContractBinding,
    chain_id: u64,
    poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockHeader {
    base_fee_per_gas: Option<String>,
}

impl RpcGateway {
    pub fn new(config: GatewayConfig, binding: ContractBinding, signer: LocalSigner) -> Self {
        Self {
            rpc: Arc::new(RpcClient::new(config.rpc_url)),
            signer,
            binding,
            chain_id: config.chain_id,
            poll_interval: config.poll_interval,
        }
    }

    pub fn binding(&self) -> &ContractBinding {
        &self.binding
    }

    /// Dry-run the call and return the estimated gas
    async fn simulate(&self, function: &str, data: &[u8]) -> Result<u64, ChainError> {
        let call = json!({
            "from": self.signer.address().to_string(),
            "to": self.binding.address.to_string(),
            "data": encode_hex(data),
        });

        self.rpc
            .request::<String>("eth_call", json!([call, "latest"]))
            .await
            .map_err(|e| simulation_error(function, e))?;

        let estimate: String = self
            .rpc
            .request("eth_estimateGas", json!([call]))
            .await
            .map_err(|e| simulation_error(function, e))?;

        parse_quantity(&estimate)
            .and_then(|gas| u64::try_from(gas).ok())
            .ok_or_else(|| {
                submission_error(function, format!("invalid gas estimate `{}`", estimate))
            })
    }

    /// Fetch nonce and fees, then build and sign the transaction
    async fn sign(
        &self,
        function: &str,
        data: Vec<u8>,
        gas: u64,
    ) -> Result<(Vec<u8>, TxHash), ChainError> {
        let account = self.signer.address().to_string();
        let (nonce, block, priority_fee) = tokio::try_join!(
            self.rpc
                .request::<String>("eth_getTransactionCount", json!([account, "pending"])),
            self.rpc
                .request::<BlockHeader>("eth_getBlockByNumber", json!(["latest", false])),
            self.rpc.request::<String>("eth_maxPriorityFeePerGas", json!([])),
        )
        .map_err(|e| submission_error(function, e.to_string()))?;

        let quantity = |value: &str, what: &str| {
            parse_quantity(value)
                .ok_or_else(|| submission_error(function, format!("invalid {} `{}`", what, value)))
        };
        let nonce = quantity(&nonce, "nonce")?;
        let priority_fee = quantity(&priority_fee, "priority fee")?;
        let base_fee = match block.base_fee_per_gas {
            Some(fee) => quantity(&fee, "base fee")?,
            None => {
                return Err(submission_error(
                    function,
                    "latest block has no base fee".to_string(),
                ));
            }
        };

        let tx = Eip1559Transaction {
            chain_id: self.chain_id,
            nonce: u64::try_from(nonce)
                .map_err(|_| submission_error(function, "nonce overflow".to_string()))?,
            max_priority_fee_per_gas: priority_fee,
            max_fee_per_gas: base_fee.saturating_mul(2).saturating_add(priority_fee),
            gas_limit: gas.saturating_add(gas / 5),
            to: self.binding.address,
            value: 0,
            data,
        };

        let signed = self
            .signer
            .sign_transaction(&tx)
            .map_err(|e| submission_error(function, e.to_string()))?;
        Ok((signed.raw, signed.hash))
    }
}

impl ChainGateway for RpcGateway {
    fn account(&self) -> Address {
        self.signer.address()
    }

    async fn read(&self, function: &str, args: &[Token]) -> Result<Vec<Token>, ChainError> {
        let read_error = |message: String| ChainError::Read {
            function: function.to_string(),
            message,
        };

        let descriptor = self
            .binding
            .interface
            .function(function)
            .map_err(|e| read_error(e.to_string()))?;
        let data = descriptor
            .encode_call(args)
            .map_err(|e| read_error(e.to_string()))?;

        let call = json!({
            "to": self.binding.address.to_string(),
            "data": encode_hex(&data),
        });
        let output: String = self
            .rpc
            .request("eth_call", json!([call, "latest"]))
            .await
            .map_err(|e| read_error(e.to_string()))?;

        let bytes = decode_hex(&output).map_err(|e| read_error(e.to_string()))?;
        descriptor
            .decode_output(&bytes)
            .map_err(|e| read_error(e.to_string()))
    }

    async fn write(&self, function: &str, args: &[Token]) -> Result<TxHash, ChainError> {
        let descriptor = self
            .binding
            .interface
            .function(function)
            .map_err(|e| invalid_call(function, e))?;
        let data = descriptor
            .encode_call(args)
            .map_err(|e| invalid_call(function, e))?;

        let gas = self.simulate(function, &data).await?;
        let (raw, expected_hash) = self.sign(function, data, gas).await?;

        let hash: TxHash = self
            .rpc
            .request("eth_sendRawTransaction", json!([encode_hex(&raw)]))
            .await
            .map_err(|e| submission_error(function, e.to_string()))?;

        if hash != expected_hash {
            log::warn!(
                "Node returned hash {} for `{}`, locally computed {}",
                hash,
                function,
                expected_hash
            );
        }
        log::info!("Submitted `{}` transaction {}", function, hash);
        Ok(hash)
    }

    fn subscribe(&self, event: &str, on_error: ErrorCallback) -> Result<Subscription, ChainError> {
        let descriptor = self
            .binding
            .interface
            .event(event)
            .map_err(|e| ChainError::Watch {
                event: event.to_string(),
                message: e.to_string(),
            })?;

        let filter = LogFilter {
            event: descriptor.name.clone(),
            address: self.binding.address,
            topic: descriptor.topic(),
        };
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let cancel = CancellationToken::new();

        log::info!("Listening for {} events...", filter.event);
        tokio::spawn(poll_logs(
            Arc::clone(&self.rpc),
            filter,
            self.poll_interval,
            tx,
            cancel.clone(),
            on_error,
        ));

        Ok(Subscription::new(rx, cancel))
    }
}

/// A revert surfaced by the node is a simulation failure; anything else
/// means we never got an answer and is reported as a submission failure
fn simulation_error(function: &str, err: RpcError) -> ChainError {
    match &err {
        RpcError::Rpc { message, .. } => ChainError::Simulation {
            function: function.to_string(),
            reason: err
                .revert_data()
                .and_then(|data| abi::decode_revert_reason(&data))
                .unwrap_or_else(|| message.clone()),
        },
        _ => submission_error(function, err.to_string()),
    }
}

fn submission_error(function: &str, message: String) -> ChainError {
    ChainError::Submission {
        function: function.to_string(),
        message,
    }
}

/// Calls that cannot be encoded would never succeed, like a revert
fn invalid_call(function: &str, err: abi::AbiError) -> ChainError {
    ChainError::Simulation {
        function: function.to_string(),
        reason: err.to_string(),
    }
}

#[derive(Debug, Clone)]
struct LogFilter {
    event: String,
    address: Address,
    topic: [u8; 32],
}

/// Poll for new logs until cancelled or the subscriber goes away
async fn poll_logs(
    rpc: Arc<RpcClient>,
    filter: LogFilter,
    interval: Duration,
    tx: mpsc::Sender<Vec<Log>>,
    cancel: CancellationToken,
    on_error: ErrorCallback,
) {
    let mut next_block: Option<u64> = None;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match poll_once(&rpc, &filter, &mut next_block).await {
            Ok(batch) if batch.is_empty() => {}
            Ok(batch) => {
                log::info!("Event received: {} {} log(s)", filter.event, batch.len());
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => break,
                    sent = tx.send(batch) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            Err(message) => {
                log::error!("Error watching contract events: {}", message);
                on_error(ChainError::Watch {
                    event: filter.event.clone(),
                    message,
                });
            }
        }
    }

    log::debug!("Stopped watching {} events", filter.event);
}

/// One polling round
///
/// The first successful round only records the chain head. The cursor
/// advances only after logs were fetched, so a failed round is retried in
/// full on the next tick.
async fn poll_once(
    rpc: &RpcClient,
    filter: &LogFilter,
    next_block: &mut Option<u64>,
) -> Result<Vec<Log>, String> {
    let head: String = rpc
        .request("eth_blockNumber", json!([]))
        .await
        .map_err(|e| e.to_string())?;
    let head = parse_quantity(&head)
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| format!("invalid block number `{}`", head))?;

    let from = match *next_block {
        Some(from) => from,
        None => {
            *next_block = Some(head + 1);
            return Ok(Vec::new());
        }
    };
    if head < from {
        return Ok(Vec::new());
    }

    let params = json!([{
        "address": filter.address.to_string(),
        "topics": [encode_hex(filter.topic)],
        "fromBlock": format_quantity(from.into()),
        "toBlock": format_quantity(head.into()),
    }]);
    let raw: Vec<Value> = rpc
        .request("eth_getLogs", params)
        .await
        .map_err(|e| e.to_string())?;

    let mut logs = Vec::with_capacity(raw.len());
    for value in raw {
        let rpc_log: RpcLog = serde_json::from_value(value).map_err(|e| e.to_string())?;
        let log = Log::try_from(rpc_log)?;
        if log.address == filter.address && log.topics.first() == Some(&filter.topic) {
            logs.push(log);
        }
    }
    logs.sort_by_key(|log| (log.block_number, log.log_index));

    *next_block = Some(head + 1);
    Ok(logs)
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod gateway_tests;
