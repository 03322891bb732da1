//! Chain gateway
//!
//! Sole owner of ledger connectivity and the signing key. Every contract
//! interaction (reads, simulated-then-submitted writes, event subscriptions)
//! funnels through a [`ChainGateway`].

use std::future::Future;

use thiserror::Error;

pub mod abi;
mod gateway;
pub mod rlp;
pub mod rpc;
pub mod signer;
pub mod subscription;
pub mod types;

pub use abi::{ContractBinding, ContractInterface, Token};
pub use gateway::{GatewayConfig, RpcGateway};
pub use signer::LocalSigner;
pub use subscription::{ErrorCallback, Subscription};
pub use types::{Address, Log, TxHash};

/// Errors surfaced by the chain gateway
///
/// `Simulation` means the call would revert against current state and will
/// keep failing for identical inputs. The other kinds can be transient.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// State query failed (network, unknown function, or undecodable output)
    #[error("failed to read `{function}`: {message}")]
    Read { function: String, message: String },

    /// Dry run of a write reverted
    #[error("`{function}` would revert: {reason}")]
    Simulation { function: String, reason: String },

    /// Preparing, signing or broadcasting a write failed
    #[error("failed to submit `{function}`: {message}")]
    Submission { function: String, message: String },

    /// Polling for events failed; the subscription keeps running
    #[error("error watching `{event}`: {message}")]
    Watch { event: String, message: String },
}

impl ChainError {
    /// Whether retrying the same call could succeed
    pub fn is_transient(&self) -> bool {
        !matches!(self, ChainError::Simulation { .. })
    }
}

/// Contract access used by the preference store
pub trait ChainGateway: Send + Sync {
    /// Account that signs writes
    fn account(&self) -> Address;

    /// Query `function` on the bound contract at the latest block
    fn read(
        &self,
        function: &str,
        args: &[Token],
    ) -> impl Future<Output = Result<Vec<Token>, ChainError>> + Send;

    /// Simulate, sign and submit a call to `function`
    ///
    /// Returns as soon as the node accepted the transaction; confirmation is
    /// not awaited.
    fn write(
        &self,
        function: &str,
        args: &[Token],
    ) -> impl Future<Output = Result<TxHash, ChainError>> + Send;

    /// Start delivering batches of `event` logs
    ///
    /// Must be called from within a tokio runtime. Transport errors go to
    /// `on_error` and do not end the subscription; delivery is at-least-once.
    fn subscribe(&self, event: &str, on_error: ErrorCallback) -> Result<Subscription, ChainError>;
}
