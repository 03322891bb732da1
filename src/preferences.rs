//! User food preferences stored on-chain
//!
//! Each fid (a social-network user id) maps to a country and a dietary
//! restrictions string held by the `UserPreferences` contract. A record with
//! both fields empty is the contract's default and means "no preferences".

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::chain::abi::EventDescriptor;
use crate::chain::{ChainError, ChainGateway, Log, Token, TxHash};

const READ_FUNCTION: &str = "fidToPreferences";
const WRITE_FUNCTION: &str = "setUserPreferences";

/// Preferences stored for one fid
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceRecord {
    pub country: String,
    pub dietary_restrictions: String,
}

impl PreferenceRecord {
    /// `None` when both fields are empty
    pub fn from_fields(country: String, dietary_restrictions: String) -> Option<Self> {
        if country.is_empty() && dietary_restrictions.is_empty() {
            return None;
        }
        Some(Self {
            country,
            dietary_restrictions,
        })
    }
}

/// One decoded `UserPreferencesUpdated` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceUpdate {
    pub fid: u64,
    /// New preferences, `None` if the update cleared them
    pub preferences: Option<PreferenceRecord>,
    pub block_number: u64,
    pub transaction_hash: Option<TxHash>,
}

/// Preference operation failures
///
/// Messages are user-facing; the underlying [`ChainError`] is the source.
#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("Failed to read preferences from the blockchain.")]
    Unavailable(#[source] ChainError),

    #[error("Failed to write preferences to the blockchain.")]
    WriteFailed(#[source] ChainError),

    #[error("Failed to watch preference updates.")]
    WatchFailed(#[source] ChainError),
}

impl PreferenceError {
    pub fn chain_error(&self) -> &ChainError {
        match self {
            PreferenceError::Unavailable(e)
            | PreferenceError::WriteFailed(e)
            | PreferenceError::WatchFailed(e) => e,
        }
    }

    /// Whether retrying could succeed; a reverted write never will
    pub fn is_transient(&self) -> bool {
        self.chain_error().is_transient()
    }
}

/// Preference reads, writes and update notifications for one contract
#[derive(Debug)]
pub struct PreferenceStore<G> {
    gateway: G,
    update_event: EventDescriptor,
}

impl<G: ChainGateway> PreferenceStore<G> {
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            update_event: EventDescriptor::user_preferences_updated(),
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Current preferences for `fid`, or `None` if none were ever set
    pub async fn get_preferences(&self, fid: u64) -> Result<Option<PreferenceRecord>, PreferenceError> {
        let unavailable = |e: ChainError| {
            log::error!("Error reading user preferences for fid {}: {}", fid, e);
            PreferenceError::Unavailable(e)
        };

        let tokens = self
            .gateway
            .read(READ_FUNCTION, &[Token::Uint(fid)])
            .await
            .map_err(unavailable)?;

        let mut fields = tokens.into_iter().map(Token::into_string);
        match (fields.next().flatten(), fields.next().flatten()) {
            (Some(country), Some(dietary_restrictions)) => {
                Ok(PreferenceRecord::from_fields(country, dietary_restrictions))
            }
            _ => Err(unavailable(ChainError::Read {
                function: READ_FUNCTION.to_string(),
                message: "expected (string, string) output".to_string(),
            })),
        }
    }

    /// Store preferences for `fid`, returning once the transaction is accepted
    ///
    /// Empty strings are allowed; writing both empty clears the record.
    pub async fn set_preferences(
        &self,
        fid: u64,
        country: &str,
        dietary_restrictions: &str,
    ) -> Result<TxHash, PreferenceError> {
        let args = [
            Token::Uint(fid),
            Token::from(country),
            Token::from(dietary_restrictions),
        ];

        self.gateway
            .write(WRITE_FUNCTION, &args)
            .await
            .map_err(|e| {
                log::error!("Error setting user preferences for fid {}: {}", fid, e);
                PreferenceError::WriteFailed(e)
            })
    }

    /// Call `handler` with every batch of preference updates
    ///
    /// Transport errors go to `on_error` and watching continues. Logs that do
    /// not decode are skipped. Must be called from within a tokio runtime.
    pub fn on_preferences_updated<H, E>(
        &self,
        mut handler: H,
        on_error: E,
    ) -> Result<WatchHandle, PreferenceError>
    where
        H: FnMut(Vec<PreferenceUpdate>) + Send + 'static,
        E: Fn(ChainError) + Send + Sync + 'static,
    {
        let mut subscription = self
            .gateway
            .subscribe(&self.update_event.name, Box::new(on_error))
            .map_err(PreferenceError::WatchFailed)?;
        let cancel = subscription.cancel_token();
        let event = self.update_event.clone();
        let active = Arc::new(Mutex::new(true));

        let gate = Arc::clone(&active);
        let task = tokio::spawn(async move {
            while let Some(batch) = subscription.next_batch().await {
                let updates: Vec<PreferenceUpdate> =
                    batch.iter().filter_map(|log| decode_update(&event, log)).collect();
                if updates.is_empty() {
                    continue;
                }
                if !deliver(&gate, &mut handler, updates) {
                    break;
                }
            }
        });

        Ok(WatchHandle {
            cancel,
            task,
            active,
        })
    }
}

/// Run the handler unless the watch was cancelled
///
/// The flag stays locked for the whole call, so `cancel()` cannot return
/// while a batch is being handled. Returns `false` once cancelled.
fn deliver<H>(active: &Mutex<bool>, handler: &mut H, updates: Vec<PreferenceUpdate>) -> bool
where
    H: FnMut(Vec<PreferenceUpdate>),
{
    let active = active.lock().unwrap_or_else(PoisonError::into_inner);
    if *active {
        handler(updates);
    }
    *active
}

fn decode_update(event: &EventDescriptor, log: &Log) -> Option<PreferenceUpdate> {
    let tokens = match event.decode_log(&log.topics, &log.data) {
        Ok(tokens) => tokens,
        Err(e) => {
            log::warn!(
                "Skipping undecodable {} log in block {}: {}",
                event.name,
                log.block_number,
                e
            );
            return None;
        }
    };

    let mut tokens = tokens.into_iter();
    let fid = tokens.next().and_then(Token::into_uint)?;
    let country = tokens.next().and_then(Token::into_string)?;
    let dietary_restrictions = tokens.next().and_then(Token::into_string)?;

    Some(PreferenceUpdate {
        fid,
        preferences: PreferenceRecord::from_fields(country, dietary_restrictions),
        block_number: log.block_number,
        transaction_hash: log.transaction_hash,
    })
}

/// Running preference watch
///
/// Once [`WatchHandle::cancel`] returns the handler is never called again.
/// A call already in progress finishes first, so `cancel` must not be
/// called from inside the handler. [`WatchHandle::stop`] also waits for the
/// polling task. Dropping the handle cancels the watch.
#[derive(Debug)]
pub struct WatchHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    active: Arc<Mutex<bool>>,
}

impl WatchHandle {
    pub fn cancel(&self) {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel and wait until the handler can no longer run
    pub async fn stop(mut self) {
        self.cancel();
        match (&mut self.task).await {
            Err(e) if e.is_panic() => log::error!("Preference watch handler panicked: {}", e),
            _ => {}
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
#[path = "preferences_tests.rs"]
mod preferences_tests;
