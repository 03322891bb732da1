//! Cancellable handle over a stream of event log batches

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::ChainError;
use super::types::Log;

/// Side channel for transport errors seen while a subscription is running
pub type ErrorCallback = Box<dyn Fn(ChainError) + Send + Sync + 'static>;

/// Receiving end of an event subscription
///
/// Batches arrive in block order. Once [`Subscription::cancel`] has returned,
/// [`Subscription::next_batch`] yields `None` even if batches were already
/// queued. Dropping the handle cancels the producer.
#[derive(Debug)]
pub struct Subscription {
    batches: mpsc::Receiver<Vec<Log>>,
    cancel: CancellationToken,
}

impl Subscription {
    /// Wrap a batch channel; the producer must stop when `cancel` fires
    pub fn new(batches: mpsc::Receiver<Vec<Log>>, cancel: CancellationToken) -> Self {
        Self { batches, cancel }
    }

    /// Wait for the next batch, or `None` once cancelled or the producer ended
    pub async fn next_batch(&mut self) -> Option<Vec<Log>> {
        if self.cancel.is_cancelled() {
            return None;
        }

        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => None,
            batch = self.batches.recv() => batch,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token observed by the producer; cancelling it cancels this subscription
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::types::Address;

    fn log_at(block_number: u64) -> Log {
        Log {
            address: Address::default(),
            topics: vec![],
            data: vec![],
            block_number,
            log_index: 0,
            transaction_hash: None,
        }
    }

    #[tokio::test]
    async fn test_batches_delivered_in_order() {
        let (tx, rx) = mpsc::channel(4);
        let mut sub = Subscription::new(rx, CancellationToken::new());

        tx.send(vec![log_at(1)]).await.unwrap();
        tx.send(vec![log_at(2), log_at(3)]).await.unwrap();
        drop(tx);

        assert_eq!(sub.next_batch().await, Some(vec![log_at(1)]));
        assert_eq!(sub.next_batch().await, Some(vec![log_at(2), log_at(3)]));
        assert_eq!(sub.next_batch().await, None);
    }

    #[tokio::test]
    async fn test_cancel_discards_queued_batches() {
        let (tx, rx) = mpsc::channel(4);
        let mut sub = Subscription::new(rx, CancellationToken::new());

        tx.send(vec![log_at(1)]).await.unwrap();
        sub.cancel();

        assert!(sub.is_cancelled());
        assert_eq!(sub.next_batch().await, None);
    }

    #[tokio::test]
    async fn test_cancel_wakes_pending_wait() {
        let (_tx, rx) = mpsc::channel::<Vec<Log>>(4);
        let mut sub = Subscription::new(rx, CancellationToken::new());
        let token = sub.cancel_token();

        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            token.cancel();
        });

        assert_eq!(sub.next_batch().await, None);
    }

    #[test]
    fn test_drop_cancels_producer_token() {
        let (_tx, rx) = mpsc::channel::<Vec<Log>>(1);
        let token = CancellationToken::new();
        let sub = Subscription::new(rx, token.clone());

        drop(sub);
        assert!(token.is_cancelled());
    }
}
