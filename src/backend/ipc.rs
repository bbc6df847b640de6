//! Local channel between the acquisition and delivery sides
//!
//! Unidirectional and bounded: the supervisor never blocks on a slow
//! broker. When the queue is full the message is dropped and counted.

use crate::types::Message;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type MessageSender = Sender<Message>;
pub type MessageReceiver = Receiver<Message>;

/// Create the bounded message queue
pub fn channel(capacity: usize) -> (MessageSender, MessageReceiver) {
    bounded(capacity.max(1))
}

/// Counters shared by every outbox clone of one building block
#[derive(Debug, Default)]
pub struct OutboxStats {
    pub sent: AtomicU64,
    pub dropped: AtomicU64,
}

/// Non-blocking sending half used by the supervisor
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: MessageSender,
    stats: Arc<OutboxStats>,
}

impl Outbox {
    pub fn new(tx: MessageSender) -> Self {
        Self {
            tx,
            stats: Arc::new(OutboxStats::default()),
        }
    }

    /// Queue a message; returns `false` if it was dropped
    pub fn send(&self, message: Message) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => {
                self.stats.sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(message)) => {
                let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    "Delivery queue full; dropped message for '{}' ({} dropped so far)",
                    message.path,
                    dropped
                );
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Delivery side is gone; message dropped");
                false
            }
        }
    }

    pub fn sent(&self) -> u64 {
        self.stats.sent.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }
}
