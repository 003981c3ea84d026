//! In-memory channel-based command source.
//!
//! Uses a tokio mpsc channel to feed command payloads into the pipeline within
//! a single process. Every delivery carries a sequence number; acknowledgments
//! are recorded in an [`AckLog`] so callers can check each delivery was
//! acknowledged exactly once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::debug;

use super::{Acknowledge, BusError, CommandSource, InboundDelivery, Result};

/// Default channel capacity.
const CHANNEL_CAPACITY: usize = 1024;

/// Record of acknowledged delivery sequence numbers, in ack order.
#[derive(Clone, Debug, Default)]
pub struct AckLog {
    acked: Arc<Mutex<Vec<u64>>>,
}

impl AckLog {
    fn record(&self, sequence: u64) {
        self.acked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(sequence);
    }

    /// Sequence numbers acknowledged so far.
    pub fn acked(&self) -> Vec<u64> {
        self.acked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn count(&self) -> usize {
        self.acked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

struct ChannelAck {
    sequence: u64,
    log: AckLog,
}

impl Acknowledge for ChannelAck {
    fn ack(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move {
            self.log.record(self.sequence);
            debug!(sequence = self.sequence, "Acknowledged channel delivery");
            Ok(())
        })
    }
}

/// Producer half: pushes raw command payloads into a [`ChannelCommandSource`].
///
/// The source is exhausted once every sender has been dropped.
#[derive(Clone)]
pub struct CommandSender {
    sender: mpsc::Sender<(u64, Vec<u8>)>,
    next_sequence: Arc<AtomicU64>,
}

impl CommandSender {
    /// Queue a raw payload. Returns the delivery sequence number.
    pub async fn send(&self, payload: impl Into<Vec<u8>>) -> Result<u64> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        self.sender
            .send((sequence, payload.into()))
            .await
            .map_err(|_| BusError::Publish("Command channel closed".to_string()))?;
        Ok(sequence)
    }
}

/// In-memory command source.
pub struct ChannelCommandSource {
    receiver: AsyncMutex<mpsc::Receiver<(u64, Vec<u8>)>>,
    acks: AckLog,
}

impl ChannelCommandSource {
    /// Create a source and its sender with the default capacity.
    pub fn new() -> (Self, CommandSender) {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    /// Create a source and its sender.
    pub fn with_capacity(capacity: usize) -> (Self, CommandSender) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let source = Self {
            receiver: AsyncMutex::new(receiver),
            acks: AckLog::default(),
        };
        let sender = CommandSender {
            sender,
            next_sequence: Arc::new(AtomicU64::new(0)),
        };
        (source, sender)
    }

    /// Shared view of the acknowledgments issued for this source.
    pub fn ack_log(&self) -> AckLog {
        self.acks.clone()
    }
}

#[async_trait]
impl CommandSource for ChannelCommandSource {
    async fn recv(&self) -> Result<Option<InboundDelivery>> {
        let next = self.receiver.lock().await.recv().await;
        Ok(next.map(|(sequence, payload)| {
            let ack = ChannelAck {
                sequence,
                log: self.acks.clone(),
            };
            InboundDelivery::new(payload, Some(sequence.to_string()), Box::new(ack))
        }))
    }
}
