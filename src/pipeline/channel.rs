//! Outbound channel: many dispatch tasks write updated incidents, the
//! publisher task reads them.

use tokio::sync::mpsc;

use crate::message::Incident;

/// Create the outbound channel with a bounded capacity.
pub fn outbound(capacity: usize) -> (OutboundSender, OutboundReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (OutboundSender { sender }, OutboundReceiver { receiver })
}

/// Cloneable write half. The channel closes once every sender is dropped.
#[derive(Debug, Clone)]
pub struct OutboundSender {
    sender: mpsc::Sender<Incident>,
}

impl OutboundSender {
    /// Queue an updated incident, waiting for space if the channel is full.
    ///
    /// Gives the incident back if the reader is gone.
    pub async fn send(&self, incident: Incident) -> Result<(), Incident> {
        self.sender.send(incident).await.map_err(|e| e.0)
    }
}

/// The single read half.
#[derive(Debug)]
pub struct OutboundReceiver {
    receiver: mpsc::Receiver<Incident>,
}

impl OutboundReceiver {
    /// Next queued incident; `None` once all senders are gone and the buffer
    /// is drained.
    pub async fn recv(&mut self) -> Option<Incident> {
        self.receiver.recv().await
    }
}
