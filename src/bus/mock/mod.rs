//! Mock event sink implementation for testing.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BusError, EventSink, OutboundRecord, Result};

/// Mock event sink for testing.
#[derive(Default)]
pub struct MockEventSink {
    published: RwLock<Vec<OutboundRecord>>,
    fail_on_publish: RwLock<bool>,
}

impl MockEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    pub async fn published(&self) -> Vec<OutboundRecord> {
        self.published.read().await.clone()
    }

    pub async fn take_published(&self) -> Vec<OutboundRecord> {
        std::mem::take(&mut *self.published.write().await)
    }
}

#[async_trait]
impl EventSink for MockEventSink {
    async fn publish(&self, record: OutboundRecord) -> Result<()> {
        if *self.fail_on_publish.read().await {
            return Err(BusError::Publish("Mock publish failure".to_string()));
        }
        self.published.write().await.push(record);
        Ok(())
    }
}
