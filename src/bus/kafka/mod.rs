//! Kafka command source and event sink.
//!
//! Commands are consumed from `command_topic` with auto-commit disabled; each
//! delivery's offset is committed only when its acknowledgment handle is used.
//! Events are produced to `event_topic`, keyed by incident id so updates for
//! one incident stay ordered within a partition.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message as KafkaMessage;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tracing::{debug, error, info};

use super::{
    Acknowledge, BusError, CommandSource, EventSink, InboundDelivery, KafkaConfig,
    OutboundRecord, Result,
};

/// Producer delivery timeout in milliseconds.
const MESSAGE_TIMEOUT_MS: &str = "5000";

/// Upper bound on waiting for queued records at shutdown.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

impl KafkaConfig {
    /// Add SASL authentication.
    pub fn with_sasl(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        mechanism: impl Into<String>,
    ) -> Self {
        self.sasl_username = Some(username.into());
        self.sasl_password = Some(password.into());
        self.sasl_mechanism = Some(mechanism.into());
        self.security_protocol = Some("SASL_SSL".to_string());
        self
    }

    /// Set security protocol.
    pub fn with_security_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.security_protocol = Some(protocol.into());
        self
    }

    /// Set SSL CA certificate location.
    pub fn with_ssl_ca(mut self, ca_location: impl Into<String>) -> Self {
        self.ssl_ca_location = Some(ca_location.into());
        self
    }

    /// Build a ClientConfig for producers.
    pub(crate) fn build_producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("message.timeout.ms", MESSAGE_TIMEOUT_MS);
        config.set("acks", "all");
        config.set("enable.idempotence", "true");

        self.apply_security_config(&mut config);
        config
    }

    /// Build a ClientConfig for the command consumer.
    pub(crate) fn build_consumer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("group.id", &self.group_id);
        config.set("enable.auto.commit", "false");
        config.set("auto.offset.reset", "earliest");

        self.apply_security_config(&mut config);
        config
    }

    fn apply_security_config(&self, config: &mut ClientConfig) {
        if let Some(ref protocol) = self.security_protocol {
            config.set("security.protocol", protocol);
        }

        if let Some(ref mechanism) = self.sasl_mechanism {
            config.set("sasl.mechanism", mechanism);
        }

        if let Some(ref username) = self.sasl_username {
            config.set("sasl.username", username);
        }

        if let Some(ref password) = self.sasl_password {
            config.set("sasl.password", password);
        }

        if let Some(ref ca_location) = self.ssl_ca_location {
            config.set("ssl.ca.location", ca_location);
        }
    }
}

/// Commits `offset + 1` for one consumed message.
struct KafkaAck {
    consumer: Arc<StreamConsumer>,
    topic: String,
    partition: i32,
    offset: i64,
}

impl Acknowledge for KafkaAck {
    fn ack(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move {
            let mut tpl = TopicPartitionList::new();
            tpl.add_partition_offset(&self.topic, self.partition, Offset::Offset(self.offset + 1))
                .map_err(|e| BusError::Ack(format!("Invalid offset: {}", e)))?;
            self.consumer
                .commit(&tpl, CommitMode::Async)
                .map_err(|e| BusError::Ack(format!("Failed to commit offset: {}", e)))?;

            debug!(
                topic = %self.topic,
                partition = self.partition,
                offset = self.offset,
                "Committed command offset"
            );
            Ok(())
        })
    }
}

/// Command source backed by a Kafka consumer group.
pub struct KafkaCommandSource {
    consumer: Arc<StreamConsumer>,
}

impl KafkaCommandSource {
    /// Create the consumer and subscribe to the command topic.
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let consumer: StreamConsumer = config
            .build_consumer_config()
            .create()
            .map_err(|e| BusError::Connection(format!("Failed to create Kafka consumer: {}", e)))?;

        consumer
            .subscribe(&[config.command_topic.as_str()])
            .map_err(|e| BusError::Subscribe(format!("Failed to subscribe to topic: {}", e)))?;

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            group_id = %config.group_id,
            topic = %config.command_topic,
            "Subscribed to command topic"
        );

        Ok(Self {
            consumer: Arc::new(consumer),
        })
    }
}

#[async_trait]
impl CommandSource for KafkaCommandSource {
    async fn recv(&self) -> Result<Option<InboundDelivery>> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| BusError::Receive(format!("Kafka consumer error: {}", e)))?;

        let payload = message.payload().map(<[u8]>::to_vec).unwrap_or_default();
        let key = message
            .key()
            .map(|k| String::from_utf8_lossy(k).into_owned());

        debug!(
            topic = %message.topic(),
            partition = message.partition(),
            offset = message.offset(),
            "Received command"
        );

        let ack = KafkaAck {
            consumer: Arc::clone(&self.consumer),
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
        };

        Ok(Some(InboundDelivery::new(payload, key, Box::new(ack))))
    }
}

/// Event sink backed by an idempotent Kafka producer.
pub struct KafkaEventSink {
    producer: FutureProducer,
    topic: String,
}

impl KafkaEventSink {
    /// Create a producer for the configured event topic.
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        Self::for_topic(config, config.event_topic.clone())
    }

    /// Create a producer for an arbitrary topic with the same connection settings.
    pub fn for_topic(config: &KafkaConfig, topic: impl Into<String>) -> Result<Self> {
        let producer: FutureProducer = config
            .build_producer_config()
            .create()
            .map_err(|e| BusError::Connection(format!("Failed to create Kafka producer: {}", e)))?;
        let topic = topic.into();

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            topic = %topic,
            "Connected to Kafka"
        );

        Ok(Self { producer, topic })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl EventSink for KafkaEventSink {
    async fn publish(&self, record: OutboundRecord) -> Result<()> {
        let delivery = self
            .producer
            .send_result(
                FutureRecord::to(&self.topic)
                    .key(&record.key)
                    .payload(&record.payload),
            )
            .map_err(|(e, _)| BusError::Publish(format!("Failed to enqueue record: {}", e)))?;

        let topic = self.topic.clone();
        let key = record.key;
        tokio::spawn(async move {
            match delivery.await {
                Ok(Ok((partition, offset))) => {
                    debug!(%topic, %key, partition, offset, "Delivered record");
                }
                Ok(Err((e, _))) => {
                    error!(%topic, %key, error = %e, "Record delivery failed");
                }
                Err(_) => {
                    error!(%topic, %key, "Record delivery cancelled");
                }
            }
        });

        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(FLUSH_TIMEOUT))
            .await
            .map_err(|e| BusError::Publish(format!("Flush task failed: {}", e)))?
            .map_err(|e| BusError::Publish(format!("Failed to flush producer: {}", e)))
    }
}
