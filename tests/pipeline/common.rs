//! Shared harness: stub services and a one-shot pipeline runner.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::{json, Value};
use tokio_stream::wrappers::UnboundedReceiverStream;

use incident_bridge::bus::{ChannelCommandSource, MockEventSink};
use incident_bridge::config::PipelineConfig;
use incident_bridge::dlq::{ChannelDeadLetterPublisher, DeadLetter};
use incident_bridge::message::Incident;
use incident_bridge::pipeline::{Pipeline, RunSummary};
use incident_bridge::service::{IncidentService, ServiceError};

/// Returns the incident unchanged.
pub struct EchoService;

impl IncidentService for EchoService {
    fn update_incident(&self, incident: Incident) -> Result<Incident, ServiceError> {
        Ok(incident)
    }
}

/// Always fails with `Unavailable`.
pub struct FailingService;

impl IncidentService for FailingService {
    fn update_incident(&self, _incident: Incident) -> Result<Incident, ServiceError> {
        Err(ServiceError::Unavailable("incident service down".to_string()))
    }
}

/// Sleeps on the calling thread before echoing.
pub struct SlowService(pub Duration);

impl IncidentService for SlowService {
    fn update_incident(&self, incident: Incident) -> Result<Incident, ServiceError> {
        std::thread::sleep(self.0);
        Ok(incident)
    }
}

/// Echoes and counts calls.
#[derive(Default)]
pub struct CountingService {
    calls: AtomicUsize,
}

impl CountingService {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl IncidentService for CountingService {
    fn update_incident(&self, incident: Incident) -> Result<Incident, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(incident)
    }
}

/// `UpdateIncidentCommand` wrapping the given incident document.
pub fn update_command(incident: Value) -> String {
    json!({
        "messageType": "UpdateIncidentCommand",
        "body": { "incident": incident }
    })
    .to_string()
}

/// Everything observable after one pipeline run.
pub struct RunResult {
    pub summary: RunSummary,
    /// Published events as (key, parsed payload), in publish order.
    pub events: Vec<(String, Value)>,
    pub dead_letters: Vec<DeadLetter>,
    /// Acknowledged delivery sequence numbers, sorted.
    pub acked: Vec<u64>,
}

/// Feed `commands` through a fresh pipeline until the source is exhausted.
pub async fn run_commands<S>(
    service: Arc<dyn IncidentService>,
    config: PipelineConfig,
    commands: S,
) -> RunResult
where
    S: IntoIterator,
    S::Item: Into<Vec<u8>>,
{
    let commands: Vec<Vec<u8>> = commands.into_iter().map(Into::into).collect();
    let sink = Arc::new(MockEventSink::new());
    let (dlq, dead_letters) = ChannelDeadLetterPublisher::new();
    let pipeline = Pipeline::new(&config, service, sink.clone(), Arc::new(dlq));

    let (source, sender) = ChannelCommandSource::with_capacity(commands.len().max(1));
    let acks = source.ack_log();
    for command in commands {
        sender.send(command).await.expect("command channel open");
    }
    drop(sender);

    let summary = pipeline.run(&source, std::future::pending()).await;

    let events = sink
        .take_published()
        .await
        .into_iter()
        .map(|record| {
            let payload = serde_json::from_slice(&record.payload).expect("event is JSON");
            (record.key, payload)
        })
        .collect();
    let dead_letters = UnboundedReceiverStream::new(dead_letters)
        .collect::<Vec<_>>()
        .await;
    let mut acked = acks.acked();
    acked.sort_unstable();

    RunResult {
        summary,
        events,
        dead_letters,
        acked,
    }
}
