use std::sync::mpsc as std_mpsc;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use super::*;
use crate::bus::{
    Acknowledge, BusError, ChannelCommandSource, InboundDelivery, MockEventSink,
};
use crate::dlq::{ChannelDeadLetterPublisher, DeadLetter, DlqError, FailureKind};
use crate::message::Incident;
use crate::service::{InMemoryIncidentService, ServiceError};

const FULL_COMMAND: &str = r#"{
    "messageType": "UpdateIncidentCommand",
    "body": {
        "incident": {
            "id": "i1",
            "lat": "34.14338",
            "lon": -77.86569,
            "medicalNeeded": true,
            "numberOfPeople": 3,
            "victimName": "Jane",
            "victimPhoneNumber": "111-222-333",
            "status": "REPORTED",
            "timestamp": 1700000000000
        }
    }
}"#;

struct EchoService;

impl IncidentService for EchoService {
    fn update_incident(&self, incident: Incident) -> Result<Incident, ServiceError> {
        Ok(incident)
    }
}

struct FailingService;

impl IncidentService for FailingService {
    fn update_incident(&self, _incident: Incident) -> Result<Incident, ServiceError> {
        Err(ServiceError::Unavailable("connection refused".to_string()))
    }
}

/// Blocks every call until the test releases it.
struct GatedService {
    gate: Mutex<std_mpsc::Receiver<()>>,
}

impl IncidentService for GatedService {
    fn update_incident(&self, incident: Incident) -> Result<Incident, ServiceError> {
        let gate = self.gate.lock().unwrap_or_else(|p| p.into_inner());
        let _ = gate.recv();
        Ok(incident)
    }
}

/// Ack handle that always fails.
struct BrokenAck;

impl Acknowledge for BrokenAck {
    fn ack(self: Box<Self>) -> BoxFuture<'static, crate::bus::Result<()>> {
        Box::pin(async { Err(BusError::Ack("broker gone".to_string())) })
    }
}

/// Records publish and flush calls in the order they happen.
#[derive(Default)]
struct RecordingDeadLetters {
    calls: Mutex<Vec<String>>,
}

impl RecordingDeadLetters {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl DeadLetterPublisher for RecordingDeadLetters {
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(format!("publish:{}", dead_letter.incident_id));
        Ok(())
    }

    async fn flush(&self) -> Result<(), DlqError> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push("flush".to_string());
        Ok(())
    }
}

struct Harness {
    pipeline: Pipeline,
    sink: Arc<MockEventSink>,
    dead_letters: tokio::sync::mpsc::UnboundedReceiver<DeadLetter>,
}

fn harness(service: Arc<dyn IncidentService>, config: PipelineConfig) -> Harness {
    let sink = Arc::new(MockEventSink::new());
    let (dlq, dead_letters) = ChannelDeadLetterPublisher::new();
    let pipeline = Pipeline::new(&config, service, sink.clone(), Arc::new(dlq));
    Harness {
        pipeline,
        sink,
        dead_letters,
    }
}

#[tokio::test]
async fn test_full_command_publishes_one_event() {
    let Harness {
        pipeline,
        sink,
        mut dead_letters,
    } = harness(Arc::new(EchoService), PipelineConfig::default());
    let (source, sender) = ChannelCommandSource::new();
    let acks = source.ack_log();

    sender.send(FULL_COMMAND).await.unwrap();
    drop(sender);

    let summary = pipeline.run(&source, std::future::pending()).await;

    assert_eq!(summary.deliveries, 1);
    assert_eq!(summary.published, 1);
    assert_eq!(acks.acked(), vec![0]);

    let records = sink.published().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, "i1");

    let event: Value = serde_json::from_slice(&records[0].payload).unwrap();
    assert_eq!(event["messageType"], "IncidentUpdatedEvent");
    assert_eq!(event["sender"], "IncidentService");
    assert_eq!(event["body"]["incidentId"], "i1");
    assert_eq!(event["body"]["lat"].as_f64(), Some(34.14338));
    assert_eq!(event["body"]["lon"].as_f64(), Some(-77.86569));
    assert_eq!(event["body"]["numberOfPeople"], 3);
    assert_eq!(event["body"]["status"], "REPORTED");
    assert!(dead_letters.try_recv().is_err());
}

#[tokio::test]
async fn test_other_command_is_ignored_and_acked() {
    let harness = harness(Arc::new(EchoService), PipelineConfig::default());
    let (source, sender) = ChannelCommandSource::new();
    let acks = source.ack_log();

    sender
        .send(r#"{"messageType":"SomeOtherCommand","body":{"incident":{"id":"i1"}}}"#)
        .await
        .unwrap();
    let delivery = source.recv().await.unwrap().unwrap();

    let disposition = harness.pipeline.controller().process(delivery).await;

    assert!(matches!(disposition, Disposition::Ignored));
    assert_eq!(acks.count(), 1);
    assert_eq!(harness.pipeline.shutdown().await.published, 0);
    assert_eq!(harness.sink.published_count().await, 0);
}

#[tokio::test]
async fn test_undecodable_incident_is_rejected_and_acked() {
    let harness = harness(Arc::new(EchoService), PipelineConfig::default());
    let (source, sender) = ChannelCommandSource::new();
    let acks = source.ack_log();

    sender
        .send(r#"{"messageType":"UpdateIncidentCommand","body":{"incident":{"id":"i1","numberOfPeople":"many"}}}"#)
        .await
        .unwrap();
    let delivery = source.recv().await.unwrap().unwrap();

    let disposition = harness.pipeline.controller().process(delivery).await;

    assert!(matches!(disposition, Disposition::Rejected(_)));
    assert_eq!(acks.count(), 1);
    assert_eq!(harness.pipeline.shutdown().await.published, 0);
}

#[tokio::test]
async fn test_failing_service_dead_letters_without_event() {
    let Harness {
        pipeline,
        sink,
        mut dead_letters,
    } = harness(Arc::new(FailingService), PipelineConfig::default());
    let (source, sender) = ChannelCommandSource::new();
    let acks = source.ack_log();

    sender.send(FULL_COMMAND).await.unwrap();
    drop(sender);

    let summary = pipeline.run(&source, std::future::pending()).await;

    assert_eq!(summary.published, 0);
    assert_eq!(acks.count(), 1);
    assert_eq!(sink.published_count().await, 0);

    let dead_letter = dead_letters.recv().await.unwrap();
    assert_eq!(dead_letter.incident_id, "i1");
    assert_eq!(dead_letter.kind, FailureKind::ServiceError);
    assert!(dead_letter.reason.contains("connection refused"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ack_does_not_wait_for_update() {
    let (release, gate) = std_mpsc::channel();
    let service = Arc::new(GatedService {
        gate: Mutex::new(gate),
    });
    let harness = harness(service, PipelineConfig::default());
    let (source, sender) = ChannelCommandSource::new();
    let acks = source.ack_log();

    sender.send(FULL_COMMAND).await.unwrap();
    let delivery = source.recv().await.unwrap().unwrap();

    let disposition = harness.pipeline.controller().process(delivery).await;

    assert_eq!(acks.count(), 1);
    assert_eq!(harness.sink.published_count().await, 0);

    release.send(()).unwrap();
    let Disposition::Dispatched(handle) = disposition else {
        panic!("Expected dispatched update");
    };
    assert!(handle.outcome().await.unwrap().is_updated());

    assert_eq!(harness.pipeline.shutdown().await.published, 1);
    assert_eq!(harness.sink.published_count().await, 1);
}

#[tokio::test]
async fn test_failed_ack_does_not_stop_processing() {
    let harness = harness(Arc::new(EchoService), PipelineConfig::default());

    let delivery = InboundDelivery::new(
        FULL_COMMAND.as_bytes().to_vec(),
        Some("k".to_string()),
        Box::new(BrokenAck),
    );
    let disposition = harness.pipeline.controller().process(delivery).await;

    assert!(matches!(disposition, Disposition::Dispatched(_)));
    assert_eq!(harness.pipeline.shutdown().await.published, 1);
}

#[tokio::test]
async fn test_shutdown_signal_stops_run() {
    let harness = harness(Arc::new(EchoService), PipelineConfig::default());
    let (source, _sender) = ChannelCommandSource::new();

    let summary = harness.pipeline.run(&source, async {}).await;

    assert_eq!(summary, RunSummary::default());
}

#[tokio::test]
async fn test_service_updated_fields_are_published() {
    let service = Arc::new(InMemoryIncidentService::new());
    let mut stored = Incident::new("i1");
    stored.victim_name = Some("Jane".to_string());
    stored.medical_needed = Some(false);
    service.insert(stored);

    let Harness { pipeline, sink, .. } = harness(service.clone(), PipelineConfig::default());
    let (source, sender) = ChannelCommandSource::new();

    sender
        .send(r#"{"messageType":"UpdateIncidentCommand","body":{"incident":{"id":"i1","status":"RESCUED"}}}"#)
        .await
        .unwrap();
    drop(sender);

    pipeline.run(&source, std::future::pending()).await;

    let event: Value = serde_json::from_slice(&sink.published().await[0].payload).unwrap();
    assert_eq!(event["body"]["status"], "RESCUED");
    assert_eq!(event["body"]["victimName"], "Jane");
    assert_eq!(event["body"]["medicalNeeded"], false);
    assert_eq!(
        service.get("i1").unwrap().status.as_deref(),
        Some("RESCUED")
    );
}

#[tokio::test]
async fn test_dead_letters_flushed_after_in_flight_failures() {
    let dead_letters = Arc::new(RecordingDeadLetters::default());
    let pipeline = Pipeline::new(
        &PipelineConfig::default(),
        Arc::new(FailingService),
        Arc::new(MockEventSink::new()),
        dead_letters.clone(),
    );
    let (source, sender) = ChannelCommandSource::new();

    sender.send(FULL_COMMAND).await.unwrap();
    drop(sender);

    pipeline.run(&source, std::future::pending()).await;

    assert_eq!(dead_letters.calls(), vec!["publish:i1", "flush"]);
}

#[tokio::test]
async fn test_shutdown_flushes_dead_letters() {
    let dead_letters = Arc::new(RecordingDeadLetters::default());
    let pipeline = Pipeline::new(
        &PipelineConfig::default(),
        Arc::new(EchoService),
        Arc::new(MockEventSink::new()),
        dead_letters.clone(),
    );

    pipeline.shutdown().await;

    assert_eq!(dead_letters.calls(), vec!["flush"]);
}
