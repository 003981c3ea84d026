//! Single-command behaviour: what is published, ignored, dead-lettered.

use std::sync::Arc;

use serde_json::json;
use tokio_test::assert_ok;

use incident_bridge::config::PipelineConfig;
use incident_bridge::dlq::FailureKind;
use incident_bridge::message::Incident;
use incident_bridge::service::InMemoryIncidentService;

use crate::common::{
    run_commands, update_command, CountingService, EchoService, FailingService,
};

#[tokio::test]
async fn test_full_update_publishes_incident_updated_event() {
    let command = update_command(json!({
        "id": "i1",
        "lat": "34.14338",
        "lon": "-77.86569",
        "medicalNeeded": true,
        "numberOfPeople": 3,
        "victimName": "Jane Doe",
        "victimPhoneNumber": "111-222-333",
        "status": "REQUESTED",
        "timestamp": 1_700_000_000_000i64
    }));

    let result = run_commands(Arc::new(EchoService), PipelineConfig::default(), [command]).await;

    assert_eq!(result.events.len(), 1);
    let (key, event) = &result.events[0];
    assert_eq!(key, "i1");
    assert_eq!(event["messageType"], "IncidentUpdatedEvent");
    assert_eq!(event["sender"], "IncidentService");

    let body = &event["body"];
    assert_eq!(body["incidentId"], "i1");
    assert_eq!(body["lat"].as_f64(), Some(34.14338));
    assert_eq!(body["lon"].as_f64(), Some(-77.86569));
    assert_eq!(body["medicalNeeded"], true);
    assert_eq!(body["numberOfPeople"], 3);
    assert_eq!(body["victimName"], "Jane Doe");
    assert_eq!(body["victimPhoneNumber"], "111-222-333");
    assert_eq!(body["status"], "REQUESTED");
    assert_eq!(body["timestamp"], 1_700_000_000_000i64);

    assert_eq!(result.acked, vec![0]);
    assert!(result.dead_letters.is_empty());
}

#[tokio::test]
async fn test_other_message_type_is_acked_without_event() {
    let service = Arc::new(CountingService::default());
    let command = json!({
        "messageType": "SomeOtherCommand",
        "body": { "incident": { "id": "i1" } }
    })
    .to_string();

    let result = run_commands(service.clone(), PipelineConfig::default(), [command]).await;

    assert!(result.events.is_empty());
    assert_eq!(result.acked, vec![0]);
    assert_eq!(service.calls(), 0);
}

#[tokio::test]
async fn test_missing_body_never_reaches_service() {
    let service = Arc::new(CountingService::default());
    let commands = [
        json!({ "messageType": "UpdateIncidentCommand" }).to_string(),
        json!({ "messageType": "UpdateIncidentCommand", "body": {} }).to_string(),
        json!({ "messageType": "UpdateIncidentCommand", "body": { "incident": null } })
            .to_string(),
    ];

    let result = run_commands(service.clone(), PipelineConfig::default(), commands).await;

    assert!(result.events.is_empty());
    assert_eq!(result.acked, vec![0, 1, 2]);
    assert_eq!(service.calls(), 0);
}

#[tokio::test]
async fn test_failing_service_dead_letters_and_acks() {
    let command = update_command(json!({ "id": "i1", "status": "RESCUED" }));

    let result = run_commands(Arc::new(FailingService), PipelineConfig::default(), [command]).await;

    assert!(result.events.is_empty());
    assert_eq!(result.acked, vec![0]);
    assert_eq!(result.dead_letters.len(), 1);

    let dead_letter = &result.dead_letters[0];
    assert_eq!(dead_letter.incident_id, "i1");
    assert_eq!(dead_letter.kind, FailureKind::ServiceError);
    assert_eq!(dead_letter.message_type, "UpdateIncidentCommand");
    assert_eq!(dead_letter.payload["status"], "RESCUED");
}

#[tokio::test]
async fn test_malformed_payloads_are_acked() {
    let service = Arc::new(CountingService::default());
    let commands: Vec<Vec<u8>> = vec![
        b"not json at all".to_vec(),
        b"[\"UpdateIncidentCommand\"]".to_vec(),
        br#"{"messageType":7,"body":{"incident":{"id":"i1"}}}"#.to_vec(),
        update_command(json!({ "id": "   " })).into_bytes(),
    ];

    let result = run_commands(service.clone(), PipelineConfig::default(), commands).await;

    assert!(result.events.is_empty());
    assert_eq!(result.acked, vec![0, 1, 2, 3]);
    assert_eq!(result.summary.deliveries, 4);
    assert_eq!(service.calls(), 0);
}

#[tokio::test]
async fn test_event_carries_service_state() {
    let service = Arc::new(InMemoryIncidentService::new());
    let mut stored = Incident::new("i7");
    stored.victim_name = Some("John".to_string());
    stored.number_of_people = Some(2);
    service.insert(stored);

    let command = update_command(json!({ "id": "i7", "status": "RESCUED" }));
    let result = run_commands(service.clone(), PipelineConfig::default(), [command]).await;

    let (_, event) = &result.events[0];
    assert_eq!(event["body"]["status"], "RESCUED");
    assert_eq!(event["body"]["victimName"], "John");
    assert_eq!(event["body"]["numberOfPeople"], 2);

    let updated = assert_ok!(service.get("i7").ok_or("missing"));
    assert_eq!(updated.status.as_deref(), Some("RESCUED"));
}

#[tokio::test]
async fn test_unknown_incident_is_dead_lettered() {
    let service = Arc::new(InMemoryIncidentService::new());

    let command = update_command(json!({ "id": "ghost" }));
    let result = run_commands(service, PipelineConfig::default(), [command]).await;

    assert!(result.events.is_empty());
    assert_eq!(result.dead_letters[0].incident_id, "ghost");
    assert!(result.dead_letters[0].reason.contains("not found"));
}

#[tokio::test]
async fn test_custom_accepted_types() {
    let config = PipelineConfig {
        accepted_message_types: vec!["PatchIncidentCommand".to_string()],
        ..Default::default()
    };
    let commands = [
        json!({ "messageType": "PatchIncidentCommand", "body": { "incident": { "id": "p1" } } })
            .to_string(),
        update_command(json!({ "id": "u1" })),
    ];

    let result = run_commands(Arc::new(EchoService), config, commands).await;

    let keys: Vec<&str> = result.events.iter().map(|(key, _)| key.as_str()).collect();
    assert_eq!(keys, vec!["p1"]);
    assert_eq!(result.acked, vec![0, 1]);
}
