//! Line transport: JSON commands on one stream, `key<TAB>event` lines out.

use std::sync::Arc;

use serde_json::{json, Value};

use incident_bridge::bus::{EventSink, LineCommandSource, LineEventSink};
use incident_bridge::config::PipelineConfig;
use incident_bridge::dlq::NoopDeadLetterPublisher;
use incident_bridge::pipeline::Pipeline;
use incident_bridge::service::InMemoryIncidentService;

use crate::common::update_command;

#[tokio::test]
async fn test_stdio_round_trip() {
    let input = format!(
        "{}\n\n{}\nnot json\n",
        update_command(json!({ "id": "a", "status": "REPORTED" })),
        json!({ "messageType": "SomeOtherCommand", "body": {} }),
    );
    let source = LineCommandSource::new(std::io::Cursor::new(input.into_bytes()));
    let sink = Arc::new(LineEventSink::new(Vec::<u8>::new()));

    let pipeline = Pipeline::new(
        &PipelineConfig::default(),
        Arc::new(InMemoryIncidentService::creating_missing()),
        sink.clone() as Arc<dyn EventSink>,
        Arc::new(NoopDeadLetterPublisher),
    );
    let summary = pipeline.run(&source, std::future::pending()).await;

    assert_eq!(summary.deliveries, 3);
    assert_eq!(summary.published, 1);

    let output = match Arc::try_unwrap(sink) {
        Ok(sink) => String::from_utf8(sink.into_inner()).unwrap(),
        Err(_) => panic!("sink still shared after the pipeline stopped"),
    };
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 1);

    let (key, payload) = lines[0].split_once('\t').unwrap();
    assert_eq!(key, "a");
    let event: Value = serde_json::from_str(payload).unwrap();
    assert_eq!(event["body"]["incidentId"], "a");
    assert_eq!(event["body"]["status"], "REPORTED");
}
