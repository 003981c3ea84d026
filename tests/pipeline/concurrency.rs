//! Many commands in flight: bounded pool, timeouts, small channels.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use incident_bridge::config::PipelineConfig;
use incident_bridge::dlq::FailureKind;

use crate::common::{run_commands, update_command, EchoService, SlowService};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_command_yields_one_event() {
    let config = PipelineConfig {
        max_concurrent_updates: 8,
        ..Default::default()
    };
    let commands: Vec<String> = (0..200)
        .map(|i| update_command(json!({ "id": format!("i{}", i), "numberOfPeople": i })))
        .collect();

    let result = run_commands(
        Arc::new(SlowService(Duration::from_millis(2))),
        config,
        commands,
    )
    .await;

    assert_eq!(result.summary.deliveries, 200);
    assert_eq!(result.summary.published, 200);
    assert_eq!(result.acked, (0..200).collect::<Vec<u64>>());

    let keys: HashSet<&str> = result.events.iter().map(|(key, _)| key.as_str()).collect();
    assert_eq!(keys.len(), 200);
    for (key, event) in &result.events {
        assert_eq!(event["body"]["incidentId"], key.as_str());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tiny_channel_still_publishes_everything() {
    let config = PipelineConfig {
        channel_capacity: 1,
        max_concurrent_updates: 4,
        ..Default::default()
    };
    let commands: Vec<String> = (0..50)
        .map(|i| update_command(json!({ "id": format!("c{}", i) })))
        .collect();

    let result = run_commands(Arc::new(EchoService), config, commands).await;

    assert_eq!(result.events.len(), 50);
    assert!(result.dead_letters.is_empty());
}

#[tokio::test]
async fn test_slow_service_times_out() {
    let config = PipelineConfig {
        update_timeout_ms: 25,
        ..Default::default()
    };
    let command = update_command(json!({ "id": "slow" }));

    let result = run_commands(
        Arc::new(SlowService(Duration::from_millis(400))),
        config,
        [command],
    )
    .await;

    assert!(result.events.is_empty());
    assert_eq!(result.acked, vec![0]);
    assert_eq!(result.dead_letters.len(), 1);
    assert_eq!(result.dead_letters[0].kind, FailureKind::TimedOut);
    assert_eq!(result.dead_letters[0].incident_id, "slow");
}
