//! incident-bridge: incident command-to-event bridge
//!
//! ## Architecture
//! ```text
//! [command topic] -> [filter] -> [incident service (blocking pool)]
//!                                          |
//!                                          v
//!                              [outbound channel] -> [event topic]
//! ```
//!
//! ## Configuration
//! - `--config <path>` / INCIDENT_BRIDGE_CONFIG: YAML config file
//! - INCIDENT_BRIDGE__*: overrides (e.g. INCIDENT_BRIDGE__MESSAGING__TYPE=stdio)
//! - INCIDENT_BRIDGE_LOG: log filter (default "info")
//! - INCIDENT_BRIDGE_LOG_FORMAT=json: JSON log lines
//! - OTEL_EXPORTER_OTLP_ENDPOINT: enables OTLP metrics export

use tracing::{error, info};

use incident_bridge::bus::init_transport;
use incident_bridge::config::Config;
use incident_bridge::dlq::create_publisher;
use incident_bridge::pipeline::Pipeline;
use incident_bridge::service::init_incident_service;
use incident_bridge::utils::bootstrap::{init_tracing, parse_config_path};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let telemetry = init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Starting incident-bridge");

    let service = init_incident_service(&config.service)?;
    let dead_letters = create_publisher(&config.messaging)?;
    let transport = init_transport(&config.messaging).await?;

    let pipeline = Pipeline::new(&config.pipeline, service, transport.sink, dead_letters);
    let summary = pipeline
        .run(transport.source.as_ref(), async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!(
        deliveries = summary.deliveries,
        published = summary.published,
        "incident-bridge stopped"
    );
    telemetry.shutdown();
    Ok(())
}
