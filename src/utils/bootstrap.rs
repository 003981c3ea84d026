//! Bootstrap utilities for the incident-bridge binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LOG_ENV_VAR, LOG_FORMAT_ENV_VAR};
#[cfg(feature = "otel")]
use crate::config::{OTEL_ENDPOINT_ENV_VAR, OTEL_SERVICE_NAME_ENV_VAR};

/// Service name reported to the metrics backend when none is configured.
#[cfg(feature = "otel")]
const DEFAULT_SERVICE_NAME: &str = "incident-bridge";

/// Keeps telemetry providers alive; flushes them on [`Telemetry::shutdown`].
#[derive(Default)]
pub struct Telemetry {
    #[cfg(feature = "otel")]
    meter_provider: Option<opentelemetry_sdk::metrics::SdkMeterProvider>,
}

impl Telemetry {
    /// Flush and stop exporters.
    pub fn shutdown(self) {
        #[cfg(feature = "otel")]
        if let Some(provider) = self.meter_provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "Failed to shut down meter provider");
            }
        }
    }
}

/// Initialize tracing with the INCIDENT_BRIDGE_LOG environment variable.
///
/// Defaults to "info" level if INCIDENT_BRIDGE_LOG is not set.
/// `INCIDENT_BRIDGE_LOG_FORMAT=json` switches to JSON lines. With the `otel`
/// feature, an OTLP metric exporter is installed when
/// `OTEL_EXPORTER_OTLP_ENDPOINT` is set. Must run inside a tokio runtime.
pub fn init_tracing() -> Telemetry {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV_VAR)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    #[allow(unused_mut)]
    let mut telemetry = Telemetry::default();

    #[cfg(feature = "otel")]
    if let Ok(endpoint) = std::env::var(OTEL_ENDPOINT_ENV_VAR) {
        let service_name = std::env::var(OTEL_SERVICE_NAME_ENV_VAR)
            .unwrap_or_else(|_| DEFAULT_SERVICE_NAME.to_string());
        match init_meter_provider(&endpoint, &service_name) {
            Ok(provider) => {
                tracing::info!(%endpoint, %service_name, "OTLP metrics exporter installed");
                telemetry.meter_provider = Some(provider);
            }
            Err(e) => {
                tracing::warn!(%endpoint, error = %e, "Failed to install OTLP metrics exporter");
            }
        }
    }

    telemetry
}

#[cfg(feature = "otel")]
fn init_meter_provider(
    endpoint: &str,
    service_name: &str,
) -> Result<opentelemetry_sdk::metrics::SdkMeterProvider, Box<dyn std::error::Error + Send + Sync>>
{
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
    use opentelemetry_sdk::{runtime, Resource};

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let reader = PeriodicReader::builder(exporter, runtime::Tokio).build();
    let provider = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(Resource::new(vec![KeyValue::new(
            "service.name",
            service_name.to_string(),
        )]))
        .build();

    opentelemetry::global::set_meter_provider(provider.clone());
    Ok(provider)
}

/// Config file path from `--config <path>`, `--config=<path>` or `-c <path>`.
pub fn parse_config_path() -> Option<String> {
    config_path_from_args(std::env::args().skip(1))
}

fn config_path_from_args<I>(args: I) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}
