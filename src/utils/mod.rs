//! Process-level helpers shared by the binary and the pipeline.

pub mod bootstrap;
#[cfg(feature = "otel")]
pub mod metrics;
