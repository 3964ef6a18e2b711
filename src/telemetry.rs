//! Logging and trace export setup
//!
//! Logs go to stdout through `tracing-subscriber`. When
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set, spans are also exported over OTLP.

use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{Error, Result};

pub const OTEL_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
const SERVICE_NAME: &str = "clique-operator";

/// Log line format on stdout
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn init_tracer(endpoint: &str) -> Result<sdktrace::Tracer> {
    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
            KeyValue::new("service.name", SERVICE_NAME),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ])))
        .install_batch(runtime::Tokio)
        .map_err(|e| Error::ConfigError(format!("Failed to initialize OTLP exporter: {}", e)))
}

/// Install the global subscriber. Returns whether OTLP export is enabled.
///
/// Must be called from within a Tokio runtime when the exporter is enabled.
pub fn init(format: LogFormat) -> Result<bool> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let (text_layer, json_layer) = match format {
        LogFormat::Text => (Some(fmt::layer().with_target(true)), None),
        LogFormat::Json => (None, Some(fmt::layer().json().with_target(true))),
    };

    let otel_layer = match std::env::var(OTEL_ENDPOINT_ENV) {
        Ok(endpoint) if !endpoint.is_empty() => {
            Some(tracing_opentelemetry::layer().with_tracer(init_tracer(&endpoint)?))
        }
        _ => None,
    };
    let otel_enabled = otel_layer.is_some();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(text_layer)
        .with(json_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| Error::ConfigError(format!("Failed to install subscriber: {}", e)))?;

    Ok(otel_enabled)
}

/// Flush any spans still buffered by the batch exporter.
pub fn shutdown() {
    opentelemetry::global::shutdown_tracer_provider();
}
