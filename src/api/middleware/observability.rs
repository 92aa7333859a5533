//! Observability wiring.
//!
//! Reads the standard OTEL_* environment variables and reports what the
//! process will do with them. Traces go through `tracing`; an OTLP exporter
//! can be attached here once one is needed.

use std::env;
use tracing::info;

/// Inspect the OTEL_* environment and log the resulting setup.
pub async fn init_observability() -> Result<(), Box<dyn std::error::Error>> {
    let service_name =
        env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "field-dispatch-api".to_string());

    match env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok() {
        Some(endpoint) => {
            info!(
                service_name,
                endpoint, "OTLP endpoint configured, exporting not wired up; using local tracing"
            );
        }
        None => {
            info!(
                service_name,
                "observability initialized, set OTEL_EXPORTER_OTLP_ENDPOINT to configure an exporter"
            );
        }
    }

    Ok(())
}

/// Flush and release exporter resources on shutdown.
pub async fn shutdown_observability() {
    // Nothing to flush while only local tracing is active
}
