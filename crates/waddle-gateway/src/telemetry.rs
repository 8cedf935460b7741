//! Logging setup for the gateway.
//!
//! Console output through tracing-subscriber. Session metrics go through the
//! global OpenTelemetry meter, which stays a no-op until an exporter is
//! installed.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

const DEFAULT_FILTER: &str = "info,waddle_gateway=debug,waddle_session=debug";

/// Initialize the global tracing subscriber.
///
/// # Configuration
///
/// - `RUST_LOG`: Log filter (default: `info,waddle_gateway=debug,waddle_session=debug`)
pub fn init(format: LogFormat) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.pretty())
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .try_init()?,
    }

    tracing::info!(format = %format, "Telemetry initialized");
    Ok(())
}

/// Flush pending output before exit.
pub fn shutdown() {
    tracing::info!("Telemetry shutdown complete");
}
