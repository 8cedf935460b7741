//! Waddle gateway: hosts the session core behind a newline-framed TCP
//! listener for local development and load testing.

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use tracing::info;

mod commands;
mod config;
mod server;
mod telemetry;
mod transport;

use config::{GatewayConfig, LogFormat};
use server::GatewayServer;

/// Command-line overrides for the environment configuration.
#[derive(Debug, Parser)]
#[command(name = "waddle-gateway", version, about)]
struct Cli {
    /// Address to listen on
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Outbound queue depth per session
    #[arg(long)]
    outbound_capacity: Option<usize>,

    /// Longest accepted line, in bytes
    #[arg(long)]
    max_frame_len: Option<usize>,

    /// Log output format (pretty or json)
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn apply(self, mut config: GatewayConfig) -> GatewayConfig {
        if let Some(listen) = self.listen {
            config.listen_addr = listen;
        }
        if let Some(capacity) = self.outbound_capacity {
            config.outbound_capacity = capacity;
        }
        if let Some(max) = self.max_frame_len {
            config.max_frame_len = max;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.apply(GatewayConfig::from_env()?);

    telemetry::init(config.log_format)?;
    config.log_summary();

    let manager = server::build_manager(&config);
    let listen_addr = config.listen_addr;
    let server = GatewayServer::bind(config, manager)
        .await
        .with_context(|| format!("failed to bind {}", listen_addr))?;

    info!("Starting Waddle gateway");
    server.run(server::shutdown_signal()).await?;

    telemetry::shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_environment() {
        let cli = Cli::parse_from([
            "waddle-gateway",
            "--listen",
            "0.0.0.0:9000",
            "--log-format",
            "json",
        ]);
        let config = cli.apply(GatewayConfig::default());

        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.outbound_capacity, GatewayConfig::default().outbound_capacity);
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
