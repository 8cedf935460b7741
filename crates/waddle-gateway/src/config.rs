//! Gateway configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! - `WADDLE_GATEWAY_LISTEN`: TCP listen address. Default: `127.0.0.1:5300`
//! - `WADDLE_GATEWAY_OUTBOUND_CAPACITY`: per-session outbound queue depth. Default: `256`
//! - `WADDLE_GATEWAY_MAX_FRAME_LEN`: longest accepted line in bytes. Default: `65536`
//! - `WADDLE_GATEWAY_LOG_FORMAT`: `pretty` or `json`. Default: `pretty`
//!
//! Command-line flags override the environment.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use thiserror::Error;
use tracing::info;
use waddle_session::SessionManagerConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, multi-line output for local development
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address to accept client connections on
    pub listen_addr: SocketAddr,
    /// Outbound queue depth per session
    pub outbound_capacity: usize,
    /// Longest accepted frame (one line), in bytes
    pub max_frame_len: usize,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 5300)),
            outbound_capacity: waddle_session::manager::DEFAULT_OUTBOUND_CAPACITY,
            max_frame_len: 64 * 1024,
            log_format: LogFormat::Pretty,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            listen_addr: parse_var(&lookup, "WADDLE_GATEWAY_LISTEN")?
                .unwrap_or(defaults.listen_addr),
            outbound_capacity: parse_var(&lookup, "WADDLE_GATEWAY_OUTBOUND_CAPACITY")?
                .unwrap_or(defaults.outbound_capacity),
            max_frame_len: parse_var(&lookup, "WADDLE_GATEWAY_MAX_FRAME_LEN")?
                .unwrap_or(defaults.max_frame_len),
            log_format: parse_var(&lookup, "WADDLE_GATEWAY_LOG_FORMAT")?
                .unwrap_or(defaults.log_format),
        })
    }

    /// Session manager settings derived from this configuration.
    pub fn session_manager(&self) -> SessionManagerConfig {
        SessionManagerConfig {
            outbound_capacity: self.outbound_capacity,
        }
    }

    pub fn log_summary(&self) {
        info!(
            listen = %self.listen_addr,
            outbound_capacity = self.outbound_capacity,
            max_frame_len = self.max_frame_len,
            log_format = %self.log_format,
            "Gateway configuration loaded"
        );
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = GatewayConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:5300".parse().unwrap());
        assert_eq!(config.outbound_capacity, 256);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_reads_variables() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("WADDLE_GATEWAY_LISTEN", "0.0.0.0:7000"),
            ("WADDLE_GATEWAY_OUTBOUND_CAPACITY", "16"),
            ("WADDLE_GATEWAY_LOG_FORMAT", "JSON"),
        ]))
        .unwrap();
        assert_eq!(config.listen_addr.port(), 7000);
        assert_eq!(config.outbound_capacity, 16);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.session_manager().outbound_capacity, 16);
    }

    #[test]
    fn test_blank_variable_uses_default() {
        let config =
            GatewayConfig::from_lookup(lookup(&[("WADDLE_GATEWAY_MAX_FRAME_LEN", "  ")])).unwrap();
        assert_eq!(config.max_frame_len, 64 * 1024);
    }

    #[test]
    fn test_invalid_variable_is_reported() {
        let err = GatewayConfig::from_lookup(lookup(&[(
            "WADDLE_GATEWAY_OUTBOUND_CAPACITY",
            "lots",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("WADDLE_GATEWAY_OUTBOUND_CAPACITY"));
    }
}
