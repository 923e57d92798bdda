//! Agent configuration from the environment.
//!
//! Missing required variables are fatal: the process must exit non-zero
//! before the polling loop ever starts.

use std::time::Duration;

use thiserror::Error;

use totem_core::{FaultKind, TerminalId};

pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 3000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_LEASE_DURATION_MS: u64 = 90_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl ConfigError {
    pub fn fault_kind(&self) -> FaultKind {
        FaultKind::Configuration
    }
}

/// Runtime configuration for one agent process (one terminal, one printer).
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub terminal_id: TerminalId,
    pub backend_url: String,
    /// Bearer credential presented on every queue call.
    pub agent_token: String,
    /// Spooler printer name; `None` selects the system default printer.
    pub printer_name: Option<String>,
    /// When set, print raw bytes to this TCP address (port-9100 style)
    /// instead of going through the spooler.
    pub printer_addr: Option<String>,
    pub polling_interval: Duration,
    /// Clamp for consecutive-failure backoff growth.
    pub max_retries: u32,
    pub lease_duration: Duration,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Testable constructor: `lookup` plays the role of `std::env::var`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let terminal_id = lookup("TERMINAL_ID").ok_or(ConfigError::Missing("TERMINAL_ID"))?;
        let terminal_id = terminal_id
            .parse::<TerminalId>()
            .map_err(|e| ConfigError::Invalid {
                name: "TERMINAL_ID",
                reason: e.to_string(),
            })?;

        let backend_url = lookup("BACKEND_URL").ok_or(ConfigError::Missing("BACKEND_URL"))?;
        if !backend_url.starts_with("http://") && !backend_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                name: "BACKEND_URL",
                reason: "must be an http(s) URL".to_string(),
            });
        }

        let agent_token = lookup("AGENT_TOKEN").ok_or(ConfigError::Missing("AGENT_TOKEN"))?;

        let polling_interval = parse_ms(
            &lookup,
            "POLLING_INTERVAL_MS",
            DEFAULT_POLLING_INTERVAL_MS,
        )?;
        let lease_duration = parse_ms(&lookup, "LEASE_DURATION_MS", DEFAULT_LEASE_DURATION_MS)?;

        let max_retries = match lookup("MAX_RETRIES") {
            None => DEFAULT_MAX_RETRIES,
            Some(raw) => raw.parse::<u32>().map_err(|e| ConfigError::Invalid {
                name: "MAX_RETRIES",
                reason: e.to_string(),
            })?,
        };

        Ok(Self {
            terminal_id,
            backend_url: backend_url.trim_end_matches('/').to_string(),
            agent_token,
            printer_name: lookup("PRINTER_NAME"),
            printer_addr: lookup("PRINTER_ADDR"),
            polling_interval: Duration::from_millis(polling_interval),
            max_retries,
            lease_duration: Duration::from_millis(lease_duration),
        })
    }
}

fn parse_ms(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => {
            let ms = raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            })?;
            if ms == 0 {
                return Err(ConfigError::Invalid {
                    name,
                    reason: "must be greater than zero".to_string(),
                });
            }
            Ok(ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn minimal_config_with_defaults() {
        let cfg = AgentConfig::from_lookup(env(&[
            ("TERMINAL_ID", "kiosk-01"),
            ("BACKEND_URL", "http://localhost:8080"),
            ("AGENT_TOKEN", "secret"),
        ]))
        .unwrap();

        assert_eq!(cfg.terminal_id.as_str(), "kiosk-01");
        assert_eq!(cfg.polling_interval, Duration::from_millis(3000));
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.lease_duration, Duration::from_millis(90_000));
        assert!(cfg.printer_name.is_none());
    }

    #[test]
    fn missing_terminal_id_is_fatal() {
        let err = AgentConfig::from_lookup(env(&[
            ("BACKEND_URL", "http://localhost:8080"),
            ("AGENT_TOKEN", "secret"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("TERMINAL_ID")));
        assert_eq!(err.fault_kind(), FaultKind::Configuration);
    }

    #[test]
    fn missing_backend_url_is_fatal() {
        let err = AgentConfig::from_lookup(env(&[
            ("TERMINAL_ID", "kiosk-01"),
            ("AGENT_TOKEN", "secret"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("BACKEND_URL")));
    }

    #[test]
    fn non_numeric_interval_is_rejected() {
        let err = AgentConfig::from_lookup(env(&[
            ("TERMINAL_ID", "kiosk-01"),
            ("BACKEND_URL", "http://localhost:8080"),
            ("AGENT_TOKEN", "secret"),
            ("POLLING_INTERVAL_MS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { name: "POLLING_INTERVAL_MS", .. }
        ));
    }

    #[test]
    fn trailing_slash_is_stripped_from_backend_url() {
        let cfg = AgentConfig::from_lookup(env(&[
            ("TERMINAL_ID", "kiosk-01"),
            ("BACKEND_URL", "http://localhost:8080/"),
            ("AGENT_TOKEN", "secret"),
        ]))
        .unwrap();
        assert_eq!(cfg.backend_url, "http://localhost:8080");
    }
}
