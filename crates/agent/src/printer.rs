//! Thermal printer executors and receipt rendering.
//!
//! The payload is opaque to the queue; this module is where it gets a shape:
//! `{"lines": ["...", ...], "cut": bool?}`. A structurally invalid payload is
//! a permanent failure — it is rejected before any device I/O so retrying
//! can never help.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use totem_core::{AttemptOutcome, FaultKind};

/// ESC/POS full-cut sequence (GS V 0).
const CUT: &[u8] = &[0x1d, 0x56, 0x00];
/// ESC/POS initialize (ESC @).
const INIT: &[u8] = &[0x1b, 0x40];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintErrorKind {
    /// Printer missing/unreachable for this attempt; retryable by policy.
    DeviceNotFound,
    /// Printer present but refusing work right now; retryable.
    DeviceBusy,
    /// Payload cannot be rendered; never retryable.
    MalformedPayload,
}

impl PrintErrorKind {
    pub fn fault_kind(&self) -> FaultKind {
        match self {
            PrintErrorKind::DeviceNotFound | PrintErrorKind::DeviceBusy => FaultKind::Transient,
            PrintErrorKind::MalformedPayload => FaultKind::Permanent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrintErrorKind::DeviceNotFound => "device_not_found",
            PrintErrorKind::DeviceBusy => "device_busy",
            PrintErrorKind::MalformedPayload => "malformed_payload",
        }
    }
}

/// Outcome of one print attempt.
///
/// `Printed` is only produced after the driver confirms submission; an
/// unknown outcome (e.g. a timeout mid-submission) must surface as a failure
/// and let the lease sweep absorb the possible duplicate print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintOutcome {
    Printed,
    Failed { kind: PrintErrorKind, message: String },
}

impl PrintOutcome {
    pub fn failed(kind: PrintErrorKind, message: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            message: message.into(),
        }
    }

    /// Translate into the report vocabulary the backend understands.
    pub fn into_attempt_outcome(self) -> AttemptOutcome {
        match self {
            PrintOutcome::Printed => AttemptOutcome::Completed,
            PrintOutcome::Failed { kind, message } => AttemptOutcome::Failed {
                fault: kind.fault_kind(),
                message: format!("{}: {}", kind.as_str(), message),
            },
        }
    }
}

#[async_trait]
pub trait PrintExecutor: Send + Sync {
    async fn print(&self, payload: &serde_json::Value) -> PrintOutcome;
}

#[async_trait]
impl<T: PrintExecutor + ?Sized> PrintExecutor for std::sync::Arc<T> {
    async fn print(&self, payload: &serde_json::Value) -> PrintOutcome {
        (**self).print(payload).await
    }
}

/// Render the receipt payload into printer bytes.
///
/// Returns the human-readable reason when the payload is malformed.
pub fn render_receipt(payload: &serde_json::Value) -> Result<Vec<u8>, String> {
    let lines = payload
        .get("lines")
        .ok_or_else(|| "missing 'lines'".to_string())?
        .as_array()
        .ok_or_else(|| "'lines' must be an array".to_string())?;

    if lines.is_empty() {
        return Err("'lines' must not be empty".to_string());
    }

    let mut bytes = Vec::with_capacity(lines.len() * 32);
    bytes.extend_from_slice(INIT);

    for (i, line) in lines.iter().enumerate() {
        let text = line
            .as_str()
            .ok_or_else(|| format!("'lines[{i}]' must be a string"))?;
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(b'\n');
    }

    // Feed a little paper before the cut so the last line clears the blade.
    bytes.extend_from_slice(b"\n\n");
    if payload.get("cut").and_then(|c| c.as_bool()).unwrap_or(true) {
        bytes.extend_from_slice(CUT);
    }

    Ok(bytes)
}

/// Prints through the system spooler (`lp`), honoring `PRINTER_NAME`.
#[derive(Debug, Clone)]
pub struct SpoolExecutor {
    printer_name: Option<String>,
}

impl SpoolExecutor {
    pub fn new(printer_name: Option<String>) -> Self {
        Self { printer_name }
    }
}

#[async_trait]
impl PrintExecutor for SpoolExecutor {
    async fn print(&self, payload: &serde_json::Value) -> PrintOutcome {
        let bytes = match render_receipt(payload) {
            Ok(bytes) => bytes,
            Err(reason) => {
                return PrintOutcome::failed(PrintErrorKind::MalformedPayload, reason);
            }
        };

        let mut cmd = Command::new("lp");
        cmd.arg("-s");
        if let Some(name) = &self.printer_name {
            cmd.arg("-d").arg(name);
        }
        cmd.arg("-").stdin(Stdio::piped()).stdout(Stdio::null()).stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return PrintOutcome::failed(
                    PrintErrorKind::DeviceNotFound,
                    "spooler command 'lp' not found",
                );
            }
            Err(e) => return PrintOutcome::failed(PrintErrorKind::DeviceBusy, e.to_string()),
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&bytes).await {
                return PrintOutcome::failed(PrintErrorKind::DeviceBusy, e.to_string());
            }
            // Close stdin so the spooler sees EOF.
            drop(stdin);
        }

        match child.wait_with_output().await {
            Ok(output) if output.status.success() => {
                tracing::debug!(bytes = bytes.len(), "spooler accepted print job");
                PrintOutcome::Printed
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let kind = if stderr.to_lowercase().contains("unknown")
                    || stderr.to_lowercase().contains("not exist")
                {
                    PrintErrorKind::DeviceNotFound
                } else {
                    PrintErrorKind::DeviceBusy
                };
                PrintOutcome::failed(kind, stderr.trim().to_string())
            }
            Err(e) => PrintOutcome::failed(PrintErrorKind::DeviceBusy, e.to_string()),
        }
    }
}

/// Prints raw bytes to a network-attached printer (port-9100 style).
#[derive(Debug, Clone)]
pub struct RawTcpExecutor {
    addr: String,
}

impl RawTcpExecutor {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl PrintExecutor for RawTcpExecutor {
    async fn print(&self, payload: &serde_json::Value) -> PrintOutcome {
        let bytes = match render_receipt(payload) {
            Ok(bytes) => bytes,
            Err(reason) => {
                return PrintOutcome::failed(PrintErrorKind::MalformedPayload, reason);
            }
        };

        let mut stream = match tokio::net::TcpStream::connect(&self.addr).await {
            Ok(stream) => stream,
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                return PrintOutcome::failed(PrintErrorKind::DeviceNotFound, e.to_string());
            }
            Err(e) => return PrintOutcome::failed(PrintErrorKind::DeviceBusy, e.to_string()),
        };

        if let Err(e) = stream.write_all(&bytes).await {
            return PrintOutcome::failed(PrintErrorKind::DeviceBusy, e.to_string());
        }
        if let Err(e) = stream.flush().await {
            return PrintOutcome::failed(PrintErrorKind::DeviceBusy, e.to_string());
        }
        if let Err(e) = stream.shutdown().await {
            return PrintOutcome::failed(PrintErrorKind::DeviceBusy, e.to_string());
        }

        tracing::debug!(addr = %self.addr, bytes = bytes.len(), "printer accepted raw job");
        PrintOutcome::Printed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_lines_with_init_and_cut() {
        let payload = serde_json::json!({"lines": ["CAFE TOTEM", "total: 12.50"]});
        let bytes = render_receipt(&payload).unwrap();

        assert!(bytes.starts_with(INIT));
        assert!(bytes.ends_with(CUT));
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("CAFE TOTEM\n"));
        assert!(text.contains("total: 12.50\n"));
    }

    #[test]
    fn cut_can_be_disabled() {
        let payload = serde_json::json!({"lines": ["x"], "cut": false});
        let bytes = render_receipt(&payload).unwrap();
        assert!(!bytes.ends_with(CUT));
    }

    #[test]
    fn missing_lines_is_malformed() {
        assert!(render_receipt(&serde_json::json!({})).is_err());
        assert!(render_receipt(&serde_json::json!({"lines": []})).is_err());
        assert!(render_receipt(&serde_json::json!({"lines": [42]})).is_err());
        assert!(render_receipt(&serde_json::json!({"lines": "no"})).is_err());
    }

    #[tokio::test]
    async fn malformed_payload_fails_before_device_io() {
        // Address that would fail if dialed; malformed payloads must not
        // reach the connect step.
        let exec = RawTcpExecutor::new("127.0.0.1:1");
        let outcome = exec.print(&serde_json::json!({"nope": true})).await;
        assert!(matches!(
            outcome,
            PrintOutcome::Failed { kind: PrintErrorKind::MalformedPayload, .. }
        ));
    }

    #[tokio::test]
    async fn unreachable_tcp_printer_is_retryable() {
        let exec = RawTcpExecutor::new("127.0.0.1:1");
        let outcome = exec.print(&serde_json::json!({"lines": ["x"]})).await;
        match outcome {
            PrintOutcome::Failed { kind, .. } => {
                assert_eq!(kind.fault_kind(), FaultKind::Transient);
            }
            PrintOutcome::Printed => panic!("port 1 must not accept a print"),
        }
    }

    #[test]
    fn outcome_translation_preserves_fault_class() {
        let printed = PrintOutcome::Printed.into_attempt_outcome();
        assert_eq!(printed, AttemptOutcome::Completed);

        let busy = PrintOutcome::failed(PrintErrorKind::DeviceBusy, "spooler queue full")
            .into_attempt_outcome();
        assert!(matches!(
            busy,
            AttemptOutcome::Failed { fault: FaultKind::Transient, .. }
        ));

        let malformed = PrintOutcome::failed(PrintErrorKind::MalformedPayload, "missing lines")
            .into_attempt_outcome();
        assert!(matches!(
            malformed,
            AttemptOutcome::Failed { fault: FaultKind::Permanent, .. }
        ));
    }
}
