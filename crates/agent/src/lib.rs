//! `totem-agent` — terminal-side print agent.
//!
//! One sequential polling loop per terminal: claim a job from the backend,
//! drive the thermal printer, report the outcome, repeat. Designed so that a
//! crash at any point is recoverable through the backend's lease sweep.

pub mod client;
pub mod config;
pub mod printer;
pub mod runner;
pub mod shutdown;

pub use client::{ClientError, HttpQueueClient, QueueApi};
pub use config::{AgentConfig, ConfigError};
pub use printer::{
    render_receipt, PrintErrorKind, PrintExecutor, PrintOutcome, RawTcpExecutor, SpoolExecutor,
};
pub use runner::PollingLoop;
pub use shutdown::ShutdownSignal;
