//! Print job data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use totem_core::{AttemptBudget, JobId, Lease, TenantId, TerminalId};

/// Lifecycle state of a print job.
///
/// A retryable failure never persists as its own state: the report protocol
/// resolves it immediately to `Pending` (budget remaining) or
/// `FailedPermanent` (budget exhausted), so readers only ever observe the
/// states below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Queued, claimable by the job's terminal.
    Pending,
    /// Handed to an agent under a live lease.
    Claimed,
    /// The agent has started driving the printer.
    Printing,
    /// The printer confirmed submission.
    Succeeded,
    /// Out of budget or failed permanently; surfaced for manual intervention.
    FailedPermanent,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::FailedPermanent)
    }

    /// Whether the job is held under a lease.
    pub fn is_leased(&self) -> bool {
        matches!(self, JobState::Claimed | JobState::Printing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Claimed => "claimed",
            JobState::Printing => "printing",
            JobState::Succeeded => "succeeded",
            JobState::FailedPermanent => "failed_permanent",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobState {
    type Err = totem_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobState::Pending),
            "claimed" => Ok(JobState::Claimed),
            "printing" => Ok(JobState::Printing),
            "succeeded" => Ok(JobState::Succeeded),
            "failed_permanent" => Ok(JobState::FailedPermanent),
            other => Err(totem_core::DomainError::validation(format!(
                "unknown job state '{other}'"
            ))),
        }
    }
}

/// A print request as accepted from the backend producer surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPrintJob {
    pub tenant_id: TenantId,
    pub terminal_id: TerminalId,
    /// Receipt content; opaque to the queue.
    pub payload: serde_json::Value,
    pub max_retries: u32,
}

/// A print job as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: JobId,
    pub tenant_id: TenantId,
    pub terminal_id: TerminalId,
    pub payload: serde_json::Value,
    pub state: JobState,
    pub budget: AttemptBudget,
    /// Present exactly while `state.is_leased()`.
    pub lease: Option<Lease>,
    pub last_error: Option<String>,
    /// Optimistic-concurrency counter; every committed transition bumps it.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PrintJob {
    pub fn new(req: NewPrintJob, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            tenant_id: req.tenant_id,
            terminal_id: req.terminal_id,
            payload: req.payload,
            state: JobState::Pending,
            budget: AttemptBudget::new(req.max_retries),
            lease: None,
            last_error: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn attempt_count(&self) -> u32 {
        self.budget.attempts
    }
}
