//! Request/response DTOs and JSON mapping helpers.

use serde::{Deserialize, Serialize};

use totem_core::{AttemptOutcome, AttemptToken, JobId, TerminalId};
use totem_queue::PrintJob;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub terminal_id: TerminalId,
    pub payload: serde_json::Value,
    pub max_retries: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub job_id: JobId,
}

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub terminal_id: TerminalId,
    pub lease_duration_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct BeginRequest {
    pub attempt_token: AttemptToken,
}

#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub attempt_token: AttemptToken,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

/// Operator-facing view of a job (claim internals elided).
pub fn job_to_json(job: &PrintJob) -> serde_json::Value {
    serde_json::json!({
        "id": job.id.to_string(),
        "terminal_id": job.terminal_id.as_str(),
        "state": job.state.as_str(),
        "attempt_count": job.attempt_count(),
        "max_retries": job.budget.max_retries,
        "claim_expires_at": job.lease.map(|l| l.expires_at.to_rfc3339()),
        "last_error": job.last_error,
        "created_at": job.created_at.to_rfc3339(),
        "updated_at": job.updated_at.to_rfc3339(),
    })
}
