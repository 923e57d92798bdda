//! Job store contract.
//!
//! Concurrency contract: `claim_next`, `begin`, `report_result`, and
//! `reclaim_expired` are linearizable per job. Implementations provide this
//! with a per-job atomic transition (version compare-and-swap in memory, row
//! locking in Postgres) — never advisory locking alone, because multiple
//! agent instances or duplicated polling intervals can race.
//!
//! Expected races are ordinary values, not errors: a lost claim is `None`, a
//! stale report is [`ReportDisposition::StaleClaim`]. Only infrastructure
//! faults surface as [`JobStoreError`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use totem_core::{AttemptOutcome, AttemptToken, JobId, TenantId, TerminalId};

use crate::claim::{ClaimedJob, ReportDisposition};
use crate::job::{NewPrintJob, PrintJob};

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("tenant isolation violation")]
    TenantIsolation,
    #[error("storage error: {0}")]
    Storage(String),
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Accept a new print request; the job starts `Pending`.
    async fn enqueue(&self, req: NewPrintJob) -> Result<JobId, JobStoreError>;

    /// Atomically select the oldest `Pending` job for the terminal, move it
    /// to `Claimed`, and mint its attempt token. Two racing callers get the
    /// job exactly once; the loser sees `Ok(None)`.
    async fn claim_next(
        &self,
        tenant_id: TenantId,
        terminal_id: &TerminalId,
        lease: chrono::Duration,
    ) -> Result<Option<ClaimedJob>, JobStoreError>;

    /// `Claimed -> Printing` under the claim of record.
    async fn begin(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        token: AttemptToken,
    ) -> Result<ReportDisposition, JobStoreError>;

    /// Apply an attempt outcome. Stale tokens and already-terminal jobs are
    /// rejected without mutating anything.
    async fn report_result(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        token: AttemptToken,
        outcome: AttemptOutcome,
    ) -> Result<ReportDisposition, JobStoreError>;

    /// Sweep jobs whose lease expired without a report, reverting them to
    /// `Pending` (or `FailedPermanent` once the budget is gone). Returns the
    /// swept job ids.
    async fn reclaim_expired(&self, now: DateTime<Utc>) -> Result<Vec<JobId>, JobStoreError>;

    async fn get(&self, tenant_id: TenantId, job_id: JobId)
        -> Result<Option<PrintJob>, JobStoreError>;

    /// Jobs for a terminal, oldest first (operator visibility).
    async fn list_for_terminal(
        &self,
        tenant_id: TenantId,
        terminal_id: &TerminalId,
        limit: usize,
    ) -> Result<Vec<PrintJob>, JobStoreError>;
}
