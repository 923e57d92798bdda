//! Claim protocol: the per-job state machine behind `claim_next`,
//! `begin`, `report_result`, and the lease sweep.
//!
//! Every mutation here is applied by a store while it holds the job's
//! per-row mutual exclusion (lock or row lock), so the methods are plain
//! sequential code; the store supplies atomicity, this module supplies the
//! transition rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use totem_core::{AttemptOutcome, AttemptToken, FaultKind, JobId, Lease, TerminalId};

use crate::job::{JobState, PrintJob};

/// What an agent receives when a claim is granted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimedJob {
    pub id: JobId,
    pub terminal_id: TerminalId,
    pub payload: serde_json::Value,
    pub attempt: u32,
    pub token: AttemptToken,
    pub lease_expires_at: DateTime<Utc>,
}

impl ClaimedJob {
    pub(crate) fn from_job(job: &PrintJob) -> Self {
        let lease = job
            .lease
            .expect("claimed job carries a lease by construction");
        Self {
            id: job.id,
            terminal_id: job.terminal_id.clone(),
            payload: job.payload.clone(),
            attempt: job.budget.attempts,
            token: lease.token,
            lease_expires_at: lease.expires_at,
        }
    }
}

/// Result of applying a begin/report against the job of record.
///
/// Losing a race is not an error: a stale report is rejected as a value and
/// the current owner of record wins (HTTP surface maps it to 409).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum ReportDisposition {
    Applied { state: JobState },
    StaleClaim { state: JobState },
}

impl ReportDisposition {
    pub fn is_applied(&self) -> bool {
        matches!(self, ReportDisposition::Applied { .. })
    }
}

impl PrintJob {
    /// Grant a claim: `Pending -> Claimed`, mint a token, start the lease.
    ///
    /// The attempt is counted here, at claim time, so a lease that later
    /// expires unreported has already consumed budget.
    pub(crate) fn grant_claim(&mut self, now: DateTime<Utc>, lease: chrono::Duration) {
        debug_assert_eq!(self.state, JobState::Pending);
        self.budget.record_start();
        self.lease = Some(Lease::grant(now, lease));
        self.state = JobState::Claimed;
        self.version += 1;
        self.updated_at = now;
    }

    /// Whether a token is the live claim of record for this job.
    fn holds_live_lease(&self, token: AttemptToken, now: DateTime<Utc>) -> bool {
        self.state.is_leased()
            && self
                .lease
                .is_some_and(|l| l.token == token && !l.is_expired(now))
    }

    /// `Claimed -> Printing` under the claim of record.
    pub(crate) fn mark_printing(
        &mut self,
        token: AttemptToken,
        now: DateTime<Utc>,
    ) -> ReportDisposition {
        if self.state != JobState::Claimed || !self.holds_live_lease(token, now) {
            return ReportDisposition::StaleClaim { state: self.state };
        }

        self.state = JobState::Printing;
        self.version += 1;
        self.updated_at = now;
        ReportDisposition::Applied { state: self.state }
    }

    /// Apply an attempt outcome reported under `token`.
    ///
    /// Accepted from `Claimed` or `Printing`. A transient failure re-enters
    /// `Pending` while the budget allows and goes to `FailedPermanent` once
    /// it is exhausted; a permanent failure is terminal regardless of the
    /// remaining budget.
    pub(crate) fn apply_report(
        &mut self,
        token: AttemptToken,
        outcome: &AttemptOutcome,
        now: DateTime<Utc>,
    ) -> ReportDisposition {
        if !self.holds_live_lease(token, now) {
            return ReportDisposition::StaleClaim { state: self.state };
        }

        match outcome {
            AttemptOutcome::Completed => {
                self.state = JobState::Succeeded;
                self.last_error = None;
            }
            AttemptOutcome::Failed { fault, message } => {
                self.last_error = Some(message.clone());
                self.state = if *fault == FaultKind::Transient && self.budget.retry_allowed() {
                    JobState::Pending
                } else {
                    JobState::FailedPermanent
                };
            }
        }

        self.lease = None;
        self.version += 1;
        self.updated_at = now;
        ReportDisposition::Applied { state: self.state }
    }

    /// Revert an expired, unreported lease.
    ///
    /// Returns `true` if the job was swept. The attempt was already counted
    /// when the claim was granted; the sweep only decides whether budget
    /// remains for another claim.
    pub(crate) fn sweep_expired(&mut self, now: DateTime<Utc>) -> bool {
        let expired = self.state.is_leased() && self.lease.is_some_and(|l| l.is_expired(now));
        if !expired {
            return false;
        }

        self.lease = None;
        self.last_error = Some("claim lease expired".to_string());
        self.state = if self.budget.retry_allowed() {
            JobState::Pending
        } else {
            JobState::FailedPermanent
        };
        self.version += 1;
        self.updated_at = now;
        true
    }
}
