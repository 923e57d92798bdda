//! Leaseable-work vocabulary: lease, attempt budget, attempt outcome.
//!
//! Printing and payment polling are both "claim a unit of external work,
//! attempt it, converge on a terminal state". The shared pieces live here;
//! the executors (printer, gateway poll) live with their subsystems.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FaultKind;
use crate::id::AttemptToken;

/// A time-bounded exclusive right to work on a job.
///
/// The lease is advisory on the holder's side: the store of record decides
/// whether a token is still the claim of record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub token: AttemptToken,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn grant(now: DateTime<Utc>, duration: chrono::Duration) -> Self {
        Self {
            token: AttemptToken::new(),
            granted_at: now,
            expires_at: now + duration,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Attempt accounting for a work item.
///
/// `attempts` counts started attempts; `max_retries` is the number of
/// re-attempts allowed beyond the first. An item whose attempt fails is
/// re-eligible while `attempts <= max_retries` (so a `max_retries = 3` item
/// may be attempted four times in total).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptBudget {
    pub attempts: u32,
    pub max_retries: u32,
}

impl AttemptBudget {
    pub fn new(max_retries: u32) -> Self {
        Self {
            attempts: 0,
            max_retries,
        }
    }

    /// Record the start of an attempt (called when a claim is granted).
    pub fn record_start(&mut self) {
        self.attempts += 1;
    }

    /// Whether a failed attempt may be retried.
    pub fn retry_allowed(&self) -> bool {
        self.attempts <= self.max_retries
    }
}

/// Outcome of one attempt at a unit of external work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The work completed; the item may transition to its success state.
    Completed,
    /// The attempt failed; `fault` decides whether the budget applies
    /// (transient) or the item goes straight to its permanent-failure state.
    Failed { fault: FaultKind, message: String },
}

impl AttemptOutcome {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Failed {
            fault: FaultKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Failed {
            fault: FaultKind::Permanent,
            message: message.into(),
        }
    }
}
