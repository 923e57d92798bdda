//! Payment status record and its state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use totem_core::{PaymentId, TenantId};

use crate::gateway::ChargeStatus;

/// Lifecycle state of a payment.
///
/// `Confirmed`, `Expired`, and `Failed` are terminal: once reached, the
/// record never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Created,
    PendingConfirmation,
    Confirmed,
    Expired,
    Failed,
}

impl PaymentState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentState::Confirmed | PaymentState::Expired | PaymentState::Failed
        )
    }
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Created => "created",
            PaymentState::PendingConfirmation => "pending_confirmation",
            PaymentState::Confirmed => "confirmed",
            PaymentState::Expired => "expired",
            PaymentState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentState {
    type Err = totem_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(PaymentState::Created),
            "pending_confirmation" => Ok(PaymentState::PendingConfirmation),
            "confirmed" => Ok(PaymentState::Confirmed),
            "expired" => Ok(PaymentState::Expired),
            "failed" => Ok(PaymentState::Failed),
            other => Err(totem_core::DomainError::validation(format!(
                "unknown payment state '{other}'"
            ))),
        }
    }
}

/// Locally tracked view of a gateway payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentStatusRecord {
    pub payment_id: PaymentId,
    pub tenant_id: TenantId,
    /// Gateway the charge lives on (configuration key, e.g. "asaas").
    pub gateway: String,
    pub state: PaymentState,
    pub poll_attempts: u32,
    pub next_poll_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Hard ceiling: past this instant the record is `Expired` no matter how
    /// many polls happened.
    pub expires_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl PaymentStatusRecord {
    pub fn new(
        payment_id: PaymentId,
        tenant_id: TenantId,
        gateway: impl Into<String>,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            payment_id,
            tenant_id,
            gateway: gateway.into(),
            state: PaymentState::Created,
            poll_attempts: 0,
            next_poll_at: now,
            created_at: now,
            expires_at: now + ttl,
            last_error: None,
        }
    }

    /// Apply a status read from the gateway. No-op once terminal.
    pub fn apply_gateway_status(&mut self, status: ChargeStatus) {
        if self.state.is_terminal() {
            return;
        }
        self.poll_attempts += 1;
        self.state = match status {
            ChargeStatus::Pending => PaymentState::PendingConfirmation,
            ChargeStatus::Confirmed => PaymentState::Confirmed,
            ChargeStatus::Expired => PaymentState::Expired,
            ChargeStatus::Failed => PaymentState::Failed,
        };
        if self.state.is_terminal() {
            self.last_error = None;
        }
    }

    /// Record a failed poll (gateway unreachable); schedules nothing by
    /// itself — the resolver decides the next poll instant.
    pub fn record_poll_failure(&mut self, error: impl Into<String>) {
        if self.state.is_terminal() {
            return;
        }
        self.poll_attempts += 1;
        self.last_error = Some(error.into());
    }

    pub fn schedule_next_poll(&mut self, at: DateTime<Utc>) {
        if !self.state.is_terminal() {
            self.next_poll_at = at;
        }
    }

    /// Fail the payment permanently (gateway rejection). No-op once terminal.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        if self.state.is_terminal() {
            return;
        }
        self.state = PaymentState::Failed;
        self.last_error = Some(error.into());
    }

    /// Enforce the hard expiry. Returns true if the record was expired here.
    pub fn mark_expired_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.state.is_terminal() || now < self.expires_at {
            return false;
        }
        self.state = PaymentState::Expired;
        true
    }
}
