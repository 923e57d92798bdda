//! Payment subsystem errors.

use thiserror::Error;

use totem_core::{FaultKind, PaymentId};

/// Payment store error.
#[derive(Debug, Clone, Error)]
pub enum PaymentStoreError {
    #[error("payment not found: {0}")]
    NotFound(PaymentId),
    #[error("tenant isolation violation")]
    TenantIsolation,
    #[error("terminal payment state is immutable: {0}")]
    TerminalStateImmutable(PaymentId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Error surfaced by the payment service / resolver boundary.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Caller does not hold the payment capability. Never retried.
    #[error("forbidden")]
    Forbidden,

    #[error("payment not found: {0}")]
    NotFound(PaymentId),

    /// Gateway rejected the request outright (permanent).
    #[error("gateway rejected request: {0}")]
    GatewayRejected(String),

    /// Gateway unreachable or misbehaving (transient; backed off by the
    /// resolver, bubbled to the caller only for create).
    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error(transparent)]
    Store(#[from] PaymentStoreError),
}

impl PaymentError {
    pub fn fault_kind(&self) -> FaultKind {
        match self {
            PaymentError::Forbidden
            | PaymentError::NotFound(_)
            | PaymentError::GatewayRejected(_) => FaultKind::Permanent,
            PaymentError::GatewayUnavailable(_) | PaymentError::Store(_) => FaultKind::Transient,
        }
    }
}
