//! Payment record storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use totem_core::{PaymentId, TenantId};

use crate::error::PaymentStoreError;
use crate::record::PaymentStatusRecord;

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, record: PaymentStatusRecord) -> Result<(), PaymentStoreError>;

    async fn get(
        &self,
        tenant_id: TenantId,
        payment_id: PaymentId,
    ) -> Result<Option<PaymentStatusRecord>, PaymentStoreError>;

    /// Persist an updated record. Rejects any attempt to move a record out of
    /// a terminal state (terminal states are immutable).
    async fn update(&self, record: &PaymentStatusRecord) -> Result<(), PaymentStoreError>;
}

/// In-memory payment store for tests/dev and single-node deployments.
#[derive(Debug, Default)]
pub struct InMemoryPaymentStore {
    records: RwLock<HashMap<PaymentId, PaymentStatusRecord>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert(&self, record: PaymentStatusRecord) -> Result<(), PaymentStoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| PaymentStoreError::Storage("lock poisoned".to_string()))?;
        records.insert(record.payment_id, record);
        Ok(())
    }

    async fn get(
        &self,
        tenant_id: TenantId,
        payment_id: PaymentId,
    ) -> Result<Option<PaymentStatusRecord>, PaymentStoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| PaymentStoreError::Storage("lock poisoned".to_string()))?;

        match records.get(&payment_id) {
            Some(r) if r.tenant_id == tenant_id => Ok(Some(r.clone())),
            Some(_) => Err(PaymentStoreError::TenantIsolation),
            None => Ok(None),
        }
    }

    async fn update(&self, record: &PaymentStatusRecord) -> Result<(), PaymentStoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| PaymentStoreError::Storage("lock poisoned".to_string()))?;

        let existing = records
            .get(&record.payment_id)
            .ok_or(PaymentStoreError::NotFound(record.payment_id))?;

        if existing.tenant_id != record.tenant_id {
            return Err(PaymentStoreError::TenantIsolation);
        }
        if existing.state.is_terminal() && existing.state != record.state {
            return Err(PaymentStoreError::TerminalStateImmutable(record.payment_id));
        }

        records.insert(record.payment_id, record.clone());
        Ok(())
    }
}
