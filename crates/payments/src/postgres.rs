//! Postgres-backed payment store.
//!
//! Terminal-state immutability is enforced the same way the job store
//! enforces its transitions: load the row `FOR UPDATE`, check in Rust, write
//! back inside the transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use totem_core::{PaymentId, TenantId};

use crate::error::PaymentStoreError;
use crate::record::{PaymentState, PaymentStatusRecord};
use crate::store::PaymentStore;

#[derive(Debug, Clone)]
pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `payment_records` table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), PaymentStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS payment_records (
                payment_id    UUID PRIMARY KEY,
                tenant_id     UUID NOT NULL,
                gateway       TEXT NOT NULL,
                state         TEXT NOT NULL,
                poll_attempts INTEGER NOT NULL DEFAULT 0,
                next_poll_at  TIMESTAMPTZ NOT NULL,
                created_at    TIMESTAMPTZ NOT NULL,
                expires_at    TIMESTAMPTZ NOT NULL,
                last_error    TEXT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn insert(&self, record: PaymentStatusRecord) -> Result<(), PaymentStoreError> {
        sqlx::query(
            r#"
            INSERT INTO payment_records (
                payment_id, tenant_id, gateway, state,
                poll_attempts, next_poll_at, created_at, expires_at, last_error
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.payment_id.as_uuid())
        .bind(record.tenant_id.as_uuid())
        .bind(&record.gateway)
        .bind(record.state.as_str())
        .bind(record.poll_attempts as i32)
        .bind(record.next_poll_at)
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(record.last_error.as_deref())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    async fn get(
        &self,
        tenant_id: TenantId,
        payment_id: PaymentId,
    ) -> Result<Option<PaymentStatusRecord>, PaymentStoreError> {
        let row = sqlx::query("SELECT * FROM payment_records WHERE payment_id = $1")
            .bind(payment_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        match row {
            Some(row) => {
                let record = row_to_record(&row)?;
                if record.tenant_id != tenant_id {
                    return Err(PaymentStoreError::TenantIsolation);
                }
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn update(&self, record: &PaymentStatusRecord) -> Result<(), PaymentStoreError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let row = sqlx::query("SELECT * FROM payment_records WHERE payment_id = $1 FOR UPDATE")
            .bind(record.payment_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_err)?;

        let row = row.ok_or(PaymentStoreError::NotFound(record.payment_id))?;
        let existing = row_to_record(&row)?;

        if existing.tenant_id != record.tenant_id {
            return Err(PaymentStoreError::TenantIsolation);
        }
        if existing.state.is_terminal() && existing.state != record.state {
            return Err(PaymentStoreError::TerminalStateImmutable(record.payment_id));
        }

        sqlx::query(
            r#"
            UPDATE payment_records
            SET state = $2,
                poll_attempts = $3,
                next_poll_at = $4,
                last_error = $5
            WHERE payment_id = $1
            "#,
        )
        .bind(record.payment_id.as_uuid())
        .bind(record.state.as_str())
        .bind(record.poll_attempts as i32)
        .bind(record.next_poll_at)
        .bind(record.last_error.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }
}

fn storage_err(e: impl std::fmt::Display) -> PaymentStoreError {
    PaymentStoreError::Storage(e.to_string())
}

fn row_to_record(row: &PgRow) -> Result<PaymentStatusRecord, PaymentStoreError> {
    let state: String = row.try_get("state").map_err(storage_err)?;
    let state: PaymentState = state.parse().map_err(storage_err)?;

    Ok(PaymentStatusRecord {
        payment_id: PaymentId::from_uuid(row.try_get("payment_id").map_err(storage_err)?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(storage_err)?),
        gateway: row.try_get("gateway").map_err(storage_err)?,
        state,
        poll_attempts: row.try_get::<i32, _>("poll_attempts").map_err(storage_err)? as u32,
        next_poll_at: row.try_get::<DateTime<Utc>, _>("next_poll_at").map_err(storage_err)?,
        created_at: row.try_get("created_at").map_err(storage_err)?,
        expires_at: row.try_get("expires_at").map_err(storage_err)?,
        last_error: row.try_get("last_error").map_err(storage_err)?,
    })
}
