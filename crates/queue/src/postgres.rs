//! Postgres-backed job store.
//!
//! The claim is a single `UPDATE ... FROM (SELECT ... FOR UPDATE SKIP LOCKED)`
//! statement, so two agents racing for the same job are serialized by the row
//! lock and exactly one wins. `begin`/`report_result` load the row `FOR
//! UPDATE` inside a transaction and apply the same transition code the
//! in-memory store uses, keeping the state machine in one place.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use totem_core::{
    AttemptBudget, AttemptOutcome, AttemptToken, JobId, Lease, TenantId, TerminalId,
};

use crate::claim::{ClaimedJob, ReportDisposition};
use crate::job::{JobState, NewPrintJob, PrintJob};
use crate::store::{JobStore, JobStoreError};

#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `print_jobs` table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), JobStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS print_jobs (
                id               UUID PRIMARY KEY,
                tenant_id        UUID NOT NULL,
                terminal_id      TEXT NOT NULL,
                payload          JSONB NOT NULL,
                state            TEXT NOT NULL,
                attempts         INTEGER NOT NULL DEFAULT 0,
                max_retries      INTEGER NOT NULL,
                claim_token      UUID NULL,
                claimed_at       TIMESTAMPTZ NULL,
                claim_expires_at TIMESTAMPTZ NULL,
                last_error       TEXT NULL,
                version          BIGINT NOT NULL DEFAULT 0,
                created_at       TIMESTAMPTZ NOT NULL,
                updated_at       TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_print_jobs_claimable \
             ON print_jobs (tenant_id, terminal_id, created_at) WHERE state = 'pending'",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_print_jobs_leased \
             ON print_jobs (claim_expires_at) WHERE state IN ('claimed', 'printing')",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    /// Load a row for mutation, apply a transition, and write it back.
    async fn transition(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        apply: impl FnOnce(&mut PrintJob) -> ReportDisposition + Send,
    ) -> Result<ReportDisposition, JobStoreError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let row = sqlx::query("SELECT * FROM print_jobs WHERE id = $1 FOR UPDATE")
            .bind(job_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_err)?;

        let row = row.ok_or(JobStoreError::NotFound(job_id))?;
        let mut job = row_to_job(&row)?;
        if job.tenant_id != tenant_id {
            return Err(JobStoreError::TenantIsolation);
        }

        let disposition = apply(&mut job);
        if disposition.is_applied() {
            write_job(&mut tx, &job).await?;
            tx.commit().await.map_err(storage_err)?;
        }

        Ok(disposition)
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn enqueue(&self, req: NewPrintJob) -> Result<JobId, JobStoreError> {
        let job = PrintJob::new(req, Utc::now());

        sqlx::query(
            r#"
            INSERT INTO print_jobs (
                id, tenant_id, terminal_id, payload, state,
                attempts, max_retries, last_error, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NULL, $8, $9, $9)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.tenant_id.as_uuid())
        .bind(job.terminal_id.as_str())
        .bind(&job.payload)
        .bind(job.state.as_str())
        .bind(job.budget.attempts as i32)
        .bind(job.budget.max_retries as i32)
        .bind(job.version as i64)
        .bind(job.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(job.id)
    }

    async fn claim_next(
        &self,
        tenant_id: TenantId,
        terminal_id: &TerminalId,
        lease: chrono::Duration,
    ) -> Result<Option<ClaimedJob>, JobStoreError> {
        let now = Utc::now();
        let token = AttemptToken::new();

        let row = sqlx::query(
            r#"
            WITH next AS (
                SELECT id FROM print_jobs
                WHERE tenant_id = $1 AND terminal_id = $2 AND state = 'pending'
                ORDER BY created_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE print_jobs j
            SET state = 'claimed',
                attempts = j.attempts + 1,
                claim_token = $3,
                claimed_at = $4,
                claim_expires_at = $5,
                version = j.version + 1,
                updated_at = $4
            FROM next
            WHERE j.id = next.id
            RETURNING j.*
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(terminal_id.as_str())
        .bind(token.as_uuid())
        .bind(now)
        .bind(now + lease)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        match row {
            Some(row) => {
                let job = row_to_job(&row)?;
                Ok(Some(ClaimedJob::from_job(&job)))
            }
            None => Ok(None),
        }
    }

    async fn begin(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        token: AttemptToken,
    ) -> Result<ReportDisposition, JobStoreError> {
        self.transition(tenant_id, job_id, move |job| {
            job.mark_printing(token, Utc::now())
        })
        .await
    }

    async fn report_result(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        token: AttemptToken,
        outcome: AttemptOutcome,
    ) -> Result<ReportDisposition, JobStoreError> {
        self.transition(tenant_id, job_id, move |job| {
            job.apply_report(token, &outcome, Utc::now())
        })
        .await
    }

    async fn reclaim_expired(&self, now: DateTime<Utc>) -> Result<Vec<JobId>, JobStoreError> {
        let rows = sqlx::query(
            r#"
            UPDATE print_jobs
            SET state = CASE
                    WHEN attempts <= max_retries THEN 'pending'
                    ELSE 'failed_permanent'
                END,
                claim_token = NULL,
                claimed_at = NULL,
                claim_expires_at = NULL,
                last_error = 'claim lease expired',
                version = version + 1,
                updated_at = $1
            WHERE state IN ('claimed', 'printing') AND claim_expires_at <= $1
            RETURNING id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter()
            .map(|row| {
                row.try_get::<uuid::Uuid, _>("id")
                    .map(JobId::from_uuid)
                    .map_err(storage_err)
            })
            .collect()
    }

    async fn get(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
    ) -> Result<Option<PrintJob>, JobStoreError> {
        let row = sqlx::query("SELECT * FROM print_jobs WHERE id = $1")
            .bind(job_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        match row {
            Some(row) => {
                let job = row_to_job(&row)?;
                if job.tenant_id != tenant_id {
                    return Err(JobStoreError::TenantIsolation);
                }
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn list_for_terminal(
        &self,
        tenant_id: TenantId,
        terminal_id: &TerminalId,
        limit: usize,
    ) -> Result<Vec<PrintJob>, JobStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM print_jobs
            WHERE tenant_id = $1 AND terminal_id = $2
            ORDER BY created_at
            LIMIT $3
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(terminal_id.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter().map(row_to_job).collect()
    }
}

fn storage_err(e: impl std::fmt::Display) -> JobStoreError {
    JobStoreError::Storage(e.to_string())
}

/// Write every mutable column of a job back to its row.
async fn write_job(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    job: &PrintJob,
) -> Result<(), JobStoreError> {
    sqlx::query(
        r#"
        UPDATE print_jobs
        SET state = $2,
            attempts = $3,
            claim_token = $4,
            claimed_at = $5,
            claim_expires_at = $6,
            last_error = $7,
            version = $8,
            updated_at = $9
        WHERE id = $1
        "#,
    )
    .bind(job.id.as_uuid())
    .bind(job.state.as_str())
    .bind(job.budget.attempts as i32)
    .bind(job.lease.map(|l| *l.token.as_uuid()))
    .bind(job.lease.map(|l| l.granted_at))
    .bind(job.lease.map(|l| l.expires_at))
    .bind(job.last_error.as_deref())
    .bind(job.version as i64)
    .bind(job.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(storage_err)?;

    Ok(())
}

fn row_to_job(row: &PgRow) -> Result<PrintJob, JobStoreError> {
    let state: String = row.try_get("state").map_err(storage_err)?;
    let state: JobState = state.parse().map_err(storage_err)?;

    let claim_token: Option<uuid::Uuid> = row.try_get("claim_token").map_err(storage_err)?;
    let claimed_at: Option<DateTime<Utc>> = row.try_get("claimed_at").map_err(storage_err)?;
    let claim_expires_at: Option<DateTime<Utc>> =
        row.try_get("claim_expires_at").map_err(storage_err)?;

    let lease = match (claim_token, claimed_at, claim_expires_at) {
        (Some(token), Some(granted_at), Some(expires_at)) => Some(Lease {
            token: AttemptToken::from_uuid(token),
            granted_at,
            expires_at,
        }),
        _ => None,
    };

    let terminal_id: String = row.try_get("terminal_id").map_err(storage_err)?;

    Ok(PrintJob {
        id: JobId::from_uuid(row.try_get("id").map_err(storage_err)?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(storage_err)?),
        terminal_id: terminal_id.parse().map_err(storage_err)?,
        payload: row.try_get("payload").map_err(storage_err)?,
        state,
        budget: AttemptBudget {
            attempts: row.try_get::<i32, _>("attempts").map_err(storage_err)? as u32,
            max_retries: row.try_get::<i32, _>("max_retries").map_err(storage_err)? as u32,
        },
        lease,
        last_error: row.try_get("last_error").map_err(storage_err)?,
        version: row.try_get::<i64, _>("version").map_err(storage_err)? as u64,
        created_at: row.try_get("created_at").map_err(storage_err)?,
        updated_at: row.try_get("updated_at").map_err(storage_err)?,
    })
}
