//! In-memory job store.
//!
//! Intended for tests/dev and single-node deployments without Postgres. The
//! per-job transition runs under the map's write lock, and every committed
//! transition bumps the job's version, mirroring the compare-and-swap
//! discipline the Postgres store gets from row locking.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use totem_core::{AttemptOutcome, AttemptToken, JobId, TenantId, TerminalId};

use crate::claim::{ClaimedJob, ReportDisposition};
use crate::job::{JobState, NewPrintJob, PrintJob};
use crate::store::{JobStore, JobStoreError};

#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, PrintJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn with_job<T>(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        f: impl FnOnce(&mut PrintJob) -> T,
    ) -> Result<T, JobStoreError> {
        let mut jobs = self
            .jobs
            .write()
            .map_err(|_| JobStoreError::Storage("lock poisoned".to_string()))?;

        let job = jobs.get_mut(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        if job.tenant_id != tenant_id {
            return Err(JobStoreError::TenantIsolation);
        }
        Ok(f(job))
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, req: NewPrintJob) -> Result<JobId, JobStoreError> {
        let job = PrintJob::new(req, Utc::now());
        let id = job.id;

        let mut jobs = self
            .jobs
            .write()
            .map_err(|_| JobStoreError::Storage("lock poisoned".to_string()))?;
        jobs.insert(id, job);
        Ok(id)
    }

    async fn claim_next(
        &self,
        tenant_id: TenantId,
        terminal_id: &TerminalId,
        lease: chrono::Duration,
    ) -> Result<Option<ClaimedJob>, JobStoreError> {
        let mut jobs = self
            .jobs
            .write()
            .map_err(|_| JobStoreError::Storage("lock poisoned".to_string()))?;

        // Oldest pending job for this terminal wins (FIFO per terminal).
        let next = jobs
            .values()
            .filter(|j| {
                j.state == JobState::Pending
                    && j.tenant_id == tenant_id
                    && &j.terminal_id == terminal_id
            })
            .min_by_key(|j| (j.created_at, j.id.as_uuid().to_owned()))
            .map(|j| j.id);

        let Some(id) = next else {
            return Ok(None);
        };

        let job = jobs
            .get_mut(&id)
            .expect("selected id exists under the same write lock");
        job.grant_claim(Utc::now(), lease);
        Ok(Some(ClaimedJob::from_job(job)))
    }

    async fn begin(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        token: AttemptToken,
    ) -> Result<ReportDisposition, JobStoreError> {
        self.with_job(tenant_id, job_id, |job| job.mark_printing(token, Utc::now()))
    }

    async fn report_result(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        token: AttemptToken,
        outcome: AttemptOutcome,
    ) -> Result<ReportDisposition, JobStoreError> {
        self.with_job(tenant_id, job_id, |job| {
            job.apply_report(token, &outcome, Utc::now())
        })
    }

    async fn reclaim_expired(&self, now: DateTime<Utc>) -> Result<Vec<JobId>, JobStoreError> {
        let mut jobs = self
            .jobs
            .write()
            .map_err(|_| JobStoreError::Storage("lock poisoned".to_string()))?;

        let mut swept = Vec::new();
        for job in jobs.values_mut() {
            if job.sweep_expired(now) {
                swept.push(job.id);
            }
        }
        Ok(swept)
    }

    async fn get(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
    ) -> Result<Option<PrintJob>, JobStoreError> {
        let jobs = self
            .jobs
            .read()
            .map_err(|_| JobStoreError::Storage("lock poisoned".to_string()))?;

        match jobs.get(&job_id) {
            Some(job) if job.tenant_id == tenant_id => Ok(Some(job.clone())),
            Some(_) => Err(JobStoreError::TenantIsolation),
            None => Ok(None),
        }
    }

    async fn list_for_terminal(
        &self,
        tenant_id: TenantId,
        terminal_id: &TerminalId,
        limit: usize,
    ) -> Result<Vec<PrintJob>, JobStoreError> {
        let jobs = self
            .jobs
            .read()
            .map_err(|_| JobStoreError::Storage("lock poisoned".to_string()))?;

        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| j.tenant_id == tenant_id && &j.terminal_id == terminal_id)
            .cloned()
            .collect();

        result.sort_by_key(|j| j.created_at);
        result.truncate(limit);
        Ok(result)
    }
}
