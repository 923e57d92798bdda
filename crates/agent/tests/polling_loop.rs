//! End-to-end polling loop behavior against an in-process queue store and a
//! scripted printer. Time is paused, so interval/backoff cadence is exact.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use totem_agent::{ClientError, PollingLoop, PrintErrorKind, PrintExecutor, PrintOutcome, QueueApi};
use totem_core::{AttemptOutcome, AttemptToken, JobId, TenantId, TerminalId};
use totem_queue::{ClaimedJob, InMemoryJobStore, JobState, JobStore, NewPrintJob};

fn terminal() -> TerminalId {
    TerminalId::new("kiosk-01").unwrap()
}

/// QueueApi implemented directly against the store, with an optional
/// scripted outage and a claim-attempt counter.
struct StoreApi {
    store: Arc<InMemoryJobStore>,
    tenant: TenantId,
    claims: AtomicU32,
    outage: AtomicU32,
}

impl StoreApi {
    fn new(store: Arc<InMemoryJobStore>, tenant: TenantId) -> Self {
        Self {
            store,
            tenant,
            claims: AtomicU32::new(0),
            outage: AtomicU32::new(0),
        }
    }

    fn claim_attempts(&self) -> u32 {
        self.claims.load(Ordering::SeqCst)
    }

    fn fail_forever(&self) {
        self.outage.store(u32::MAX, Ordering::SeqCst);
    }
}

#[async_trait]
impl QueueApi for StoreApi {
    async fn claim_next(&self, lease: Duration) -> Result<Option<ClaimedJob>, ClientError> {
        self.claims.fetch_add(1, Ordering::SeqCst);
        if self.outage.load(Ordering::SeqCst) > 0 {
            return Err(ClientError::Transport("scripted outage".to_string()));
        }

        self.store
            .claim_next(
                self.tenant,
                &terminal(),
                chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::seconds(90)),
            )
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    async fn begin(&self, job_id: JobId, token: AttemptToken) -> Result<bool, ClientError> {
        self.store
            .begin(self.tenant, job_id, token)
            .await
            .map(|d| d.is_applied())
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    async fn report(
        &self,
        job_id: JobId,
        token: AttemptToken,
        outcome: AttemptOutcome,
    ) -> Result<bool, ClientError> {
        self.store
            .report_result(self.tenant, job_id, token, outcome)
            .await
            .map(|d| d.is_applied())
            .map_err(|e| ClientError::Transport(e.to_string()))
    }
}

/// Printer that fails `failures` times, then succeeds forever.
struct FlakyPrinter {
    remaining_failures: AtomicU32,
    kind: PrintErrorKind,
}

impl FlakyPrinter {
    fn new(failures: u32, kind: PrintErrorKind) -> Self {
        Self {
            remaining_failures: AtomicU32::new(failures),
            kind,
        }
    }

    fn reliable() -> Self {
        Self::new(0, PrintErrorKind::DeviceBusy)
    }
}

#[async_trait]
impl PrintExecutor for FlakyPrinter {
    async fn print(&self, _payload: &serde_json::Value) -> PrintOutcome {
        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.store(remaining - 1, Ordering::SeqCst);
            PrintOutcome::Failed {
                kind: self.kind,
                message: "scripted failure".to_string(),
            }
        } else {
            PrintOutcome::Printed
        }
    }
}

fn receipt() -> serde_json::Value {
    serde_json::json!({"lines": ["CAFE TOTEM", "1x espresso", "total: 7.00"]})
}

async fn enqueue(store: &InMemoryJobStore, tenant: TenantId, max_retries: u32) -> JobId {
    store
        .enqueue(NewPrintJob {
            tenant_id: tenant,
            terminal_id: terminal(),
            payload: receipt(),
            max_retries,
        })
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn empty_queue_polls_on_the_configured_interval() {
    let store = InMemoryJobStore::arc();
    let tenant = TenantId::new();
    let api = Arc::new(StoreApi::new(store, tenant));

    let polling = PollingLoop::new(
        api.clone(),
        Arc::new(FlakyPrinter::reliable()),
        Duration::from_millis(3000),
        Duration::from_secs(90),
        3,
    );
    let shutdown = polling.shutdown_signal();
    let handle = tokio::spawn(async move { polling.run().await });

    tokio::time::sleep(Duration::from_secs(10)).await;
    shutdown.trigger();
    handle.await.unwrap();

    // First tick immediate, then every 3 s: expect 3-4 attempts in 10 s.
    let attempts = api.claim_attempts();
    assert!(
        (3..=4).contains(&attempts),
        "expected 3-4 claim attempts in 10s, got {attempts}"
    );
}

#[tokio::test(start_paused = true)]
async fn busy_printer_retries_to_success_with_attempt_count_four() {
    let store = InMemoryJobStore::arc();
    let tenant = TenantId::new();
    let api = Arc::new(StoreApi::new(store.clone(), tenant));
    let id = enqueue(&store, tenant, 3).await;

    let polling = PollingLoop::new(
        api.clone(),
        Arc::new(FlakyPrinter::new(3, PrintErrorKind::DeviceBusy)),
        Duration::from_millis(3000),
        Duration::from_secs(90),
        3,
    );
    let shutdown = polling.shutdown_signal();
    let handle = tokio::spawn(async move { polling.run().await });

    // Three backoff rounds plus the final attempt fit well inside a minute
    // of virtual time.
    tokio::time::sleep(Duration::from_secs(60)).await;
    shutdown.trigger();
    handle.await.unwrap();

    let job = store.get(tenant, id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Succeeded);
    assert_eq!(job.attempt_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn malformed_payload_dead_ends_without_burning_budget() {
    let store = InMemoryJobStore::arc();
    let tenant = TenantId::new();
    let api = Arc::new(StoreApi::new(store.clone(), tenant));
    let id = enqueue(&store, tenant, 5).await;

    let polling = PollingLoop::new(
        api.clone(),
        Arc::new(FlakyPrinter::new(u32::MAX, PrintErrorKind::MalformedPayload)),
        Duration::from_millis(3000),
        Duration::from_secs(90),
        3,
    );
    let shutdown = polling.shutdown_signal();
    let handle = tokio::spawn(async move { polling.run().await });

    tokio::time::sleep(Duration::from_secs(30)).await;
    shutdown.trigger();
    handle.await.unwrap();

    let job = store.get(tenant, id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::FailedPermanent);
    assert_eq!(job.attempt_count(), 1, "no retry after a permanent failure");
}

#[tokio::test(start_paused = true)]
async fn backend_outage_backs_off_instead_of_hammering() {
    let store = InMemoryJobStore::arc();
    let tenant = TenantId::new();
    let api = Arc::new(StoreApi::new(store, tenant));
    api.fail_forever();

    let polling = PollingLoop::new(
        api.clone(),
        Arc::new(FlakyPrinter::reliable()),
        Duration::from_millis(3000),
        Duration::from_secs(90),
        3,
    );
    let shutdown = polling.shutdown_signal();
    let handle = tokio::spawn(async move { polling.run().await });

    tokio::time::sleep(Duration::from_secs(60)).await;
    shutdown.trigger();
    handle.await.unwrap();

    // Fixed-interval polling would attempt ~20 times in 60 s; capped
    // exponential backoff (3s, 6s, 12s, 12s, ...) stays well under that.
    let attempts = api.claim_attempts();
    assert!(
        (2..=8).contains(&attempts),
        "expected backoff-paced attempts, got {attempts}"
    );
}

#[tokio::test(start_paused = true)]
async fn drains_queued_jobs_without_waiting_for_ticks() {
    let store = InMemoryJobStore::arc();
    let tenant = TenantId::new();
    let api = Arc::new(StoreApi::new(store.clone(), tenant));

    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(enqueue(&store, tenant, 0).await);
    }

    let polling = PollingLoop::new(
        api.clone(),
        Arc::new(FlakyPrinter::reliable()),
        Duration::from_millis(3000),
        Duration::from_secs(90),
        3,
    );
    let shutdown = polling.shutdown_signal();
    let handle = tokio::spawn(async move { polling.run().await });

    // Well under one polling interval: the whole burst must already be done.
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.trigger();
    handle.await.unwrap();

    for id in ids {
        let job = store.get(tenant, id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Succeeded);
    }
}

#[tokio::test(start_paused = true)]
async fn shutdown_is_honored_between_cycles() {
    let store = InMemoryJobStore::arc();
    let tenant = TenantId::new();
    let api = Arc::new(StoreApi::new(store, tenant));

    let polling = PollingLoop::new(
        api.clone(),
        Arc::new(FlakyPrinter::reliable()),
        Duration::from_millis(3000),
        Duration::from_secs(90),
        3,
    );
    let shutdown = polling.shutdown_signal();
    let handle = tokio::spawn(async move { polling.run().await });

    // Let the loop park in its idle sleep, then stop it.
    tokio::time::sleep(Duration::from_millis(10)).await;
    shutdown.trigger();
    handle.await.unwrap();

    let before = api.claim_attempts();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(api.claim_attempts(), before, "no claims after shutdown");
}
