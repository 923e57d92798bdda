//! Infrastructure wiring: job store, payment gateway, lease sweeper.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use totem_payments::{
    HttpPaymentGateway, InMemoryPaymentStore, PaymentGateway, PaymentService, PaymentStore,
    PgPaymentStore, ScriptedGateway,
};
use totem_queue::{InMemoryJobStore, JobStore, LeaseSweeper, PgJobStore};

pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 10_000;
const PAYMENT_POLL_INTERVAL: Duration = Duration::from_secs(3);

pub struct AppServices {
    pub jobs: Arc<dyn JobStore>,
    pub payments: PaymentService,
}

/// Build services from the environment and start the lease sweeper.
///
/// `DATABASE_URL` selects the Postgres store; without it everything runs in
/// memory (dev mode). `GATEWAY_URL`/`GATEWAY_API_KEY` select the real payment
/// gateway; without them charges run against the scripted gateway.
pub async fn build_services() -> anyhow::Result<Arc<AppServices>> {
    let (jobs, payment_store): (Arc<dyn JobStore>, Arc<dyn PaymentStore>) =
        match std::env::var("DATABASE_URL") {
            Ok(url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(16)
                    .connect(&url)
                    .await
                    .context("failed to connect to DATABASE_URL")?;

                let jobs = PgJobStore::new(pool.clone());
                jobs.ensure_schema()
                    .await
                    .context("failed to ensure print_jobs schema")?;

                let payments = PgPaymentStore::new(pool);
                payments
                    .ensure_schema()
                    .await
                    .context("failed to ensure payment_records schema")?;

                tracing::info!("using postgres stores");
                (Arc::new(jobs), Arc::new(payments))
            }
            Err(_) => {
                tracing::warn!("DATABASE_URL not set; using in-memory stores");
                (
                    Arc::new(InMemoryJobStore::new()),
                    Arc::new(InMemoryPaymentStore::new()),
                )
            }
        };

    let gateway: Arc<dyn PaymentGateway> = match (
        std::env::var("GATEWAY_URL"),
        std::env::var("GATEWAY_API_KEY"),
    ) {
        (Ok(url), Ok(key)) => Arc::new(HttpPaymentGateway::new(url, key)),
        _ => {
            tracing::warn!("GATEWAY_URL/GATEWAY_API_KEY not set; using scripted payment gateway");
            Arc::new(ScriptedGateway::new())
        }
    };

    let payments = PaymentService::new(payment_store, gateway, "asaas", PAYMENT_POLL_INTERVAL);

    let sweep_interval = std::env::var("SWEEP_INTERVAL_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_MS);
    LeaseSweeper::new(jobs.clone(), Duration::from_millis(sweep_interval)).start();

    Ok(Arc::new(AppServices { jobs, payments }))
}

/// In-memory services for tests: no environment, fast sweep, scripted
/// gateway.
pub fn build_test_services(sweep_interval: Duration) -> Arc<AppServices> {
    let jobs: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let payments = PaymentService::new(
        Arc::new(InMemoryPaymentStore::new()),
        Arc::new(ScriptedGateway::new()),
        "asaas",
        Duration::from_millis(25),
    );

    LeaseSweeper::new(jobs.clone(), sweep_interval).start();

    Arc::new(AppServices { jobs, payments })
}
