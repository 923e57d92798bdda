//! The agent's polling loop.
//!
//! Single sequential cycle per terminal: claim, print, report. The first
//! tick is immediate; an empty queue sleeps one interval; consecutive
//! failures (infrastructure or printer) switch the sleep to capped
//! exponential backoff. Shutdown is only observed between cycles.

use std::time::Duration;

use totem_core::RetryPolicy;

use crate::client::{ClientError, QueueApi};
use crate::config::AgentConfig;
use crate::printer::PrintExecutor;
use crate::shutdown::ShutdownSignal;

/// What one cycle did, for pacing purposes.
enum Cycle {
    /// A job was claimed and its print confirmed; claim again immediately.
    Printed,
    /// Queue was empty; sleep one interval.
    Idle,
    /// Print failed or infrastructure misbehaved; sleep with backoff.
    Failed,
}

pub struct PollingLoop<C, P> {
    client: C,
    printer: P,
    interval: Duration,
    lease: Duration,
    backoff: RetryPolicy,
    /// Clamp on backoff growth (consecutive failures beyond this stop
    /// increasing the delay).
    backoff_clamp: u32,
    shutdown: ShutdownSignal,
}

impl<C: QueueApi, P: PrintExecutor> PollingLoop<C, P> {
    pub fn new(client: C, printer: P, interval: Duration, lease: Duration, max_retries: u32) -> Self {
        Self {
            client,
            printer,
            interval,
            lease,
            backoff: RetryPolicy::exponential(interval, Duration::from_secs(300)),
            backoff_clamp: max_retries.max(1),
            shutdown: ShutdownSignal::new(),
        }
    }

    pub fn from_config(client: C, printer: P, config: &AgentConfig) -> Self {
        Self::new(
            client,
            printer,
            config.polling_interval,
            config.lease_duration,
            config.max_retries,
        )
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Run until shutdown. Never panics on backend or printer trouble: the
    /// operator sees an idle agent, not a crash loop.
    pub async fn run(&self) {
        tracing::info!("polling loop started");
        let mut consecutive_failures: u32 = 0;

        loop {
            // Safe point: before claiming.
            if self.shutdown.is_triggered() {
                break;
            }

            let cycle = match self.client.claim_next(self.lease).await {
                Ok(Some(job)) => {
                    tracing::debug!(job_id = %job.id, attempt = job.attempt, "claimed job");
                    self.execute(job).await
                }
                Ok(None) => Cycle::Idle,
                Err(err) => {
                    self.log_client_error("claim", &err);
                    Cycle::Failed
                }
            };

            // Safe point: after the report (or the failed attempt at one).
            if self.shutdown.is_triggered() {
                break;
            }

            let sleep = match cycle {
                Cycle::Printed => {
                    consecutive_failures = 0;
                    // Drain the queue before going back to the tick cadence.
                    continue;
                }
                Cycle::Idle => {
                    consecutive_failures = 0;
                    self.interval
                }
                Cycle::Failed => {
                    consecutive_failures += 1;
                    let delay = self
                        .backoff
                        .delay_for_attempt(consecutive_failures.min(self.backoff_clamp));
                    tracing::debug!(
                        failures = consecutive_failures,
                        delay_ms = delay.as_millis() as u64,
                        "backing off"
                    );
                    delay
                }
            };

            tokio::select! {
                _ = self.shutdown.wait() => break,
                _ = tokio::time::sleep(sleep) => {}
            }
        }

        tracing::info!("polling loop stopped");
    }

    /// Drive one claimed job to a reported outcome.
    async fn execute(&self, job: totem_queue::ClaimedJob) -> Cycle {
        // Mark the job printing first so the backend can tell "handed to an
        // agent" from "at the printer".
        match self.client.begin(job.id, job.token).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(job_id = %job.id, "claim went stale before printing");
                return Cycle::Failed;
            }
            Err(err) => {
                // Outcome unknown: do not print. The lease sweep will
                // re-queue the attempt.
                self.log_client_error("begin", &err);
                return Cycle::Failed;
            }
        }

        let outcome = self.printer.print(&job.payload).await;
        let printed = matches!(outcome, crate::printer::PrintOutcome::Printed);

        match self
            .client
            .report(job.id, job.token, outcome.into_attempt_outcome())
            .await
        {
            Ok(true) => {
                if printed {
                    tracing::info!(job_id = %job.id, attempt = job.attempt, "receipt printed");
                    Cycle::Printed
                } else {
                    tracing::warn!(job_id = %job.id, attempt = job.attempt, "print attempt failed");
                    Cycle::Failed
                }
            }
            Ok(false) => {
                // Someone else is the owner of record now; their result wins.
                tracing::warn!(job_id = %job.id, "report rejected as stale");
                Cycle::Failed
            }
            Err(err) => {
                // A lost report is never success; the lease sweep resolves it.
                self.log_client_error("report", &err);
                Cycle::Failed
            }
        }
    }

    fn log_client_error(&self, op: &'static str, err: &ClientError) {
        match err {
            ClientError::Unauthorized => {
                tracing::error!(op, "backend rejected agent credential");
            }
            err => tracing::warn!(op, error = %err, "backend call failed"),
        }
    }
}
