//! Background lease sweeper.
//!
//! Periodically reverts jobs whose lease expired without a report, so an
//! agent that died mid-print cannot permanently orphan a job.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::store::JobStore;

/// Periodic `reclaim_expired` runner.
pub struct LeaseSweeper {
    store: Arc<dyn JobStore>,
    interval: Duration,
    shutdown: Arc<tokio::sync::Notify>,
}

impl LeaseSweeper {
    pub fn new(store: Arc<dyn JobStore>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            shutdown: Arc::new(tokio::sync::Notify::new()),
        }
    }

    /// Handle used to request graceful shutdown.
    pub fn shutdown_handle(&self) -> Arc<tokio::sync::Notify> {
        self.shutdown.clone()
    }

    /// Spawn the sweep loop.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        let store = self.store;
        let shutdown = self.shutdown;
        let interval = self.interval;

        tokio::spawn(async move {
            tracing::info!("lease sweeper started");

            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.notified() => {
                        tracing::info!("lease sweeper received shutdown signal");
                        break;
                    }
                    _ = tick.tick() => {
                        match store.reclaim_expired(Utc::now()).await {
                            Ok(swept) if swept.is_empty() => {}
                            Ok(swept) => {
                                tracing::info!(count = swept.len(), "reclaimed expired claims");
                            }
                            Err(err) => {
                                // Transient by policy; the next tick retries.
                                tracing::warn!(error = %err, "lease sweep failed");
                            }
                        }
                    }
                }
            }

            tracing::info!("lease sweeper stopped");
        })
    }
}
