//! Asynchronous payment status resolution.
//!
//! Claim-less sibling of the print agent's polling loop: poll the gateway on
//! a schedule, back off on transport faults, and converge on a terminal
//! state or the record's hard expiry. Shutdown is honored only at cycle
//! boundaries; an in-flight poll is never interpreted by its absence.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use totem_core::{PaymentId, RetryPolicy, TenantId};

use crate::error::PaymentError;
use crate::gateway::{GatewayError, PaymentGateway};
use crate::record::PaymentState;
use crate::store::PaymentStore;

pub struct PaymentStatusResolver {
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    poll_interval: Duration,
    retry: RetryPolicy,
    shutdown: Arc<tokio::sync::Notify>,
}

impl PaymentStatusResolver {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            poll_interval,
            retry: RetryPolicy::exponential(poll_interval, Duration::from_secs(60)),
            shutdown: Arc::new(tokio::sync::Notify::new()),
        }
    }

    pub fn shutdown_handle(&self) -> Arc<tokio::sync::Notify> {
        self.shutdown.clone()
    }

    /// Drive one payment record until it is terminal, it passes its hard
    /// expiry, or shutdown is requested. Returns the state it left the
    /// record in.
    pub async fn resolve(
        &self,
        tenant_id: TenantId,
        payment_id: PaymentId,
    ) -> Result<PaymentState, PaymentError> {
        let mut consecutive_failures = 0u32;

        loop {
            let mut record = self
                .store
                .get(tenant_id, payment_id)
                .await?
                .ok_or(PaymentError::NotFound(payment_id))?;

            if record.state.is_terminal() {
                return Ok(record.state);
            }

            let now = Utc::now();
            if record.mark_expired_if_due(now) {
                self.store.update(&record).await?;
                tracing::info!(payment_id = %payment_id, "payment expired before confirmation");
                return Ok(PaymentState::Expired);
            }

            match self.gateway.charge_status(payment_id).await {
                Ok(status) => {
                    consecutive_failures = 0;
                    record.apply_gateway_status(status);
                    record.schedule_next_poll(
                        now + chrono::Duration::from_std(self.poll_interval)
                            .unwrap_or_else(|_| chrono::Duration::seconds(3)),
                    );
                    self.store.update(&record).await?;

                    if record.state.is_terminal() {
                        tracing::info!(
                            payment_id = %payment_id,
                            state = %record.state,
                            polls = record.poll_attempts,
                            "payment reached terminal state"
                        );
                        return Ok(record.state);
                    }
                }
                Err(GatewayError::Rejected(msg)) => {
                    record.record_poll_failure(&msg);
                    record.mark_failed(&msg);
                    self.store.update(&record).await?;
                    tracing::warn!(payment_id = %payment_id, error = %msg, "gateway rejected status poll");
                    return Ok(PaymentState::Failed);
                }
                Err(GatewayError::Transport(msg)) => {
                    consecutive_failures += 1;
                    record.record_poll_failure(&msg);
                    let delay = self.retry.delay_for_attempt(consecutive_failures);
                    record.schedule_next_poll(now + chrono::Duration::from_std(delay)
                        .unwrap_or_else(|_| chrono::Duration::seconds(3)));
                    self.store.update(&record).await?;
                    tracing::warn!(
                        payment_id = %payment_id,
                        failures = consecutive_failures,
                        "gateway unreachable, backing off"
                    );
                }
            }

            // Sleep until the next poll is due (or the hard expiry, whichever
            // comes first). Shutdown is only observed here, between cycles.
            let now = Utc::now();
            let wake = record.next_poll_at.min(record.expires_at);
            let sleep = (wake - now).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = self.shutdown.notified() => {
                    tracing::info!(payment_id = %payment_id, "resolver received shutdown signal");
                    return Ok(record.state);
                }
                _ = tokio::time::sleep(sleep) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ChargeStatus, ScriptedGateway};
    use crate::record::PaymentStatusRecord;
    use crate::store::InMemoryPaymentStore;

    fn resolver_with(
        store: Arc<InMemoryPaymentStore>,
        gateway: Arc<ScriptedGateway>,
    ) -> PaymentStatusResolver {
        PaymentStatusResolver::new(store, gateway, Duration::from_millis(10))
    }

    async fn seed(
        store: &InMemoryPaymentStore,
        ttl: chrono::Duration,
    ) -> (TenantId, PaymentId) {
        let tenant = TenantId::new();
        let record =
            PaymentStatusRecord::new(PaymentId::new(), tenant, "asaas", Utc::now(), ttl);
        let id = record.payment_id;
        store.insert(record).await.unwrap();
        (tenant, id)
    }

    #[tokio::test]
    async fn converges_on_confirmation() {
        let store = InMemoryPaymentStore::arc();
        let gateway = Arc::new(ScriptedGateway::new());
        let (tenant, id) = seed(&store, chrono::Duration::minutes(5)).await;

        gateway.script(
            id,
            [ChargeStatus::Pending, ChargeStatus::Pending, ChargeStatus::Confirmed],
        );

        let resolver = resolver_with(store.clone(), gateway);
        let state = resolver.resolve(tenant, id).await.unwrap();

        assert_eq!(state, PaymentState::Confirmed);
        let record = store.get(tenant, id).await.unwrap().unwrap();
        assert_eq!(record.state, PaymentState::Confirmed);
        assert_eq!(record.poll_attempts, 3);
    }

    #[tokio::test]
    async fn stops_at_hard_expiry_instead_of_polling_forever() {
        let store = InMemoryPaymentStore::arc();
        let gateway = Arc::new(ScriptedGateway::new());
        // Expires ~4 poll intervals in; the script never goes terminal.
        let (tenant, id) = seed(&store, chrono::Duration::milliseconds(40)).await;

        gateway.script(id, std::iter::repeat(ChargeStatus::Pending).take(1000));

        let resolver = resolver_with(store.clone(), gateway);
        let state = resolver.resolve(tenant, id).await.unwrap();

        assert_eq!(state, PaymentState::Expired);
        let record = store.get(tenant, id).await.unwrap().unwrap();
        assert_eq!(record.state, PaymentState::Expired);
        assert!(record.poll_attempts < 1000, "resolver must stop polling");
    }

    #[tokio::test]
    async fn transport_faults_back_off_then_converge() {
        let store = InMemoryPaymentStore::arc();
        let gateway = Arc::new(ScriptedGateway::new());
        let (tenant, id) = seed(&store, chrono::Duration::minutes(5)).await;

        gateway.script(id, [ChargeStatus::Confirmed]);
        gateway.fail_next(2);

        let resolver = resolver_with(store.clone(), gateway);
        let state = resolver.resolve(tenant, id).await.unwrap();

        assert_eq!(state, PaymentState::Confirmed);
        let record = store.get(tenant, id).await.unwrap().unwrap();
        // Two failed polls plus the successful one.
        assert_eq!(record.poll_attempts, 3);
    }

    #[tokio::test]
    async fn gateway_rejection_is_terminal_failure() {
        let store = InMemoryPaymentStore::arc();
        let gateway = Arc::new(ScriptedGateway::new());
        let (tenant, id) = seed(&store, chrono::Duration::minutes(5)).await;
        // No script and no created charge: the gateway does not know the id.

        let resolver = resolver_with(store.clone(), gateway);
        let state = resolver.resolve(tenant, id).await.unwrap();

        assert_eq!(state, PaymentState::Failed);
        let record = store.get(tenant, id).await.unwrap().unwrap();
        assert!(record.last_error.is_some());
    }

    #[tokio::test]
    async fn already_terminal_record_returns_immediately() {
        let store = InMemoryPaymentStore::arc();
        let gateway = Arc::new(ScriptedGateway::new());
        let (tenant, id) = seed(&store, chrono::Duration::minutes(5)).await;

        let mut record = store.get(tenant, id).await.unwrap().unwrap();
        record.apply_gateway_status(ChargeStatus::Confirmed);
        store.update(&record).await.unwrap();

        let resolver = resolver_with(store.clone(), gateway);
        let state = resolver.resolve(tenant, id).await.unwrap();
        assert_eq!(state, PaymentState::Confirmed);
    }
}
