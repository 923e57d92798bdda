//! Capability-gated payment service facade.
//!
//! Every entrypoint checks the caller's payment capability before touching
//! the gateway or the store; a missing capability is a `Forbidden` at the
//! boundary, never a retryable condition.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use chrono::Utc;

use totem_auth::{authorize, capability, Principal};
use totem_core::{PaymentId, TenantId};

use crate::error::PaymentError;
use crate::gateway::{CreatePixCharge, GatewayError, PaymentGateway, PixCharge};
use crate::record::PaymentStatusRecord;
use crate::resolver::PaymentStatusResolver;
use crate::store::PaymentStore;

/// How long a PIX charge stays collectable before the local record expires.
const DEFAULT_PAYMENT_TTL_MINUTES: i64 = 30;

#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    resolver: Arc<PaymentStatusResolver>,
    gateway_name: String,
    ttl: chrono::Duration,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        gateway_name: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        let resolver = Arc::new(PaymentStatusResolver::new(
            store.clone(),
            gateway.clone(),
            poll_interval,
        ));
        Self {
            store,
            gateway,
            resolver,
            gateway_name: gateway_name.into(),
            ttl: chrono::Duration::minutes(DEFAULT_PAYMENT_TTL_MINUTES),
        }
    }

    pub fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn resolver(&self) -> Arc<PaymentStatusResolver> {
        self.resolver.clone()
    }

    /// Create a PIX charge for an appointment and start resolving its status
    /// in the background.
    pub async fn create_pix_for_appointment(
        &self,
        principal: &Principal,
        tenant_id: TenantId,
        appointment_id: &str,
    ) -> Result<PixCharge, PaymentError> {
        authorize(principal, tenant_id, &capability::payments::CHARGE)
            .map_err(|_| PaymentError::Forbidden)?;

        let req = CreatePixCharge {
            tenant_id,
            appointment_id: appointment_id.to_string(),
        };

        let charge = self.gateway.create_pix_charge(&req).await.map_err(|e| match e {
            GatewayError::Rejected(msg) => PaymentError::GatewayRejected(msg),
            GatewayError::Transport(msg) => PaymentError::GatewayUnavailable(msg),
        })?;

        // A QR image the kiosk cannot render is a gateway defect; surface it
        // here instead of at the screen.
        base64::engine::general_purpose::STANDARD
            .decode(&charge.qr_code_image_base64)
            .map_err(|e| PaymentError::GatewayRejected(format!("invalid QR image: {e}")))?;

        let record = PaymentStatusRecord::new(
            charge.payment_id,
            tenant_id,
            self.gateway_name.clone(),
            Utc::now(),
            self.ttl,
        );
        self.store.insert(record).await?;

        let resolver = self.resolver.clone();
        let payment_id = charge.payment_id;
        tokio::spawn(async move {
            if let Err(err) = resolver.resolve(tenant_id, payment_id).await {
                tracing::error!(payment_id = %payment_id, error = %err, "payment resolution failed");
            }
        });

        tracing::info!(payment_id = %charge.payment_id, "created pix charge");
        Ok(charge)
    }

    /// Read the current status record for a payment.
    pub async fn payment_status(
        &self,
        principal: &Principal,
        tenant_id: TenantId,
        payment_id: PaymentId,
    ) -> Result<PaymentStatusRecord, PaymentError> {
        authorize(principal, tenant_id, &capability::payments::READ)
            .map_err(|_| PaymentError::Forbidden)?;

        self.store
            .get(tenant_id, payment_id)
            .await?
            .ok_or(PaymentError::NotFound(payment_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use totem_auth::{Capability, PrincipalId};

    use crate::gateway::{ChargeStatus, ScriptedGateway};
    use crate::record::PaymentState;
    use crate::store::InMemoryPaymentStore;

    fn service(gateway: Arc<ScriptedGateway>) -> (PaymentService, Arc<InMemoryPaymentStore>) {
        let store = InMemoryPaymentStore::arc();
        let svc = PaymentService::new(
            store.clone(),
            gateway,
            "asaas",
            Duration::from_millis(10),
        );
        (svc, store)
    }

    fn principal(tenant: TenantId, caps: &[&'static str]) -> Principal {
        Principal::new(
            PrincipalId::new(),
            tenant,
            caps.iter().map(|c| Capability::new(*c)).collect(),
        )
    }

    #[tokio::test]
    async fn create_requires_charge_capability() {
        let (svc, _) = service(Arc::new(ScriptedGateway::new()));
        let tenant = TenantId::new();

        let reader = principal(tenant, &["payments.read"]);
        let err = svc
            .create_pix_for_appointment(&reader, tenant, "appt-1")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Forbidden));
    }

    #[tokio::test]
    async fn status_requires_read_capability() {
        let (svc, _) = service(Arc::new(ScriptedGateway::new()));
        let tenant = TenantId::new();

        let nobody = principal(tenant, &[]);
        let err = svc
            .payment_status(&nobody, tenant, PaymentId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Forbidden));
    }

    #[tokio::test]
    async fn cross_tenant_token_is_forbidden() {
        let (svc, _) = service(Arc::new(ScriptedGateway::new()));
        let tenant = TenantId::new();

        let outsider = principal(TenantId::new(), &["*"]);
        let err = svc
            .create_pix_for_appointment(&outsider, tenant, "appt-1")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Forbidden));
    }

    #[tokio::test]
    async fn create_then_status_reflects_resolution() {
        let gateway = Arc::new(ScriptedGateway::new());
        let (svc, _) = service(gateway.clone());
        let tenant = TenantId::new();
        let operator = principal(tenant, &["payments.charge", "payments.read"]);

        let charge = svc
            .create_pix_for_appointment(&operator, tenant, "appt-42")
            .await
            .unwrap();
        assert_eq!(charge.status, ChargeStatus::Pending);
        assert!(!charge.qr_code_text.is_empty());

        gateway.script(charge.payment_id, [ChargeStatus::Confirmed]);

        // Give the background resolver a few poll intervals to converge.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let record = svc
            .payment_status(&operator, tenant, charge.payment_id)
            .await
            .unwrap();
        assert_eq!(record.state, PaymentState::Confirmed);
    }

    #[tokio::test]
    async fn status_of_unknown_payment_is_not_found() {
        let (svc, _) = service(Arc::new(ScriptedGateway::new()));
        let tenant = TenantId::new();
        let operator = principal(tenant, &["payments.read"]);

        let err = svc
            .payment_status(&operator, tenant, PaymentId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::NotFound(_)));
    }
}
