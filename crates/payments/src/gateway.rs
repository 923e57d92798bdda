//! Payment gateway boundary.
//!
//! Gateway-specific request/response modeling is out of scope; this trait is
//! the minimal surface the platform needs (create a PIX charge, read its
//! status). The HTTP implementation speaks a thin JSON dialect; the scripted
//! implementation backs tests and dev mode.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use totem_core::{PaymentId, TenantId};

/// Status of a charge as the gateway reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Pending,
    Confirmed,
    Expired,
    Failed,
}

/// Request to create a PIX charge for an appointment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePixCharge {
    pub tenant_id: TenantId,
    /// Appointment the charge pays for; opaque to the proxy.
    pub appointment_id: String,
}

/// A created PIX charge, QR code included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PixCharge {
    pub payment_id: PaymentId,
    pub qr_code_image_base64: String,
    pub qr_code_text: String,
    pub status: ChargeStatus,
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Could not reach the gateway or it answered garbage; retryable.
    #[error("gateway transport error: {0}")]
    Transport(String),

    /// The gateway understood and said no; not retryable.
    #[error("gateway rejected request: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_pix_charge(&self, req: &CreatePixCharge) -> Result<PixCharge, GatewayError>;

    async fn charge_status(&self, payment_id: PaymentId) -> Result<ChargeStatus, GatewayError>;
}

/// HTTP gateway client.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpPaymentGateway {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireCharge {
    payment_id: PaymentId,
    qr_code_image_base64: String,
    qr_code_text: String,
    status: ChargeStatus,
}

#[derive(Debug, Deserialize)]
struct WireStatus {
    status: ChargeStatus,
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_pix_charge(&self, req: &CreatePixCharge) -> Result<PixCharge, GatewayError> {
        let url = format!("{}/pix/charges", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(req)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if response.status().is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected(body));
        }

        let wire: WireCharge = response
            .error_for_status()
            .map_err(|e| GatewayError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(PixCharge {
            payment_id: wire.payment_id,
            qr_code_image_base64: wire.qr_code_image_base64,
            qr_code_text: wire.qr_code_text,
            status: wire.status,
        })
    }

    async fn charge_status(&self, payment_id: PaymentId) -> Result<ChargeStatus, GatewayError> {
        let url = format!("{}/pix/charges/{}", self.base_url, payment_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::Rejected(format!(
                "unknown charge {payment_id}"
            )));
        }

        let wire: WireStatus = response
            .error_for_status()
            .map_err(|e| GatewayError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(wire.status)
    }
}

/// Scripted in-memory gateway for tests and dev mode.
///
/// Status reads pop from a per-payment script; when the script runs dry the
/// last status repeats. `fail_next` injects transport errors.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    scripts: Mutex<HashMap<PaymentId, VecDeque<ChargeStatus>>>,
    last: Mutex<HashMap<PaymentId, ChargeStatus>>,
    fail_next: Mutex<u32>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the statuses the gateway will report for `payment_id`, in order.
    pub fn script(&self, payment_id: PaymentId, statuses: impl IntoIterator<Item = ChargeStatus>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(payment_id, statuses.into_iter().collect());
    }

    /// Make the next `n` status reads fail with a transport error.
    pub fn fail_next(&self, n: u32) {
        *self.fail_next.lock().unwrap() = n;
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_pix_charge(&self, _req: &CreatePixCharge) -> Result<PixCharge, GatewayError> {
        let payment_id = PaymentId::new();
        self.last
            .lock()
            .unwrap()
            .insert(payment_id, ChargeStatus::Pending);
        Ok(PixCharge {
            payment_id,
            qr_code_image_base64: "iVBORw0KGgo=".to_string(),
            qr_code_text: format!("00020126pix-{payment_id}"),
            status: ChargeStatus::Pending,
        })
    }

    async fn charge_status(&self, payment_id: PaymentId) -> Result<ChargeStatus, GatewayError> {
        {
            let mut fail = self.fail_next.lock().unwrap();
            if *fail > 0 {
                *fail -= 1;
                return Err(GatewayError::Transport("scripted outage".to_string()));
            }
        }

        if let Some(next) = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&payment_id)
            .and_then(|q| q.pop_front())
        {
            self.last.lock().unwrap().insert(payment_id, next);
            return Ok(next);
        }

        self.last
            .lock()
            .unwrap()
            .get(&payment_id)
            .copied()
            .ok_or_else(|| GatewayError::Rejected(format!("unknown charge {payment_id}")))
    }
}
