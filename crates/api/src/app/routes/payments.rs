//! Payment proxy endpoints.
//!
//! Capability checks live inside `PaymentService`; these handlers only map
//! transport shapes. An absent capability surfaces as 403, never as a retry.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use totem_core::PaymentId;

use crate::app::{errors, AppServices};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/appointments/:appointment_id/pix", post(create_pix))
        .route("/:payment_id", get(payment_status))
}

/// POST /payments/appointments/:appointment_id/pix — create a PIX charge and
/// start resolving its status in the background.
async fn create_pix(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(appointment_id): Path<String>,
) -> axum::response::Response {
    match services
        .payments
        .create_pix_for_appointment(principal.principal(), tenant.tenant_id(), &appointment_id)
        .await
    {
        Ok(charge) => (StatusCode::CREATED, Json(charge)).into_response(),
        Err(e) => errors::payment_error_to_response(e),
    }
}

/// GET /payments/:payment_id — current status record.
async fn payment_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(payment_id): Path<PaymentId>,
) -> axum::response::Response {
    match services
        .payments
        .payment_status(principal.principal(), tenant.tenant_id(), payment_id)
        .await
    {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => errors::payment_error_to_response(e),
    }
}
