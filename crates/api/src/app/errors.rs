use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use totem_payments::{PaymentError, PaymentStoreError};
use totem_queue::JobStoreError;

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn job_store_error_to_response(err: JobStoreError) -> axum::response::Response {
    match err {
        JobStoreError::NotFound(id) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("job {id} not found"))
        }
        JobStoreError::TenantIsolation => {
            json_error(StatusCode::FORBIDDEN, "tenant_isolation", "tenant isolation")
        }
        JobStoreError::Storage(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}

pub fn payment_error_to_response(err: PaymentError) -> axum::response::Response {
    match err {
        PaymentError::Forbidden => json_error(StatusCode::FORBIDDEN, "forbidden", "forbidden"),
        PaymentError::NotFound(id) => json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("payment {id} not found"),
        ),
        PaymentError::GatewayRejected(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "gateway_rejected", msg)
        }
        PaymentError::GatewayUnavailable(msg) => {
            json_error(StatusCode::BAD_GATEWAY, "gateway_unavailable", msg)
        }
        PaymentError::Store(PaymentStoreError::TenantIsolation) => {
            json_error(StatusCode::FORBIDDEN, "tenant_isolation", "tenant isolation")
        }
        PaymentError::Store(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}
