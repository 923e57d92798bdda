//! Print queue endpoints: the producer surface used by the checkout flow and
//! the claim/report protocol consumed by terminal agents.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use totem_core::{JobId, TerminalId};
use totem_queue::{NewPrintJob, ReportDisposition};

use crate::app::dto::{
    job_to_json, BeginRequest, ClaimRequest, EnqueueRequest, EnqueueResponse, ReportRequest,
    DEFAULT_MAX_RETRIES,
};
use crate::app::{errors, AppServices};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

/// Bounds on the agent-requested lease, so a typo in one terminal's config
/// cannot park jobs for an hour.
const MIN_LEASE_MS: u64 = 5_000;
const MAX_LEASE_MS: u64 = 600_000;

pub fn router() -> Router {
    Router::new()
        .route("/jobs", post(enqueue))
        .route("/claim", post(claim))
        .route("/:job_id/begin", post(begin))
        .route("/:job_id/report", post(report))
        .route("/terminals/:terminal_id/jobs", get(list_for_terminal))
}

/// POST /queue/jobs — accept a print request.
async fn enqueue(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<EnqueueRequest>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&tenant, &principal, &totem_auth::capability::queue::ENQUEUE) {
        return resp;
    }

    let req = NewPrintJob {
        tenant_id: tenant.tenant_id(),
        terminal_id: body.terminal_id,
        payload: body.payload,
        max_retries: body.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
    };

    match services.jobs.enqueue(req).await {
        Ok(job_id) => {
            (StatusCode::CREATED, Json(EnqueueResponse { job_id })).into_response()
        }
        Err(e) => errors::job_store_error_to_response(e),
    }
}

/// POST /queue/claim — hand the oldest pending job for the terminal to the
/// calling agent. 204 when there is nothing to do.
async fn claim(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<ClaimRequest>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&tenant, &principal, &totem_auth::capability::queue::WORK) {
        return resp;
    }

    let lease_ms = body.lease_duration_ms.clamp(MIN_LEASE_MS, MAX_LEASE_MS);
    let lease = chrono::Duration::milliseconds(lease_ms as i64);

    match services
        .jobs
        .claim_next(tenant.tenant_id(), &body.terminal_id, lease)
        .await
    {
        Ok(Some(job)) => (StatusCode::OK, Json(job)).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::job_store_error_to_response(e),
    }
}

/// POST /queue/:job_id/begin — the agent is about to drive the printer.
async fn begin(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(job_id): Path<JobId>,
    Json(body): Json<BeginRequest>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&tenant, &principal, &totem_auth::capability::queue::WORK) {
        return resp;
    }

    match services
        .jobs
        .begin(tenant.tenant_id(), job_id, body.attempt_token)
        .await
    {
        Ok(disposition) => disposition_to_response(disposition),
        Err(e) => errors::job_store_error_to_response(e),
    }
}

/// POST /queue/:job_id/report — apply an attempt outcome. 409 when the
/// presented token is no longer the claim of record.
async fn report(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(job_id): Path<JobId>,
    Json(body): Json<ReportRequest>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&tenant, &principal, &totem_auth::capability::queue::WORK) {
        return resp;
    }

    match services
        .jobs
        .report_result(tenant.tenant_id(), job_id, body.attempt_token, body.outcome)
        .await
    {
        Ok(disposition) => disposition_to_response(disposition),
        Err(e) => errors::job_store_error_to_response(e),
    }
}

/// GET /queue/terminals/:terminal_id/jobs — operator visibility.
async fn list_for_terminal(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(terminal_id): Path<TerminalId>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&tenant, &principal, &totem_auth::capability::queue::READ) {
        return resp;
    }

    match services
        .jobs
        .list_for_terminal(tenant.tenant_id(), &terminal_id, 100)
        .await
    {
        Ok(jobs) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "jobs": jobs.iter().map(job_to_json).collect::<Vec<_>>(),
            })),
        )
            .into_response(),
        Err(e) => errors::job_store_error_to_response(e),
    }
}

fn disposition_to_response(disposition: ReportDisposition) -> axum::response::Response {
    match disposition {
        ReportDisposition::Applied { state } => (
            StatusCode::OK,
            Json(serde_json::json!({ "state": state.as_str() })),
        )
            .into_response(),
        ReportDisposition::StaleClaim { state } => errors::json_error(
            StatusCode::CONFLICT,
            "stale_claim",
            format!("claim is no longer valid (job is {state})"),
        ),
    }
}
