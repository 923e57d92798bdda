//! Capability enforcement for handlers.

use axum::http::StatusCode;

use totem_auth::{authorize, Capability};

use crate::app::errors;
use crate::context::{PrincipalContext, TenantContext};

/// Require a capability within the request's tenant context.
///
/// Returns the ready-to-send 403 response on denial so handlers can `?`-style
/// early-return with it.
pub fn require(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    capability: &Capability,
) -> Result<(), axum::response::Response> {
    authorize(principal.principal(), tenant.tenant_id(), capability).map_err(|e| {
        errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string())
    })
}
