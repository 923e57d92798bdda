use thiserror::Error;

use totem_core::TenantId;

use crate::capability::Capability;
use crate::principal::Principal;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing capability '{0}'")]
    Forbidden(String),
}

/// Authorize a principal within a tenant context.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(
    principal: &Principal,
    tenant_id: TenantId,
    required: &Capability,
) -> Result<(), AuthzError> {
    if principal.tenant_id != tenant_id {
        return Err(AuthzError::TenantMismatch);
    }

    if principal.holds(required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}
