use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use totem_core::TenantId;

use crate::capability::Capability;

/// Identifier of an authenticated principal (user or service account).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(Uuid);

impl PrincipalId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A fully resolved principal for authorization decisions.
///
/// Construction of this object is intentionally decoupled from transport:
/// the API layer derives it from validated token claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub tenant_id: TenantId,
    pub capabilities: Vec<Capability>,
}

impl Principal {
    pub fn new(
        principal_id: PrincipalId,
        tenant_id: TenantId,
        capabilities: Vec<Capability>,
    ) -> Self {
        Self {
            principal_id,
            tenant_id,
            capabilities,
        }
    }

    /// Whether the principal holds the given capability (or the wildcard).
    pub fn holds(&self, required: &Capability) -> bool {
        let caps: HashSet<&str> = self.capabilities.iter().map(|c| c.as_str()).collect();
        caps.contains("*") || caps.contains(required.as_str())
    }
}
