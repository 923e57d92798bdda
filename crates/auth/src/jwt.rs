//! Bearer-token decoding and signature verification.
//!
//! Wire format (JWT payload): `sub` and `tenant_id` are UUID strings,
//! `capabilities` is an array of capability strings, `iat`/`exp` are unix
//! seconds. Token *issuance* is out of scope; this module only verifies.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use totem_core::TenantId;

use crate::capability::Capability;
use crate::claims::{validate_claims, AccessClaims, TokenValidationError};
use crate::principal::PrincipalId;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("signature verification failed")]
    Signature,

    #[error(transparent)]
    Claims(#[from] TokenValidationError),
}

/// Verifies a bearer token and yields validated claims.
pub trait TokenValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims, TokenError>;
}

/// JWT payload as it appears on the wire.
#[derive(Debug, Serialize, Deserialize)]
struct WireClaims {
    sub: Uuid,
    tenant_id: Uuid,
    #[serde(default)]
    capabilities: Vec<String>,
    iat: i64,
    exp: i64,
}

/// HS256 (shared-secret) token validator.
pub struct Hs256TokenValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256TokenValidator {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Time-window checks are done deterministically by `validate_claims`
        // so they can be tested without the real clock.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl TokenValidator for Hs256TokenValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims, TokenError> {
        let data = decode::<WireClaims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature => TokenError::Signature,
                _ => TokenError::Malformed(e.to_string()),
            }
        })?;

        let wire = data.claims;

        let issued_at = Utc
            .timestamp_opt(wire.iat, 0)
            .single()
            .ok_or_else(|| TokenError::Malformed("iat out of range".to_string()))?;
        let expires_at = Utc
            .timestamp_opt(wire.exp, 0)
            .single()
            .ok_or_else(|| TokenError::Malformed("exp out of range".to_string()))?;

        let claims = AccessClaims {
            sub: PrincipalId::from_uuid(wire.sub),
            tenant_id: TenantId::from_uuid(wire.tenant_id),
            capabilities: wire.capabilities.into_iter().map(Capability::new).collect(),
            issued_at,
            expires_at,
        };

        validate_claims(&claims, now)?;
        Ok(claims)
    }
}
