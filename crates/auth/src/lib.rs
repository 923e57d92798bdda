//! `totem-auth` — authentication/authorization boundary (zero-trust).
//!
//! This crate is intentionally decoupled from HTTP and storage: the API layer
//! extracts a bearer token, a [`TokenValidator`] turns it into
//! [`AccessClaims`], and [`authorize`] is a pure policy check over the
//! resulting principal.

pub mod authorize;
pub mod capability;
pub mod claims;
pub mod jwt;
pub mod principal;

pub use authorize::{authorize, AuthzError};
pub use capability::Capability;
pub use claims::{validate_claims, AccessClaims, TokenValidationError};
pub use jwt::{Hs256TokenValidator, TokenError, TokenValidator};
pub use principal::{Principal, PrincipalId};
