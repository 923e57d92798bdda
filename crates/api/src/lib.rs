//! `totem-api` — backend HTTP surface for the kiosk platform.
//!
//! Hosts the print queue claim/report protocol consumed by terminal agents
//! and the payment proxy consumed by the kiosk checkout flow.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
