//! `totem-payments` — payment gateway proxy with asynchronous status
//! resolution.
//!
//! A PIX charge is created against the gateway, then polled until it reaches
//! a terminal state or its hard expiry. The polling discipline mirrors the
//! print queue's claim/retry shape: attempt, classify the failure, back off,
//! converge on a terminal state that is then immutable.

pub mod error;
pub mod gateway;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod record;
pub mod resolver;
pub mod service;
pub mod store;

pub use error::{PaymentError, PaymentStoreError};
pub use gateway::{
    ChargeStatus, CreatePixCharge, GatewayError, HttpPaymentGateway, PaymentGateway, PixCharge,
    ScriptedGateway,
};
#[cfg(feature = "postgres")]
pub use postgres::PgPaymentStore;
pub use record::{PaymentState, PaymentStatusRecord};
pub use resolver::PaymentStatusResolver;
pub use service::PaymentService;
pub use store::{InMemoryPaymentStore, PaymentStore};
