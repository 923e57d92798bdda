//! `totem-queue` — durable print job queue with leased claims.
//!
//! The backend accepts print requests, agents claim them one at a time per
//! terminal, and every state transition is committed through the store's
//! atomic per-job transition primitive. See `claim.rs` for the state machine
//! and `store.rs` for the concurrency contract.

pub mod claim;
pub mod in_memory;
pub mod job;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod store;
pub mod sweeper;

pub use claim::{ClaimedJob, ReportDisposition};
pub use in_memory::InMemoryJobStore;
pub use job::{JobState, NewPrintJob, PrintJob};
#[cfg(feature = "postgres")]
pub use postgres::PgJobStore;
pub use store::{JobStore, JobStoreError};
pub use sweeper::LeaseSweeper;
