//! Job persistence and credit ledger.
//!
//! The generation core depends only on the [`JobStore`] and [`CreditLedger`]
//! contracts. PostgreSQL backends serve production; in-memory backends with
//! identical semantics serve tests and local development.

pub mod config;
pub mod error;
pub mod memory;
pub mod pg;
pub mod store;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use memory::{MemoryCreditLedger, MemoryJobStore};
pub use pg::{connect, PgCreditLedger, PgJobStore};
pub use store::{CreditLedger, JobFilter, JobStore};
