//! Shared data models for the PixPool generation service.
//!
//! This crate provides Serde-serializable types for:
//! - Generation jobs and their progress
//! - Rendering parameters
//! - Credit ledger entries
//! - Notification kinds and WebSocket message schemas

pub mod credit;
pub mod job;
pub mod notify;
pub mod params;
pub mod progress;
pub mod ws;

// Re-export common types
pub use credit::{CreditDirection, CreditLedgerEntry};
pub use job::{Job, JobId, JobKind, JobView, NewJob, ParseJobKindError};
pub use notify::NotifyKind;
pub use params::GenerateParams;
pub use progress::{Progress, FAILED_PROGRESS};
pub use ws::WsMessage;
