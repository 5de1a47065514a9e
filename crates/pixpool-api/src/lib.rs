//! Axum HTTP/WebSocket API for the pixpool generation service.
//!
//! This crate provides:
//! - Submission endpoints that charge credits and enqueue work items
//! - Job listing, removal with refunds, and gallery publishing
//! - The live client WebSocket that receives job events
//! - Health, metrics and the provider status callback

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
pub mod ws;

pub use config::{ApiConfig, StoreBackend};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::JobService;
pub use state::{AppState, Backends};
