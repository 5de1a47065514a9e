//! Generation channel and prompt rewrite clients.
//!
//! This crate provides:
//! - The [`GenerationChannel`] contract the worker pool drives
//! - [`HttpChannel`], a generation-proxy REST implementation
//! - The [`PromptRewriter`] contract and an OpenAI-compatible client

pub mod channel;
pub mod config;
pub mod error;
pub mod http;
pub mod rewrite;
pub mod types;

pub use channel::GenerationChannel;
pub use config::{parse_channels, ChannelConfig, ProviderConfig, RewriteConfig};
pub use error::{ProviderError, ProviderResult};
pub use http::HttpChannel;
pub use rewrite::{needs_rewrite, OpenAiRewriter, PromptRewriter, REWRITE_PROMPT_TEMPLATE};
pub use types::{
    interaction_hash, AcceptedCodes, ActionRequest, GenerateRequest, SubmitResult, TaskButton,
    TaskStatus,
};
