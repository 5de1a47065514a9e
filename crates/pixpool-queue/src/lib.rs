//! Durable FIFO queues for the PixPool generation core.
//!
//! This crate provides:
//! - The [`PersistentQueue`] contract shared by both queues
//! - A Redis list backend and an in-process backend
//! - The inbound [`WorkItem`] and outbound [`NotifyMessage`] wire types

pub mod error;
pub mod job;
pub mod memory;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::{ActionTarget, NotifyMessage, TaskPayload, WorkItem};
pub use memory::MemoryQueue;
pub use queue::{PersistentQueue, QueueBackend, QueueConfig, RedisQueue, DEFAULT_POP_BLOCK};
