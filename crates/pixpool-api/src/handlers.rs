//! Request handlers.

pub mod callback;
pub mod health;
pub mod jobs;

pub use callback::*;
pub use health::*;
pub use jobs::*;
