//! Business logic services.

pub mod jobs;

pub use jobs::{ActionTaskRequest, ImageTaskRequest, JobService, ListQuery};
