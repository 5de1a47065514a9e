//! The generation channel contract.

use async_trait::async_trait;

use crate::error::{ProviderError, ProviderResult};
use crate::types::{ActionRequest, GenerateRequest, SubmitResult, TaskStatus};

/// One configured, independently authenticated generation backend.
///
/// Submissions return the provider's status code; whether a code counts as
/// accepted is decided by the caller. Errors are transport or protocol
/// failures only.
#[async_trait]
pub trait GenerationChannel: Send + Sync {
    /// Channel identity, used for affinity binding.
    fn name(&self) -> &str;

    async fn submit_generate(&self, request: &GenerateRequest) -> ProviderResult<SubmitResult>;

    async fn submit_upscale(&self, request: &ActionRequest) -> ProviderResult<SubmitResult>;

    async fn submit_variation(&self, request: &ActionRequest) -> ProviderResult<SubmitResult>;

    async fn submit_blend(&self, image_urls: &[String]) -> ProviderResult<SubmitResult>;

    /// `image_urls` holds the face source followed by the target.
    async fn submit_face_swap(&self, image_urls: &[String]) -> ProviderResult<SubmitResult>;

    async fn query_task(&self, task_id: &str) -> ProviderResult<TaskStatus>;

    /// Fetch an in-progress image through this channel as a data URI.
    async fn image_preview(&self, url: &str) -> ProviderResult<String> {
        Err(ProviderError::image(format!(
            "{}: channel {} has no previews",
            url,
            self.name()
        )))
    }
}
