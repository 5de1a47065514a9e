//! Request and result types shared by all generation channels.

use serde::{Deserialize, Serialize};

use pixpool_models::GenerateParams;

/// Text-to-image request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub params: GenerateParams,
    /// Reference images blended into the prompt
    pub image_urls: Vec<String>,
}

impl GenerateRequest {
    /// Prompt with rendered flags and the negative prompt appended.
    pub fn full_prompt(&self) -> String {
        let mut prompt = self.params.apply(&self.prompt, !self.image_urls.is_empty());
        let negative = self.negative_prompt.trim();
        if !negative.is_empty() && !prompt.contains("--no") {
            prompt.push_str(" --no ");
            prompt.push_str(negative);
        }
        prompt
    }
}

/// Action on one image of an earlier grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    /// Grid position, 1-based
    pub index: u8,
    /// Provider task id of the source image
    pub message_id: String,
    /// Interaction hash of the source image
    pub message_hash: String,
}

/// Outcome of a submission call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResult {
    pub code: i32,
    #[serde(default)]
    pub description: String,
    /// Provider task handle; empty when the submission was rejected
    #[serde(default)]
    pub task_id: String,
}

/// An interaction button on a finished image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskButton {
    #[serde(default)]
    pub custom_id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub emoji: String,
}

/// Provider view of a submitted task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    /// Percentage string such as `"40%"`
    #[serde(default)]
    pub progress: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "fail_reason")]
    pub fail_reason: Option<String>,
    /// Canonical prompt the provider actually ran
    #[serde(default)]
    pub prompt_en: Option<String>,
    #[serde(default)]
    pub buttons: Vec<TaskButton>,
}

impl TaskStatus {
    /// Terminal failure reported by the provider, if any.
    pub fn failure(&self) -> Option<&str> {
        self.fail_reason
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Interaction hash of the image, from the first action button.
    pub fn hash(&self) -> Option<String> {
        self.buttons
            .first()
            .map(|b| interaction_hash(&b.custom_id))
            .filter(|h| !h.is_empty())
    }
}

// Some proxies send `failReason` as an object or number instead of a string.
fn fail_reason<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Extract the image hash from a button custom id such as
/// `MJ::JOB::upsample::1::3f2a...`.
///
/// Ids with more than five `::` segments carry the hash in the fifth one;
/// otherwise it is the last segment.
pub fn interaction_hash(custom_id: &str) -> String {
    let parts: Vec<&str> = custom_id.split("::").collect();
    if parts.len() > 5 {
        parts[4].to_string()
    } else {
        parts.last().copied().unwrap_or_default().to_string()
    }
}

/// Provider status codes meaning "taken for processing".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedCodes {
    /// Accepted immediately
    pub submitted: i32,
    /// Queued, or accepted as a duplicate
    pub queued: i32,
}

impl Default for AcceptedCodes {
    fn default() -> Self {
        Self {
            submitted: 1,
            queued: 22,
        }
    }
}

impl AcceptedCodes {
    pub fn is_accepted(&self, code: i32) -> bool {
        code == self.submitted || code == self.queued
    }
}
