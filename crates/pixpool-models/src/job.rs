//! Generation job definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::Progress;

/// Unique identifier for a job (the store's row id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl JobId {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for JobId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Kind of generation work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Text-to-image generation
    Generate,
    /// Enlarge one image of a prior grid
    Upscale,
    /// Produce variations of one image of a prior grid
    Variation,
    /// Blend several reference images
    Blend,
    /// Swap a face from one image onto another
    FaceSwap,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Generate => "generate",
            JobKind::Upscale => "upscale",
            JobKind::Variation => "variation",
            JobKind::Blend => "blend",
            JobKind::FaceSwap => "face_swap",
        }
    }

    /// Human-readable label used in ledger remarks.
    pub fn label(&self) -> &'static str {
        match self {
            JobKind::Generate => "Generate",
            JobKind::Upscale => "Upscale",
            JobKind::Variation => "Variation",
            JobKind::Blend => "Blend",
            JobKind::FaceSwap => "Face swap",
        }
    }

    /// Action kinds operate on an image produced earlier and must run on the
    /// channel that produced it.
    pub fn is_action(&self) -> bool {
        matches!(self, JobKind::Upscale | JobKind::Variation)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown job kind: {0}")]
pub struct ParseJobKindError(pub String);

impl FromStr for JobKind {
    type Err = ParseJobKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generate" | "image" => Ok(JobKind::Generate),
            "upscale" => Ok(JobKind::Upscale),
            "variation" => Ok(JobKind::Variation),
            "blend" => Ok(JobKind::Blend),
            "face_swap" | "swapFace" => Ok(JobKind::FaceSwap),
            other => Err(ParseJobKindError(other.to_string())),
        }
    }
}

/// Fields needed to create a job row.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub kind: JobKind,
    pub user_id: i64,
    pub prompt: String,
    /// Provider message id of the image an action targets
    pub reference_id: Option<String>,
    pub credit_cost: u32,
}

/// A persisted generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub user_id: i64,

    /// Provider task handle, set once submission is accepted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    /// Channel that accepted the submission
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,

    /// Provider message id of the image an action targets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,

    pub progress: Progress,
    pub prompt: String,

    /// Best-known image url reported by the provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    /// Interaction hash used by follow-up actions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub credit_cost: u32,
    pub publish: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Build an unsubmitted job from creation fields.
    pub fn from_new(id: JobId, new: NewJob) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind: new.kind,
            user_id: new.user_id,
            task_id: None,
            channel_id: None,
            reference_id: new.reference_id,
            progress: Progress::default(),
            prompt: new.prompt,
            image_url: None,
            hash: None,
            error_message: None,
            credit_cost: new.credit_cost,
            publish: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the job failed with a reason. A job fails at most once.
    ///
    /// Returns `false` when the job had already failed.
    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        if self.progress.is_failed() {
            return false;
        }
        self.progress = Progress::Failed;
        self.error_message = Some(reason.into());
        self.updated_at = Utc::now();
        true
    }

    /// Bind the job to the provider task and channel that accepted it.
    pub fn bind(&mut self, task_id: impl Into<String>, channel_id: impl Into<String>) {
        self.task_id = Some(task_id.into());
        self.channel_id = Some(channel_id.into());
        self.updated_at = Utc::now();
    }

    /// Whether the job has been accepted by a provider and is not terminal.
    pub fn is_in_flight(&self) -> bool {
        self.task_id.is_some() && !self.progress.is_terminal()
    }
}

/// Client-facing projection of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub id: JobId,
    #[serde(rename = "type")]
    pub kind: JobKind,
    pub user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub progress: i16,
    pub failed: bool,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub img_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err_msg: Option<String>,
    pub power: u32,
    pub publish: bool,
    pub created_at: i64,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            kind: job.kind,
            user_id: job.user_id,
            task_id: job.task_id.clone(),
            channel_id: job.channel_id.clone(),
            message_id: job.task_id.clone(),
            progress: job.progress.to_db(),
            failed: job.progress.is_failed(),
            prompt: job.prompt.clone(),
            img_url: job.image_url.clone(),
            hash: job.hash.clone(),
            err_msg: job.error_message.clone(),
            power: job.credit_cost,
            publish: job.publish,
            created_at: job.created_at.timestamp(),
        }
    }
}
