//! Queue message definitions.
//!
//! [`WorkItem`] travels on the inbound queue from the submission path to a
//! channel worker. [`NotifyMessage`] travels on the outbound queue from the
//! workers and the reconciler to the notification dispatcher.

use serde::{Deserialize, Serialize};

use pixpool_models::{GenerateParams, JobId, JobKind, NotifyKind};

/// Fields of an action on one image of a previously generated grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTarget {
    /// Grid position, 1-based
    pub index: u8,
    /// Provider message id of the source image
    pub message_id: String,
    /// Interaction hash of the source image
    pub message_hash: String,
}

/// Kind-specific payload of a work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    Generate {
        /// User prompt without rendered flags
        prompt: String,
        #[serde(default)]
        negative_prompt: String,
        #[serde(default)]
        params: GenerateParams,
        #[serde(default)]
        image_urls: Vec<String>,
    },
    Upscale(ActionTarget),
    Variation(ActionTarget),
    Blend {
        image_urls: Vec<String>,
    },
    FaceSwap {
        image_urls: Vec<String>,
    },
}

impl TaskPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            TaskPayload::Generate { .. } => JobKind::Generate,
            TaskPayload::Upscale(_) => JobKind::Upscale,
            TaskPayload::Variation(_) => JobKind::Variation,
            TaskPayload::Blend { .. } => JobKind::Blend,
            TaskPayload::FaceSwap { .. } => JobKind::FaceSwap,
        }
    }
}

/// One unit of dispatch work for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub job_id: JobId,
    pub user_id: i64,

    /// Channel that must serve this item. Empty unless the item has to run
    /// on the channel that produced an earlier image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,

    pub payload: TaskPayload,
}

impl WorkItem {
    pub fn new(job_id: JobId, user_id: i64, payload: TaskPayload) -> Self {
        Self {
            job_id,
            user_id,
            channel_id: None,
            payload,
        }
    }

    /// Bind the item to a channel.
    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn kind(&self) -> JobKind {
        self.payload.kind()
    }

    /// The required channel, if any. Blank ids count as unset.
    pub fn target_channel(&self) -> Option<&str> {
        self.channel_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Job state change to push to a user's live connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyMessage {
    pub user_id: i64,
    pub job_id: JobId,
    pub message: NotifyKind,
}

impl NotifyMessage {
    pub fn new(user_id: i64, job_id: JobId, message: NotifyKind) -> Self {
        Self {
            user_id,
            job_id,
            message,
        }
    }

    pub fn running(user_id: i64, job_id: JobId) -> Self {
        Self::new(user_id, job_id, NotifyKind::Running)
    }

    pub fn finished(user_id: i64, job_id: JobId) -> Self {
        Self::new(user_id, job_id, NotifyKind::Finished)
    }

    pub fn failed(user_id: i64, job_id: JobId) -> Self {
        Self::new(user_id, job_id, NotifyKind::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_channel_is_unset() {
        let item = WorkItem::new(
            JobId(1),
            2,
            TaskPayload::Blend {
                image_urls: vec![],
            },
        )
        .with_channel("  ");
        assert_eq!(item.target_channel(), None);
        assert_eq!(item.with_channel("A").target_channel(), Some("A"));
    }

    #[test]
    fn test_payload_wire_format_is_tagged() {
        let item = WorkItem::new(
            JobId(5),
            2,
            TaskPayload::Upscale(ActionTarget {
                index: 2,
                message_id: "m-1".into(),
                message_hash: "h-1".into(),
            }),
        )
        .with_channel("A");

        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["payload"]["kind"], "upscale");
        assert_eq!(value["payload"]["index"], 2);
        assert_eq!(value["channel_id"], "A");

        let back: WorkItem = serde_json::from_value(value).unwrap();
        assert_eq!(back.kind(), JobKind::Upscale);
    }

    #[test]
    fn test_generate_payload_defaults() {
        let item: WorkItem = serde_json::from_str(
            r#"{"job_id":3,"user_id":1,"payload":{"kind":"generate","prompt":"a cat"}}"#,
        )
        .unwrap();
        match item.payload {
            TaskPayload::Generate {
                negative_prompt,
                image_urls,
                ..
            } => {
                assert!(negative_prompt.is_empty());
                assert!(image_urls.is_empty());
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert_eq!(item.channel_id, None);
    }
}
