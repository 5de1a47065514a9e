//! WebSocket message types pushed to live client connections.

use serde::{Deserialize, Serialize};

use crate::{JobId, NotifyKind};

/// WebSocket message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// A job changed state
    JobStatus { job_id: JobId, status: NotifyKind },

    /// The user's job list changed; the client should re-fetch it
    TaskUpdated,

    /// Keep-alive reply
    Pong,

    /// Error message
    Error { message: String },
}

impl WsMessage {
    pub fn job_status(job_id: JobId, status: NotifyKind) -> Self {
        WsMessage::JobStatus { job_id, status }
    }

    pub fn error(message: impl Into<String>) -> Self {
        WsMessage::Error {
            message: message.into(),
        }
    }

    /// Serialize to the JSON text frame payload.
    pub fn to_json(&self) -> String {
        // Serialization of these variants cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_shape() {
        let msg = WsMessage::job_status(JobId(9), NotifyKind::Running);
        let value: serde_json::Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(value["type"], "job_status");
        assert_eq!(value["job_id"], 9);
        assert_eq!(value["status"], "RUNNING");
    }

    #[test]
    fn test_unit_variant_shape() {
        assert_eq!(WsMessage::TaskUpdated.to_json(), r#"{"type":"task_updated"}"#);
    }
}
