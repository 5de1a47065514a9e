//! Notification event kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of job state change pushed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotifyKind {
    /// Intermediate progress observed
    #[serde(rename = "RUNNING")]
    Running,
    /// Progress reached 100
    #[serde(rename = "FINISH")]
    Finished,
    /// Submission rejected or provider reported a terminal failure
    #[serde(rename = "FAIL")]
    Failed,
}

impl NotifyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyKind::Running => "RUNNING",
            NotifyKind::Finished => "FINISH",
            NotifyKind::Failed => "FAIL",
        }
    }
}

impl fmt::Display for NotifyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&NotifyKind::Finished).unwrap(), "\"FINISH\"");
        let k: NotifyKind = serde_json::from_str("\"FAIL\"").unwrap();
        assert_eq!(k, NotifyKind::Failed);
    }
}
