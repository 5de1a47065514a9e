//! Job progress with a distinguished failure state.
//!
//! Progress is persisted as a small integer where `0..=100` is the completion
//! percentage and [`FAILED_PROGRESS`] marks a job that failed. In memory the
//! two cases are kept apart so the failure state cannot be confused with a
//! percentage.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Persisted value marking a failed job. Lies outside the percentage range.
pub const FAILED_PROGRESS: i16 = 101;

/// Progress of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Progress {
    /// Completion percentage, always `0..=100`.
    Percent(u8),
    /// Terminal failure.
    Failed,
}

impl Default for Progress {
    fn default() -> Self {
        Progress::Percent(0)
    }
}

impl Progress {
    /// Build a percentage, clamping to 100.
    pub fn percent(value: u8) -> Self {
        Progress::Percent(value.min(100))
    }

    /// Decode the persisted integer form.
    ///
    /// Values above 100 decode to [`Progress::Failed`], negative values to 0.
    pub fn from_db(value: i16) -> Self {
        if value > 100 {
            Progress::Failed
        } else {
            Progress::Percent(value.max(0) as u8)
        }
    }

    /// Encode to the persisted integer form.
    pub fn to_db(self) -> i16 {
        match self {
            Progress::Percent(p) => p as i16,
            Progress::Failed => FAILED_PROGRESS,
        }
    }

    pub fn is_failed(self) -> bool {
        matches!(self, Progress::Failed)
    }

    pub fn is_finished(self) -> bool {
        matches!(self, Progress::Percent(100))
    }

    /// Finished or failed.
    pub fn is_terminal(self) -> bool {
        self.is_failed() || self.is_finished()
    }

    /// Merge a provider-reported percentage into the current progress.
    ///
    /// A failed job stays failed; otherwise progress never moves backwards.
    pub fn advance(self, reported: u8) -> Self {
        match self {
            Progress::Failed => Progress::Failed,
            Progress::Percent(current) => Progress::Percent(current.max(reported.min(100))),
        }
    }

    /// Parse a provider percentage such as `"40%"` or `"40"`.
    ///
    /// Missing or unparseable values yield 0.
    pub fn parse_reported(raw: Option<&str>) -> u8 {
        raw.map(|s| s.trim().trim_end_matches('%').trim())
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .map(|v| v.clamp(0.0, 100.0) as u8)
            .unwrap_or(0)
    }
}

impl Serialize for Progress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i16(self.to_db())
    }
}

impl<'de> Deserialize<'de> for Progress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Progress::from_db(i16::deserialize(deserializer)?))
    }
}
