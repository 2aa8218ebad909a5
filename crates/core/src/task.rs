//! Core task types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::TaskId;

/// Animation task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Submitted, waiting to be picked up
    Pending,
    /// A worker holds the task; a crash leaves this state behind until the
    /// broker redelivers the message
    Processing,
    /// Rendered successfully, result stored
    Complete,
    /// Gave up, no result
    Failed,
}

impl TaskStatus {
    /// Terminal statuses never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Complete => "complete",
            TaskStatus::Failed => "failed",
        }
    }
}

impl core::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for TaskStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "complete" => Ok(TaskStatus::Complete),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Output container for the rendered animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Gif,
    Mp4,
}

impl OutputFormat {
    /// File extension the renderer uses for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Gif => "gif",
            OutputFormat::Mp4 => "mp4",
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Gif
    }
}

impl core::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.extension())
    }
}

impl core::str::FromStr for OutputFormat {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gif" => Ok(OutputFormat::Gif),
            "mp4" => Ok(OutputFormat::Mp4),
            other => Err(DomainError::UnknownFormat(other.to_string())),
        }
    }
}

/// Render inputs, read-only after submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    /// Text prompt driving the animation
    pub prompt: String,
    /// Base64-encoded first frame (PNG)
    pub image_b64: String,
    /// Output container
    #[serde(default)]
    pub format: OutputFormat,
    /// Extra renderer parameters, carried through untouched
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// An animation task as stored.
///
/// Workers treat a loaded `Task` as an immutable snapshot of the document;
/// every mutation goes through the store as its own atomic update, never by
/// writing a modified snapshot back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task id (matches the queue message byte-for-byte)
    pub id: TaskId,
    /// Current lifecycle status
    pub status: TaskStatus,
    /// Processing attempts so far, including any in-flight one
    pub num_attempts: u32,
    /// One entry per failed attempt, oldest first, never truncated
    pub errors: Vec<String>,
    /// Render inputs
    pub payload: TaskPayload,
    /// Rendered artifact, set exactly once on completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<u8>>,
    /// Opaque submitter attribution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_by: Option<String>,
    /// When the task was created
    pub created_at: DateTime<Utc>,
    /// When the task was last updated
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new pending task.
    pub fn new(id: TaskId, payload: TaskPayload) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: TaskStatus::Pending,
            num_attempts: 0,
            errors: Vec::new(),
            payload,
            result: None,
            submitted_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach submitter attribution.
    pub fn with_submitted_by(mut self, submitter: impl Into<String>) -> Self {
        self.submitted_by = Some(submitter.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_payload() -> TaskPayload {
        TaskPayload {
            prompt: "a fox running through snow".to_string(),
            image_b64: "aGVsbG8=".to_string(),
            format: OutputFormat::Gif,
            params: serde_json::Map::new(),
        }
    }

    #[test]
    fn new_task_starts_pending_with_no_attempts() {
        let task = Task::new(TaskId::from("t-1"), test_payload());

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.num_attempts, 0);
        assert!(task.errors.is_empty());
        assert!(task.result.is_none());
        assert!(task.submitted_by.is_none());
    }

    #[test]
    fn only_complete_and_failed_are_terminal() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Complete.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Processing,
            TaskStatus::Complete,
            TaskStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }

        assert!(matches!(
            "cancelled".parse::<TaskStatus>(),
            Err(DomainError::UnknownStatus(_))
        ));
    }

    #[test]
    fn format_defaults_to_gif() {
        let payload: TaskPayload = serde_json::from_value(serde_json::json!({
            "prompt": "a pond at dusk",
            "image_b64": "aGVsbG8=",
        }))
        .unwrap();

        assert_eq!(payload.format, OutputFormat::Gif);
        assert!(payload.params.is_empty());
    }

    #[test]
    fn format_extension_matches_renderer_output() {
        assert_eq!(OutputFormat::Gif.extension(), "gif");
        assert_eq!(OutputFormat::Mp4.extension(), "mp4");
        assert_eq!("mp4".parse::<OutputFormat>().unwrap(), OutputFormat::Mp4);
        assert!("webm".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn submitted_by_builder_attaches_attribution() {
        let task = Task::new(TaskId::new(), test_payload()).with_submitted_by("api-gateway");
        assert_eq!(task.submitted_by.as_deref(), Some("api-gateway"));
    }
}
