//! Task store abstraction.

use std::sync::Arc;

use motionforge_core::{Task, TaskId};

/// Task store abstraction.
///
/// Every operation is a single atomic update on a single task document;
/// there are no multi-document transactions anywhere in the worker. These
/// coarse primitives are all the coordinator needs to stay correct under
/// redelivery and crashes.
pub trait TaskStore: Send + Sync {
    /// Load a task by id.
    fn fetch(&self, id: &TaskId) -> Result<Task, TaskStoreError>;

    /// Create a new task document.
    fn insert(&self, task: &Task) -> Result<(), TaskStoreError>;

    /// Enter processing: set the status and the attempt counter in one write.
    fn begin_attempt(&self, id: &TaskId, attempt: u32) -> Result<(), TaskStoreError>;

    /// Resolve successfully: store the artifact and mark complete in one write.
    fn complete(&self, id: &TaskId, result: &[u8]) -> Result<(), TaskStoreError>;

    /// Resolve unsuccessfully.
    fn mark_failed(&self, id: &TaskId) -> Result<(), TaskStoreError>;

    /// Append one entry to the task's error history without rewriting it.
    fn append_error(&self, id: &TaskId, message: &str) -> Result<(), TaskStoreError>;
}

/// Task store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskStoreError {
    #[error("task not found: {0}")]
    NotFound(TaskId),
    #[error("task already exists: {0}")]
    AlreadyExists(TaskId),
    #[error("stored task is corrupt: {0}")]
    Corrupt(String),
    #[error("store connection error: {0}")]
    Connection(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl TaskStoreError {
    /// Whether this is a transport problem rather than a data problem.
    ///
    /// Transport problems abort consumption (the outcome of the delivery
    /// cannot be recorded); data problems resolve the delivery itself.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            TaskStoreError::Connection(_) | TaskStoreError::Storage(_)
        )
    }
}

impl<S> TaskStore for Arc<S>
where
    S: TaskStore + ?Sized,
{
    fn fetch(&self, id: &TaskId) -> Result<Task, TaskStoreError> {
        (**self).fetch(id)
    }

    fn insert(&self, task: &Task) -> Result<(), TaskStoreError> {
        (**self).insert(task)
    }

    fn begin_attempt(&self, id: &TaskId, attempt: u32) -> Result<(), TaskStoreError> {
        (**self).begin_attempt(id, attempt)
    }

    fn complete(&self, id: &TaskId, result: &[u8]) -> Result<(), TaskStoreError> {
        (**self).complete(id, result)
    }

    fn mark_failed(&self, id: &TaskId) -> Result<(), TaskStoreError> {
        (**self).mark_failed(id)
    }

    fn append_error(&self, id: &TaskId, message: &str) -> Result<(), TaskStoreError> {
        (**self).append_error(id, message)
    }
}
