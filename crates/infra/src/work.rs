//! The external render seam.

use motionforge_core::Task;

/// Error from one render attempt.
///
/// The message becomes the task's error-history entry for the attempt, so
/// it should say what failed in one line.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct WorkError(pub String);

impl WorkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Executes the actual long-running work for one task.
///
/// Implementations get an immutable snapshot and return the artifact bytes;
/// all status and attempt bookkeeping stays with the coordinator. Calls run
/// strictly one at a time per worker.
pub trait WorkExecutor: Send + Sync {
    fn execute(&self, task: &Task) -> Result<Vec<u8>, WorkError>;
}

impl<F> WorkExecutor for F
where
    F: Fn(&Task) -> Result<Vec<u8>, WorkError> + Send + Sync,
{
    fn execute(&self, task: &Task) -> Result<Vec<u8>, WorkError> {
        self(task)
    }
}
