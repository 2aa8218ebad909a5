//! In-memory task store for tests/dev.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use motionforge_core::{Task, TaskId, TaskStatus};

use super::store::{TaskStore, TaskStoreError};

/// In-memory task store.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn update(&self, id: &TaskId, apply: impl FnOnce(&mut Task)) -> Result<(), TaskStoreError> {
        let mut tasks = self.tasks.write().unwrap();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| TaskStoreError::NotFound(id.clone()))?;
        apply(task);
        task.updated_at = Utc::now();
        Ok(())
    }

    /// Insert a task under an arbitrary key, so tests can build documents
    /// whose embedded id disagrees with the key they resolve under.
    #[cfg(test)]
    pub(crate) fn insert_at(&self, key: TaskId, task: Task) {
        self.tasks.write().unwrap().insert(key, task);
    }
}

impl TaskStore for InMemoryTaskStore {
    fn fetch(&self, id: &TaskId) -> Result<Task, TaskStoreError> {
        let tasks = self.tasks.read().unwrap();
        tasks
            .get(id)
            .cloned()
            .ok_or_else(|| TaskStoreError::NotFound(id.clone()))
    }

    fn insert(&self, task: &Task) -> Result<(), TaskStoreError> {
        let mut tasks = self.tasks.write().unwrap();
        if tasks.contains_key(&task.id) {
            return Err(TaskStoreError::AlreadyExists(task.id.clone()));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn begin_attempt(&self, id: &TaskId, attempt: u32) -> Result<(), TaskStoreError> {
        self.update(id, |task| {
            task.status = TaskStatus::Processing;
            task.num_attempts = attempt;
        })
    }

    fn complete(&self, id: &TaskId, result: &[u8]) -> Result<(), TaskStoreError> {
        self.update(id, |task| {
            task.status = TaskStatus::Complete;
            task.result = Some(result.to_vec());
        })
    }

    fn mark_failed(&self, id: &TaskId) -> Result<(), TaskStoreError> {
        self.update(id, |task| {
            task.status = TaskStatus::Failed;
        })
    }

    fn append_error(&self, id: &TaskId, message: &str) -> Result<(), TaskStoreError> {
        self.update(id, |task| {
            task.errors.push(message.to_string());
        })
    }
}
