//! Redis-backed task store (hash per task).
//!
//! Document layout:
//! - `motionforge:task:{id}` - hash holding the task's scalar fields
//! - `motionforge:task:{id}:errors` - list holding the error history
//!
//! A multi-field HSET is the atomic document update; RPUSH onto the sibling
//! list is the atomic error append. Nothing here deletes tasks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use motionforge_core::{OutputFormat, Task, TaskId, TaskPayload, TaskStatus};

use super::store::{TaskStore, TaskStoreError};
use crate::connect;

/// Default Redis endpoint.
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Prefix for every key this store owns.
const DEFAULT_KEY_PREFIX: &str = "motionforge:";

/// Connection settings for [`RedisTaskStore`].
#[derive(Debug, Clone)]
pub struct RedisTaskStoreConfig {
    pub url: String,
    pub key_prefix: String,
    pub retry_delay: Duration,
}

impl Default for RedisTaskStoreConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REDIS_URL.to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            retry_delay: connect::DEFAULT_RETRY_DELAY,
        }
    }
}

impl RedisTaskStoreConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }
}

/// Redis-backed task store.
#[derive(Debug, Clone)]
pub struct RedisTaskStore {
    client: Arc<redis::Client>,
    key_prefix: String,
}

impl RedisTaskStore {
    /// Connect to Redis, waiting indefinitely for the server to accept.
    ///
    /// Only a malformed URL fails here; an unreachable server is retried
    /// every `retry_delay` until it answers PING.
    pub fn connect(config: RedisTaskStoreConfig) -> Result<Self, TaskStoreError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| TaskStoreError::Connection(e.to_string()))?;

        let store = Self {
            client: Arc::new(client),
            key_prefix: config.key_prefix,
        };

        connect::retry_indefinitely("task store", config.retry_delay, || store.ping());
        info!("task store connected");
        Ok(store)
    }

    fn ping(&self) -> Result<(), TaskStoreError> {
        let mut conn = self.connection()?;
        let _: String = redis::cmd("PING")
            .query(&mut conn)
            .map_err(|e| TaskStoreError::Connection(e.to_string()))?;
        Ok(())
    }

    fn connection(&self) -> Result<redis::Connection, TaskStoreError> {
        self.client
            .get_connection()
            .map_err(|e| TaskStoreError::Connection(e.to_string()))
    }

    fn task_key(&self, id: &TaskId) -> String {
        format!("{}task:{}", self.key_prefix, id)
    }

    fn errors_key(&self, id: &TaskId) -> String {
        format!("{}task:{}:errors", self.key_prefix, id)
    }

    fn ensure_exists(
        &self,
        conn: &mut redis::Connection,
        key: &str,
        id: &TaskId,
    ) -> Result<(), TaskStoreError> {
        let exists: bool = redis::cmd("EXISTS")
            .arg(key)
            .query(conn)
            .map_err(|e| TaskStoreError::Storage(format!("EXISTS failed: {e}")))?;

        if exists {
            Ok(())
        } else {
            Err(TaskStoreError::NotFound(id.clone()))
        }
    }

    fn write_fields(
        &self,
        conn: &mut redis::Connection,
        key: &str,
        fields: &[(&str, Vec<u8>)],
    ) -> Result<(), TaskStoreError> {
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (name, value) in fields {
            cmd.arg(*name).arg(value.as_slice());
        }

        let _: u64 = cmd
            .query(conn)
            .map_err(|e| TaskStoreError::Storage(format!("HSET failed: {e}")))?;
        Ok(())
    }
}

impl TaskStore for RedisTaskStore {
    fn fetch(&self, id: &TaskId) -> Result<Task, TaskStoreError> {
        let mut conn = self.connection()?;

        let fields: HashMap<String, Vec<u8>> = redis::cmd("HGETALL")
            .arg(self.task_key(id))
            .query(&mut conn)
            .map_err(|e| TaskStoreError::Storage(format!("HGETALL failed: {e}")))?;

        if fields.is_empty() {
            return Err(TaskStoreError::NotFound(id.clone()));
        }

        let errors: Vec<String> = redis::cmd("LRANGE")
            .arg(self.errors_key(id))
            .arg(0)
            .arg(-1)
            .query(&mut conn)
            .map_err(|e| TaskStoreError::Storage(format!("LRANGE failed: {e}")))?;

        decode_task(&fields, errors)
    }

    fn insert(&self, task: &Task) -> Result<(), TaskStoreError> {
        let mut conn = self.connection()?;
        let key = self.task_key(&task.id);

        let created: bool = redis::cmd("HSETNX")
            .arg(&key)
            .arg("id")
            .arg(task.id.as_str())
            .query(&mut conn)
            .map_err(|e| TaskStoreError::Storage(format!("HSETNX failed: {e}")))?;
        if !created {
            return Err(TaskStoreError::AlreadyExists(task.id.clone()));
        }

        let fields = encode_fields(task)?;
        self.write_fields(&mut conn, &key, &fields)?;

        for message in &task.errors {
            let _: u64 = redis::cmd("RPUSH")
                .arg(self.errors_key(&task.id))
                .arg(message)
                .query(&mut conn)
                .map_err(|e| TaskStoreError::Storage(format!("RPUSH failed: {e}")))?;
        }

        Ok(())
    }

    #[instrument(skip(self), fields(task_id = %id), err)]
    fn begin_attempt(&self, id: &TaskId, attempt: u32) -> Result<(), TaskStoreError> {
        let mut conn = self.connection()?;
        let key = self.task_key(id);
        self.ensure_exists(&mut conn, &key, id)?;

        self.write_fields(
            &mut conn,
            &key,
            &[
                ("status", TaskStatus::Processing.as_str().into()),
                ("num_attempts", attempt.to_string().into_bytes()),
                ("updated_at", Utc::now().to_rfc3339().into_bytes()),
            ],
        )
    }

    #[instrument(skip(self, result), fields(task_id = %id, bytes = result.len()), err)]
    fn complete(&self, id: &TaskId, result: &[u8]) -> Result<(), TaskStoreError> {
        let mut conn = self.connection()?;
        let key = self.task_key(id);
        self.ensure_exists(&mut conn, &key, id)?;

        self.write_fields(
            &mut conn,
            &key,
            &[
                ("status", TaskStatus::Complete.as_str().into()),
                ("result", result.to_vec()),
                ("updated_at", Utc::now().to_rfc3339().into_bytes()),
            ],
        )
    }

    fn mark_failed(&self, id: &TaskId) -> Result<(), TaskStoreError> {
        let mut conn = self.connection()?;
        let key = self.task_key(id);
        self.ensure_exists(&mut conn, &key, id)?;

        self.write_fields(
            &mut conn,
            &key,
            &[
                ("status", TaskStatus::Failed.as_str().into()),
                ("updated_at", Utc::now().to_rfc3339().into_bytes()),
            ],
        )
    }

    fn append_error(&self, id: &TaskId, message: &str) -> Result<(), TaskStoreError> {
        let mut conn = self.connection()?;
        let key = self.task_key(id);
        self.ensure_exists(&mut conn, &key, id)?;

        let _: u64 = redis::cmd("RPUSH")
            .arg(self.errors_key(id))
            .arg(message)
            .query(&mut conn)
            .map_err(|e| TaskStoreError::Storage(format!("RPUSH failed: {e}")))?;
        Ok(())
    }
}

/// Flatten a task into hash field/value pairs.
fn encode_fields(task: &Task) -> Result<Vec<(&'static str, Vec<u8>)>, TaskStoreError> {
    let mut fields: Vec<(&'static str, Vec<u8>)> = vec![
        ("id", task.id.as_str().into()),
        ("status", task.status.as_str().into()),
        ("num_attempts", task.num_attempts.to_string().into_bytes()),
        ("prompt", task.payload.prompt.as_str().into()),
        ("image", task.payload.image_b64.as_str().into()),
        ("format", task.payload.format.extension().into()),
        ("created_at", task.created_at.to_rfc3339().into_bytes()),
        ("updated_at", task.updated_at.to_rfc3339().into_bytes()),
    ];

    if !task.payload.params.is_empty() {
        let params = serde_json::to_vec(&task.payload.params)
            .map_err(|e| TaskStoreError::Storage(format!("params encode failed: {e}")))?;
        fields.push(("params", params));
    }
    if let Some(result) = &task.result {
        fields.push(("result", result.clone()));
    }
    if let Some(submitted_by) = &task.submitted_by {
        fields.push(("submitted_by", submitted_by.as_str().into()));
    }

    Ok(fields)
}

/// Rebuild a task from its hash fields and error list.
///
/// The embedded `id` field is used as-is; callers compare it against the
/// key they fetched by to detect corrupted documents.
fn decode_task(
    fields: &HashMap<String, Vec<u8>>,
    errors: Vec<String>,
) -> Result<Task, TaskStoreError> {
    let id = require_string(fields, "id")?;
    let status = require_string(fields, "status")?
        .parse::<TaskStatus>()
        .map_err(|e| TaskStoreError::Corrupt(e.to_string()))?;
    let num_attempts = require_string(fields, "num_attempts")?
        .parse::<u32>()
        .map_err(|_| TaskStoreError::Corrupt("num_attempts is not a number".to_string()))?;

    let format = match field_string(fields, "format")? {
        Some(raw) => raw
            .parse::<OutputFormat>()
            .map_err(|e| TaskStoreError::Corrupt(e.to_string()))?,
        None => OutputFormat::default(),
    };
    let params = match fields.get("params") {
        Some(raw) => serde_json::from_slice(raw)
            .map_err(|e| TaskStoreError::Corrupt(format!("params is not valid json: {e}")))?,
        None => serde_json::Map::new(),
    };

    Ok(Task {
        id: TaskId::from(id),
        status,
        num_attempts,
        errors,
        payload: TaskPayload {
            prompt: require_string(fields, "prompt")?,
            image_b64: require_string(fields, "image")?,
            format,
            params,
        },
        result: fields.get("result").cloned(),
        submitted_by: field_string(fields, "submitted_by")?,
        created_at: parse_timestamp(fields, "created_at")?,
        updated_at: parse_timestamp(fields, "updated_at")?,
    })
}

fn field_string(
    fields: &HashMap<String, Vec<u8>>,
    name: &str,
) -> Result<Option<String>, TaskStoreError> {
    match fields.get(name) {
        Some(raw) => String::from_utf8(raw.clone())
            .map(Some)
            .map_err(|_| TaskStoreError::Corrupt(format!("field {name} is not utf-8"))),
        None => Ok(None),
    }
}

fn require_string(fields: &HashMap<String, Vec<u8>>, name: &str) -> Result<String, TaskStoreError> {
    field_string(fields, name)?
        .ok_or_else(|| TaskStoreError::Corrupt(format!("missing field {name}")))
}

fn parse_timestamp(
    fields: &HashMap<String, Vec<u8>>,
    name: &str,
) -> Result<DateTime<Utc>, TaskStoreError> {
    let raw = require_string(fields, name)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TaskStoreError::Corrupt(format!("{name} is not a timestamp: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_task() -> Task {
        let mut params = serde_json::Map::new();
        params.insert("steps".to_string(), serde_json::json!(24));

        let mut task = Task::new(
            TaskId::from("t-42"),
            TaskPayload {
                prompt: "a comet over the city".to_string(),
                image_b64: "aGVsbG8=".to_string(),
                format: OutputFormat::Mp4,
                params,
            },
        )
        .with_submitted_by("api-gateway");
        task.status = TaskStatus::Complete;
        task.num_attempts = 2;
        task.result = Some(b"mp4-bytes".to_vec());
        task
    }

    fn encoded(task: &Task) -> HashMap<String, Vec<u8>> {
        encode_fields(task)
            .unwrap()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }

    #[test]
    fn documents_round_trip() {
        let task = test_task();
        let errors = vec!["e1".to_string(), "e2".to_string()];

        let decoded = decode_task(&encoded(&task), errors.clone()).unwrap();

        assert_eq!(decoded.id, task.id);
        assert_eq!(decoded.status, task.status);
        assert_eq!(decoded.num_attempts, task.num_attempts);
        assert_eq!(decoded.errors, errors);
        assert_eq!(decoded.payload, task.payload);
        assert_eq!(decoded.result, task.result);
        assert_eq!(decoded.submitted_by, task.submitted_by);
        assert_eq!(decoded.created_at, task.created_at);
        assert_eq!(decoded.updated_at, task.updated_at);
    }

    #[test]
    fn decode_defaults_optional_fields() {
        let mut fields = encoded(&test_task());
        fields.remove("format");
        fields.remove("params");
        fields.remove("result");
        fields.remove("submitted_by");

        let decoded = decode_task(&fields, vec![]).unwrap();

        assert_eq!(decoded.payload.format, OutputFormat::Gif);
        assert!(decoded.payload.params.is_empty());
        assert!(decoded.result.is_none());
        assert!(decoded.submitted_by.is_none());
    }

    #[test]
    fn decode_rejects_unknown_status() {
        let mut fields = encoded(&test_task());
        fields.insert("status".to_string(), b"archived".to_vec());

        assert!(matches!(
            decode_task(&fields, vec![]),
            Err(TaskStoreError::Corrupt(_))
        ));
    }

    #[test]
    fn decode_requires_core_fields() {
        let mut fields = encoded(&test_task());
        fields.remove("prompt");

        let err = decode_task(&fields, vec![]).unwrap_err();
        assert!(err.to_string().contains("missing field prompt"));
    }

    #[test]
    fn decode_rejects_garbled_counter() {
        let mut fields = encoded(&test_task());
        fields.insert("num_attempts".to_string(), b"many".to_vec());

        assert!(matches!(
            decode_task(&fields, vec![]),
            Err(TaskStoreError::Corrupt(_))
        ));
    }
}
