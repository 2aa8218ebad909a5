//! Durable task queue over Redis Streams consumer groups.
//!
//! Delivery model:
//! - At-least-once. An entry stays in the group's pending list until a
//!   consumer XACKs it, so a crashed worker's deliveries come back.
//! - One at a time. Reads use `COUNT 1` with a short `BLOCK`, the stream
//!   equivalent of prefetch 1.
//! - Requeue by republish. A retryable failure XADDs a fresh entry and only
//!   then acks the old one, so the retry never depends on the old delivery.
//!
//! ## Architecture
//!
//! Entries carry a single `id` field holding the task id; everything else
//! about the task lives in the task store.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use motionforge_core::TaskId;
use motionforge_messaging::{DeliveryHandler, Disposition, TaskQueue};

use crate::connect;

/// Default Redis endpoint.
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Queue consumed when none is configured.
const DEFAULT_QUEUE: &str = "animation";

/// Consumer group shared by every worker on a queue.
const DEFAULT_GROUP: &str = "workers";

/// Prefix for the stream key backing a queue.
const STREAM_KEY_PREFIX: &str = "motionforge:queue:";

/// How long a read blocks waiting for a delivery (milliseconds).
const DEFAULT_BLOCK_MS: u64 = 5_000;

/// Idle time after which another consumer's pending delivery is claimed.
const DEFAULT_CLAIM_IDLE_MS: u64 = 30_000;

/// Stream entry field carrying the task id.
const BODY_FIELD: &str = "id";

/// Errors from the Redis Streams transport.
#[derive(Debug, thiserror::Error)]
pub enum RedisQueueError {
    #[error("queue connection error: {0}")]
    Connection(String),

    #[error("queue command error: {0}")]
    Command(String),

    #[error("malformed stream entry: {0}")]
    Entry(String),

    #[error("handler fault: {0}")]
    Handler(String),
}

/// Connection settings for [`RedisStreamQueue`].
#[derive(Debug, Clone)]
pub struct RedisStreamQueueConfig {
    pub url: String,
    pub queue: String,
    pub group: String,
    /// Consumer name within the group; must survive restarts of the same
    /// worker so its pending entries are reclaimed rather than orphaned.
    pub consumer: String,
    pub block_ms: u64,
    pub claim_idle_ms: u64,
    pub retry_delay: Duration,
}

impl Default for RedisStreamQueueConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REDIS_URL.to_string(),
            queue: DEFAULT_QUEUE.to_string(),
            group: DEFAULT_GROUP.to_string(),
            consumer: format!("worker-{}", Uuid::now_v7()),
            block_ms: DEFAULT_BLOCK_MS,
            claim_idle_ms: DEFAULT_CLAIM_IDLE_MS,
            retry_delay: connect::DEFAULT_RETRY_DELAY,
        }
    }
}

impl RedisStreamQueueConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn with_consumer(mut self, consumer: impl Into<String>) -> Self {
        self.consumer = consumer.into();
        self
    }
}

/// Redis Streams implementation of [`TaskQueue`].
#[derive(Debug, Clone)]
pub struct RedisStreamQueue {
    client: Arc<redis::Client>,
    stream_key: String,
    group: String,
    consumer: String,
    block_ms: u64,
    claim_idle_ms: u64,
}

impl RedisStreamQueue {
    /// Connect to Redis and ensure the stream and consumer group exist,
    /// waiting indefinitely for the server to accept.
    ///
    /// Only a malformed URL fails here; an unreachable server is retried
    /// every `retry_delay`.
    pub fn connect(config: RedisStreamQueueConfig) -> Result<Self, RedisQueueError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| RedisQueueError::Connection(e.to_string()))?;

        let queue = Self {
            client: Arc::new(client),
            stream_key: format!("{STREAM_KEY_PREFIX}{}", config.queue),
            group: config.group,
            consumer: config.consumer,
            block_ms: config.block_ms,
            claim_idle_ms: config.claim_idle_ms,
        };

        connect::retry_indefinitely("task queue", config.retry_delay, || queue.ensure_group());
        info!(
            stream_key = %queue.stream_key,
            group = %queue.group,
            consumer = %queue.consumer,
            "task queue ready"
        );
        Ok(queue)
    }

    // XGROUP CREATE with MKSTREAM creates the stream if it doesn't exist;
    // BUSYGROUP just means another worker got there first.
    fn ensure_group(&self) -> Result<(), RedisQueueError> {
        let mut conn = self.connection()?;
        let created: Result<String, redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg("0")
            .arg("MKSTREAM")
            .query(&mut conn);

        match created {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(RedisQueueError::Command(e.to_string())),
        }
    }

    fn connection(&self) -> Result<redis::Connection, RedisQueueError> {
        self.client
            .get_connection()
            .map_err(|e| RedisQueueError::Connection(e.to_string()))
    }

    /// Publish a task id onto the queue.
    #[instrument(skip(self), fields(stream_key = %self.stream_key, task_id = %id), err)]
    pub fn publish_task(&self, id: &TaskId) -> Result<(), RedisQueueError> {
        let mut conn = self.connection()?;
        self.publish_body(&mut conn, id.as_str())?;
        info!("published task");
        Ok(())
    }

    fn publish_body(
        &self,
        conn: &mut redis::Connection,
        body: &str,
    ) -> Result<(), RedisQueueError> {
        let _: String = redis::cmd("XADD")
            .arg(&self.stream_key)
            .arg("*")
            .arg(BODY_FIELD)
            .arg(body)
            .query(conn)
            .map_err(|e| RedisQueueError::Command(format!("XADD failed: {e}")))?;
        Ok(())
    }

    /// Consume deliveries one at a time until the handler faults or the
    /// transport drops.
    ///
    /// Stale deliveries abandoned by crashed consumers are claimed before
    /// new entries are read, so redeliveries are never starved by fresh
    /// submissions.
    pub fn consume_loop(&self, handler: &dyn DeliveryHandler) -> Result<(), RedisQueueError> {
        let mut conn = self.connection()?;
        info!(
            stream_key = %self.stream_key,
            consumer = %self.consumer,
            "consuming deliveries"
        );

        loop {
            let delivery = match self.claim_stale(&mut conn)? {
                Some(entry) => Some(entry),
                None => self.read_next(&mut conn)?,
            };
            let Some((entry_id, body)) = delivery else {
                continue;
            };

            match handler.handle(&body) {
                Ok(Disposition::Processed) => {
                    info!(task_id = %body, "delivery processed, acking");
                    self.ack(&mut conn, &entry_id)?;
                }
                Ok(Disposition::RetryableFailure) => {
                    info!(task_id = %body, "delivery failed, requeueing");
                    // Republish before acking: a crash in between duplicates
                    // the delivery instead of losing it.
                    self.publish_body(&mut conn, &body)?;
                    self.ack(&mut conn, &entry_id)?;
                }
                Ok(Disposition::TerminalFailure) => {
                    warn!(task_id = %body, "delivery failed terminally, dropping");
                    self.ack(&mut conn, &entry_id)?;
                }
                Err(fault) => {
                    // The entry stays pending and comes back through
                    // XAUTOCLAIM after restart.
                    return Err(RedisQueueError::Handler(fault.to_string()));
                }
            }
        }
    }

    fn claim_stale(
        &self,
        conn: &mut redis::Connection,
    ) -> Result<Option<(String, String)>, RedisQueueError> {
        let reply: redis::Value = redis::cmd("XAUTOCLAIM")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg(&self.consumer)
            .arg(self.claim_idle_ms.to_string())
            .arg("0-0")
            .arg("COUNT")
            .arg("1")
            .query(conn)
            .map_err(|e| RedisQueueError::Command(format!("XAUTOCLAIM failed: {e}")))?;

        // Reply shape: [next-cursor, [entry, ...], ...]
        let redis::Value::Bulk(parts) = reply else {
            return Ok(None);
        };
        let Some(redis::Value::Bulk(entries)) = parts.get(1) else {
            return Ok(None);
        };

        match entries.first() {
            // Deleted entries surface as nils on older servers; skip them.
            Some(entry @ redis::Value::Bulk(_)) => parse_entry(entry).map(Some),
            _ => Ok(None),
        }
    }

    fn read_next(
        &self,
        conn: &mut redis::Connection,
    ) -> Result<Option<(String, String)>, RedisQueueError> {
        let reply: redis::Value = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg("1")
            .arg("BLOCK")
            .arg(self.block_ms.to_string())
            .arg("STREAMS")
            .arg(&self.stream_key)
            .arg(">")
            .query(conn)
            .map_err(|e| RedisQueueError::Command(format!("XREADGROUP failed: {e}")))?;

        // Reply shape: [[stream-name, [entry, ...]]], or nil on timeout.
        let streams = match reply {
            redis::Value::Nil => return Ok(None),
            redis::Value::Bulk(streams) => streams,
            other => {
                return Err(RedisQueueError::Entry(format!(
                    "unexpected XREADGROUP reply: {other:?}"
                )));
            }
        };

        let entries = match streams.first() {
            Some(redis::Value::Bulk(stream)) => match stream.get(1) {
                Some(redis::Value::Bulk(entries)) => entries,
                _ => {
                    return Err(RedisQueueError::Entry(
                        "stream reply missing entries".to_string(),
                    ));
                }
            },
            _ => return Ok(None),
        };

        match entries.first() {
            Some(entry) => parse_entry(entry).map(Some),
            None => Ok(None),
        }
    }

    fn ack(&self, conn: &mut redis::Connection, entry_id: &str) -> Result<(), RedisQueueError> {
        let _: u64 = redis::cmd("XACK")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg(entry_id)
            .query(conn)
            .map_err(|e| RedisQueueError::Command(format!("XACK failed: {e}")))?;
        Ok(())
    }
}

impl TaskQueue for RedisStreamQueue {
    type Error = RedisQueueError;

    fn publish(&self, id: &TaskId) -> Result<(), Self::Error> {
        self.publish_task(id)
    }

    fn consume(&self, handler: &dyn DeliveryHandler) -> Result<(), Self::Error> {
        self.consume_loop(handler)
    }
}

/// Pull the entry id and task id out of a stream entry.
fn parse_entry(entry: &redis::Value) -> Result<(String, String), RedisQueueError> {
    let redis::Value::Bulk(parts) = entry else {
        return Err(RedisQueueError::Entry(format!(
            "entry is not an array: {entry:?}"
        )));
    };

    let entry_id = match parts.first() {
        Some(redis::Value::Data(raw)) => String::from_utf8_lossy(raw).into_owned(),
        _ => return Err(RedisQueueError::Entry("entry has no id".to_string())),
    };

    let fields = match parts.get(1) {
        Some(redis::Value::Bulk(fields)) => fields,
        _ => {
            return Err(RedisQueueError::Entry(format!(
                "entry {entry_id} has no fields"
            )));
        }
    };

    for pair in fields.chunks(2) {
        if let [redis::Value::Data(name), redis::Value::Data(value)] = pair {
            if name.as_slice() == BODY_FIELD.as_bytes() {
                return Ok((entry_id, String::from_utf8_lossy(value).into_owned()));
            }
        }
    }

    Err(RedisQueueError::Entry(format!(
        "entry {entry_id} has no {BODY_FIELD} field"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(entry_id: &str, fields: &[(&str, &str)]) -> redis::Value {
        let mut flat = Vec::new();
        for (name, value) in fields {
            flat.push(redis::Value::Data(name.as_bytes().to_vec()));
            flat.push(redis::Value::Data(value.as_bytes().to_vec()));
        }
        redis::Value::Bulk(vec![
            redis::Value::Data(entry_id.as_bytes().to_vec()),
            redis::Value::Bulk(flat),
        ])
    }

    #[test]
    fn parses_well_formed_entries() {
        let parsed = parse_entry(&entry("1111-0", &[("id", "t-1")])).unwrap();
        assert_eq!(parsed, ("1111-0".to_string(), "t-1".to_string()));
    }

    #[test]
    fn skips_unrelated_fields() {
        let parsed = parse_entry(&entry("2222-0", &[("trace", "abc"), ("id", "t-9")])).unwrap();
        assert_eq!(parsed.1, "t-9");
    }

    #[test]
    fn rejects_entries_without_a_task_id() {
        let err = parse_entry(&entry("3333-0", &[("trace", "abc")])).unwrap_err();
        assert!(matches!(err, RedisQueueError::Entry(_)));
    }

    #[test]
    fn rejects_non_array_entries() {
        assert!(parse_entry(&redis::Value::Nil).is_err());
    }

    #[test]
    fn default_consumer_names_are_unique() {
        let a = RedisStreamQueueConfig::default();
        let b = RedisStreamQueueConfig::default();

        assert_ne!(a.consumer, b.consumer);
        assert!(a.consumer.starts_with("worker-"));
    }
}
