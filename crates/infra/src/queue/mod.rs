//! Queue transports.
//!
//! ## Components
//!
//! - `RedisStreamQueue` - durable consumer-group transport over Redis Streams
//!
//! The in-memory transport used by tests lives in `motionforge-messaging`
//! next to the `TaskQueue` trait itself.

mod redis_streams;

pub use redis_streams::{RedisQueueError, RedisStreamQueue, RedisStreamQueueConfig};
