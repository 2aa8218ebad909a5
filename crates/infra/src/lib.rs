//! Infrastructure layer: Redis transports, task persistence, coordination.
//!
//! The pure contracts (queue, handler) live in `motionforge-messaging`; this
//! crate provides the backed implementations and the retry coordinator that
//! wires store, queue, and the external render call together.

pub mod connect;
pub mod coordinator;
pub mod queue;
pub mod task_store;
pub mod work;


pub use coordinator::RetryCoordinator;
pub use queue::{RedisQueueError, RedisStreamQueue, RedisStreamQueueConfig};
pub use task_store::{
    InMemoryTaskStore, RedisTaskStore, RedisTaskStoreConfig, TaskStore, TaskStoreError,
};
pub use work::{WorkError, WorkExecutor};
