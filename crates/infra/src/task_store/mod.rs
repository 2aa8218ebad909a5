//! Persistent task state.
//!
//! The store owns the task documents; workers mutate them only through the
//! operations here, each of which is one atomic update on one document.
//!
//! ## Components
//!
//! - `TaskStore`: the storage contract the coordinator programs against
//! - `InMemoryTaskStore`: for tests/dev
//! - `RedisTaskStore`: hash-per-task production store

mod in_memory;
mod redis;
mod store;

pub use in_memory::InMemoryTaskStore;
pub use redis::{RedisTaskStore, RedisTaskStoreConfig};
pub use store::{TaskStore, TaskStoreError};
