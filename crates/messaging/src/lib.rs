//! `motionforge-messaging` - task queue abstraction (mechanics only).
//!
//! Transport-agnostic queue contracts plus an in-memory implementation for
//! tests/dev. Durable transports live in `motionforge-infra`.

pub mod in_memory;
pub mod queue;

pub use in_memory::{InMemoryQueue, InMemoryQueueError};
pub use queue::{DeliveryHandler, Disposition, HandlerFault, TaskQueue};
