//! `motionforge-core` - domain foundation building blocks.
//!
//! This crate contains **pure domain** types for animation tasks (no queue or
//! storage concerns).

pub mod error;
pub mod id;
pub mod task;

pub use error::DomainError;
pub use id::TaskId;
pub use task::{OutputFormat, Task, TaskPayload, TaskStatus};
