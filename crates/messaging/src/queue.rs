//! Task queue abstraction (mechanics only).
//!
//! This module provides the **work queue pattern** - point-to-point delivery
//! of task ids to whichever worker picks them up first.
//!
//! ## Design Philosophy
//!
//! The queue is intentionally **lightweight** and makes minimal assumptions:
//!
//! - **Transport-agnostic**: Works with in-memory queues, Redis Streams, AMQP brokers, etc.
//! - **At-least-once delivery**: Messages may be delivered multiple times; handlers must be idempotent
//! - **Ids only**: The message body is a task id; the task store is the source of truth for state
//! - **Explicit resolution**: Every delivery ends in an acknowledge, a requeue, or a durable drop
//!
//! ## Why At-Least-Once?
//!
//! At-least-once delivery is acceptable because:
//! - **Store first**: Tasks are persisted before their ids are published
//! - **Idempotent handlers**: A delivery for an already-resolved task acks without touching it
//! - **Simplicity**: At-least-once is easier to operate than exactly-once
//! - **Recovery**: A crashed worker's unacknowledged message simply redelivers elsewhere
//!
//! Handlers must be idempotent - processing the same message twice should
//! produce the same stored outcome (or be a no-op).

use std::sync::Arc;

use motionforge_core::TaskId;

/// Decision a handler reaches for one delivered message.
///
/// This is what drives the broker acknowledgement: `Processed` and
/// `TerminalFailure` both remove the message for good, `RetryableFailure`
/// puts it back for another delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The delivery is fully resolved (including "it was already resolved
    /// before we got it"); acknowledge and move on.
    Processed,
    /// The attempt failed but the task has retry budget left; requeue.
    RetryableFailure,
    /// The task cannot succeed; drop the message without requeueing.
    TerminalFailure,
}

impl Disposition {
    pub fn should_requeue(&self) -> bool {
        matches!(self, Disposition::RetryableFailure)
    }
}

/// Fault that aborts consumption entirely.
///
/// Raised when a handler cannot even record the outcome of a delivery
/// (typically the task store went away mid-flight). The consume loop stops,
/// the in-flight message stays unacknowledged for redelivery, and the
/// process exits so the supervisor restarts it into a fresh connect cycle.
#[derive(Debug, Clone, thiserror::Error)]
#[error("handler fault: {0}")]
pub struct HandlerFault(pub String);

impl HandlerFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Processes one delivered message body.
///
/// `body` is the raw message payload (a task id). Implementations must be
/// idempotent: at-least-once delivery means the same body can arrive more
/// than once, possibly at different workers.
pub trait DeliveryHandler: Send + Sync {
    fn handle(&self, body: &str) -> Result<Disposition, HandlerFault>;
}

impl<H> DeliveryHandler for Arc<H>
where
    H: DeliveryHandler + ?Sized,
{
    fn handle(&self, body: &str) -> Result<Disposition, HandlerFault> {
        (**self).handle(body)
    }
}

/// Domain-agnostic task queue (point-to-point work distribution).
///
/// ## Architecture Role
///
/// The queue sits between task submission and the workers:
///
/// ```text
/// Submission → Task Store (persist task) → Queue (publish id) → Worker
///                                                                  └─ resolves via the store
/// ```
///
/// Ids are **stored first**, then **published**. Losing a message is
/// recoverable (republish the id); losing store state is not.
///
/// ## Delivery Guarantees
///
/// - At-least-once: unacknowledged messages are redelivered
/// - One in-flight delivery per consumer: `consume` runs the handler to
///   completion before reading the next message
/// - FIFO per queue as the transport provides it; no priorities
///
/// ## Error Handling
///
/// `publish` failures surface to the caller. `consume` returns only on
/// unrecoverable transport or handler faults; callers treat that as fatal
/// and lean on supervisor restart rather than retrying in place.
pub trait TaskQueue: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    /// Enqueue one task id for processing.
    fn publish(&self, id: &TaskId) -> Result<(), Self::Error>;

    /// Consume deliveries one at a time, routing each body through
    /// `handler` and resolving it per the returned [`Disposition`].
    fn consume(&self, handler: &dyn DeliveryHandler) -> Result<(), Self::Error>;
}

impl<Q> TaskQueue for Arc<Q>
where
    Q: TaskQueue + ?Sized,
{
    type Error = Q::Error;

    fn publish(&self, id: &TaskId) -> Result<(), Self::Error> {
        (**self).publish(id)
    }

    fn consume(&self, handler: &dyn DeliveryHandler) -> Result<(), Self::Error> {
        (**self).consume(handler)
    }
}
