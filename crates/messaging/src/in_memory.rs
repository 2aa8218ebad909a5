//! In-memory task queue for tests/dev.

use std::collections::VecDeque;
use std::sync::Mutex;

use motionforge_core::TaskId;

use crate::queue::{DeliveryHandler, TaskQueue};

/// Deliveries processed in one `consume` call before giving up.
///
/// A handler that requeues unconditionally would otherwise spin forever;
/// tests want an error instead of a hang.
const DELIVERY_BUDGET: usize = 1024;

#[derive(Debug)]
pub enum InMemoryQueueError {
    /// Internal lock poisoning.
    Poisoned,
    /// `consume` hit the delivery budget without draining the queue.
    BudgetExhausted,
    /// The handler raised an unrecoverable fault.
    Handler(String),
}

/// In-memory FIFO queue.
///
/// - No IO / no async
/// - `consume` drains until empty, then returns (no blocking on new work)
/// - Requeued messages go to the back, like a broker redelivery would
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    messages: Mutex<VecDeque<String>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages currently queued.
    pub fn len(&self) -> usize {
        self.messages.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TaskQueue for InMemoryQueue {
    type Error = InMemoryQueueError;

    fn publish(&self, id: &TaskId) -> Result<(), Self::Error> {
        let mut messages = self
            .messages
            .lock()
            .map_err(|_| InMemoryQueueError::Poisoned)?;
        messages.push_back(id.as_str().to_string());
        Ok(())
    }

    fn consume(&self, handler: &dyn DeliveryHandler) -> Result<(), Self::Error> {
        for _ in 0..DELIVERY_BUDGET {
            let next = {
                let mut messages = self
                    .messages
                    .lock()
                    .map_err(|_| InMemoryQueueError::Poisoned)?;
                messages.pop_front()
            };

            let body = match next {
                Some(body) => body,
                None => return Ok(()),
            };

            match handler.handle(&body) {
                Ok(disposition) if disposition.should_requeue() => {
                    let mut messages = self
                        .messages
                        .lock()
                        .map_err(|_| InMemoryQueueError::Poisoned)?;
                    messages.push_back(body);
                }
                Ok(_) => {}
                Err(fault) => return Err(InMemoryQueueError::Handler(fault.to_string())),
            }
        }

        Err(InMemoryQueueError::BudgetExhausted)
    }
}
