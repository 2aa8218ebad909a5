//! Delivery-to-outcome coordination.
//!
//! [`RetryCoordinator`] is the worker's [`DeliveryHandler`]: it resolves a
//! delivered task id against the store, runs the executor at most once per
//! delivery, and records the outcome so a bounded number of redeliveries
//! drives every task to `complete` or `failed`.

use tracing::{error, info, instrument, warn};

use motionforge_core::TaskId;
use motionforge_messaging::{DeliveryHandler, Disposition, HandlerFault};

use crate::task_store::{TaskStore, TaskStoreError};
use crate::work::WorkExecutor;

/// Attempts a task gets before it is failed for good.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Turns queue deliveries into task outcomes.
///
/// Holds the two effectful seams (store and executor) explicitly; there is
/// no ambient state, so tests wire in whatever combination they need.
pub struct RetryCoordinator<S, W> {
    store: S,
    executor: W,
    max_attempts: u32,
}

impl<S, W> RetryCoordinator<S, W>
where
    S: TaskStore,
    W: WorkExecutor,
{
    pub fn new(store: S, executor: W) -> Self {
        Self {
            store,
            executor,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Override the attempt budget (clamped to at least one attempt).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Resolve one delivered task id.
    ///
    /// ## Per-delivery flow
    ///
    /// 1. Load the task. A body that resolves to nothing (or to a corrupt
    ///    document) is dropped terminally; only store transport failures
    ///    abort consumption.
    /// 2. Already `complete` or `failed`: ack without touching anything.
    ///    This is the idempotency path for redeliveries.
    /// 3. Non-terminal but out of budget (the previous holder crashed on
    ///    its final attempt): record the aborted attempt and fail the task.
    /// 4. Claim the attempt: status `processing` and the bumped counter in
    ///    one store update.
    /// 5. Run the executor once.
    /// 6. Record the outcome: `complete` with the artifact, or an appended
    ///    error plus `failed` once the budget is spent.
    #[instrument(skip_all, fields(task_id = %body), err)]
    pub fn handle_delivery(&self, body: &str) -> Result<Disposition, HandlerFault> {
        let delivered = TaskId::from(body);

        let task = match self.store.fetch(&delivered) {
            Ok(task) => task,
            Err(e) if e.is_transport() => return Err(HandlerFault::new(e.to_string())),
            Err(e) => {
                error!(error = %e, "delivery does not resolve to a usable task, dropping");
                return Ok(Disposition::TerminalFailure);
            }
        };

        if task.status.is_terminal() {
            info!(status = %task.status, "task already resolved, acking redelivery");
            return Ok(Disposition::Processed);
        }

        if task.num_attempts >= self.max_attempts {
            // A worker crashed mid-attempt with no budget left; no new
            // attempt is allowed, so resolve the task here.
            warn!(
                num_attempts = task.num_attempts,
                "attempt budget already spent, failing task"
            );
            self.record(|| {
                self.store.append_error(
                    &delivered,
                    &format!("attempt {} aborted before completion", task.num_attempts),
                )
            })?;
            self.record(|| self.store.mark_failed(&delivered))?;
            return Ok(Disposition::TerminalFailure);
        }

        let attempt = task.num_attempts + 1;
        info!(attempt, max_attempts = self.max_attempts, "starting attempt");
        self.record(|| self.store.begin_attempt(&delivered, attempt))?;

        if task.id.as_str() != body {
            // The document carries a different id than the key it was
            // fetched by. Retrying cannot fix that.
            error!(stored_id = %task.id, "message and stored task id mismatch, failing task");
            self.record(|| {
                self.store.append_error(
                    &delivered,
                    &format!("message and stored task id mismatch: {body} != {}", task.id),
                )
            })?;
            self.record(|| self.store.mark_failed(&delivered))?;
            return Ok(Disposition::TerminalFailure);
        }

        match self.executor.execute(&task) {
            Ok(artifact) => {
                self.record(|| self.store.complete(&delivered, &artifact))?;
                info!(attempt, bytes = artifact.len(), "task complete");
                Ok(Disposition::Processed)
            }
            Err(e) => {
                warn!(attempt, error = %e, "attempt failed");
                self.record(|| self.store.append_error(&delivered, &e.to_string()))?;

                if attempt >= self.max_attempts {
                    self.record(|| self.store.mark_failed(&delivered))?;
                    error!(attempt, "attempt budget exhausted, failing task");
                    Ok(Disposition::TerminalFailure)
                } else {
                    // The task stays `processing`; the requeued message
                    // carries the retry.
                    Ok(Disposition::RetryableFailure)
                }
            }
        }
    }

    // Outcome writes that don't land can't be papered over: surface them as
    // a fault so the delivery stays unacknowledged.
    fn record(&self, op: impl FnOnce() -> Result<(), TaskStoreError>) -> Result<(), HandlerFault> {
        op().map_err(|e| HandlerFault::new(e.to_string()))
    }
}

impl<S, W> DeliveryHandler for RetryCoordinator<S, W>
where
    S: TaskStore,
    W: WorkExecutor,
{
    fn handle(&self, body: &str) -> Result<Disposition, HandlerFault> {
        self.handle_delivery(body)
    }
}
