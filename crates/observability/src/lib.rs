//! Worker process observability.
//!
//! One JSON line per event on stdout, filtered by `RUST_LOG` (default
//! `info`). Spans opened at `#[instrument]` sites carry the task id through
//! every log line of a delivery, which is what makes a single task's
//! history greppable across retries.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::SystemTime;

/// Install the global tracing subscriber.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(SystemTime)
        .with_target(false)
        .try_init();
}
