//! Domain error model.

use thiserror::Error;

/// Domain-level error.
///
/// Keep this focused on deterministic domain failures (unparseable persisted
/// values). Transport and storage concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A persisted status string did not name a known status.
    #[error("unknown task status: {0}")]
    UnknownStatus(String),

    /// A persisted format string did not name a known output format.
    #[error("unknown output format: {0}")]
    UnknownFormat(String),
}
