use thiserror::Error;

use wareflow_core::StockError;
use wareflow_events::AuditError;

pub type EngineResult<T> = Result<T, EngineError>;

/// Failures surfaced by the engine facade.
///
/// `Stock` carries the typed business-rule taxonomy and is never worth
/// retrying as-is; `Store` and `Conflict` are the transient infrastructure
/// class a caller may retry.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Stock(#[from] StockError),

    /// In-memory store failure (poisoned lock, audit serialization).
    #[error("store failure: {0}")]
    Store(String),

    /// Concurrent writer won; the caller should reload and retry.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl EngineError {
    pub(crate) fn poisoned() -> Self {
        Self::Store("lock poisoned".to_string())
    }
}

impl From<AuditError> for EngineError {
    fn from(err: AuditError) -> Self {
        Self::Store(err.to_string())
    }
}
