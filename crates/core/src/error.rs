//! Business-rule error taxonomy for the stock engine.

use thiserror::Error;

/// Result type used across the domain layer.
pub type StockResult<T> = Result<T, StockError>;

/// Typed business-rule failure.
///
/// Every variant is recoverable by the caller and carries enough context
/// (shortfall, current state) to react without a follow-up query.
/// Infrastructure failures (lock waits, commit conflicts) live in the
/// engine crate, not here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    /// Malformed quantity/rate/percentage input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An outward movement would drive on-hand stock negative.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    /// A reservation would exceed on-hand stock for its key.
    #[error(
        "over-allocation: requested {requested} with {already_reserved} already reserved against {on_hand} on hand"
    )]
    OverAllocation {
        requested: i64,
        on_hand: i64,
        already_reserved: i64,
    },

    /// A serial unit is not in a state that legally reaches the target status.
    #[error("serial {serial} not available: currently {status}")]
    SerialNotAvailable { serial: String, status: String },

    /// A lifecycle transition outside the transfer state table.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    /// A transfer above the approval threshold was moved without sign-off.
    #[error("approval required: estimated cost {estimated_cost} exceeds threshold {threshold}")]
    ApprovalRequired { estimated_cost: i64, threshold: i64 },

    /// A requested record does not exist (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (duplicate record, stale version).
    #[error("conflict: {0}")]
    Conflict(String),

    /// An identifier failed to parse.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl StockError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn insufficient_stock(requested: i64, available: i64) -> Self {
        Self::InsufficientStock {
            requested,
            available,
        }
    }

    pub fn over_allocation(requested: i64, on_hand: i64, already_reserved: i64) -> Self {
        Self::OverAllocation {
            requested,
            on_hand,
            already_reserved,
        }
    }

    pub fn serial_not_available(serial: impl Into<String>, status: impl Into<String>) -> Self {
        Self::SerialNotAvailable {
            serial: serial.into(),
            status: status.into(),
        }
    }

    pub fn invalid_transition(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::InvalidStateTransition {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn approval_required(estimated_cost: i64, threshold: i64) -> Self {
        Self::ApprovalRequired {
            estimated_cost,
            threshold,
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
