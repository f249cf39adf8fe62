//! Domain events and the append-only audit record of stock mutations.

pub mod audit;
pub mod envelope;
pub mod event;

pub use audit::{AuditError, AuditLog};
pub use envelope::EventEnvelope;
pub use event::Event;
