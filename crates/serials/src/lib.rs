//! `wareflow-serials` — per-unit status tracking for serialized stock.
//!
//! Exactly one unit exists per serial number. Batch status updates are
//! all-or-nothing: if any serial in the batch cannot legally reach the
//! target status, nothing changes.

pub mod registry;

pub use registry::{
    RegisterSerials, SerialCommand, SerialEvent, SerialRegistry, SerialRegistryId,
    SerialStatus, SerialStatusUpdated, SerialUnit, SerialsRegistered, UpdateStatus,
};
