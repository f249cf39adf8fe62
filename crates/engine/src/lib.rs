//! `wareflow-engine` — the orchestration facade over the stock aggregates.
//!
//! The domain crates are pure state machines; this crate owns all interior
//! mutability. Mutations for one (tenant, stock key) are serialized behind
//! that key's lock, with validation and commit in the same critical section.
//! Every committed event lands in an append-only audit log.

pub mod config;
pub mod engine;
pub mod error;
pub mod validator;

mod store;

pub use config::EngineConfig;
pub use engine::InventoryEngine;
pub use error::{EngineError, EngineResult};
pub use validator::{StockValidation, StockValidator};
