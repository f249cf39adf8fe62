//! `wareflow-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! strongly-typed identifiers, the engine-wide error taxonomy, and the
//! aggregate/entity/value-object traits every stock module builds on.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{StockError, StockResult};
pub use id::{AggregateId, TenantId, UserId};
pub use value_object::ValueObject;
