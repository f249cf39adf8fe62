//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value** — two with the
/// same attribute values are the same value. `StockKey` and the calculator's
/// money figures are value objects; a `Reservation` (which has an id and a
/// lifecycle) is an entity.
///
/// To "modify" a value object, build a new one. That keeps them safe to
/// share across threads and predictable under concurrent reads.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
