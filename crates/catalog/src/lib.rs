//! `wareflow-catalog` — typed references to the masters the engine consumes.
//!
//! Product, warehouse, bin and UoM records are owned by the surrounding
//! application; the engine only ever sees their identifiers. Keeping them as
//! distinct newtypes stops a warehouse id from ever being passed where a
//! product id belongs.

pub mod key;

pub use key::{BinId, ProductId, SerialNumber, StockKey, UomId, VariantId, WarehouseId};
