use serde::{Deserialize, Serialize};

use wareflow_core::{AggregateId, ValueObject};

macro_rules! impl_master_id {
    ($(#[$meta:meta])* $t:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(pub AggregateId);

        impl $t {
            pub fn new(id: AggregateId) -> Self {
                Self(id)
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

impl_master_id!(
    /// Product master identifier.
    ProductId
);
impl_master_id!(
    /// Product variant identifier (size/colour/grade split of a product).
    VariantId
);
impl_master_id!(
    /// Warehouse master identifier.
    WarehouseId
);
impl_master_id!(
    /// Storage bin within a warehouse.
    BinId
);
impl_master_id!(
    /// Unit-of-measure identifier.
    UomId
);

/// A per-unit serial number, unique within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerialNumber(String);

impl SerialNumber {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The key every stock fact is scoped to: (product, optional variant, warehouse).
///
/// On-hand quantity, reservations and availability are all per `StockKey`;
/// two keys never share stock. A product without variants uses `variant: None`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub product: ProductId,
    pub variant: Option<VariantId>,
    pub warehouse: WarehouseId,
}

impl StockKey {
    pub fn new(product: ProductId, warehouse: WarehouseId) -> Self {
        Self {
            product,
            variant: None,
            warehouse,
        }
    }

    pub fn with_variant(product: ProductId, variant: VariantId, warehouse: WarehouseId) -> Self {
        Self {
            product,
            variant: Some(variant),
            warehouse,
        }
    }

    /// The same product/variant in a different warehouse (transfer destination).
    pub fn in_warehouse(self, warehouse: WarehouseId) -> Self {
        Self { warehouse, ..self }
    }
}

impl ValueObject for StockKey {}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.variant {
            Some(v) => write!(f, "{}/{}@{}", self.product, v, self.warehouse),
            None => write!(f, "{}@{}", self.product, self.warehouse),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_with_different_variants_are_distinct() {
        let product = ProductId::new(AggregateId::new());
        let warehouse = WarehouseId::new(AggregateId::new());
        let plain = StockKey::new(product, warehouse);
        let varied =
            StockKey::with_variant(product, VariantId::new(AggregateId::new()), warehouse);
        assert_ne!(plain, varied);
    }

    #[test]
    fn in_warehouse_moves_only_the_warehouse() {
        let product = ProductId::new(AggregateId::new());
        let src = WarehouseId::new(AggregateId::new());
        let dst = WarehouseId::new(AggregateId::new());
        let key = StockKey::new(product, src);
        let moved = key.in_warehouse(dst);
        assert_eq!(moved.product, key.product);
        assert_eq!(moved.variant, key.variant);
        assert_eq!(moved.warehouse, dst);
    }
}
