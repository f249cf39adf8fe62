use serde::{Deserialize, Serialize};

use wareflow_ledger::MovementType;

/// The result of an availability check for one stock key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockValidation {
    pub is_valid: bool,
    /// `on_hand - reserved - on_hold`. May be negative when claims were
    /// placed before stock left through another door.
    pub available_stock: i64,
    pub on_hand: i64,
    pub reserved: i64,
    pub on_hold: i64,
    pub message: Option<String>,
}

/// Availability arithmetic, shared by the advisory preview and the
/// authoritative commit-time check.
///
/// Pure: the engine reads the three balances under the key lock and hands
/// them in, so both call sites run the exact same formula.
pub struct StockValidator;

impl StockValidator {
    pub fn assess(
        on_hand: i64,
        reserved: i64,
        on_hold: i64,
        quantity: i64,
        movement: MovementType,
    ) -> StockValidation {
        let available_stock = on_hand - reserved - on_hold;

        if !movement.is_outward() {
            return StockValidation {
                is_valid: true,
                available_stock,
                on_hand,
                reserved,
                on_hold,
                message: None,
            };
        }

        let is_valid = quantity <= available_stock;
        let message = if is_valid {
            None
        } else {
            Some(format!(
                "requested {quantity}, available {available_stock} (short by {})",
                quantity - available_stock
            ))
        };

        StockValidation {
            is_valid,
            available_stock,
            on_hand,
            reserved,
            on_hold,
            message,
        }
    }
}
