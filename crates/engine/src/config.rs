use serde::{Deserialize, Serialize};

/// Engine behaviour knobs.
///
/// Money rounding is not configurable: all derived money figures are rounded
/// half-up to 2 decimal places in the pricing crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Transfers with an estimated cost above this (smallest currency unit)
    /// require an explicit approver; at or below it they auto-approve on
    /// submission.
    pub approval_threshold: i64,

    /// When set, generating a pick list also reserves each line's quantity
    /// against the pick list document. Off by default: picking records work,
    /// it does not claim stock.
    pub picking_reserves: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            approval_threshold: 0,
            picking_reserves: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_requires_approval_for_everything() {
        let config = EngineConfig::default();
        assert_eq!(config.approval_threshold, 0);
        assert!(!config.picking_reserves);
    }

    #[test]
    fn partial_config_deserializes_with_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"approval_threshold": 50000}"#).unwrap();
        assert_eq!(config.approval_threshold, 50_000);
        assert!(!config.picking_reserves);
    }
}
