use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use wareflow_catalog::{BinId, StockKey};
use wareflow_core::{Aggregate, AggregateId, AggregateRoot, StockError, TenantId};
use wareflow_events::Event;

/// Stock ledger stream identifier (one stream per tenant + stock key).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockLedgerId(pub AggregateId);

impl StockLedgerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for StockLedgerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Whether a movement adds stock to the key or consumes it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementDirection {
    Inward,
    Outward,
}

/// Closed set of movement types the engine accepts.
///
/// A sale return brings stock back in; a purchase return sends it out.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    PurchaseIn,
    SaleOut,
    TransferIn,
    TransferOut,
    AdjustmentIn,
    AdjustmentOut,
    SaleReturnIn,
    PurchaseReturnOut,
}

impl MovementType {
    pub fn direction(self) -> MovementDirection {
        match self {
            MovementType::PurchaseIn
            | MovementType::TransferIn
            | MovementType::AdjustmentIn
            | MovementType::SaleReturnIn => MovementDirection::Inward,
            MovementType::SaleOut
            | MovementType::TransferOut
            | MovementType::AdjustmentOut
            | MovementType::PurchaseReturnOut => MovementDirection::Outward,
        }
    }

    pub fn is_outward(self) -> bool {
        self.direction() == MovementDirection::Outward
    }
}

/// One committed ledger entry (immutable once emitted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLedgerEntry {
    pub entry_id: Uuid,
    pub tenant_id: TenantId,
    pub key: StockKey,
    pub bin_id: Option<BinId>,
    pub movement: MovementType,
    /// Signed delta: positive inward, negative outward.
    pub quantity_delta: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    /// The document transaction this entry belongs to.
    pub txn_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

/// Aggregate root: StockLedger for one stock key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLedger {
    id: StockLedgerId,
    tenant_id: Option<TenantId>,
    key: Option<StockKey>,
    on_hand: i64,
    version: u64,
}

impl StockLedger {
    /// Empty stream for rehydration.
    pub fn empty(id: StockLedgerId) -> Self {
        Self {
            id,
            tenant_id: None,
            key: None,
            on_hand: 0,
            version: 0,
        }
    }

    pub fn id_typed(&self) -> StockLedgerId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn key(&self) -> Option<StockKey> {
        self.key
    }

    /// Physical quantity recorded for this key, ignoring reservations/holds.
    pub fn on_hand(&self) -> i64 {
        self.on_hand
    }
}

impl AggregateRoot for StockLedger {
    type Id = StockLedgerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordMovement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub tenant_id: TenantId,
    pub key: StockKey,
    pub bin_id: Option<BinId>,
    pub movement: MovementType,
    /// Unsigned quantity; the sign comes from the movement direction.
    pub quantity: i64,
    pub txn_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockLedgerCommand {
    RecordMovement(RecordMovement),
}

/// Event: MovementRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecorded {
    pub entry: StockLedgerEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockLedgerEvent {
    MovementRecorded(MovementRecorded),
}

impl Event for StockLedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockLedgerEvent::MovementRecorded(_) => "stock.ledger.movement_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockLedgerEvent::MovementRecorded(e) => e.entry.occurred_at,
        }
    }
}

impl Aggregate for StockLedger {
    type Command = StockLedgerCommand;
    type Event = StockLedgerEvent;
    type Error = StockError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockLedgerEvent::MovementRecorded(e) => {
                if self.tenant_id.is_none() {
                    self.tenant_id = Some(e.entry.tenant_id);
                    self.key = Some(e.entry.key);
                }
                self.on_hand = e.entry.new_stock;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockLedgerCommand::RecordMovement(cmd) => self.handle_record(cmd),
        }
    }
}

impl StockLedger {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), StockError> {
        match self.tenant_id {
            Some(t) if t != tenant_id => Err(StockError::conflict("tenant mismatch")),
            _ => Ok(()),
        }
    }

    fn ensure_key(&self, key: StockKey) -> Result<(), StockError> {
        match self.key {
            Some(k) if k != key => Err(StockError::conflict("stock key mismatch")),
            _ => Ok(()),
        }
    }

    fn handle_record(&self, cmd: &RecordMovement) -> Result<Vec<StockLedgerEvent>, StockError> {
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_key(cmd.key)?;

        if cmd.quantity <= 0 {
            return Err(StockError::invalid_input("quantity must be positive"));
        }

        let quantity_delta = match cmd.movement.direction() {
            MovementDirection::Inward => cmd.quantity,
            MovementDirection::Outward => {
                // On-hand check; reservation/hold subtraction happens in the
                // validator before the command reaches the ledger.
                if cmd.quantity > self.on_hand {
                    return Err(StockError::insufficient_stock(cmd.quantity, self.on_hand));
                }
                -cmd.quantity
            }
        };

        let previous_stock = self.on_hand;
        let new_stock = previous_stock + quantity_delta;
        debug_assert!(new_stock >= 0);

        Ok(vec![StockLedgerEvent::MovementRecorded(MovementRecorded {
            entry: StockLedgerEntry {
                entry_id: Uuid::now_v7(),
                tenant_id: cmd.tenant_id,
                key: cmd.key,
                bin_id: cmd.bin_id,
                movement: cmd.movement,
                quantity_delta,
                previous_stock,
                new_stock,
                txn_id: cmd.txn_id,
                occurred_at: cmd.occurred_at,
            },
        })])
    }
}
