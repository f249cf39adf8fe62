use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use wareflow_catalog::StockKey;
use wareflow_core::{Aggregate, AggregateId, AggregateRoot, Entity, StockError, TenantId, UserId};
use wareflow_events::Event;

/// Reservation book identifier (one book per tenant + stock key).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationBookId(pub AggregateId);

impl ReservationBookId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ReservationBookId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Reservation lifecycle. Rows are never deleted, only status-transitioned.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Active,
    Released,
    Consumed,
}

/// The document a reservation is held for (order, pick list, transfer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub doc_type: String,
    pub doc_number: String,
}

impl DocumentRef {
    pub fn new(doc_type: impl Into<String>, doc_number: impl Into<String>) -> Self {
        Self {
            doc_type: doc_type.into(),
            doc_number: doc_number.into(),
        }
    }
}

/// A soft claim on stock for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub reservation_id: Uuid,
    pub key: StockKey,
    pub reserved_quantity: i64,
    pub reference: DocumentRef,
    pub status: ReservationStatus,
    pub reserved_by: UserId,
    pub reserved_at: DateTime<Utc>,
}

impl Entity for Reservation {
    type Id = Uuid;

    fn id(&self) -> &Self::Id {
        &self.reservation_id
    }
}

/// Aggregate root: ReservationBook for one stock key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationBook {
    id: ReservationBookId,
    tenant_id: Option<TenantId>,
    key: Option<StockKey>,
    reservations: Vec<Reservation>,
    version: u64,
}

impl ReservationBook {
    /// Empty book for rehydration.
    pub fn empty(id: ReservationBookId) -> Self {
        Self {
            id,
            tenant_id: None,
            key: None,
            reservations: Vec::new(),
            version: 0,
        }
    }

    pub fn id_typed(&self) -> ReservationBookId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    /// All rows, regardless of status (audit view).
    pub fn all(&self) -> &[Reservation] {
        &self.reservations
    }

    /// Active rows. This list is the availability formula's subtraction input.
    pub fn active(&self) -> Vec<Reservation> {
        self.reservations
            .iter()
            .filter(|r| r.status == ReservationStatus::Active)
            .cloned()
            .collect()
    }

    /// Sum of active reserved quantity.
    pub fn active_quantity(&self) -> i64 {
        self.reservations
            .iter()
            .filter(|r| r.status == ReservationStatus::Active)
            .map(|r| r.reserved_quantity)
            .sum()
    }

    fn find(&self, reservation_id: Uuid) -> Option<&Reservation> {
        self.reservations
            .iter()
            .find(|r| r.reservation_id == reservation_id)
    }
}

impl AggregateRoot for ReservationBook {
    type Id = ReservationBookId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: Reserve quantity against a document.
///
/// `on_hand` is supplied by the engine from the ledger under the same key
/// lock, so the over-allocation check here is authoritative at commit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reserve {
    pub tenant_id: TenantId,
    pub key: StockKey,
    pub quantity: i64,
    pub reference: DocumentRef,
    pub reserved_by: UserId,
    pub on_hand: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Release a reservation (idempotent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub tenant_id: TenantId,
    pub reservation_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Consume a reservation (its movement has been committed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consume {
    pub tenant_id: TenantId,
    pub reservation_id: Uuid,
    pub txn_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationCommand {
    Reserve(Reserve),
    Release(Release),
    Consume(Consume),
}

/// Event: Reserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reserved {
    pub tenant_id: TenantId,
    pub reservation: Reservation,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReservationReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationReleased {
    pub tenant_id: TenantId,
    pub reservation_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReservationConsumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationConsumed {
    pub tenant_id: TenantId,
    pub reservation_id: Uuid,
    pub txn_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationEvent {
    Reserved(Reserved),
    ReservationReleased(ReservationReleased),
    ReservationConsumed(ReservationConsumed),
}

impl Event for ReservationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReservationEvent::Reserved(_) => "stock.reservation.reserved",
            ReservationEvent::ReservationReleased(_) => "stock.reservation.released",
            ReservationEvent::ReservationConsumed(_) => "stock.reservation.consumed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ReservationEvent::Reserved(e) => e.occurred_at,
            ReservationEvent::ReservationReleased(e) => e.occurred_at,
            ReservationEvent::ReservationConsumed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ReservationBook {
    type Command = ReservationCommand;
    type Event = ReservationEvent;
    type Error = StockError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ReservationEvent::Reserved(e) => {
                if self.tenant_id.is_none() {
                    self.tenant_id = Some(e.tenant_id);
                    self.key = Some(e.reservation.key);
                }
                self.reservations.push(e.reservation.clone());
            }
            ReservationEvent::ReservationReleased(e) => {
                if let Some(r) = self
                    .reservations
                    .iter_mut()
                    .find(|r| r.reservation_id == e.reservation_id)
                {
                    r.status = ReservationStatus::Released;
                }
            }
            ReservationEvent::ReservationConsumed(e) => {
                if let Some(r) = self
                    .reservations
                    .iter_mut()
                    .find(|r| r.reservation_id == e.reservation_id)
                {
                    r.status = ReservationStatus::Consumed;
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ReservationCommand::Reserve(cmd) => self.handle_reserve(cmd),
            ReservationCommand::Release(cmd) => self.handle_release(cmd),
            ReservationCommand::Consume(cmd) => self.handle_consume(cmd),
        }
    }
}

impl ReservationBook {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), StockError> {
        match self.tenant_id {
            Some(t) if t != tenant_id => Err(StockError::conflict("tenant mismatch")),
            _ => Ok(()),
        }
    }

    fn handle_reserve(&self, cmd: &Reserve) -> Result<Vec<ReservationEvent>, StockError> {
        self.ensure_tenant(cmd.tenant_id)?;
        if let Some(k) = self.key {
            if k != cmd.key {
                return Err(StockError::conflict("stock key mismatch"));
            }
        }

        if cmd.quantity <= 0 {
            return Err(StockError::invalid_input("reserved quantity must be positive"));
        }

        let already_reserved = self.active_quantity();
        if cmd.quantity + already_reserved > cmd.on_hand {
            return Err(StockError::over_allocation(
                cmd.quantity,
                cmd.on_hand,
                already_reserved,
            ));
        }

        Ok(vec![ReservationEvent::Reserved(Reserved {
            tenant_id: cmd.tenant_id,
            reservation: Reservation {
                reservation_id: Uuid::now_v7(),
                key: cmd.key,
                reserved_quantity: cmd.quantity,
                reference: cmd.reference.clone(),
                status: ReservationStatus::Active,
                reserved_by: cmd.reserved_by,
                reserved_at: cmd.occurred_at,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &Release) -> Result<Vec<ReservationEvent>, StockError> {
        self.ensure_tenant(cmd.tenant_id)?;

        // Releasing an unknown or non-active reservation is a no-op, not an error.
        match self.find(cmd.reservation_id) {
            Some(r) if r.status == ReservationStatus::Active => {
                Ok(vec![ReservationEvent::ReservationReleased(
                    ReservationReleased {
                        tenant_id: cmd.tenant_id,
                        reservation_id: cmd.reservation_id,
                        occurred_at: cmd.occurred_at,
                    },
                )])
            }
            _ => Ok(Vec::new()),
        }
    }

    fn handle_consume(&self, cmd: &Consume) -> Result<Vec<ReservationEvent>, StockError> {
        self.ensure_tenant(cmd.tenant_id)?;

        match self.find(cmd.reservation_id) {
            Some(r) if r.status == ReservationStatus::Active => {
                Ok(vec![ReservationEvent::ReservationConsumed(
                    ReservationConsumed {
                        tenant_id: cmd.tenant_id,
                        reservation_id: cmd.reservation_id,
                        txn_id: cmd.txn_id,
                        occurred_at: cmd.occurred_at,
                    },
                )])
            }
            _ => Ok(Vec::new()),
        }
    }
}
