use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use wareflow_catalog::{ProductId, StockKey, WarehouseId};
use wareflow_core::{Aggregate, AggregateId, AggregateRoot, Entity, StockError, TenantId, UserId};
use wareflow_events::Event;

/// QC book identifier (one book per tenant + product + warehouse).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QcBookId(pub AggregateId);

impl QcBookId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for QcBookId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Hold lifecycle. Rows are never deleted, only status-transitioned.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QcHoldStatus {
    OnHold,
    Released,
    Rejected,
}

/// A quantity withheld from availability pending inspection.
///
/// Holds are scoped to (product, warehouse); they withhold from every
/// variant's availability under that product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QcHold {
    pub hold_id: Uuid,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub hold_quantity: i64,
    pub hold_reason: String,
    pub status: QcHoldStatus,
    pub inspector_id: Option<UserId>,
    pub placed_at: DateTime<Utc>,
}

impl Entity for QcHold {
    type Id = Uuid;

    fn id(&self) -> &Self::Id {
        &self.hold_id
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageSeverity {
    Minor,
    Major,
    TotalLoss,
}

/// A recorded loss event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageAssessment {
    pub assessment_id: Uuid,
    pub key: StockKey,
    pub quantity: i64,
    pub severity: DamageSeverity,
    pub action_taken: Option<String>,
    pub assessed_by: UserId,
    pub assessed_at: DateTime<Utc>,
}

/// Aggregate root: QcBook for one product + warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QcBook {
    id: QcBookId,
    tenant_id: Option<TenantId>,
    product_id: Option<ProductId>,
    warehouse_id: Option<WarehouseId>,
    holds: Vec<QcHold>,
    assessments: Vec<DamageAssessment>,
    version: u64,
}

impl QcBook {
    /// Empty book for rehydration.
    pub fn empty(id: QcBookId) -> Self {
        Self {
            id,
            tenant_id: None,
            product_id: None,
            warehouse_id: None,
            holds: Vec::new(),
            assessments: Vec::new(),
            version: 0,
        }
    }

    pub fn id_typed(&self) -> QcBookId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn holds(&self) -> &[QcHold] {
        &self.holds
    }

    pub fn assessments(&self) -> &[DamageAssessment] {
        &self.assessments
    }

    /// Holds still withholding quantity.
    pub fn active_holds(&self) -> Vec<QcHold> {
        self.holds
            .iter()
            .filter(|h| h.status == QcHoldStatus::OnHold)
            .cloned()
            .collect()
    }

    /// Total quantity excluded from availability by this book.
    pub fn on_hold_quantity(&self) -> i64 {
        self.holds
            .iter()
            .filter(|h| h.status == QcHoldStatus::OnHold)
            .map(|h| h.hold_quantity)
            .sum()
    }

    fn find(&self, hold_id: Uuid) -> Option<&QcHold> {
        self.holds.iter().find(|h| h.hold_id == hold_id)
    }
}

impl AggregateRoot for QcBook {
    type Id = QcBookId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceHold.
///
/// `on_hand` is supplied by the engine from the ledger under the key lock;
/// a hold can never withhold more than physically exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceHold {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    pub reason: String,
    pub on_hand: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseHold (inspection passed; quantity re-enters availability).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseHold {
    pub tenant_id: TenantId,
    pub hold_id: Uuid,
    pub inspector_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectHold (inspection failed; quantity heads to disposal).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectHold {
    pub tenant_id: TenantId,
    pub hold_id: Uuid,
    pub inspector_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordDamage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDamage {
    pub tenant_id: TenantId,
    pub key: StockKey,
    pub quantity: i64,
    pub severity: DamageSeverity,
    pub action_taken: Option<String>,
    pub assessed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QcCommand {
    PlaceHold(PlaceHold),
    ReleaseHold(ReleaseHold),
    RejectHold(RejectHold),
    RecordDamage(RecordDamage),
}

/// Event: HoldPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldPlaced {
    pub tenant_id: TenantId,
    pub hold: QcHold,
    pub occurred_at: DateTime<Utc>,
}

/// Event: HoldReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldReleased {
    pub tenant_id: TenantId,
    pub hold_id: Uuid,
    pub inspector_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: HoldRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldRejected {
    pub tenant_id: TenantId,
    pub hold_id: Uuid,
    pub inspector_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DamageRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageRecorded {
    pub tenant_id: TenantId,
    pub assessment: DamageAssessment,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QcEvent {
    HoldPlaced(HoldPlaced),
    HoldReleased(HoldReleased),
    HoldRejected(HoldRejected),
    DamageRecorded(DamageRecorded),
}

impl Event for QcEvent {
    fn event_type(&self) -> &'static str {
        match self {
            QcEvent::HoldPlaced(_) => "stock.qc.hold_placed",
            QcEvent::HoldReleased(_) => "stock.qc.hold_released",
            QcEvent::HoldRejected(_) => "stock.qc.hold_rejected",
            QcEvent::DamageRecorded(_) => "stock.qc.damage_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            QcEvent::HoldPlaced(e) => e.occurred_at,
            QcEvent::HoldReleased(e) => e.occurred_at,
            QcEvent::HoldRejected(e) => e.occurred_at,
            QcEvent::DamageRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for QcBook {
    type Command = QcCommand;
    type Event = QcEvent;
    type Error = StockError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            QcEvent::HoldPlaced(e) => {
                if self.tenant_id.is_none() {
                    self.tenant_id = Some(e.tenant_id);
                    self.product_id = Some(e.hold.product_id);
                    self.warehouse_id = Some(e.hold.warehouse_id);
                }
                self.holds.push(e.hold.clone());
            }
            QcEvent::HoldReleased(e) => {
                if let Some(h) = self.holds.iter_mut().find(|h| h.hold_id == e.hold_id) {
                    h.status = QcHoldStatus::Released;
                    h.inspector_id = Some(e.inspector_id);
                }
            }
            QcEvent::HoldRejected(e) => {
                if let Some(h) = self.holds.iter_mut().find(|h| h.hold_id == e.hold_id) {
                    h.status = QcHoldStatus::Rejected;
                    h.inspector_id = Some(e.inspector_id);
                }
            }
            QcEvent::DamageRecorded(e) => {
                if self.tenant_id.is_none() {
                    self.tenant_id = Some(e.tenant_id);
                    self.product_id = Some(e.assessment.key.product);
                    self.warehouse_id = Some(e.assessment.key.warehouse);
                }
                self.assessments.push(e.assessment.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            QcCommand::PlaceHold(cmd) => self.handle_place(cmd),
            QcCommand::ReleaseHold(cmd) => self.handle_release(cmd),
            QcCommand::RejectHold(cmd) => self.handle_reject(cmd),
            QcCommand::RecordDamage(cmd) => self.handle_damage(cmd),
        }
    }
}

impl QcBook {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), StockError> {
        match self.tenant_id {
            Some(t) if t != tenant_id => Err(StockError::conflict("tenant mismatch")),
            _ => Ok(()),
        }
    }

    fn handle_place(&self, cmd: &PlaceHold) -> Result<Vec<QcEvent>, StockError> {
        self.ensure_tenant(cmd.tenant_id)?;

        if cmd.quantity <= 0 {
            return Err(StockError::invalid_input("hold quantity must be positive"));
        }
        if cmd.reason.trim().is_empty() {
            return Err(StockError::invalid_input("hold reason cannot be empty"));
        }
        if cmd.quantity + self.on_hold_quantity() > cmd.on_hand {
            return Err(StockError::invalid_input(format!(
                "hold quantity {} exceeds unheld on-hand stock ({} on hand, {} already held)",
                cmd.quantity,
                cmd.on_hand,
                self.on_hold_quantity()
            )));
        }

        Ok(vec![QcEvent::HoldPlaced(HoldPlaced {
            tenant_id: cmd.tenant_id,
            hold: QcHold {
                hold_id: Uuid::now_v7(),
                product_id: cmd.product_id,
                warehouse_id: cmd.warehouse_id,
                hold_quantity: cmd.quantity,
                hold_reason: cmd.reason.clone(),
                status: QcHoldStatus::OnHold,
                inspector_id: None,
                placed_at: cmd.occurred_at,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn resolve_target(&self, hold_id: Uuid) -> Result<(), StockError> {
        match self.find(hold_id) {
            None => Err(StockError::not_found()),
            Some(h) if h.status != QcHoldStatus::OnHold => {
                Err(StockError::conflict("hold already resolved"))
            }
            Some(_) => Ok(()),
        }
    }

    fn handle_release(&self, cmd: &ReleaseHold) -> Result<Vec<QcEvent>, StockError> {
        self.ensure_tenant(cmd.tenant_id)?;
        self.resolve_target(cmd.hold_id)?;

        Ok(vec![QcEvent::HoldReleased(HoldReleased {
            tenant_id: cmd.tenant_id,
            hold_id: cmd.hold_id,
            inspector_id: cmd.inspector_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectHold) -> Result<Vec<QcEvent>, StockError> {
        self.ensure_tenant(cmd.tenant_id)?;
        self.resolve_target(cmd.hold_id)?;

        Ok(vec![QcEvent::HoldRejected(HoldRejected {
            tenant_id: cmd.tenant_id,
            hold_id: cmd.hold_id,
            inspector_id: cmd.inspector_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_damage(&self, cmd: &RecordDamage) -> Result<Vec<QcEvent>, StockError> {
        self.ensure_tenant(cmd.tenant_id)?;

        if cmd.quantity <= 0 {
            return Err(StockError::invalid_input("damaged quantity must be positive"));
        }

        Ok(vec![QcEvent::DamageRecorded(DamageRecorded {
            tenant_id: cmd.tenant_id,
            assessment: DamageAssessment {
                assessment_id: Uuid::now_v7(),
                key: cmd.key,
                quantity: cmd.quantity,
                severity: cmd.severity,
                action_taken: cmd.action_taken.clone(),
                assessed_by: cmd.assessed_by,
                assessed_at: cmd.occurred_at,
            },
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_product() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_warehouse() -> WarehouseId {
        WarehouseId::new(AggregateId::new())
    }

    fn test_book() -> QcBook {
        QcBook::empty(QcBookId::new(AggregateId::new()))
    }

    fn place(tenant: TenantId, product: ProductId, warehouse: WarehouseId, qty: i64, on_hand: i64) -> QcCommand {
        QcCommand::PlaceHold(PlaceHold {
            tenant_id: tenant,
            product_id: product,
            warehouse_id: warehouse,
            quantity: qty,
            reason: "incoming inspection".to_string(),
            on_hand,
            occurred_at: Utc::now(),
        })
    }

    fn apply_all(book: &mut QcBook, events: &[QcEvent]) {
        for event in events {
            book.apply(event);
        }
    }

    #[test]
    fn placed_hold_withholds_quantity() {
        let mut book = test_book();
        let tenant = test_tenant_id();

        let events = book
            .handle(&place(tenant, test_product(), test_warehouse(), 12, 50))
            .unwrap();
        apply_all(&mut book, &events);

        assert_eq!(book.on_hold_quantity(), 12);
        assert_eq!(book.active_holds().len(), 1);
    }

    #[test]
    fn hold_cannot_exceed_unheld_on_hand() {
        let mut book = test_book();
        let tenant = test_tenant_id();
        let product = test_product();
        let warehouse = test_warehouse();

        let events = book.handle(&place(tenant, product, warehouse, 30, 50)).unwrap();
        apply_all(&mut book, &events);

        let err = book.handle(&place(tenant, product, warehouse, 25, 50)).unwrap_err();
        assert!(matches!(err, StockError::InvalidInput(_)));
        assert_eq!(book.on_hold_quantity(), 30);
    }

    #[test]
    fn releasing_a_hold_restores_availability_and_records_inspector() {
        let mut book = test_book();
        let tenant = test_tenant_id();
        let inspector = UserId::new();

        let events = book
            .handle(&place(tenant, test_product(), test_warehouse(), 12, 50))
            .unwrap();
        apply_all(&mut book, &events);
        let hold_id = book.active_holds()[0].hold_id;

        let events = book
            .handle(&QcCommand::ReleaseHold(ReleaseHold {
                tenant_id: tenant,
                hold_id,
                inspector_id: inspector,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        apply_all(&mut book, &events);

        assert_eq!(book.on_hold_quantity(), 0);
        assert_eq!(book.holds()[0].status, QcHoldStatus::Released);
        assert_eq!(book.holds()[0].inspector_id, Some(inspector));
    }

    #[test]
    fn resolved_hold_cannot_be_resolved_again() {
        let mut book = test_book();
        let tenant = test_tenant_id();

        let events = book
            .handle(&place(tenant, test_product(), test_warehouse(), 5, 50))
            .unwrap();
        apply_all(&mut book, &events);
        let hold_id = book.active_holds()[0].hold_id;

        let reject = QcCommand::RejectHold(RejectHold {
            tenant_id: tenant,
            hold_id,
            inspector_id: UserId::new(),
            occurred_at: Utc::now(),
        });
        let events = book.handle(&reject).unwrap();
        apply_all(&mut book, &events);

        let err = book.handle(&reject).unwrap_err();
        assert!(matches!(err, StockError::Conflict(_)));
    }

    #[test]
    fn unknown_hold_is_not_found() {
        let book = test_book();
        let err = book
            .handle(&QcCommand::ReleaseHold(ReleaseHold {
                tenant_id: test_tenant_id(),
                hold_id: Uuid::now_v7(),
                inspector_id: UserId::new(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, StockError::NotFound);
    }

    #[test]
    fn damage_assessment_is_recorded() {
        let mut book = test_book();
        let tenant = test_tenant_id();
        let key = StockKey::new(test_product(), test_warehouse());

        let events = book
            .handle(&QcCommand::RecordDamage(RecordDamage {
                tenant_id: tenant,
                key,
                quantity: 3,
                severity: DamageSeverity::Major,
                action_taken: Some("returned to vendor".to_string()),
                assessed_by: UserId::new(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        apply_all(&mut book, &events);

        assert_eq!(book.assessments().len(), 1);
        assert_eq!(book.assessments()[0].severity, DamageSeverity::Major);
        // Damage record alone does not withhold stock.
        assert_eq!(book.on_hold_quantity(), 0);
    }
}
