use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use wareflow_catalog::{BinId, ProductId, SerialNumber, StockKey, VariantId, WarehouseId};
use wareflow_core::{Aggregate, AggregateId, StockError, TenantId, UserId};
use wareflow_events::{AuditLog, Event};
use wareflow_ledger::{
    MovementType, RecordMovement, StockLedgerCommand, StockLedgerEntry, StockLedgerEvent,
};
use wareflow_picking::{
    CloseShort, GeneratePickList, PickLineInput, PickList, PickListCommand, PickListDetail,
    PickListId, RecordPick,
};
use wareflow_quality::{
    DamageAssessment, DamageSeverity, PlaceHold, QcCommand, QcEvent, QcHold, RecordDamage,
    RejectHold, ReleaseHold,
};
use wareflow_reservations::{
    Consume, DocumentRef, Release, Reservation, ReservationCommand, ReservationEvent, Reserve,
};
use wareflow_serials::{RegisterSerials, SerialCommand, SerialEvent, SerialStatus, SerialUnit,
    UpdateStatus,
};
use wareflow_transfers::{
    AddTransferLine, ApproveTransfer, CancelTransfer, CreateTransfer, LineQuantity,
    ReceiveTransfer, RejectTransfer, ResubmitTransfer, ShipTransfer, StockTransfer,
    SubmitTransfer, TransferCommand, TransferEvent, TransferId, TransferLine, TransferStatus,
};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::store::StockStore;
use crate::validator::{StockValidation, StockValidator};

/// The orchestration facade over the pure stock aggregates.
///
/// All interior mutability lives here: mutations for one (tenant, stock key)
/// are serialized behind that key's lock, and validation plus commit run in
/// the same critical section, so a committed outward movement can never
/// exceed the availability it was checked against.
pub struct InventoryEngine {
    store: StockStore,
    config: EngineConfig,
}

impl InventoryEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            store: StockStore::new(),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The append-only record of every committed event, for audit queries
    /// and for a persistence collaborator to subscribe to.
    pub fn audit(&self) -> &AuditLog {
        self.store.audit()
    }

    fn append_audit<E: Event + Serialize>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        events: &[E],
    ) -> EngineResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        self.store
            .audit()
            .append(tenant_id, aggregate_id, aggregate_type, events)?;
        Ok(())
    }

    // ---- availability ------------------------------------------------------

    /// Physical on-hand quantity for a key (zero for untouched keys).
    pub fn on_hand(&self, tenant_id: TenantId, key: StockKey) -> EngineResult<i64> {
        let slot = self.store.slot(tenant_id, key)?;
        let slot = slot.lock().map_err(|_| EngineError::poisoned())?;
        Ok(slot.ledger.on_hand())
    }

    /// Advisory availability check.
    ///
    /// Runs the same formula the commit path runs, but releases the key lock
    /// afterwards; a `is_valid: true` answer can go stale before a commit.
    pub fn validate_stock_transaction(
        &self,
        tenant_id: TenantId,
        key: StockKey,
        quantity: i64,
        movement: MovementType,
    ) -> EngineResult<StockValidation> {
        if quantity <= 0 {
            return Err(StockError::invalid_input("quantity must be positive").into());
        }
        let slot = self.store.slot(tenant_id, key)?;
        let slot = slot.lock().map_err(|_| EngineError::poisoned())?;
        let on_hold = self
            .store
            .on_hold_quantity(tenant_id, key.product, key.warehouse)?;
        Ok(StockValidator::assess(
            slot.ledger.on_hand(),
            slot.reservations.active_quantity(),
            on_hold,
            quantity,
            movement,
        ))
    }

    /// Commit one stock movement.
    ///
    /// Availability is re-checked inside the key lock; an outward commit that
    /// exceeds it fails `InsufficientStock` even if an earlier preview said
    /// otherwise.
    pub fn commit_movement(
        &self,
        tenant_id: TenantId,
        key: StockKey,
        bin_id: Option<BinId>,
        movement: MovementType,
        quantity: i64,
        txn_id: Uuid,
        occurred_at: DateTime<Utc>,
    ) -> EngineResult<StockLedgerEntry> {
        let slot = self.store.slot(tenant_id, key)?;
        let mut slot = slot.lock().map_err(|_| EngineError::poisoned())?;

        if movement.is_outward() {
            let on_hold = self
                .store
                .on_hold_quantity(tenant_id, key.product, key.warehouse)?;
            let validation = StockValidator::assess(
                slot.ledger.on_hand(),
                slot.reservations.active_quantity(),
                on_hold,
                quantity,
                movement,
            );
            if !validation.is_valid {
                warn!(
                    tenant = %tenant_id,
                    %key,
                    requested = quantity,
                    available = validation.available_stock,
                    "outward movement denied"
                );
                return Err(
                    StockError::insufficient_stock(quantity, validation.available_stock).into(),
                );
            }
        }

        let cmd = StockLedgerCommand::RecordMovement(RecordMovement {
            tenant_id,
            key,
            bin_id,
            movement,
            quantity,
            txn_id,
            occurred_at,
        });
        let events = slot.ledger.handle(&cmd)?;
        for event in &events {
            slot.ledger.apply(event);
        }
        let entry = match events.first() {
            Some(StockLedgerEvent::MovementRecorded(e)) => e.entry.clone(),
            None => return Err(EngineError::Store("ledger emitted no event".to_string())),
        };
        self.append_audit(tenant_id, slot.ledger.id_typed().0, "stock_ledger", &events)?;

        info!(
            tenant = %tenant_id,
            %key,
            movement = ?movement,
            quantity,
            new_stock = entry.new_stock,
            "movement committed"
        );
        Ok(entry)
    }

    /// Inward ledger entry without an availability gate (receipts,
    /// compensating entries).
    fn record_inward(
        &self,
        tenant_id: TenantId,
        key: StockKey,
        movement: MovementType,
        quantity: i64,
        txn_id: Uuid,
        occurred_at: DateTime<Utc>,
    ) -> EngineResult<StockLedgerEntry> {
        let slot = self.store.slot(tenant_id, key)?;
        let mut slot = slot.lock().map_err(|_| EngineError::poisoned())?;
        let cmd = StockLedgerCommand::RecordMovement(RecordMovement {
            tenant_id,
            key,
            bin_id: None,
            movement,
            quantity,
            txn_id,
            occurred_at,
        });
        let events = slot.ledger.handle(&cmd)?;
        for event in &events {
            slot.ledger.apply(event);
        }
        let entry = match events.first() {
            Some(StockLedgerEvent::MovementRecorded(e)) => e.entry.clone(),
            None => return Err(EngineError::Store("ledger emitted no event".to_string())),
        };
        self.append_audit(tenant_id, slot.ledger.id_typed().0, "stock_ledger", &events)?;
        Ok(entry)
    }

    // ---- reservations ------------------------------------------------------

    /// Active reservations for a key. The availability preview subtracts
    /// exactly this list's total, so display and validation cannot diverge.
    pub fn get_active_reservations(
        &self,
        tenant_id: TenantId,
        key: StockKey,
    ) -> EngineResult<Vec<Reservation>> {
        let slot = self.store.slot(tenant_id, key)?;
        let slot = slot.lock().map_err(|_| EngineError::poisoned())?;
        Ok(slot.reservations.active())
    }

    pub fn create_reservation(
        &self,
        tenant_id: TenantId,
        key: StockKey,
        quantity: i64,
        reference: DocumentRef,
        reserved_by: UserId,
    ) -> EngineResult<Reservation> {
        let slot = self.store.slot(tenant_id, key)?;
        let mut slot = slot.lock().map_err(|_| EngineError::poisoned())?;
        let cmd = ReservationCommand::Reserve(Reserve {
            tenant_id,
            key,
            quantity,
            reference,
            reserved_by,
            on_hand: slot.ledger.on_hand(),
            occurred_at: Utc::now(),
        });
        let events = slot.reservations.handle(&cmd)?;
        let reservation = match events.first() {
            Some(ReservationEvent::Reserved(e)) => e.reservation.clone(),
            _ => return Err(EngineError::Store("reservation event missing".to_string())),
        };
        for event in &events {
            slot.reservations.apply(event);
        }
        self.append_audit(
            tenant_id,
            slot.reservations.id_typed().0,
            "reservation_book",
            &events,
        )?;
        info!(tenant = %tenant_id, %key, quantity, "stock reserved");
        Ok(reservation)
    }

    /// Idempotent: releasing an unknown or non-active reservation succeeds
    /// without emitting anything.
    pub fn release_reservation(
        &self,
        tenant_id: TenantId,
        key: StockKey,
        reservation_id: Uuid,
    ) -> EngineResult<()> {
        let slot = self.store.slot(tenant_id, key)?;
        let mut slot = slot.lock().map_err(|_| EngineError::poisoned())?;
        let cmd = ReservationCommand::Release(Release {
            tenant_id,
            reservation_id,
            occurred_at: Utc::now(),
        });
        let events = slot.reservations.handle(&cmd)?;
        for event in &events {
            slot.reservations.apply(event);
        }
        self.append_audit(
            tenant_id,
            slot.reservations.id_typed().0,
            "reservation_book",
            &events,
        )?;
        Ok(())
    }

    // ---- serialized stock --------------------------------------------------

    pub fn get_available_serial_numbers(
        &self,
        tenant_id: TenantId,
        key: StockKey,
    ) -> EngineResult<Vec<SerialUnit>> {
        let slot = self.store.slot(tenant_id, key)?;
        let slot = slot.lock().map_err(|_| EngineError::poisoned())?;
        Ok(slot.serials.available())
    }

    pub fn register_serial_numbers(
        &self,
        tenant_id: TenantId,
        key: StockKey,
        serials: Vec<SerialNumber>,
    ) -> EngineResult<Vec<SerialUnit>> {
        let slot = self.store.slot(tenant_id, key)?;
        let mut slot = slot.lock().map_err(|_| EngineError::poisoned())?;
        let cmd = SerialCommand::RegisterSerials(RegisterSerials {
            tenant_id,
            key,
            serials,
            occurred_at: Utc::now(),
        });
        let events = slot.serials.handle(&cmd)?;
        let units = match events.first() {
            Some(SerialEvent::SerialsRegistered(e)) => e.units.clone(),
            _ => return Err(EngineError::Store("registration event missing".to_string())),
        };
        for event in &events {
            slot.serials.apply(event);
        }
        self.append_audit(tenant_id, slot.serials.id_typed().0, "serial_registry", &events)?;
        info!(tenant = %tenant_id, %key, count = units.len(), "serials registered");
        Ok(units)
    }

    /// Batch status update, all-or-nothing: if any serial in the batch cannot
    /// legally reach the target status, no status changes at all.
    pub fn update_serial_number_status(
        &self,
        tenant_id: TenantId,
        key: StockKey,
        serials: Vec<SerialNumber>,
        new_status: SerialStatus,
        txn_id: Uuid,
    ) -> EngineResult<()> {
        let slot = self.store.slot(tenant_id, key)?;
        let mut slot = slot.lock().map_err(|_| EngineError::poisoned())?;
        let cmd = SerialCommand::UpdateStatus(UpdateStatus {
            tenant_id,
            serials,
            new_status,
            txn_id,
            occurred_at: Utc::now(),
        });
        let events = slot.serials.handle(&cmd)?;
        for event in &events {
            slot.serials.apply(event);
        }
        self.append_audit(tenant_id, slot.serials.id_typed().0, "serial_registry", &events)?;
        info!(tenant = %tenant_id, %key, status = new_status.as_str(), "serial batch updated");
        Ok(())
    }

    // ---- quality control ---------------------------------------------------

    /// Place a QC hold on (product, warehouse).
    ///
    /// The hold is bounded by the summed on-hand across every variant key in
    /// that warehouse, snapshotted at placement.
    pub fn create_qc_hold(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i64,
        reason: impl Into<String>,
    ) -> EngineResult<QcHold> {
        let mut on_hand = 0i64;
        for slot in self
            .store
            .slots_for_product(tenant_id, product_id, warehouse_id)?
        {
            let slot = slot.lock().map_err(|_| EngineError::poisoned())?;
            on_hand += slot.ledger.on_hand();
        }

        let book = self.store.qc_book(tenant_id, product_id, warehouse_id)?;
        let mut book = book.lock().map_err(|_| EngineError::poisoned())?;
        let cmd = QcCommand::PlaceHold(PlaceHold {
            tenant_id,
            product_id,
            warehouse_id,
            quantity,
            reason: reason.into(),
            on_hand,
            occurred_at: Utc::now(),
        });
        let events = book.handle(&cmd)?;
        let hold = match events.first() {
            Some(QcEvent::HoldPlaced(e)) => e.hold.clone(),
            _ => return Err(EngineError::Store("hold event missing".to_string())),
        };
        for event in &events {
            book.apply(event);
        }
        self.append_audit(tenant_id, book.id_typed().0, "qc_book", &events)?;
        info!(tenant = %tenant_id, product = %product_id, warehouse = %warehouse_id, quantity, "qc hold placed");
        Ok(hold)
    }

    pub fn release_qc_hold(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        hold_id: Uuid,
        inspector_id: UserId,
    ) -> EngineResult<()> {
        let book = self.store.qc_book(tenant_id, product_id, warehouse_id)?;
        let mut book = book.lock().map_err(|_| EngineError::poisoned())?;
        let cmd = QcCommand::ReleaseHold(ReleaseHold {
            tenant_id,
            hold_id,
            inspector_id,
            occurred_at: Utc::now(),
        });
        let events = book.handle(&cmd)?;
        for event in &events {
            book.apply(event);
        }
        self.append_audit(tenant_id, book.id_typed().0, "qc_book", &events)?;
        info!(tenant = %tenant_id, %hold_id, "qc hold released");
        Ok(())
    }

    pub fn reject_qc_hold(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        hold_id: Uuid,
        inspector_id: UserId,
    ) -> EngineResult<()> {
        let book = self.store.qc_book(tenant_id, product_id, warehouse_id)?;
        let mut book = book.lock().map_err(|_| EngineError::poisoned())?;
        let cmd = QcCommand::RejectHold(RejectHold {
            tenant_id,
            hold_id,
            inspector_id,
            occurred_at: Utc::now(),
        });
        let events = book.handle(&cmd)?;
        for event in &events {
            book.apply(event);
        }
        self.append_audit(tenant_id, book.id_typed().0, "qc_book", &events)?;
        info!(tenant = %tenant_id, %hold_id, "qc hold rejected");
        Ok(())
    }

    pub fn get_active_qc_holds(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> EngineResult<Vec<QcHold>> {
        self.store
            .active_qc_holds(tenant_id, product_id, warehouse_id)
    }

    pub fn create_damage_assessment(
        &self,
        tenant_id: TenantId,
        key: StockKey,
        quantity: i64,
        severity: DamageSeverity,
        action_taken: Option<String>,
        assessed_by: UserId,
    ) -> EngineResult<DamageAssessment> {
        let book = self.store.qc_book(tenant_id, key.product, key.warehouse)?;
        let mut book = book.lock().map_err(|_| EngineError::poisoned())?;
        let cmd = QcCommand::RecordDamage(RecordDamage {
            tenant_id,
            key,
            quantity,
            severity,
            action_taken,
            assessed_by,
            occurred_at: Utc::now(),
        });
        let events = book.handle(&cmd)?;
        let assessment = match events.first() {
            Some(QcEvent::DamageRecorded(e)) => e.assessment.clone(),
            _ => return Err(EngineError::Store("damage event missing".to_string())),
        };
        for event in &events {
            book.apply(event);
        }
        self.append_audit(tenant_id, book.id_typed().0, "qc_book", &events)?;
        info!(tenant = %tenant_id, %key, quantity, severity = ?severity, "damage recorded");
        Ok(assessment)
    }

    // ---- picking -----------------------------------------------------------

    /// Generate a pick list from validated outward lines.
    ///
    /// With `picking_reserves` set, each line's quantity is also reserved
    /// against the pick list document; if any line over-allocates, every
    /// reservation made so far is released and nothing is stored.
    pub fn create_pick_list(
        &self,
        tenant_id: TenantId,
        warehouse_id: WarehouseId,
        lines: Vec<PickLineInput>,
        requested_by: UserId,
    ) -> EngineResult<(PickListId, Vec<PickListDetail>)> {
        let pick_list_id = PickListId::new(AggregateId::new());
        let mut pick_list = PickList::empty(pick_list_id);
        let cmd = PickListCommand::GeneratePickList(GeneratePickList {
            tenant_id,
            warehouse_id,
            lines: lines.clone(),
            occurred_at: Utc::now(),
        });
        let events = pick_list.handle(&cmd)?;

        if self.config.picking_reserves {
            let reference = DocumentRef::new("pick_list", pick_list_id.to_string());
            let mut claimed: Vec<(StockKey, Uuid)> = Vec::new();
            for line in &lines {
                match self.create_reservation(
                    tenant_id,
                    line.key,
                    line.required_quantity,
                    reference.clone(),
                    requested_by,
                ) {
                    Ok(reservation) => claimed.push((line.key, reservation.reservation_id)),
                    Err(err) => {
                        for (key, reservation_id) in claimed {
                            self.release_reservation(tenant_id, key, reservation_id)?;
                        }
                        warn!(tenant = %tenant_id, warehouse = %warehouse_id, "pick list reservation failed");
                        return Err(err);
                    }
                }
            }
        }

        for event in &events {
            pick_list.apply(event);
        }
        let details = pick_list.details().to_vec();
        self.append_audit(tenant_id, pick_list_id.0, "pick_list", &events)?;
        self.store.insert_pick_list(tenant_id, pick_list)?;
        info!(tenant = %tenant_id, warehouse = %warehouse_id, lines = details.len(), "pick list generated");
        Ok((pick_list_id, details))
    }

    pub fn record_pick(
        &self,
        tenant_id: TenantId,
        pick_list_id: PickListId,
        line_no: u32,
        quantity: i64,
    ) -> EngineResult<()> {
        let pick_list = self.store.pick_list(tenant_id, pick_list_id)?;
        let mut pick_list = pick_list.lock().map_err(|_| EngineError::poisoned())?;
        let cmd = PickListCommand::RecordPick(RecordPick {
            tenant_id,
            line_no,
            quantity,
            occurred_at: Utc::now(),
        });
        let events = pick_list.handle(&cmd)?;
        for event in &events {
            pick_list.apply(event);
        }
        self.append_audit(tenant_id, pick_list_id.0, "pick_list", &events)?;
        Ok(())
    }

    pub fn close_pick_line_short(
        &self,
        tenant_id: TenantId,
        pick_list_id: PickListId,
        line_no: u32,
    ) -> EngineResult<()> {
        let pick_list = self.store.pick_list(tenant_id, pick_list_id)?;
        let mut pick_list = pick_list.lock().map_err(|_| EngineError::poisoned())?;
        let cmd = PickListCommand::CloseShort(CloseShort {
            tenant_id,
            line_no,
            occurred_at: Utc::now(),
        });
        let events = pick_list.handle(&cmd)?;
        for event in &events {
            pick_list.apply(event);
        }
        self.append_audit(tenant_id, pick_list_id.0, "pick_list", &events)?;
        Ok(())
    }

    // ---- transfers ---------------------------------------------------------

    pub fn create_transfer(
        &self,
        tenant_id: TenantId,
        source_warehouse: WarehouseId,
        dest_warehouse: WarehouseId,
        estimated_cost: i64,
        created_by: UserId,
    ) -> EngineResult<TransferId> {
        let transfer_id = TransferId::new(AggregateId::new());
        let mut transfer = StockTransfer::empty(transfer_id);
        let cmd = TransferCommand::CreateTransfer(CreateTransfer {
            tenant_id,
            transfer_id,
            source_warehouse,
            dest_warehouse,
            estimated_cost,
            created_by,
            occurred_at: Utc::now(),
        });
        let events = transfer.handle(&cmd)?;
        for event in &events {
            transfer.apply(event);
        }
        self.append_audit(tenant_id, transfer_id.0, "stock_transfer", &events)?;
        self.store.insert_transfer(tenant_id, transfer)?;
        info!(tenant = %tenant_id, transfer = %transfer_id, "transfer created");
        Ok(transfer_id)
    }

    /// Add a line to a draft transfer; returns the assigned line number.
    pub fn add_transfer_line(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        requested_quantity: i64,
    ) -> EngineResult<u32> {
        let transfer = self.store.transfer(tenant_id, transfer_id)?;
        let mut transfer = transfer.lock().map_err(|_| EngineError::poisoned())?;
        let cmd = TransferCommand::AddTransferLine(AddTransferLine {
            tenant_id,
            transfer_id,
            product_id,
            variant_id,
            requested_quantity,
            occurred_at: Utc::now(),
        });
        let events = transfer.handle(&cmd)?;
        let line_no = match events.first() {
            Some(TransferEvent::TransferLineAdded(e)) => e.line_no,
            _ => return Err(EngineError::Store("line event missing".to_string())),
        };
        for event in &events {
            transfer.apply(event);
        }
        self.append_audit(tenant_id, transfer_id.0, "stock_transfer", &events)?;
        Ok(line_no)
    }

    /// Submit a transfer; auto-approves at or below the configured threshold.
    pub fn submit_transfer(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
        request_auto_approve: bool,
    ) -> EngineResult<TransferStatus> {
        let transfer = self.store.transfer(tenant_id, transfer_id)?;
        let mut transfer = transfer.lock().map_err(|_| EngineError::poisoned())?;
        let cmd = TransferCommand::SubmitTransfer(SubmitTransfer {
            tenant_id,
            transfer_id,
            approval_threshold: self.config.approval_threshold,
            request_auto_approve,
            occurred_at: Utc::now(),
        });
        let events = transfer.handle(&cmd)?;
        for event in &events {
            transfer.apply(event);
        }
        self.append_audit(tenant_id, transfer_id.0, "stock_transfer", &events)?;
        info!(tenant = %tenant_id, transfer = %transfer_id, status = transfer.status().as_str(), "transfer submitted");
        Ok(transfer.status())
    }

    pub fn approve_transfer(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
        approver: UserId,
    ) -> EngineResult<()> {
        let transfer = self.store.transfer(tenant_id, transfer_id)?;
        let mut transfer = transfer.lock().map_err(|_| EngineError::poisoned())?;
        let cmd = TransferCommand::ApproveTransfer(ApproveTransfer {
            tenant_id,
            transfer_id,
            approver,
            occurred_at: Utc::now(),
        });
        let events = transfer.handle(&cmd)?;
        for event in &events {
            transfer.apply(event);
        }
        self.append_audit(tenant_id, transfer_id.0, "stock_transfer", &events)?;
        info!(tenant = %tenant_id, transfer = %transfer_id, "transfer approved");
        Ok(())
    }

    pub fn reject_transfer(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
        approver: UserId,
        reason: Option<String>,
    ) -> EngineResult<()> {
        let transfer = self.store.transfer(tenant_id, transfer_id)?;
        let mut transfer = transfer.lock().map_err(|_| EngineError::poisoned())?;
        let cmd = TransferCommand::RejectTransfer(RejectTransfer {
            tenant_id,
            transfer_id,
            approver,
            reason,
            occurred_at: Utc::now(),
        });
        let events = transfer.handle(&cmd)?;
        for event in &events {
            transfer.apply(event);
        }
        self.append_audit(tenant_id, transfer_id.0, "stock_transfer", &events)?;
        Ok(())
    }

    pub fn resubmit_transfer(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
    ) -> EngineResult<()> {
        let transfer = self.store.transfer(tenant_id, transfer_id)?;
        let mut transfer = transfer.lock().map_err(|_| EngineError::poisoned())?;
        let cmd = TransferCommand::ResubmitTransfer(ResubmitTransfer {
            tenant_id,
            transfer_id,
            occurred_at: Utc::now(),
        });
        let events = transfer.handle(&cmd)?;
        for event in &events {
            transfer.apply(event);
        }
        self.append_audit(tenant_id, transfer_id.0, "stock_transfer", &events)?;
        Ok(())
    }

    /// Ship an approved transfer.
    ///
    /// Per shipped line: reserve at the source key, consume the claim and
    /// record `TransferOut`, all in that key's critical section. If a later
    /// line fails its availability check, earlier deductions are reversed
    /// with compensating `TransferIn` entries and the transfer stays
    /// approved.
    pub fn ship_transfer(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
        shipments: Vec<LineQuantity>,
        shipped_by: UserId,
    ) -> EngineResult<()> {
        let transfer = self.store.transfer(tenant_id, transfer_id)?;
        let mut transfer = transfer.lock().map_err(|_| EngineError::poisoned())?;
        let occurred_at = Utc::now();
        let cmd = TransferCommand::ShipTransfer(ShipTransfer {
            tenant_id,
            transfer_id,
            shipments: shipments.clone(),
            occurred_at,
        });
        let events = transfer.handle(&cmd)?;

        let source = transfer
            .source_warehouse()
            .ok_or_else(|| EngineError::Store("transfer missing source warehouse".to_string()))?;
        let keys: HashMap<u32, StockKey> = transfer
            .lines()
            .iter()
            .map(|line| (line.line_no, line_key(line, source)))
            .collect();

        let txn_id = Uuid::now_v7();
        let mut committed: Vec<(StockKey, i64)> = Vec::new();
        for shipment in &shipments {
            if shipment.quantity == 0 {
                continue;
            }
            let key = *keys
                .get(&shipment.line_no)
                .ok_or(EngineError::Stock(StockError::NotFound))?;
            match self.deduct_for_shipment(
                tenant_id,
                key,
                shipment.quantity,
                transfer_id,
                shipped_by,
                txn_id,
                occurred_at,
            ) {
                Ok(()) => committed.push((key, shipment.quantity)),
                Err(err) => {
                    for (key, quantity) in committed {
                        self.record_inward(
                            tenant_id,
                            key,
                            MovementType::TransferIn,
                            quantity,
                            txn_id,
                            occurred_at,
                        )?;
                    }
                    warn!(
                        tenant = %tenant_id,
                        transfer = %transfer_id,
                        line = shipment.line_no,
                        "shipment denied, earlier deductions compensated"
                    );
                    return Err(err);
                }
            }
        }

        for event in &events {
            transfer.apply(event);
        }
        self.append_audit(tenant_id, transfer_id.0, "stock_transfer", &events)?;
        info!(tenant = %tenant_id, transfer = %transfer_id, "transfer shipped");
        Ok(())
    }

    fn deduct_for_shipment(
        &self,
        tenant_id: TenantId,
        key: StockKey,
        quantity: i64,
        transfer_id: TransferId,
        shipped_by: UserId,
        txn_id: Uuid,
        occurred_at: DateTime<Utc>,
    ) -> EngineResult<()> {
        let slot = self.store.slot(tenant_id, key)?;
        let mut slot = slot.lock().map_err(|_| EngineError::poisoned())?;

        let on_hand = slot.ledger.on_hand();
        let on_hold = self
            .store
            .on_hold_quantity(tenant_id, key.product, key.warehouse)?;
        let validation = StockValidator::assess(
            on_hand,
            slot.reservations.active_quantity(),
            on_hold,
            quantity,
            MovementType::TransferOut,
        );
        if !validation.is_valid {
            return Err(
                StockError::insufficient_stock(quantity, validation.available_stock).into(),
            );
        }

        let reserve = ReservationCommand::Reserve(Reserve {
            tenant_id,
            key,
            quantity,
            reference: DocumentRef::new("transfer", transfer_id.to_string()),
            reserved_by: shipped_by,
            on_hand,
            occurred_at,
        });
        let reserve_events = slot.reservations.handle(&reserve)?;
        let reservation_id = match reserve_events.first() {
            Some(ReservationEvent::Reserved(e)) => e.reservation.reservation_id,
            _ => return Err(EngineError::Store("reservation event missing".to_string())),
        };
        for event in &reserve_events {
            slot.reservations.apply(event);
        }

        let consume = ReservationCommand::Consume(Consume {
            tenant_id,
            reservation_id,
            txn_id,
            occurred_at,
        });
        let consume_events = slot.reservations.handle(&consume)?;
        for event in &consume_events {
            slot.reservations.apply(event);
        }

        let ledger_cmd = StockLedgerCommand::RecordMovement(RecordMovement {
            tenant_id,
            key,
            bin_id: None,
            movement: MovementType::TransferOut,
            quantity,
            txn_id,
            occurred_at,
        });
        let ledger_events = slot.ledger.handle(&ledger_cmd)?;
        for event in &ledger_events {
            slot.ledger.apply(event);
        }

        let book_id = slot.reservations.id_typed().0;
        self.append_audit(tenant_id, book_id, "reservation_book", &reserve_events)?;
        self.append_audit(tenant_id, book_id, "reservation_book", &consume_events)?;
        self.append_audit(tenant_id, slot.ledger.id_typed().0, "stock_ledger", &ledger_events)?;
        Ok(())
    }

    /// Receive shipped quantity at the destination warehouse.
    pub fn receive_transfer(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
        receipts: Vec<LineQuantity>,
    ) -> EngineResult<TransferStatus> {
        let transfer = self.store.transfer(tenant_id, transfer_id)?;
        let mut transfer = transfer.lock().map_err(|_| EngineError::poisoned())?;
        let occurred_at = Utc::now();
        let cmd = TransferCommand::ReceiveTransfer(ReceiveTransfer {
            tenant_id,
            transfer_id,
            receipts: receipts.clone(),
            occurred_at,
        });
        let events = transfer.handle(&cmd)?;

        let dest = transfer
            .dest_warehouse()
            .ok_or_else(|| EngineError::Store("transfer missing dest warehouse".to_string()))?;
        let keys: HashMap<u32, StockKey> = transfer
            .lines()
            .iter()
            .map(|line| (line.line_no, line_key(line, dest)))
            .collect();

        let txn_id = Uuid::now_v7();
        for receipt in &receipts {
            let key = *keys
                .get(&receipt.line_no)
                .ok_or(EngineError::Stock(StockError::NotFound))?;
            self.record_inward(
                tenant_id,
                key,
                MovementType::TransferIn,
                receipt.quantity,
                txn_id,
                occurred_at,
            )?;
        }

        for event in &events {
            transfer.apply(event);
        }
        self.append_audit(tenant_id, transfer_id.0, "stock_transfer", &events)?;
        info!(
            tenant = %tenant_id,
            transfer = %transfer_id,
            status = transfer.status().as_str(),
            "transfer received"
        );
        Ok(transfer.status())
    }

    /// Cancel a transfer in any non-terminal state.
    ///
    /// Shipped-but-unreceived quantity returns to the source as compensating
    /// `TransferIn` entries; any still-active reservations against the
    /// transfer document are released.
    pub fn cancel_transfer(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
        cancelled_by: UserId,
    ) -> EngineResult<()> {
        let transfer = self.store.transfer(tenant_id, transfer_id)?;
        let mut transfer = transfer.lock().map_err(|_| EngineError::poisoned())?;
        let occurred_at = Utc::now();
        let cmd = TransferCommand::CancelTransfer(CancelTransfer {
            tenant_id,
            transfer_id,
            cancelled_by,
            occurred_at,
        });
        let events = transfer.handle(&cmd)?;
        let unreceived = match events.first() {
            Some(TransferEvent::TransferCancelled(e)) => e.unreceived_shipped.clone(),
            _ => return Err(EngineError::Store("cancel event missing".to_string())),
        };

        if let Some(source) = transfer.source_warehouse() {
            let keys: HashMap<u32, StockKey> = transfer
                .lines()
                .iter()
                .map(|line| (line.line_no, line_key(line, source)))
                .collect();

            let txn_id = Uuid::now_v7();
            for lq in &unreceived {
                let key = *keys
                    .get(&lq.line_no)
                    .ok_or(EngineError::Stock(StockError::NotFound))?;
                self.record_inward(
                    tenant_id,
                    key,
                    MovementType::TransferIn,
                    lq.quantity,
                    txn_id,
                    occurred_at,
                )?;
            }

            let reference = DocumentRef::new("transfer", transfer_id.to_string());
            for line in transfer.lines() {
                self.release_claims_for(tenant_id, line_key(line, source), &reference)?;
            }
        }

        for event in &events {
            transfer.apply(event);
        }
        self.append_audit(tenant_id, transfer_id.0, "stock_transfer", &events)?;
        info!(tenant = %tenant_id, transfer = %transfer_id, "transfer cancelled");
        Ok(())
    }

    fn release_claims_for(
        &self,
        tenant_id: TenantId,
        key: StockKey,
        reference: &DocumentRef,
    ) -> EngineResult<()> {
        let slot = self.store.slot(tenant_id, key)?;
        let mut slot = slot.lock().map_err(|_| EngineError::poisoned())?;
        let claimed: Vec<Uuid> = slot
            .reservations
            .active()
            .iter()
            .filter(|r| &r.reference == reference)
            .map(|r| r.reservation_id)
            .collect();
        for reservation_id in claimed {
            let cmd = ReservationCommand::Release(Release {
                tenant_id,
                reservation_id,
                occurred_at: Utc::now(),
            });
            let events = slot.reservations.handle(&cmd)?;
            for event in &events {
                slot.reservations.apply(event);
            }
            self.append_audit(
                tenant_id,
                slot.reservations.id_typed().0,
                "reservation_book",
                &events,
            )?;
        }
        Ok(())
    }

    pub fn transfer_status(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
    ) -> EngineResult<TransferStatus> {
        let transfer = self.store.transfer(tenant_id, transfer_id)?;
        let transfer = transfer.lock().map_err(|_| EngineError::poisoned())?;
        Ok(transfer.status())
    }

    pub fn transfer_lines(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
    ) -> EngineResult<Vec<TransferLine>> {
        let transfer = self.store.transfer(tenant_id, transfer_id)?;
        let transfer = transfer.lock().map_err(|_| EngineError::poisoned())?;
        Ok(transfer.lines().to_vec())
    }
}

fn line_key(line: &TransferLine, warehouse: WarehouseId) -> StockKey {
    match line.variant_id {
        Some(variant) => StockKey::with_variant(line.product_id, variant, warehouse),
        None => StockKey::new(line.product_id, warehouse),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wareflow_picking::PickLineStatus;
    use wareflow_catalog::UomId;

    const THRESHOLD: i64 = 100_000;

    fn engine() -> InventoryEngine {
        InventoryEngine::new(EngineConfig {
            approval_threshold: THRESHOLD,
            picking_reserves: false,
        })
    }

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_key() -> StockKey {
        StockKey::new(
            ProductId::new(AggregateId::new()),
            WarehouseId::new(AggregateId::new()),
        )
    }

    fn stock(engine: &InventoryEngine, tenant: TenantId, key: StockKey, quantity: i64) {
        engine
            .commit_movement(
                tenant,
                key,
                None,
                MovementType::PurchaseIn,
                quantity,
                Uuid::now_v7(),
                Utc::now(),
            )
            .unwrap();
    }

    fn order_ref() -> DocumentRef {
        DocumentRef::new("sales_order", "SO-1001")
    }

    #[test]
    fn preview_subtracts_exactly_the_active_reservation_list() {
        let engine = engine();
        let tenant = test_tenant_id();
        let key = test_key();
        stock(&engine, tenant, key, 100);
        engine
            .create_reservation(tenant, key, 40, order_ref(), UserId::new())
            .unwrap();

        let active = engine.get_active_reservations(tenant, key).unwrap();
        let reserved_total: i64 = active.iter().map(|r| r.reserved_quantity).sum();

        let validation = engine
            .validate_stock_transaction(tenant, key, 60, MovementType::SaleOut)
            .unwrap();
        assert!(validation.is_valid);
        assert_eq!(validation.reserved, reserved_total);
        assert_eq!(validation.available_stock, 60);

        let validation = engine
            .validate_stock_transaction(tenant, key, 61, MovementType::SaleOut)
            .unwrap();
        assert!(!validation.is_valid);
    }

    #[test]
    fn commit_revalidates_inside_the_key_lock() {
        let engine = engine();
        let tenant = test_tenant_id();
        let key = test_key();
        stock(&engine, tenant, key, 100);

        // A preview for 50 would have passed before this claim landed.
        engine
            .create_reservation(tenant, key, 60, order_ref(), UserId::new())
            .unwrap();

        let err = engine
            .commit_movement(
                tenant,
                key,
                None,
                MovementType::SaleOut,
                50,
                Uuid::now_v7(),
                Utc::now(),
            )
            .unwrap_err();
        match err {
            EngineError::Stock(StockError::InsufficientStock {
                requested,
                available,
            }) => {
                assert_eq!(requested, 50);
                assert_eq!(available, 40);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
        assert_eq!(engine.on_hand(tenant, key).unwrap(), 100);
    }

    #[test]
    fn reserving_more_than_on_hand_over_allocates() {
        let engine = engine();
        let tenant = test_tenant_id();
        let key = test_key();
        stock(&engine, tenant, key, 40);

        let err = engine
            .create_reservation(tenant, key, 50, order_ref(), UserId::new())
            .unwrap_err();
        match err {
            EngineError::Stock(StockError::OverAllocation {
                requested,
                on_hand,
                already_reserved,
            }) => {
                assert_eq!((requested, on_hand, already_reserved), (50, 40, 0));
            }
            other => panic!("expected OverAllocation, got {other:?}"),
        }

        engine
            .create_reservation(tenant, key, 30, order_ref(), UserId::new())
            .unwrap();
        let err = engine
            .create_reservation(tenant, key, 15, order_ref(), UserId::new())
            .unwrap_err();
        match err {
            EngineError::Stock(StockError::OverAllocation {
                requested,
                on_hand,
                already_reserved,
            }) => {
                assert_eq!((requested, on_hand, already_reserved), (15, 40, 30));
            }
            other => panic!("expected OverAllocation, got {other:?}"),
        }
    }

    #[test]
    fn qc_hold_withholds_until_released() {
        let engine = engine();
        let tenant = test_tenant_id();
        let key = test_key();
        stock(&engine, tenant, key, 100);

        let hold = engine
            .create_qc_hold(tenant, key.product, key.warehouse, 30, "inbound inspection")
            .unwrap();
        assert_eq!(
            engine
                .get_active_qc_holds(tenant, key.product, key.warehouse)
                .unwrap()
                .len(),
            1
        );

        let validation = engine
            .validate_stock_transaction(tenant, key, 80, MovementType::SaleOut)
            .unwrap();
        assert!(!validation.is_valid);
        assert_eq!(validation.available_stock, 70);
        assert_eq!(validation.on_hold, 30);

        engine
            .release_qc_hold(tenant, key.product, key.warehouse, hold.hold_id, UserId::new())
            .unwrap();
        let validation = engine
            .validate_stock_transaction(tenant, key, 80, MovementType::SaleOut)
            .unwrap();
        assert!(validation.is_valid);
        assert!(engine
            .get_active_qc_holds(tenant, key.product, key.warehouse)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn damage_assessment_is_recorded_against_the_key_scope() {
        let engine = engine();
        let tenant = test_tenant_id();
        let key = test_key();
        stock(&engine, tenant, key, 10);

        let assessment = engine
            .create_damage_assessment(
                tenant,
                key,
                2,
                DamageSeverity::Major,
                Some("crushed carton".to_string()),
                UserId::new(),
            )
            .unwrap();
        assert_eq!(assessment.quantity, 2);
        assert_eq!(assessment.severity, DamageSeverity::Major);
        // Loss events do not move stock; disposal is a separate adjustment.
        assert_eq!(engine.on_hand(tenant, key).unwrap(), 10);
    }

    #[test]
    fn serial_batch_updates_are_all_or_nothing() {
        let engine = engine();
        let tenant = test_tenant_id();
        let key = test_key();
        let serials: Vec<SerialNumber> = ["SN-A", "SN-B", "SN-C"]
            .iter()
            .map(|s| SerialNumber::new(*s))
            .collect();
        engine
            .register_serial_numbers(tenant, key, serials.clone())
            .unwrap();
        assert_eq!(engine.get_available_serial_numbers(tenant, key).unwrap().len(), 3);

        engine
            .update_serial_number_status(
                tenant,
                key,
                vec![SerialNumber::new("SN-A")],
                SerialStatus::Sold,
                Uuid::now_v7(),
            )
            .unwrap();

        let err = engine
            .update_serial_number_status(
                tenant,
                key,
                vec![SerialNumber::new("SN-A"), SerialNumber::new("SN-B")],
                SerialStatus::Reserved,
                Uuid::now_v7(),
            )
            .unwrap_err();
        match err {
            EngineError::Stock(StockError::SerialNotAvailable { serial, status }) => {
                assert_eq!(serial, "SN-A");
                assert_eq!(status, "sold");
            }
            other => panic!("expected SerialNotAvailable, got {other:?}"),
        }
        // SN-B untouched by the failed batch.
        assert_eq!(engine.get_available_serial_numbers(tenant, key).unwrap().len(), 2);
    }

    #[test]
    fn pick_list_generation_does_not_reserve_by_default() {
        let engine = engine();
        let tenant = test_tenant_id();
        let key = test_key();
        stock(&engine, tenant, key, 50);

        let lines = vec![PickLineInput {
            key,
            bin_id: None,
            required_quantity: 20,
            uom_id: UomId::new(AggregateId::new()),
        }];
        let (pick_list_id, details) = engine
            .create_pick_list(tenant, key.warehouse, lines, UserId::new())
            .unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].status, PickLineStatus::Pending);
        assert!(engine.get_active_reservations(tenant, key).unwrap().is_empty());

        engine.record_pick(tenant, pick_list_id, 1, 20).unwrap();
    }

    #[test]
    fn pick_list_reserves_when_configured() {
        let engine = InventoryEngine::new(EngineConfig {
            approval_threshold: THRESHOLD,
            picking_reserves: true,
        });
        let tenant = test_tenant_id();
        let key = test_key();
        stock(&engine, tenant, key, 50);

        let lines = vec![PickLineInput {
            key,
            bin_id: None,
            required_quantity: 20,
            uom_id: UomId::new(AggregateId::new()),
        }];
        engine
            .create_pick_list(tenant, key.warehouse, lines, UserId::new())
            .unwrap();

        let active = engine.get_active_reservations(tenant, key).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].reserved_quantity, 20);
        assert_eq!(active[0].reference.doc_type, "pick_list");
    }

    #[test]
    fn transfer_full_cycle_moves_stock_between_warehouses() {
        let engine = engine();
        let tenant = test_tenant_id();
        let product = ProductId::new(AggregateId::new());
        let source = WarehouseId::new(AggregateId::new());
        let dest = WarehouseId::new(AggregateId::new());
        let source_key = StockKey::new(product, source);
        let dest_key = StockKey::new(product, dest);
        stock(&engine, tenant, source_key, 100);

        let transfer_id = engine
            .create_transfer(tenant, source, dest, 500, UserId::new())
            .unwrap();
        engine
            .add_transfer_line(tenant, transfer_id, product, None, 30)
            .unwrap();
        let status = engine.submit_transfer(tenant, transfer_id, false).unwrap();
        assert_eq!(status, TransferStatus::Approved);

        engine
            .ship_transfer(
                tenant,
                transfer_id,
                vec![LineQuantity {
                    line_no: 1,
                    quantity: 30,
                }],
                UserId::new(),
            )
            .unwrap();
        assert_eq!(engine.on_hand(tenant, source_key).unwrap(), 70);
        assert_eq!(
            engine.transfer_status(tenant, transfer_id).unwrap(),
            TransferStatus::InTransit
        );
        // The shipment claim was consumed, not left dangling.
        assert!(engine
            .get_active_reservations(tenant, source_key)
            .unwrap()
            .is_empty());

        let status = engine
            .receive_transfer(
                tenant,
                transfer_id,
                vec![LineQuantity {
                    line_no: 1,
                    quantity: 30,
                }],
            )
            .unwrap();
        assert_eq!(status, TransferStatus::Completed);
        assert_eq!(engine.on_hand(tenant, dest_key).unwrap(), 30);
        assert_eq!(engine.on_hand(tenant, source_key).unwrap(), 70);
    }

    #[test]
    fn cancelling_after_ship_compensates_the_source() {
        let engine = engine();
        let tenant = test_tenant_id();
        let product = ProductId::new(AggregateId::new());
        let source = WarehouseId::new(AggregateId::new());
        let dest = WarehouseId::new(AggregateId::new());
        let source_key = StockKey::new(product, source);
        stock(&engine, tenant, source_key, 100);

        let transfer_id = engine
            .create_transfer(tenant, source, dest, 500, UserId::new())
            .unwrap();
        engine
            .add_transfer_line(tenant, transfer_id, product, None, 30)
            .unwrap();
        engine.submit_transfer(tenant, transfer_id, false).unwrap();
        engine
            .ship_transfer(
                tenant,
                transfer_id,
                vec![LineQuantity {
                    line_no: 1,
                    quantity: 30,
                }],
                UserId::new(),
            )
            .unwrap();
        assert_eq!(engine.on_hand(tenant, source_key).unwrap(), 70);

        engine
            .cancel_transfer(tenant, transfer_id, UserId::new())
            .unwrap();
        assert_eq!(engine.on_hand(tenant, source_key).unwrap(), 100);
        assert_eq!(
            engine.transfer_status(tenant, transfer_id).unwrap(),
            TransferStatus::Cancelled
        );
    }

    #[test]
    fn failed_shipment_line_reverses_earlier_deductions() {
        let engine = engine();
        let tenant = test_tenant_id();
        let product_a = ProductId::new(AggregateId::new());
        let product_b = ProductId::new(AggregateId::new());
        let source = WarehouseId::new(AggregateId::new());
        let dest = WarehouseId::new(AggregateId::new());
        let key_a = StockKey::new(product_a, source);
        let key_b = StockKey::new(product_b, source);
        stock(&engine, tenant, key_a, 100);
        stock(&engine, tenant, key_b, 20);

        let transfer_id = engine
            .create_transfer(tenant, source, dest, 500, UserId::new())
            .unwrap();
        engine
            .add_transfer_line(tenant, transfer_id, product_a, None, 30)
            .unwrap();
        engine
            .add_transfer_line(tenant, transfer_id, product_b, None, 50)
            .unwrap();
        engine.submit_transfer(tenant, transfer_id, false).unwrap();

        let err = engine
            .ship_transfer(
                tenant,
                transfer_id,
                vec![
                    LineQuantity {
                        line_no: 1,
                        quantity: 30,
                    },
                    LineQuantity {
                        line_no: 2,
                        quantity: 50,
                    },
                ],
                UserId::new(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Stock(StockError::InsufficientStock { .. })
        ));

        // Line 1 was deducted and compensated back; the transfer never moved.
        assert_eq!(engine.on_hand(tenant, key_a).unwrap(), 100);
        assert_eq!(engine.on_hand(tenant, key_b).unwrap(), 20);
        assert_eq!(
            engine.transfer_status(tenant, transfer_id).unwrap(),
            TransferStatus::Approved
        );
    }

    #[test]
    fn expensive_transfer_needs_a_second_pair_of_eyes() {
        let engine = engine();
        let tenant = test_tenant_id();
        let product = ProductId::new(AggregateId::new());
        let source = WarehouseId::new(AggregateId::new());
        let dest = WarehouseId::new(AggregateId::new());
        let creator = UserId::new();

        let transfer_id = engine
            .create_transfer(tenant, source, dest, THRESHOLD + 1, creator)
            .unwrap();
        engine
            .add_transfer_line(tenant, transfer_id, product, None, 10)
            .unwrap();

        let err = engine.submit_transfer(tenant, transfer_id, true).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Stock(StockError::ApprovalRequired { .. })
        ));

        let status = engine.submit_transfer(tenant, transfer_id, false).unwrap();
        assert_eq!(status, TransferStatus::PendingApproval);

        let err = engine
            .approve_transfer(tenant, transfer_id, creator)
            .unwrap_err();
        assert!(matches!(err, EngineError::Stock(StockError::InvalidInput(_))));

        engine
            .approve_transfer(tenant, transfer_id, UserId::new())
            .unwrap();
        assert_eq!(
            engine.transfer_status(tenant, transfer_id).unwrap(),
            TransferStatus::Approved
        );
    }

    #[test]
    fn audit_streams_have_monotonic_sequence_numbers() {
        let engine = engine();
        let tenant = test_tenant_id();
        let key = test_key();
        stock(&engine, tenant, key, 10);
        stock(&engine, tenant, key, 5);
        engine
            .commit_movement(
                tenant,
                key,
                None,
                MovementType::SaleOut,
                3,
                Uuid::now_v7(),
                Utc::now(),
            )
            .unwrap();

        let envelopes = engine.audit().for_tenant(tenant);
        assert_eq!(envelopes.len(), 3);
        let mut by_stream: HashMap<AggregateId, Vec<u64>> = HashMap::new();
        for envelope in &envelopes {
            by_stream
                .entry(envelope.aggregate_id())
                .or_default()
                .push(envelope.sequence_number());
        }
        for sequences in by_stream.values() {
            for (i, seq) in sequences.iter().enumerate() {
                assert_eq!(*seq, (i as u64) + 1);
            }
        }
    }
}
