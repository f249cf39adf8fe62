use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use wareflow_catalog::{ProductId, StockKey, WarehouseId};
use wareflow_core::{AggregateId, TenantId};
use wareflow_events::AuditLog;
use wareflow_ledger::{StockLedger, StockLedgerId};
use wareflow_picking::{PickList, PickListId};
use wareflow_quality::{QcBook, QcBookId};
use wareflow_reservations::{ReservationBook, ReservationBookId};
use wareflow_serials::{SerialRegistry, SerialRegistryId};
use wareflow_transfers::{StockTransfer, TransferId};

use crate::error::{EngineError, EngineResult};

/// The per-key aggregates that share one critical section.
///
/// Availability for a key is computed from ledger + reservations inside
/// that key's lock; the serial registry rides along because serial status
/// changes belong to the same key stream.
pub(crate) struct KeySlot {
    pub(crate) ledger: StockLedger,
    pub(crate) reservations: ReservationBook,
    pub(crate) serials: SerialRegistry,
}

impl KeySlot {
    fn new() -> Self {
        Self {
            ledger: StockLedger::empty(StockLedgerId::new(AggregateId::new())),
            reservations: ReservationBook::empty(ReservationBookId::new(AggregateId::new())),
            serials: SerialRegistry::empty(SerialRegistryId::new(AggregateId::new())),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct SlotKey {
    tenant_id: TenantId,
    key: StockKey,
}

/// QC holds are scoped wider than a stock key: one book per
/// (tenant, product, warehouse), withholding from every variant under it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct QcScope {
    tenant_id: TenantId,
    product_id: ProductId,
    warehouse_id: WarehouseId,
}

/// In-memory state owned by the engine.
///
/// Every map value sits behind its own mutex; the maps themselves only grow.
/// Lock order is fixed: a key slot lock may be followed by a QC book lock,
/// never the reverse, and no two key slot locks are ever held together.
pub(crate) struct StockStore {
    slots: RwLock<HashMap<SlotKey, Arc<Mutex<KeySlot>>>>,
    qc_books: RwLock<HashMap<QcScope, Arc<Mutex<QcBook>>>>,
    pick_lists: RwLock<HashMap<(TenantId, PickListId), Arc<Mutex<PickList>>>>,
    transfers: RwLock<HashMap<(TenantId, TransferId), Arc<Mutex<StockTransfer>>>>,
    audit: AuditLog,
}

impl StockStore {
    pub(crate) fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            qc_books: RwLock::new(HashMap::new()),
            pick_lists: RwLock::new(HashMap::new()),
            transfers: RwLock::new(HashMap::new()),
            audit: AuditLog::new(),
        }
    }

    pub(crate) fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// The slot for one (tenant, key), created on first touch.
    pub(crate) fn slot(
        &self,
        tenant_id: TenantId,
        key: StockKey,
    ) -> EngineResult<Arc<Mutex<KeySlot>>> {
        let slot_key = SlotKey { tenant_id, key };
        {
            let slots = self.slots.read().map_err(|_| EngineError::poisoned())?;
            if let Some(slot) = slots.get(&slot_key) {
                return Ok(Arc::clone(slot));
            }
        }
        let mut slots = self.slots.write().map_err(|_| EngineError::poisoned())?;
        Ok(Arc::clone(
            slots
                .entry(slot_key)
                .or_insert_with(|| Arc::new(Mutex::new(KeySlot::new()))),
        ))
    }

    /// Slots for every variant of one product in one warehouse.
    pub(crate) fn slots_for_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> EngineResult<Vec<Arc<Mutex<KeySlot>>>> {
        let slots = self.slots.read().map_err(|_| EngineError::poisoned())?;
        Ok(slots
            .iter()
            .filter(|(k, _)| {
                k.tenant_id == tenant_id
                    && k.key.product == product_id
                    && k.key.warehouse == warehouse_id
            })
            .map(|(_, slot)| Arc::clone(slot))
            .collect())
    }

    pub(crate) fn qc_book(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> EngineResult<Arc<Mutex<QcBook>>> {
        let scope = QcScope {
            tenant_id,
            product_id,
            warehouse_id,
        };
        {
            let books = self.qc_books.read().map_err(|_| EngineError::poisoned())?;
            if let Some(book) = books.get(&scope) {
                return Ok(Arc::clone(book));
            }
        }
        let mut books = self.qc_books.write().map_err(|_| EngineError::poisoned())?;
        Ok(Arc::clone(books.entry(scope).or_insert_with(|| {
            Arc::new(Mutex::new(QcBook::empty(QcBookId::new(AggregateId::new()))))
        })))
    }

    /// On-hold quantity for a scope without creating a book.
    pub(crate) fn on_hold_quantity(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> EngineResult<i64> {
        let scope = QcScope {
            tenant_id,
            product_id,
            warehouse_id,
        };
        let books = self.qc_books.read().map_err(|_| EngineError::poisoned())?;
        match books.get(&scope) {
            Some(book) => {
                let book = book.lock().map_err(|_| EngineError::poisoned())?;
                Ok(book.on_hold_quantity())
            }
            None => Ok(0),
        }
    }

    /// Active holds for a scope without creating a book.
    pub(crate) fn active_qc_holds(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> EngineResult<Vec<wareflow_quality::QcHold>> {
        let scope = QcScope {
            tenant_id,
            product_id,
            warehouse_id,
        };
        let books = self.qc_books.read().map_err(|_| EngineError::poisoned())?;
        match books.get(&scope) {
            Some(book) => {
                let book = book.lock().map_err(|_| EngineError::poisoned())?;
                Ok(book.active_holds())
            }
            None => Ok(Vec::new()),
        }
    }

    pub(crate) fn insert_pick_list(
        &self,
        tenant_id: TenantId,
        pick_list: PickList,
    ) -> EngineResult<Arc<Mutex<PickList>>> {
        let id = pick_list.id_typed();
        let mut lists = self.pick_lists.write().map_err(|_| EngineError::poisoned())?;
        let entry = Arc::new(Mutex::new(pick_list));
        lists.insert((tenant_id, id), Arc::clone(&entry));
        Ok(entry)
    }

    pub(crate) fn pick_list(
        &self,
        tenant_id: TenantId,
        pick_list_id: PickListId,
    ) -> EngineResult<Arc<Mutex<PickList>>> {
        let lists = self.pick_lists.read().map_err(|_| EngineError::poisoned())?;
        lists
            .get(&(tenant_id, pick_list_id))
            .cloned()
            .ok_or(EngineError::Stock(wareflow_core::StockError::NotFound))
    }

    pub(crate) fn insert_transfer(
        &self,
        tenant_id: TenantId,
        transfer: StockTransfer,
    ) -> EngineResult<Arc<Mutex<StockTransfer>>> {
        let id = transfer.id_typed();
        let mut transfers = self.transfers.write().map_err(|_| EngineError::poisoned())?;
        let entry = Arc::new(Mutex::new(transfer));
        transfers.insert((tenant_id, id), Arc::clone(&entry));
        Ok(entry)
    }

    pub(crate) fn transfer(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
    ) -> EngineResult<Arc<Mutex<StockTransfer>>> {
        let transfers = self.transfers.read().map_err(|_| EngineError::poisoned())?;
        transfers
            .get(&(tenant_id, transfer_id))
            .cloned()
            .ok_or(EngineError::Stock(wareflow_core::StockError::NotFound))
    }
}
