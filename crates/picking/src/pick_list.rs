use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wareflow_catalog::{BinId, StockKey, UomId, WarehouseId};
use wareflow_core::{Aggregate, AggregateId, AggregateRoot, StockError, TenantId};
use wareflow_events::Event;

/// Pick list identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PickListId(pub AggregateId);

impl PickListId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PickListId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Pick line lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PickLineStatus {
    Pending,
    Picking,
    Completed,
    Short,
}

/// One line of picking work. `0 <= picked_quantity <= required_quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickListDetail {
    pub line_no: u32,
    pub key: StockKey,
    pub bin_id: Option<BinId>,
    pub required_quantity: i64,
    pub picked_quantity: i64,
    pub uom_id: UomId,
    pub status: PickLineStatus,
}

/// Generation input: one validated outward line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickLineInput {
    pub key: StockKey,
    pub bin_id: Option<BinId>,
    pub required_quantity: i64,
    pub uom_id: UomId,
}

/// Aggregate root: PickList.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickList {
    id: PickListId,
    tenant_id: Option<TenantId>,
    warehouse_id: Option<WarehouseId>,
    details: Vec<PickListDetail>,
    version: u64,
}

impl PickList {
    /// Empty pick list for rehydration.
    pub fn empty(id: PickListId) -> Self {
        Self {
            id,
            tenant_id: None,
            warehouse_id: None,
            details: Vec::new(),
            version: 0,
        }
    }

    pub fn id_typed(&self) -> PickListId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn warehouse_id(&self) -> Option<WarehouseId> {
        self.warehouse_id
    }

    pub fn details(&self) -> &[PickListDetail] {
        &self.details
    }

    pub fn is_generated(&self) -> bool {
        !self.details.is_empty()
    }

    fn line(&self, line_no: u32) -> Option<&PickListDetail> {
        self.details.iter().find(|d| d.line_no == line_no)
    }
}

impl AggregateRoot for PickList {
    type Id = PickListId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: GeneratePickList.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratePickList {
    pub tenant_id: TenantId,
    pub warehouse_id: WarehouseId,
    pub lines: Vec<PickLineInput>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPick {
    pub tenant_id: TenantId,
    pub line_no: u32,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CloseShort (give up on an under-picked line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseShort {
    pub tenant_id: TenantId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PickListCommand {
    GeneratePickList(GeneratePickList),
    RecordPick(RecordPick),
    CloseShort(CloseShort),
}

/// Event: PickListGenerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickListGenerated {
    pub tenant_id: TenantId,
    pub warehouse_id: WarehouseId,
    pub details: Vec<PickListDetail>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PickRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickRecorded {
    pub tenant_id: TenantId,
    pub line_no: u32,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineClosedShort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineClosedShort {
    pub tenant_id: TenantId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PickListEvent {
    PickListGenerated(PickListGenerated),
    PickRecorded(PickRecorded),
    LineClosedShort(LineClosedShort),
}

impl Event for PickListEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PickListEvent::PickListGenerated(_) => "stock.pick_list.generated",
            PickListEvent::PickRecorded(_) => "stock.pick_list.pick_recorded",
            PickListEvent::LineClosedShort(_) => "stock.pick_list.line_closed_short",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PickListEvent::PickListGenerated(e) => e.occurred_at,
            PickListEvent::PickRecorded(e) => e.occurred_at,
            PickListEvent::LineClosedShort(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PickList {
    type Command = PickListCommand;
    type Event = PickListEvent;
    type Error = StockError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PickListEvent::PickListGenerated(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.warehouse_id = Some(e.warehouse_id);
                self.details = e.details.clone();
            }
            PickListEvent::PickRecorded(e) => {
                if let Some(d) = self.details.iter_mut().find(|d| d.line_no == e.line_no) {
                    d.picked_quantity += e.quantity;
                    d.status = if d.picked_quantity == d.required_quantity {
                        PickLineStatus::Completed
                    } else {
                        PickLineStatus::Picking
                    };
                }
            }
            PickListEvent::LineClosedShort(e) => {
                if let Some(d) = self.details.iter_mut().find(|d| d.line_no == e.line_no) {
                    d.status = PickLineStatus::Short;
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PickListCommand::GeneratePickList(cmd) => self.handle_generate(cmd),
            PickListCommand::RecordPick(cmd) => self.handle_pick(cmd),
            PickListCommand::CloseShort(cmd) => self.handle_close_short(cmd),
        }
    }
}

impl PickList {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), StockError> {
        match self.tenant_id {
            Some(t) if t != tenant_id => Err(StockError::conflict("tenant mismatch")),
            _ => Ok(()),
        }
    }

    fn handle_generate(&self, cmd: &GeneratePickList) -> Result<Vec<PickListEvent>, StockError> {
        if self.is_generated() {
            return Err(StockError::conflict("pick list already generated"));
        }
        if cmd.lines.is_empty() {
            return Err(StockError::invalid_input("pick list needs at least one line"));
        }

        let mut details = Vec::with_capacity(cmd.lines.len());
        for (idx, line) in cmd.lines.iter().enumerate() {
            if line.required_quantity <= 0 {
                return Err(StockError::invalid_input(
                    "required quantity must be positive",
                ));
            }
            if line.key.warehouse != cmd.warehouse_id {
                return Err(StockError::invalid_input(
                    "pick line warehouse does not match pick list warehouse",
                ));
            }
            details.push(PickListDetail {
                line_no: (idx as u32) + 1,
                key: line.key,
                bin_id: line.bin_id,
                required_quantity: line.required_quantity,
                picked_quantity: 0,
                uom_id: line.uom_id,
                status: PickLineStatus::Pending,
            });
        }

        Ok(vec![PickListEvent::PickListGenerated(PickListGenerated {
            tenant_id: cmd.tenant_id,
            warehouse_id: cmd.warehouse_id,
            details,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_pick(&self, cmd: &RecordPick) -> Result<Vec<PickListEvent>, StockError> {
        self.ensure_tenant(cmd.tenant_id)?;

        if cmd.quantity <= 0 {
            return Err(StockError::invalid_input("picked quantity must be positive"));
        }

        let line = self.line(cmd.line_no).ok_or(StockError::NotFound)?;
        match line.status {
            PickLineStatus::Pending | PickLineStatus::Picking => {}
            PickLineStatus::Completed | PickLineStatus::Short => {
                return Err(StockError::conflict("pick line already closed"));
            }
        }
        if line.picked_quantity + cmd.quantity > line.required_quantity {
            return Err(StockError::invalid_input(format!(
                "picking {} would exceed required quantity ({} of {} picked)",
                cmd.quantity, line.picked_quantity, line.required_quantity
            )));
        }

        Ok(vec![PickListEvent::PickRecorded(PickRecorded {
            tenant_id: cmd.tenant_id,
            line_no: cmd.line_no,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_close_short(&self, cmd: &CloseShort) -> Result<Vec<PickListEvent>, StockError> {
        self.ensure_tenant(cmd.tenant_id)?;

        let line = self.line(cmd.line_no).ok_or(StockError::NotFound)?;
        match line.status {
            PickLineStatus::Pending | PickLineStatus::Picking => {}
            PickLineStatus::Completed | PickLineStatus::Short => {
                return Err(StockError::conflict("pick line already closed"));
            }
        }

        Ok(vec![PickListEvent::LineClosedShort(LineClosedShort {
            tenant_id: cmd.tenant_id,
            line_no: cmd.line_no,
            occurred_at: cmd.occurred_at,
        })])
    }
}
