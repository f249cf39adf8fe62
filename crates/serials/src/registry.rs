use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use wareflow_catalog::{SerialNumber, StockKey};
use wareflow_core::{Aggregate, AggregateId, AggregateRoot, StockError, TenantId};
use wareflow_events::Event;

/// Serial registry identifier (one registry per tenant + stock key).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerialRegistryId(pub AggregateId);

impl SerialRegistryId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SerialRegistryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Per-unit status.
///
/// Transitions are one-directional except `Reserved -> Available` (release).
/// `Sold`, `Transferred` and `Scrapped` are terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialStatus {
    Available,
    Reserved,
    Sold,
    Transferred,
    Scrapped,
}

impl SerialStatus {
    pub fn can_transition_to(self, to: SerialStatus) -> bool {
        use SerialStatus::*;
        match self {
            Available => matches!(to, Reserved | Sold | Transferred | Scrapped),
            Reserved => matches!(to, Available | Sold | Transferred | Scrapped),
            Sold | Transferred | Scrapped => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SerialStatus::Available => "available",
            SerialStatus::Reserved => "reserved",
            SerialStatus::Sold => "sold",
            SerialStatus::Transferred => "transferred",
            SerialStatus::Scrapped => "scrapped",
        }
    }
}

/// One serialized unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialUnit {
    pub serial_number: SerialNumber,
    pub key: StockKey,
    pub status: SerialStatus,
}

/// Aggregate root: SerialRegistry for one stock key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialRegistry {
    id: SerialRegistryId,
    tenant_id: Option<TenantId>,
    key: Option<StockKey>,
    units: Vec<SerialUnit>,
    version: u64,
}

impl SerialRegistry {
    /// Empty registry for rehydration.
    pub fn empty(id: SerialRegistryId) -> Self {
        Self {
            id,
            tenant_id: None,
            key: None,
            units: Vec::new(),
            version: 0,
        }
    }

    pub fn id_typed(&self) -> SerialRegistryId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn units(&self) -> &[SerialUnit] {
        &self.units
    }

    /// Units currently eligible for outward commitment.
    pub fn available(&self) -> Vec<SerialUnit> {
        self.units
            .iter()
            .filter(|u| u.status == SerialStatus::Available)
            .cloned()
            .collect()
    }

    fn find(&self, serial: &SerialNumber) -> Option<&SerialUnit> {
        self.units.iter().find(|u| &u.serial_number == serial)
    }
}

impl AggregateRoot for SerialRegistry {
    type Id = SerialRegistryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterSerials (serialized stock intake).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSerials {
    pub tenant_id: TenantId,
    pub key: StockKey,
    pub serials: Vec<SerialNumber>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateStatus (atomic batch transition).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStatus {
    pub tenant_id: TenantId,
    pub serials: Vec<SerialNumber>,
    pub new_status: SerialStatus,
    pub txn_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SerialCommand {
    RegisterSerials(RegisterSerials),
    UpdateStatus(UpdateStatus),
}

/// Event: SerialsRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialsRegistered {
    pub tenant_id: TenantId,
    pub units: Vec<SerialUnit>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SerialStatusUpdated (whole batch, applied atomically).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialStatusUpdated {
    pub tenant_id: TenantId,
    pub serials: Vec<SerialNumber>,
    pub new_status: SerialStatus,
    pub txn_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SerialEvent {
    SerialsRegistered(SerialsRegistered),
    SerialStatusUpdated(SerialStatusUpdated),
}

impl Event for SerialEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SerialEvent::SerialsRegistered(_) => "stock.serial.registered",
            SerialEvent::SerialStatusUpdated(_) => "stock.serial.status_updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SerialEvent::SerialsRegistered(e) => e.occurred_at,
            SerialEvent::SerialStatusUpdated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SerialRegistry {
    type Command = SerialCommand;
    type Event = SerialEvent;
    type Error = StockError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SerialEvent::SerialsRegistered(e) => {
                if self.tenant_id.is_none() {
                    self.tenant_id = Some(e.tenant_id);
                    self.key = e.units.first().map(|u| u.key);
                }
                self.units.extend(e.units.iter().cloned());
            }
            SerialEvent::SerialStatusUpdated(e) => {
                for serial in &e.serials {
                    if let Some(u) = self.units.iter_mut().find(|u| &u.serial_number == serial) {
                        u.status = e.new_status;
                    }
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SerialCommand::RegisterSerials(cmd) => self.handle_register(cmd),
            SerialCommand::UpdateStatus(cmd) => self.handle_update(cmd),
        }
    }
}

impl SerialRegistry {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), StockError> {
        match self.tenant_id {
            Some(t) if t != tenant_id => Err(StockError::conflict("tenant mismatch")),
            _ => Ok(()),
        }
    }

    fn handle_register(&self, cmd: &RegisterSerials) -> Result<Vec<SerialEvent>, StockError> {
        self.ensure_tenant(cmd.tenant_id)?;
        if let Some(k) = self.key {
            if k != cmd.key {
                return Err(StockError::conflict("stock key mismatch"));
            }
        }

        if cmd.serials.is_empty() {
            return Err(StockError::invalid_input("no serial numbers supplied"));
        }

        let mut units = Vec::with_capacity(cmd.serials.len());
        for serial in &cmd.serials {
            if self.find(serial).is_some() {
                return Err(StockError::conflict(format!(
                    "serial {serial} already registered"
                )));
            }
            if units.iter().any(|u: &SerialUnit| &u.serial_number == serial) {
                return Err(StockError::conflict(format!(
                    "serial {serial} duplicated in batch"
                )));
            }
            units.push(SerialUnit {
                serial_number: serial.clone(),
                key: cmd.key,
                status: SerialStatus::Available,
            });
        }

        Ok(vec![SerialEvent::SerialsRegistered(SerialsRegistered {
            tenant_id: cmd.tenant_id,
            units,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateStatus) -> Result<Vec<SerialEvent>, StockError> {
        self.ensure_tenant(cmd.tenant_id)?;

        if cmd.serials.is_empty() {
            return Err(StockError::invalid_input("no serial numbers supplied"));
        }

        // Validate the whole batch before emitting anything: a single illegal
        // transition rejects the batch with no partial application.
        for serial in &cmd.serials {
            match self.find(serial) {
                None => {
                    return Err(StockError::serial_not_available(
                        serial.as_str(),
                        "unregistered",
                    ));
                }
                Some(unit) if !unit.status.can_transition_to(cmd.new_status) => {
                    return Err(StockError::serial_not_available(
                        serial.as_str(),
                        unit.status.as_str(),
                    ));
                }
                Some(_) => {}
            }
        }

        Ok(vec![SerialEvent::SerialStatusUpdated(SerialStatusUpdated {
            tenant_id: cmd.tenant_id,
            serials: cmd.serials.clone(),
            new_status: cmd.new_status,
            txn_id: cmd.txn_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wareflow_catalog::{ProductId, WarehouseId};

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_key() -> StockKey {
        StockKey::new(
            ProductId::new(AggregateId::new()),
            WarehouseId::new(AggregateId::new()),
        )
    }

    fn serials(names: &[&str]) -> Vec<SerialNumber> {
        names.iter().map(|s| SerialNumber::new(*s)).collect()
    }

    fn registry_with(tenant: TenantId, key: StockKey, names: &[&str]) -> SerialRegistry {
        let mut registry = SerialRegistry::empty(SerialRegistryId::new(AggregateId::new()));
        let events = registry
            .handle(&SerialCommand::RegisterSerials(RegisterSerials {
                tenant_id: tenant,
                key,
                serials: serials(names),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        for event in &events {
            registry.apply(event);
        }
        registry
    }

    fn update(tenant: TenantId, names: &[&str], new_status: SerialStatus) -> SerialCommand {
        SerialCommand::UpdateStatus(UpdateStatus {
            tenant_id: tenant,
            serials: serials(names),
            new_status,
            txn_id: Uuid::now_v7(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn registered_serials_start_available() {
        let tenant = test_tenant_id();
        let registry = registry_with(tenant, test_key(), &["SN-1", "SN-2"]);
        assert_eq!(registry.available().len(), 2);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let tenant = test_tenant_id();
        let key = test_key();
        let registry = registry_with(tenant, key, &["SN-1"]);

        let err = registry
            .handle(&SerialCommand::RegisterSerials(RegisterSerials {
                tenant_id: tenant,
                key,
                serials: serials(&["SN-1"]),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, StockError::Conflict(_)));
    }

    #[test]
    fn batch_update_transitions_every_serial() {
        let tenant = test_tenant_id();
        let mut registry = registry_with(tenant, test_key(), &["SN-1", "SN-2", "SN-3"]);

        let events = registry
            .handle(&update(tenant, &["SN-1", "SN-2"], SerialStatus::Reserved))
            .unwrap();
        for event in &events {
            registry.apply(event);
        }

        assert_eq!(registry.available().len(), 1);
        assert_eq!(registry.units()[0].status, SerialStatus::Reserved);
        assert_eq!(registry.units()[1].status, SerialStatus::Reserved);
    }

    #[test]
    fn batch_with_one_sold_serial_is_rejected_wholesale() {
        let tenant = test_tenant_id();
        let mut registry = registry_with(tenant, test_key(), &["SN-1", "SN-2", "SN-3"]);

        // Sell SN-2 first.
        let events = registry
            .handle(&update(tenant, &["SN-2"], SerialStatus::Sold))
            .unwrap();
        for event in &events {
            registry.apply(event);
        }

        let before = registry.units().to_vec();
        let err = registry
            .handle(&update(tenant, &["SN-1", "SN-2", "SN-3"], SerialStatus::Sold))
            .unwrap_err();

        assert_eq!(
            err,
            StockError::SerialNotAvailable {
                serial: "SN-2".to_string(),
                status: "sold".to_string()
            }
        );
        // No serial's status changed.
        assert_eq!(registry.units(), before.as_slice());
    }

    #[test]
    fn reserved_serial_can_be_released_back_to_available() {
        let tenant = test_tenant_id();
        let mut registry = registry_with(tenant, test_key(), &["SN-1"]);

        for cmd in [
            update(tenant, &["SN-1"], SerialStatus::Reserved),
            update(tenant, &["SN-1"], SerialStatus::Available),
        ] {
            let events = registry.handle(&cmd).unwrap();
            for event in &events {
                registry.apply(event);
            }
        }

        assert_eq!(registry.available().len(), 1);
    }

    #[test]
    fn scrapped_is_terminal() {
        let tenant = test_tenant_id();
        let mut registry = registry_with(tenant, test_key(), &["SN-1"]);

        let events = registry
            .handle(&update(tenant, &["SN-1"], SerialStatus::Scrapped))
            .unwrap();
        for event in &events {
            registry.apply(event);
        }

        let err = registry
            .handle(&update(tenant, &["SN-1"], SerialStatus::Available))
            .unwrap_err();
        assert!(matches!(err, StockError::SerialNotAvailable { .. }));
    }

    #[test]
    fn unregistered_serial_rejects_the_batch() {
        let tenant = test_tenant_id();
        let registry = registry_with(tenant, test_key(), &["SN-1"]);

        let err = registry
            .handle(&update(tenant, &["SN-1", "SN-404"], SerialStatus::Reserved))
            .unwrap_err();
        assert_eq!(
            err,
            StockError::SerialNotAvailable {
                serial: "SN-404".to_string(),
                status: "unregistered".to_string()
            }
        );
    }
}
