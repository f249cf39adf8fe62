//! `wareflow-ledger` — the authoritative append-only stock ledger.
//!
//! One ledger stream per (tenant, stock key). Every movement is validated
//! against the current on-hand quantity before any event is emitted, so a
//! committed stream can never contain a negative balance. Corrections are
//! compensating entries; entries are never mutated or deleted.

pub mod stock_ledger;

pub use stock_ledger::{
    MovementDirection, MovementRecorded, MovementType, RecordMovement, StockLedger,
    StockLedgerCommand, StockLedgerEntry, StockLedgerEvent, StockLedgerId,
};
