//! `wareflow-quality` — quality-control holds and damage assessments.
//!
//! A hold withholds quantity from availability until an inspector releases
//! or rejects it. Damage assessments record loss events; disposal of
//! rejected or totally lost stock is an adjustment movement decided by the
//! caller.

pub mod book;

pub use book::{
    DamageAssessment, DamageRecorded, DamageSeverity, HoldPlaced, HoldRejected, HoldReleased,
    PlaceHold, QcBook, QcBookId, QcCommand, QcEvent, QcHold, QcHoldStatus, RecordDamage,
    RejectHold, ReleaseHold,
};
