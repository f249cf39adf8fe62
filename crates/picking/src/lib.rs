//! `wareflow-picking` — picking work orders for validated outward lines.
//!
//! A pick list is generated from already-validated outward lines; generating
//! one never reserves stock (the caller decides whether picking reserves).

pub mod pick_list;

pub use pick_list::{
    CloseShort, GeneratePickList, LineClosedShort, PickLineInput, PickLineStatus, PickList,
    PickListCommand, PickListDetail, PickListEvent, PickListGenerated, PickListId, PickRecorded,
    RecordPick,
};
