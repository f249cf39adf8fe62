//! `wareflow-transfers` — warehouse-to-warehouse transfer lifecycle.
//!
//! A transfer moves stock between two warehouses through an approval gate
//! and a ship/receive cycle. Every state change goes through an explicit
//! transition table; anything outside it fails without mutating state.

pub mod transfer;

pub use transfer::{
    AddTransferLine, ApprovalStatus, ApproveTransfer, CancelTransfer, CreateTransfer,
    LineQuantity, ReceiveTransfer, RejectTransfer, ResubmitTransfer, ShipTransfer, StockTransfer,
    SubmitTransfer, TransferApproved, TransferCancelled, TransferCommand, TransferCreated,
    TransferEvent, TransferId, TransferLine, TransferLineAdded, TransferLineStatus,
    TransferReceived, TransferRejected, TransferResubmitted, TransferShipped, TransferStatus,
    TransferSubmitted,
};
