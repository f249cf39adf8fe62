//! `wareflow-pricing` — deterministic money arithmetic for document lines.
//!
//! Every document type (purchase order, GRN, invoice, return, stock entry)
//! derives its line figures through the same calculator, so a preview in the
//! editor and the committed document can never disagree on totals.

pub mod line_item;

pub use line_item::{Discount, LineItemCalculator, LineItemFigures, LineItemInput, TaxBreakup, TaxComponent};
