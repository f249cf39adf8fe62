//! `wareflow-reservations` — soft, revocable claims on stock.
//!
//! A reservation withholds quantity from availability without moving it.
//! The book for a stock key is the single source the availability formula
//! subtracts from; display and validation read the same `active()` list.

pub mod book;

pub use book::{
    Consume, DocumentRef, Release, Reservation, ReservationBook, ReservationBookId,
    ReservationCommand, ReservationConsumed, ReservationEvent, ReservationReleased,
    ReservationStatus, Reserve, Reserved,
};
