//! Movement ledger: the append-only system of record for stock changes.
//!
//! Movements are immutable once appended. There is no update or delete;
//! corrections are new compensating movements.

pub mod movement;
pub mod query;
pub mod replay;
pub mod store;

pub use movement::{Direction, Movement, NewMovement, Reason};
pub use query::{
    DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, MovementCursor, MovementFilter, MovementPage, Pagination,
};
pub use replay::{Replay, replay};
pub use store::{InMemoryMovementLedger, MovementLedger};
