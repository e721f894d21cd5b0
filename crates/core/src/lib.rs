//! `stockledger-core`: shared building blocks for the stock ledger.
//!
//! Identifiers, the error taxonomy, and optimistic version checks. No IO.

pub mod entity;
pub mod error;
pub mod id;
pub mod version;

pub use entity::Entity;
pub use error::{InventoryError, InventoryResult};
pub use id::{AlertId, CategoryId, DocumentId, MovementId, PartyId, ProductId};
pub use version::ExpectedVersion;
