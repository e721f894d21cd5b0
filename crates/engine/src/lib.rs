//! `stockledger-engine`: the transactional core.
//!
//! - `locks`: per-product exclusive locks with ordered, bounded acquisition
//! - `mutator`: the stock mutator (registry write, ledger append, alert notify)
//! - `processors`: purchase/sale/return/adjustment documents and reversals
//! - `service`: the facade exposed to the API layer
//! - `sweep`: periodic low-stock evaluation

pub mod config;
pub mod locks;
pub mod mutator;
pub mod processors;
pub mod service;
pub mod sweep;

pub use config::EngineConfig;
pub use locks::{LockManager, ProductLocks};
pub use mutator::{MovementRequest, StagedWrite, StockMutator, StockTransaction};
pub use processors::DocumentProcessor;
pub use service::{InMemoryInventoryService, InventoryService, Reconciliation};
pub use sweep::{SweepReport, SweepWorker, WorkerHandle};
