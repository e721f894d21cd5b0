//! Alert engine: threshold alerts derived from post-movement stock levels.
//!
//! The engine is the only writer of alert state. Stock-driven transitions
//! come from `notify`; operator transitions from `mark_read`/`mark_all_read`.

pub mod alert;
pub mod engine;

pub use alert::{Alert, AlertClosure, AlertFilter, AlertKind, StockObservation};
pub use engine::{AlertEngine, Transition};
