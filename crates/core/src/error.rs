//! Error taxonomy shared by every stock ledger component.

use thiserror::Error;

use crate::id::ProductId;

/// Result type used across the stock ledger.
pub type InventoryResult<T> = Result<T, InventoryError>;

/// Stock ledger error.
///
/// Every variant is raised before anything is committed, or after a full
/// rollback. Nothing is retried internally except lock acquisition.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Malformed or missing input (empty document, non-positive quantity, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An outbound movement would take stock below zero.
    #[error(
        "insufficient stock for product {product_id}{}: available {available}, requested {requested}",
        line_suffix(.line_no)
    )]
    InsufficientStock {
        product_id: ProductId,
        line_no: Option<u32>,
        available: i64,
        requested: i64,
    },

    /// Another product already uses this SKU.
    #[error("duplicate sku: {0}")]
    DuplicateSku(String),

    /// The product has ledger history and cannot be removed.
    #[error("product {0} is referenced by the movement ledger")]
    ReferencedByLedger(ProductId),

    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Locks could not be acquired in the bounded wait; safe to retry.
    #[error("busy: could not lock products after {attempts} attempt(s)")]
    Busy { attempts: u32 },

    /// Stale version or an operation that already happened.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Underlying storage failure. Nothing was partially committed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

fn line_suffix(line_no: &Option<u32>) -> String {
    line_no.map(|n| format!(" (line {n})")).unwrap_or_default()
}

impl InventoryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// Storage lock poisoning is reported as a persistence failure.
    pub fn poisoned(store: &str) -> Self {
        Self::Persistence(format!("{store}: lock poisoned"))
    }

    /// Whether the caller may retry the whole operation unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Busy { .. } | Self::Persistence(_))
    }
}
