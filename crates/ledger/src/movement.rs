use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DocumentId, Entity, InventoryError, InventoryResult, MovementId, ProductId};

/// Which way stock moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }

    /// Stock after moving `quantity` units from `before`, or `None` if it
    /// does not fit in an `i64`. May be negative; callers decide whether that
    /// is acceptable.
    pub fn apply(self, before: i64, quantity: i64) -> Option<i64> {
        match self {
            Direction::In => before.checked_add(quantity),
            Direction::Out => before.checked_sub(quantity),
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            Direction::In => Direction::Out,
            Direction::Out => Direction::In,
        }
    }
}

impl core::fmt::Display for Direction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Business reason for a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reason {
    Purchase,
    Sale,
    Return,
    Adjustment,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Purchase => "purchase",
            Reason::Sale => "sale",
            Reason::Return => "return",
            Reason::Adjustment => "adjustment",
        }
    }
}

impl core::fmt::Display for Reason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A movement ready to be appended (not yet sequenced).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    pub id: MovementId,
    pub product_id: ProductId,
    pub direction: Direction,
    pub reason: Reason,
    pub quantity: i64,
    pub stock_before: i64,
    pub stock_after: i64,
    pub note: Option<String>,
    pub document_id: Option<DocumentId>,
    pub line_no: Option<u32>,
}

impl NewMovement {
    /// Check the record is internally consistent.
    pub fn validate(&self) -> InventoryResult<()> {
        if self.quantity <= 0 {
            return Err(InventoryError::validation("movement quantity must be positive"));
        }
        if self.stock_before < 0 || self.stock_after < 0 {
            return Err(InventoryError::validation(format!(
                "movement {} has negative stock snapshot",
                self.id
            )));
        }
        if self.direction.apply(self.stock_before, self.quantity) != Some(self.stock_after) {
            return Err(InventoryError::validation(format!(
                "movement {}: {} {} from {} does not reach {}",
                self.id, self.direction, self.quantity, self.stock_before, self.stock_after
            )));
        }
        Ok(())
    }
}

/// An appended, immutable movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    /// Global append position. Gap-free, starts at 1.
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    pub product_id: ProductId,
    pub direction: Direction,
    pub reason: Reason,
    /// Always positive; the sign lives in `direction`.
    pub quantity: i64,
    pub stock_before: i64,
    pub stock_after: i64,
    pub note: Option<String>,
    pub document_id: Option<DocumentId>,
    pub line_no: Option<u32>,
}

impl Movement {
    pub(crate) fn from_new(new: NewMovement, sequence: u64, recorded_at: DateTime<Utc>) -> Self {
        Self {
            id: new.id,
            sequence,
            recorded_at,
            product_id: new.product_id,
            direction: new.direction,
            reason: new.reason,
            quantity: new.quantity,
            stock_before: new.stock_before,
            stock_after: new.stock_after,
            note: new.note,
            document_id: new.document_id,
            line_no: new.line_no,
        }
    }
}

impl Entity for Movement {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
