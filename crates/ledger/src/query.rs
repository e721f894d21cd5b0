//! Movement history queries: filters, pagination, and the lazy cursor.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DocumentId, InventoryResult, ProductId};

use crate::movement::{Direction, Movement, Reason};
use crate::store::MovementLedger;

pub const DEFAULT_PAGE_LIMIT: u32 = 100;
pub const MAX_PAGE_LIMIT: u32 = 1000;

/// Pagination parameters for history listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of movements to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }
}

/// Filter criteria for movement queries. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub product_id: Option<ProductId>,
    pub document_id: Option<DocumentId>,
    pub direction: Option<Direction>,
    pub reason: Option<Reason>,
    /// Inclusive lower bound on `recorded_at`.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `recorded_at`.
    pub to: Option<DateTime<Utc>>,
}

impl MovementFilter {
    pub fn for_product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            ..Default::default()
        }
    }

    pub fn for_document(document_id: DocumentId) -> Self {
        Self {
            document_id: Some(document_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, m: &Movement) -> bool {
        self.product_id.is_none_or(|p| m.product_id == p)
            && self.document_id.is_none_or(|d| m.document_id == Some(d))
            && self.direction.is_none_or(|d| m.direction == d)
            && self.reason.is_none_or(|r| m.reason == r)
            && self.from.is_none_or(|from| m.recorded_at >= from)
            && self.to.is_none_or(|to| m.recorded_at <= to)
    }
}

/// One page of history, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementPage {
    pub movements: Vec<Movement>,
    /// Total number of movements matching the filter (across all pages).
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

/// Lazy, restartable iterator over matching movements in append order.
///
/// Fetches from the ledger in batches. `position()` is the sequence of the
/// last yielded movement; a new cursor started after that position continues
/// exactly where this one stopped. Because the ledger only grows, a cursor
/// that returned `None` may yield more after new appends.
pub struct MovementCursor<'a, L: ?Sized> {
    ledger: &'a L,
    filter: MovementFilter,
    position: u64,
    batch_size: usize,
    buffered: VecDeque<Movement>,
}

impl<'a, L> MovementCursor<'a, L>
where
    L: MovementLedger + ?Sized,
{
    const DEFAULT_BATCH: usize = 256;

    pub fn new(ledger: &'a L, filter: MovementFilter) -> Self {
        Self::starting_after(ledger, filter, 0)
    }

    /// Resume after a previously observed `position()`.
    pub fn starting_after(ledger: &'a L, filter: MovementFilter, position: u64) -> Self {
        Self {
            ledger,
            filter,
            position,
            batch_size: Self::DEFAULT_BATCH,
            buffered: VecDeque::new(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Start over from the beginning of the ledger.
    pub fn rewind(&mut self) {
        self.position = 0;
        self.buffered.clear();
    }
}

impl<L> Iterator for MovementCursor<'_, L>
where
    L: MovementLedger + ?Sized,
{
    type Item = InventoryResult<Movement>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffered.is_empty() {
            let after = self.position;
            match self.ledger.scan(&self.filter, after, self.batch_size) {
                Ok(batch) => self.buffered.extend(batch),
                Err(e) => return Some(Err(e)),
            }
        }

        let next = self.buffered.pop_front()?;
        self.position = next.sequence;
        Some(Ok(next))
    }
}
