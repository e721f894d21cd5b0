use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use stockledger_core::{InventoryError, InventoryResult, MovementId, ProductId};

use crate::movement::{Movement, NewMovement};
use crate::query::{MovementCursor, MovementFilter, MovementPage, Pagination};

/// Append-only movement ledger.
///
/// ## Append semantics
///
/// `append()`:
/// - validates every draft (positive quantity, before/after consistent with direction)
/// - checks each product's chain: a draft's `stock_before` must equal the
///   `stock_after` of that product's previous movement
/// - assigns gap-free sequence numbers and a non-decreasing `recorded_at`
/// - persists the batch atomically (all or nothing)
///
/// Storage failures surface as `InventoryError::Persistence`.
///
/// ## Reads
///
/// `scan()` returns movements in append order (ascending sequence, which is
/// also ascending `recorded_at`). `page()` is the newest-first listing used by
/// history screens.
pub trait MovementLedger: Send + Sync {
    fn append(&self, drafts: Vec<NewMovement>) -> InventoryResult<Vec<Movement>>;

    fn get(&self, id: MovementId) -> InventoryResult<Movement>;

    /// Up to `limit` matching movements with `sequence > after`, ascending.
    fn scan(&self, filter: &MovementFilter, after: u64, limit: usize) -> InventoryResult<Vec<Movement>>;

    fn page(&self, filter: &MovementFilter, pagination: Pagination) -> InventoryResult<MovementPage>;

    fn has_movements(&self, product_id: ProductId) -> InventoryResult<bool> {
        Ok(!self.scan(&MovementFilter::for_product(product_id), 0, 1)?.is_empty())
    }

    /// Lazy iterator over every movement matching `filter`.
    fn query(&self, filter: MovementFilter) -> MovementCursor<'_, Self>
    where
        Self: Sized,
    {
        MovementCursor::new(self, filter)
    }
}

impl<L> MovementLedger for Arc<L>
where
    L: MovementLedger + ?Sized,
{
    fn append(&self, drafts: Vec<NewMovement>) -> InventoryResult<Vec<Movement>> {
        (**self).append(drafts)
    }

    fn get(&self, id: MovementId) -> InventoryResult<Movement> {
        (**self).get(id)
    }

    fn scan(&self, filter: &MovementFilter, after: u64, limit: usize) -> InventoryResult<Vec<Movement>> {
        (**self).scan(filter, after, limit)
    }

    fn page(&self, filter: &MovementFilter, pagination: Pagination) -> InventoryResult<MovementPage> {
        (**self).page(filter, pagination)
    }

    fn has_movements(&self, product_id: ProductId) -> InventoryResult<bool> {
        (**self).has_movements(product_id)
    }
}

#[derive(Debug, Default)]
struct Journal {
    /// Append order; `movements[i].sequence == i + 1`.
    movements: Vec<Movement>,
    by_id: HashMap<MovementId, usize>,
    /// Latest `stock_after` per product.
    heads: HashMap<ProductId, i64>,
    last_recorded_at: Option<DateTime<Utc>>,
}

/// In-memory append-only ledger.
///
/// Intended for tests/dev. Not optimized for large histories.
#[derive(Debug, Default)]
pub struct InMemoryMovementLedger {
    journal: RwLock<Journal>,
}

impl InMemoryMovementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.journal.read().map(|j| j.movements.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MovementLedger for InMemoryMovementLedger {
    fn append(&self, drafts: Vec<NewMovement>) -> InventoryResult<Vec<Movement>> {
        if drafts.is_empty() {
            return Ok(vec![]);
        }

        let mut guard = self
            .journal
            .write()
            .map_err(|_| InventoryError::poisoned("movement ledger"))?;
        let journal = &mut *guard;

        // Validate the whole batch against the current heads first.
        let mut heads: HashMap<ProductId, i64> = HashMap::new();
        for (idx, d) in drafts.iter().enumerate() {
            d.validate()?;
            if journal.by_id.contains_key(&d.id) || drafts[..idx].iter().any(|p| p.id == d.id) {
                return Err(InventoryError::conflict(format!("movement {} already recorded", d.id)));
            }
            let head = heads
                .get(&d.product_id)
                .or_else(|| journal.heads.get(&d.product_id))
                .copied();
            if let Some(head) = head {
                if head != d.stock_before {
                    return Err(InventoryError::conflict(format!(
                        "ledger chain broken for product {}: head is {head}, movement starts at {}",
                        d.product_id, d.stock_before
                    )));
                }
            }
            heads.insert(d.product_id, d.stock_after);
        }

        // Timestamps never go backwards relative to sequence order.
        let now = Utc::now();
        let recorded_at = journal.last_recorded_at.map_or(now, |last| last.max(now));

        let mut committed = Vec::with_capacity(drafts.len());
        for d in drafts {
            let sequence = journal.movements.len() as u64 + 1;
            let movement = Movement::from_new(d, sequence, recorded_at);
            journal.by_id.insert(movement.id, journal.movements.len());
            journal.movements.push(movement.clone());
            committed.push(movement);
        }
        journal.heads.extend(heads);
        journal.last_recorded_at = Some(recorded_at);

        Ok(committed)
    }

    fn get(&self, id: MovementId) -> InventoryResult<Movement> {
        let journal = self
            .journal
            .read()
            .map_err(|_| InventoryError::poisoned("movement ledger"))?;
        journal
            .by_id
            .get(&id)
            .and_then(|&idx| journal.movements.get(idx))
            .cloned()
            .ok_or_else(|| InventoryError::not_found(format!("movement {id}")))
    }

    fn scan(&self, filter: &MovementFilter, after: u64, limit: usize) -> InventoryResult<Vec<Movement>> {
        let journal = self
            .journal
            .read()
            .map_err(|_| InventoryError::poisoned("movement ledger"))?;
        let start = journal.movements.partition_point(|m| m.sequence <= after);
        Ok(journal.movements[start..]
            .iter()
            .filter(|m| filter.matches(m))
            .take(limit)
            .cloned()
            .collect())
    }

    fn page(&self, filter: &MovementFilter, pagination: Pagination) -> InventoryResult<MovementPage> {
        let journal = self
            .journal
            .read()
            .map_err(|_| InventoryError::poisoned("movement ledger"))?;

        let matching: Vec<&Movement> = journal.movements.iter().rev().filter(|m| filter.matches(m)).collect();
        let total = matching.len() as u64;
        let offset = pagination.offset as usize;
        let limit = pagination.limit as usize;
        let movements: Vec<Movement> = matching.into_iter().skip(offset).take(limit).cloned().collect();
        let has_more = (offset + movements.len()) < total as usize;

        Ok(MovementPage {
            movements,
            total,
            pagination,
            has_more,
        })
    }

    fn has_movements(&self, product_id: ProductId) -> InventoryResult<bool> {
        let journal = self
            .journal
            .read()
            .map_err(|_| InventoryError::poisoned("movement ledger"))?;
        Ok(journal.heads.contains_key(&product_id))
    }
}
