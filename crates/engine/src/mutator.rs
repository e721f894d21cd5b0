//! Stock mutator: the only path by which stock changes.
//!
//! ## Transaction
//!
//! `begin()` locks every product named by the requests and plans the
//! movements against a working copy of their stock. Nothing is written yet, so
//! dropping a transaction is a rollback.
//!
//! `commit_with()` then:
//! 1. prepares the new stock in the registry (compare-and-swap on row
//!    version); readers keep seeing the old stock
//! 2. appends the movements to the ledger: **this is the commit point**
//! 3. publishes the prepared stock and the caller's staged write (e.g. the
//!    document)
//! 4. notifies the alert engine for every touched product
//!
//! A failure in 1-2 discards everything prepared or staged; nothing was ever
//! visible. Steps 3-4 cannot fail. Locks are held until the transaction is
//! dropped, after alert notification.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{info, warn};

use stockledger_alerts::{AlertEngine, StockObservation, Transition};
use stockledger_catalog::{Product, ProductRegistry, StockWrite};
use stockledger_core::{DocumentId, ExpectedVersion, InventoryError, InventoryResult, MovementId, ProductId};
use stockledger_ledger::{Direction, Movement, MovementLedger, NewMovement, Reason};

use crate::config::EngineConfig;
use crate::locks::{LockManager, ProductLocks};

/// One requested stock change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementRequest {
    pub product_id: ProductId,
    pub direction: Direction,
    pub reason: Reason,
    pub quantity: i64,
    pub note: Option<String>,
    pub document_id: Option<DocumentId>,
    /// Position in the originating document, reported back on failures.
    pub line_no: Option<u32>,
}

impl MovementRequest {
    pub fn new(product_id: ProductId, direction: Direction, reason: Reason, quantity: i64) -> Self {
        Self {
            product_id,
            direction,
            reason,
            quantity,
            note: None,
            document_id: None,
            line_no: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn for_line(mut self, document_id: DocumentId, line_no: u32) -> Self {
        self.document_id = Some(document_id);
        self.line_no = Some(line_no);
        self
    }

    fn line_suffix(&self) -> String {
        self.line_no.map(|n| format!("line {n}: ")).unwrap_or_default()
    }
}

/// A write staged next to a stock transaction, kept out of readers' sight
/// until the ledger append commits.
///
/// The transaction calls exactly one of the two methods.
pub trait StagedWrite {
    fn publish(self);
    fn discard(self);
}

impl StagedWrite for () {
    fn publish(self) {}
    fn discard(self) {}
}

/// Locks a transaction runs under: its own, or ones its caller holds.
enum HeldLocks<'a> {
    Owned(ProductLocks<'a>),
    Borrowed(&'a ProductLocks<'a>),
}

impl HeldLocks<'_> {
    fn products(&self) -> &[ProductId] {
        match self {
            HeldLocks::Owned(locks) => locks.products(),
            HeldLocks::Borrowed(locks) => locks.products(),
        }
    }
}

pub struct StockMutator<R, L> {
    registry: R,
    ledger: L,
    alerts: Arc<AlertEngine>,
    locks: LockManager,
}

impl<R, L> StockMutator<R, L>
where
    R: ProductRegistry,
    L: MovementLedger,
{
    pub fn new(registry: R, ledger: L, alerts: Arc<AlertEngine>, locks: LockManager) -> Self {
        Self {
            registry,
            ledger,
            alerts,
            locks,
        }
    }

    pub fn from_config(registry: R, ledger: L, alerts: Arc<AlertEngine>, config: &EngineConfig) -> Self {
        Self::new(registry, ledger, alerts, LockManager::from_config(config))
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn alerts(&self) -> &AlertEngine {
        &self.alerts
    }

    pub fn lock(&self, ids: impl IntoIterator<Item = ProductId>) -> InventoryResult<ProductLocks<'_>> {
        self.locks.acquire(ids)
    }

    /// Feed a product's current stock to the alert engine.
    ///
    /// Callers must hold the product's lock.
    pub fn observe(&self, product: &Product) -> Transition {
        self.alerts.notify(&observation(product))
    }

    /// Apply one movement: the single-line form of `begin` + `commit`.
    pub fn apply(
        &self,
        product_id: ProductId,
        direction: Direction,
        quantity: i64,
        reason: Reason,
        note: Option<String>,
        document_id: Option<DocumentId>,
    ) -> InventoryResult<Movement> {
        let request = MovementRequest {
            product_id,
            direction,
            reason,
            quantity,
            note,
            document_id,
            line_no: None,
        };
        single(self.begin(vec![request])?.commit()?)
    }

    /// Lock and plan. The returned transaction holds the product locks.
    pub fn begin(&self, requests: Vec<MovementRequest>) -> InventoryResult<StockTransaction<'_, R, L>> {
        check_requests(&requests)?;
        let locks = self.locks.acquire(requests.iter().map(|r| r.product_id))?;
        self.plan(HeldLocks::Owned(locks), requests)
    }

    /// Plan under locks the caller already holds; they must cover every
    /// requested product and stay held after the transaction ends.
    pub fn begin_locked<'a>(
        &'a self,
        locks: &'a ProductLocks<'a>,
        requests: Vec<MovementRequest>,
    ) -> InventoryResult<StockTransaction<'a, R, L>> {
        check_requests(&requests)?;
        if let Some(r) = requests.iter().find(|r| !locks.covers(r.product_id)) {
            return Err(InventoryError::validation(format!(
                "product {} is not locked by the caller",
                r.product_id
            )));
        }
        self.plan(HeldLocks::Borrowed(locks), requests)
    }

    fn plan<'a>(
        &'a self,
        locks: HeldLocks<'a>,
        requests: Vec<MovementRequest>,
    ) -> InventoryResult<StockTransaction<'a, R, L>> {
        let mut products: BTreeMap<ProductId, Product> = BTreeMap::new();
        for r in &requests {
            if !products.contains_key(&r.product_id) {
                products.insert(r.product_id, self.registry.get(r.product_id)?);
            }
        }

        let mut working: HashMap<ProductId, i64> = products.iter().map(|(id, p)| (*id, p.stock())).collect();
        let mut drafts = Vec::with_capacity(requests.len());
        for r in requests {
            let before = working.get(&r.product_id).copied().unwrap_or_default();
            let Some(after) = r.direction.apply(before, r.quantity) else {
                return Err(InventoryError::validation(format!(
                    "{}stock would overflow ({} {} from {})",
                    r.line_suffix(),
                    r.direction,
                    r.quantity,
                    before
                )));
            };
            if after < 0 {
                info!(
                    product_id = %r.product_id,
                    line_no = ?r.line_no,
                    available = before,
                    requested = r.quantity,
                    "insufficient stock"
                );
                return Err(InventoryError::InsufficientStock {
                    product_id: r.product_id,
                    line_no: r.line_no,
                    available: before,
                    requested: r.quantity,
                });
            }
            working.insert(r.product_id, after);
            drafts.push(NewMovement {
                id: MovementId::new(),
                product_id: r.product_id,
                direction: r.direction,
                reason: r.reason,
                quantity: r.quantity,
                stock_before: before,
                stock_after: after,
                note: r.note,
                document_id: r.document_id,
                line_no: r.line_no,
            });
        }

        debug_assert!(products.keys().all(|id| locks.products().contains(id)));
        Ok(StockTransaction {
            mutator: self,
            _locks: locks,
            products,
            finals: working,
            drafts,
        })
    }
}

fn check_requests(requests: &[MovementRequest]) -> InventoryResult<()> {
    if requests.is_empty() {
        return Err(InventoryError::validation("no movements requested"));
    }
    for r in requests {
        if r.quantity <= 0 {
            return Err(InventoryError::validation(format!(
                "{}quantity must be positive",
                r.line_suffix()
            )));
        }
    }
    Ok(())
}

pub(crate) fn single(movements: Vec<Movement>) -> InventoryResult<Movement> {
    movements
        .into_iter()
        .next()
        .ok_or_else(|| InventoryError::persistence("ledger returned no movement for a committed append"))
}

fn observation(product: &Product) -> StockObservation {
    StockObservation {
        product_id: product.id_typed(),
        label: product.label(),
        stock: product.stock(),
        minimum: product.minimum_stock(),
    }
}

/// A planned, locked, not yet written set of movements.
pub struct StockTransaction<'a, R, L> {
    mutator: &'a StockMutator<R, L>,
    _locks: HeldLocks<'a>,
    /// Rows as read under the locks.
    products: BTreeMap<ProductId, Product>,
    finals: HashMap<ProductId, i64>,
    drafts: Vec<NewMovement>,
}

impl<R, L> StockTransaction<'_, R, L>
where
    R: ProductRegistry,
    L: MovementLedger,
{
    pub fn movement_ids(&self) -> Vec<MovementId> {
        self.drafts.iter().map(|d| d.id).collect()
    }

    /// Stock the product will have once committed.
    #[cfg(test)]
    fn planned_stock(&self, id: ProductId) -> Option<i64> {
        self.finals.get(&id).copied()
    }

    pub fn commit(self) -> InventoryResult<Vec<Movement>> {
        self.commit_with(())
    }

    /// Commit, publishing `staged` together with the new stock.
    ///
    /// `staged` is discarded if the transaction fails.
    pub fn commit_with<S: StagedWrite>(self, staged: S) -> InventoryResult<Vec<Movement>> {
        let mutator = self.mutator;
        let ids: Vec<ProductId> = self.products.keys().copied().collect();
        let writes: Vec<StockWrite> = self
            .products
            .values()
            .map(|p| StockWrite {
                product_id: p.id_typed(),
                expected_version: ExpectedVersion::Exact(p.version()),
                stock: self.finals.get(&p.id_typed()).copied().unwrap_or(p.stock()),
            })
            .collect();

        if let Err(err) = mutator.registry.prepare_stock(&writes) {
            warn!(error = ?err, "stock write rejected; transaction rolled back");
            staged.discard();
            return Err(err);
        }

        let movements = match mutator.ledger.append(self.drafts.clone()) {
            Ok(movements) => movements,
            Err(err) => {
                warn!(error = ?err, "ledger append failed; transaction rolled back");
                mutator.registry.discard_stock(&ids);
                staged.discard();
                return Err(err);
            }
        };

        let published = mutator.registry.publish_stock(&ids);
        staged.publish();

        for product in &published {
            mutator.observe(product);
        }

        for m in &movements {
            info!(
                movement_id = %m.id,
                product_id = %m.product_id,
                direction = %m.direction,
                reason = %m.reason,
                quantity = m.quantity,
                stock_before = m.stock_before,
                stock_after = m.stock_after,
                sequence = m.sequence,
                "movement committed"
            );
        }

        Ok(movements)
    }
}
