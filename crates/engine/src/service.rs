//! Inventory service facade.
//!
//! The operations the API layer calls. Transport, authentication and request
//! parsing live outside this crate.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use stockledger_alerts::{Alert, AlertEngine, AlertFilter};
use stockledger_catalog::{
    InMemoryProductRegistry, NewProduct, Product, ProductFilter, ProductPatch, ProductRegistry,
};
use stockledger_core::{AlertId, DocumentId, InventoryError, InventoryResult, PartyId, ProductId};
use stockledger_documents::{
    Document, DocumentFilter, DocumentStore, InMemoryDocumentStore, LineItem, NewDocument, ReturnKind,
};
use stockledger_ledger::{
    Direction, InMemoryMovementLedger, Movement, MovementCursor, MovementFilter, MovementLedger, MovementPage,
    Pagination, Reason, Replay, replay,
};

use crate::config::EngineConfig;
use crate::locks::ProductLocks;
use crate::mutator::{MovementRequest, StockMutator};
use crate::processors::DocumentProcessor;

/// Note on the synthetic movement carrying a product's initial stock.
pub const INITIAL_STOCK_NOTE: &str = "initial stock";

/// Registry snapshot compared against the ledger's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub product_id: ProductId,
    pub recorded_stock: i64,
    pub replay: Replay,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.recorded_stock == self.replay.stock
    }
}

pub struct InventoryService<R, L, D> {
    config: EngineConfig,
    mutator: StockMutator<R, L>,
    documents: D,
}

pub type InMemoryInventoryService =
    InventoryService<Arc<InMemoryProductRegistry>, Arc<InMemoryMovementLedger>, Arc<InMemoryDocumentStore>>;

impl InMemoryInventoryService {
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(
            config,
            InMemoryProductRegistry::arc(),
            InMemoryMovementLedger::arc(),
            InMemoryDocumentStore::arc(),
        )
    }
}

impl<R, L, D> InventoryService<R, L, D>
where
    R: ProductRegistry,
    L: MovementLedger,
    D: DocumentStore,
{
    pub fn new(config: EngineConfig, registry: R, ledger: L, documents: D) -> Self {
        let mutator = StockMutator::from_config(registry, ledger, Arc::new(AlertEngine::new()), &config);
        Self {
            config,
            mutator,
            documents,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn mutator(&self) -> &StockMutator<R, L> {
        &self.mutator
    }

    fn processor(&self) -> DocumentProcessor<'_, R, L, D> {
        DocumentProcessor::new(&self.mutator, &self.documents)
    }

    // ---- products ----

    /// Register a product. Non-zero initial stock is recorded as its first movement.
    ///
    /// The new product's lock is held while its stock is seeded and observed.
    pub fn create_product(&self, mut new: NewProduct, initial_stock: i64) -> InventoryResult<Product> {
        if initial_stock < 0 {
            return Err(InventoryError::validation("initial stock cannot be negative"));
        }
        new.minimum_stock.get_or_insert(self.config.default_minimum_stock);

        let product = self.mutator.registry().create(new)?;
        let id = product.id_typed();
        info!(product_id = %id, sku = product.sku(), initial_stock, "product created");

        let locks = match self.mutator.lock([id]) {
            Ok(locks) => locks,
            Err(err) => {
                warn!(product_id = %id, error = ?err, "new product could not be locked; removing it");
                if let Err(undo) = self.delete_product(id) {
                    warn!(product_id = %id, error = ?undo, "failed to remove unlocked new product");
                }
                return Err(err);
            }
        };

        match self.seed(&locks, id, initial_stock) {
            Ok(product) => Ok(product),
            Err(err) => {
                warn!(product_id = %id, error = ?err, "initial stock failed; removing product");
                if let Err(undo) = self.delete_locked(id) {
                    warn!(product_id = %id, error = ?undo, "failed to remove product after initial stock failure");
                }
                Err(err)
            }
        }
    }

    fn seed(&self, locks: &ProductLocks<'_>, id: ProductId, initial_stock: i64) -> InventoryResult<Product> {
        if initial_stock > 0 {
            let request = MovementRequest::new(id, Direction::In, Reason::Adjustment, initial_stock)
                .with_note(INITIAL_STOCK_NOTE);
            self.mutator.begin_locked(locks, vec![request])?.commit()?;
            return self.mutator.registry().get(id);
        }
        let product = self.mutator.registry().get(id)?;
        self.mutator.observe(&product);
        Ok(product)
    }

    /// Master data update. A changed threshold re-evaluates the product's alerts.
    pub fn update_product(&self, id: ProductId, patch: ProductPatch) -> InventoryResult<Product> {
        let reevaluate = patch.touches_threshold() || patch.active == Some(true);
        let _locks = self.mutator.lock([id])?;
        let updated = self.mutator.registry().update(id, patch)?;
        if !updated.is_active() {
            self.mutator.alerts().withdraw(id);
        } else if reevaluate {
            self.mutator.observe(&updated);
        }
        Ok(updated)
    }

    /// Soft delete: hidden from listings and the sweep, history kept.
    pub fn deactivate_product(&self, id: ProductId) -> InventoryResult<Product> {
        self.update_product(
            id,
            ProductPatch {
                active: Some(false),
                ..Default::default()
            },
        )
    }

    /// Hard delete, refused once the product has any movement.
    pub fn delete_product(&self, id: ProductId) -> InventoryResult<()> {
        let _locks = self.mutator.lock([id])?;
        self.delete_locked(id)
    }

    /// Caller holds the product's lock.
    fn delete_locked(&self, id: ProductId) -> InventoryResult<()> {
        self.mutator.registry().get(id)?;
        if self.mutator.ledger().has_movements(id)? {
            return Err(InventoryError::ReferencedByLedger(id));
        }
        self.mutator.registry().delete(id)?;
        self.mutator.alerts().withdraw(id);
        info!(product_id = %id, "product deleted");
        Ok(())
    }

    pub fn get_product(&self, id: ProductId) -> InventoryResult<Product> {
        self.mutator.registry().get(id)
    }

    pub fn get_product_by_sku(&self, sku: &str) -> InventoryResult<Product> {
        self.mutator.registry().get_by_sku(sku)
    }

    pub fn list_products(&self, filter: &ProductFilter) -> InventoryResult<Vec<Product>> {
        self.mutator.registry().list(filter)
    }

    // ---- documents ----

    pub fn purchase(
        &self,
        supplier_id: PartyId,
        document_number: Option<String>,
        lines: Vec<LineItem>,
    ) -> InventoryResult<Document> {
        self.processor()
            .process(NewDocument::purchase(supplier_id, document_number, lines))
    }

    pub fn sale(
        &self,
        customer_id: Option<PartyId>,
        pos_label: Option<String>,
        lines: Vec<LineItem>,
    ) -> InventoryResult<Document> {
        self.processor().process(NewDocument::sale(customer_id, pos_label, lines))
    }

    pub fn return_goods(
        &self,
        kind: ReturnKind,
        reference_document_id: Option<DocumentId>,
        reason: impl Into<String>,
        lines: Vec<LineItem>,
    ) -> InventoryResult<Document> {
        self.processor()
            .process(NewDocument::return_goods(kind, reference_document_id, reason, lines))
    }

    pub fn adjustment(
        &self,
        product_id: ProductId,
        direction: Direction,
        quantity: i64,
        note: Option<String>,
    ) -> InventoryResult<Movement> {
        self.processor().adjust(product_id, direction, quantity, note)
    }

    pub fn reverse_document(&self, id: DocumentId) -> InventoryResult<Vec<Movement>> {
        self.processor().reverse(id)
    }

    pub fn get_document(&self, id: DocumentId) -> InventoryResult<Document> {
        self.documents.get(id)
    }

    pub fn list_documents(&self, filter: &DocumentFilter) -> InventoryResult<Vec<Document>> {
        self.documents.list(filter)
    }

    // ---- history ----

    /// Newest-first page; `limit` defaults to the configured page size.
    pub fn movements(
        &self,
        filter: &MovementFilter,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> InventoryResult<MovementPage> {
        let pagination = Pagination::new(limit.or(Some(self.config.movement_page_limit)), offset);
        self.mutator.ledger().page(filter, pagination)
    }

    /// Lazy oldest-first iterator over the full matching history.
    pub fn movement_cursor(&self, filter: MovementFilter) -> MovementCursor<'_, L> {
        MovementCursor::new(self.mutator.ledger(), filter)
    }

    /// Replay a product's history and compare with its recorded stock.
    pub fn reconcile(&self, product_id: ProductId) -> InventoryResult<Reconciliation> {
        let _locks = self.mutator.lock([product_id])?;
        let product = self.mutator.registry().get(product_id)?;
        let history: Vec<Movement> = self
            .movement_cursor(MovementFilter::for_product(product_id))
            .collect::<InventoryResult<_>>()?;
        let replayed = replay(&history)?;

        let result = Reconciliation {
            product_id,
            recorded_stock: product.stock(),
            replay: replayed,
        };
        if !result.is_consistent() {
            warn!(
                product_id = %product_id,
                recorded = result.recorded_stock,
                replayed = result.replay.stock,
                "stock does not match ledger history"
            );
        }
        Ok(result)
    }

    // ---- alerts ----

    pub fn alerts(&self, filter: &AlertFilter) -> Vec<Alert> {
        self.mutator.alerts().list(filter)
    }

    pub fn alert(&self, id: AlertId) -> InventoryResult<Alert> {
        self.mutator.alerts().get(id)
    }

    pub fn open_alert_count(&self) -> usize {
        self.mutator.alerts().count_open()
    }

    pub fn mark_alert_read(&self, id: AlertId) -> InventoryResult<Alert> {
        self.mutator.alerts().mark_read(id)
    }

    pub fn mark_all_alerts_read(&self) -> usize {
        self.mutator.alerts().mark_all_read()
    }
}
