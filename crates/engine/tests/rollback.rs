//! Storage failures mid-transaction must leave no partial effect.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

use rust_decimal::Decimal;

use stockledger_catalog::{InMemoryProductRegistry, NewProduct, ProductRegistry};
use stockledger_core::{DocumentId, InventoryError, InventoryResult, MovementId, PartyId, ProductId};
use stockledger_documents::{Document, DocumentFilter, DocumentStore, InMemoryDocumentStore, LineItem};
use stockledger_engine::{EngineConfig, InventoryService};
use stockledger_ledger::{
    InMemoryMovementLedger, Movement, MovementFilter, MovementLedger, MovementPage, NewMovement, Pagination,
};

/// Ledger whose appends fail while `failing` is set.
#[derive(Default)]
struct FlakyLedger {
    inner: InMemoryMovementLedger,
    failing: AtomicBool,
}

impl MovementLedger for FlakyLedger {
    fn append(&self, drafts: Vec<NewMovement>) -> InventoryResult<Vec<Movement>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(InventoryError::persistence("ledger: disk full"));
        }
        self.inner.append(drafts)
    }

    fn get(&self, id: MovementId) -> InventoryResult<Movement> {
        self.inner.get(id)
    }

    fn scan(&self, filter: &MovementFilter, after: u64, limit: usize) -> InventoryResult<Vec<Movement>> {
        self.inner.scan(filter, after, limit)
    }

    fn page(&self, filter: &MovementFilter, pagination: Pagination) -> InventoryResult<MovementPage> {
        self.inner.page(filter, pagination)
    }
}

/// Document store whose staging fails while `failing` is set.
#[derive(Default)]
struct FlakyDocuments {
    inner: InMemoryDocumentStore,
    failing: AtomicBool,
}

impl DocumentStore for FlakyDocuments {
    fn stage(&self, document: Document) -> InventoryResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(InventoryError::persistence("documents: connection reset"));
        }
        self.inner.stage(document)
    }

    fn publish(&self, id: DocumentId) {
        self.inner.publish(id)
    }

    fn discard(&self, id: DocumentId) {
        self.inner.discard(id)
    }

    fn get(&self, id: DocumentId) -> InventoryResult<Document> {
        self.inner.get(id)
    }

    fn list(&self, filter: &DocumentFilter) -> InventoryResult<Vec<Document>> {
        self.inner.list(filter)
    }
}

/// What a reader saw while an append was in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Seen {
    stock: i64,
    documents: usize,
}

/// Ledger that reads the catalog and document store during every append,
/// before deciding whether the append succeeds.
struct ReadingLedger {
    inner: InMemoryMovementLedger,
    registry: Arc<InMemoryProductRegistry>,
    documents: Arc<InMemoryDocumentStore>,
    watched: Mutex<Option<ProductId>>,
    seen: Mutex<Vec<Seen>>,
    failing: AtomicBool,
}

impl MovementLedger for ReadingLedger {
    fn append(&self, drafts: Vec<NewMovement>) -> InventoryResult<Vec<Movement>> {
        if let Some(id) = *self.watched.lock().unwrap() {
            let seen = Seen {
                stock: self.registry.get(id)?.stock(),
                documents: self.documents.list(&DocumentFilter::default())?.len(),
            };
            self.seen.lock().unwrap().push(seen);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(InventoryError::persistence("ledger: write timed out"));
        }
        self.inner.append(drafts)
    }

    fn get(&self, id: MovementId) -> InventoryResult<Movement> {
        self.inner.get(id)
    }

    fn scan(&self, filter: &MovementFilter, after: u64, limit: usize) -> InventoryResult<Vec<Movement>> {
        self.inner.scan(filter, after, limit)
    }

    fn page(&self, filter: &MovementFilter, pagination: Pagination) -> InventoryResult<MovementPage> {
        self.inner.page(filter, pagination)
    }
}

type Service = InventoryService<Arc<InMemoryProductRegistry>, Arc<FlakyLedger>, Arc<FlakyDocuments>>;

fn setup() -> (Service, Arc<FlakyLedger>, Arc<FlakyDocuments>) {
    stockledger_observability::init_for_tests();
    let ledger = Arc::new(FlakyLedger::default());
    let documents = Arc::new(FlakyDocuments::default());
    let svc = InventoryService::new(
        EngineConfig::default(),
        InMemoryProductRegistry::arc(),
        Arc::clone(&ledger),
        Arc::clone(&documents),
    );
    (svc, ledger, documents)
}

fn product(svc: &Service, sku: &str, stock: i64) -> ProductId {
    svc.create_product(NewProduct::new(sku, sku, Decimal::ONE).with_minimum_stock(2), stock)
        .unwrap()
        .id_typed()
}

#[test]
fn failed_append_rolls_back_stock_and_document() {
    let (svc, ledger, _) = setup();
    let a = product(&svc, "A", 10);
    let b = product(&svc, "B", 10);
    let alerts_before = svc.open_alert_count();

    ledger.failing.store(true, Ordering::SeqCst);
    let err = svc
        .sale(None, None, vec![LineItem::new(a, 9, Decimal::ONE), LineItem::new(b, 9, Decimal::ONE)])
        .unwrap_err();
    assert!(matches!(err, InventoryError::Persistence(_)));
    assert!(err.is_transient());

    assert_eq!(svc.get_product(a).unwrap().stock(), 10);
    assert_eq!(svc.get_product(b).unwrap().stock(), 10);
    assert!(svc.list_documents(&DocumentFilter::default()).unwrap().is_empty());
    assert_eq!(svc.open_alert_count(), alerts_before);

    // Once storage recovers the same document goes through.
    ledger.failing.store(false, Ordering::SeqCst);
    svc.sale(None, None, vec![LineItem::new(a, 9, Decimal::ONE)]).unwrap();
    assert_eq!(svc.get_product(a).unwrap().stock(), 1);
    assert!(svc.reconcile(a).unwrap().is_consistent());
}

#[test]
fn failed_document_insert_rolls_back_stock() {
    let (svc, _, documents) = setup();
    let a = product(&svc, "A", 3);

    documents.failing.store(true, Ordering::SeqCst);
    let err = svc
        .purchase(PartyId::new(), None, vec![LineItem::new(a, 7, Decimal::ONE)])
        .unwrap_err();
    assert!(matches!(err, InventoryError::Persistence(_)));

    assert_eq!(svc.get_product(a).unwrap().stock(), 3);
    assert_eq!(svc.movements(&MovementFilter::for_product(a), None, None).unwrap().total, 1);
    assert!(svc.reconcile(a).unwrap().is_consistent());
}

#[test]
fn failed_initial_stock_removes_product() {
    let (svc, ledger, _) = setup();
    ledger.failing.store(true, Ordering::SeqCst);

    let err = svc
        .create_product(NewProduct::new("A", "A", Decimal::ONE), 5)
        .unwrap_err();
    assert!(matches!(err, InventoryError::Persistence(_)));
    assert!(matches!(svc.get_product_by_sku("A"), Err(InventoryError::NotFound(_))));
    assert_eq!(svc.open_alert_count(), 0);

    ledger.failing.store(false, Ordering::SeqCst);
    let p = svc.create_product(NewProduct::new("A", "A", Decimal::ONE), 5).unwrap();
    assert_eq!(p.stock(), 5);
    assert!(svc.reconcile(p.id_typed()).unwrap().is_consistent());
}

#[test]
fn uncommitted_stock_and_documents_stay_invisible() {
    stockledger_observability::init_for_tests();
    let registry = InMemoryProductRegistry::arc();
    let documents = InMemoryDocumentStore::arc();
    let ledger = Arc::new(ReadingLedger {
        inner: InMemoryMovementLedger::new(),
        registry: Arc::clone(&registry),
        documents: Arc::clone(&documents),
        watched: Mutex::new(None),
        seen: Mutex::new(vec![]),
        failing: AtomicBool::new(false),
    });
    let svc = InventoryService::new(EngineConfig::default(), registry, Arc::clone(&ledger), documents);
    let a = svc
        .create_product(NewProduct::new("A", "A", Decimal::ONE), 10)
        .unwrap()
        .id_typed();
    *ledger.watched.lock().unwrap() = Some(a);

    ledger.failing.store(true, Ordering::SeqCst);
    svc.sale(None, None, vec![LineItem::new(a, 4, Decimal::ONE)]).unwrap_err();
    assert_eq!(svc.get_product(a).unwrap().stock(), 10);

    // A successful append is read the same way: the new stock lands after it.
    ledger.failing.store(false, Ordering::SeqCst);
    svc.sale(None, None, vec![LineItem::new(a, 4, Decimal::ONE)]).unwrap();
    assert_eq!(svc.get_product(a).unwrap().stock(), 6);
    assert_eq!(svc.list_documents(&DocumentFilter::default()).unwrap().len(), 1);

    let seen = ledger.seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            Seen { stock: 10, documents: 0 },
            Seen { stock: 10, documents: 0 },
        ]
    );
}
