use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use stockledger_core::{DocumentId, Entity, InventoryError, InventoryResult};

use crate::document::{Document, DocumentFilter};

/// Document persistence boundary.
///
/// Documents are written once, together with their movements, in two
/// phases: `stage` checks and parks the document out of readers' sight, and
/// the stock transaction later either `publish`es it (after the ledger
/// commit) or `discard`s it.
pub trait DocumentStore: Send + Sync {
    /// Park a document. Fails with `Conflict` if the id is already taken.
    fn stage(&self, document: Document) -> InventoryResult<()>;

    /// Make a staged document visible. Runs after the ledger commit point and
    /// cannot fail; a durable backend does everything fallible in `stage`.
    fn publish(&self, id: DocumentId);

    /// Forget a staged document.
    fn discard(&self, id: DocumentId);

    fn get(&self, id: DocumentId) -> InventoryResult<Document>;

    /// Documents matching `filter`, newest first.
    fn list(&self, filter: &DocumentFilter) -> InventoryResult<Vec<Document>>;
}

impl<D> DocumentStore for Arc<D>
where
    D: DocumentStore + ?Sized,
{
    fn stage(&self, document: Document) -> InventoryResult<()> {
        (**self).stage(document)
    }

    fn publish(&self, id: DocumentId) {
        (**self).publish(id)
    }

    fn discard(&self, id: DocumentId) {
        (**self).discard(id)
    }

    fn get(&self, id: DocumentId) -> InventoryResult<Document> {
        (**self).get(id)
    }

    fn list(&self, filter: &DocumentFilter) -> InventoryResult<Vec<Document>> {
        (**self).list(filter)
    }
}

#[derive(Debug, Default)]
struct Shelf {
    documents: HashMap<DocumentId, Document>,
    staged: HashMap<DocumentId, Document>,
}

/// In-memory document store.
///
/// Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    shelf: RwLock<Shelf>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Write access for publish/discard. Both are single map moves, so a
    /// poisoned lock still guards valid data.
    fn shelf_mut(&self) -> RwLockWriteGuard<'_, Shelf> {
        self.shelf.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn stage(&self, document: Document) -> InventoryResult<()> {
        let mut shelf = self
            .shelf
            .write()
            .map_err(|_| InventoryError::poisoned("document store"))?;
        if shelf.documents.contains_key(&document.id) || shelf.staged.contains_key(&document.id) {
            return Err(InventoryError::conflict(format!("{} already exists", document.tag("document"))));
        }
        shelf.staged.insert(document.id, document);
        Ok(())
    }

    fn publish(&self, id: DocumentId) {
        let mut guard = self.shelf_mut();
        let shelf = &mut *guard;
        if let Some(document) = shelf.staged.remove(&id) {
            shelf.documents.insert(id, document);
        }
    }

    fn discard(&self, id: DocumentId) {
        self.shelf_mut().staged.remove(&id);
    }

    fn get(&self, id: DocumentId) -> InventoryResult<Document> {
        let shelf = self
            .shelf
            .read()
            .map_err(|_| InventoryError::poisoned("document store"))?;
        shelf
            .documents
            .get(&id)
            .cloned()
            .ok_or_else(|| InventoryError::not_found(format!("document {id}")))
    }

    fn list(&self, filter: &DocumentFilter) -> InventoryResult<Vec<Document>> {
        let shelf = self
            .shelf
            .read()
            .map_err(|_| InventoryError::poisoned("document store"))?;
        let mut out: Vec<Document> = shelf.documents.values().filter(|d| filter.matches(d)).cloned().collect();
        // v7 ids are time-ordered, so they break timestamp ties.
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(out)
    }
}
