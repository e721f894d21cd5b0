//! Document processors: purchases, sales, returns, adjustments, reversals.
//!
//! Every document is planned as one stock transaction covering all its lines,
//! so either every line's movement is committed together with the document, or
//! nothing is.

use chrono::Utc;
use tracing::{info, warn};

use stockledger_catalog::ProductRegistry;
use stockledger_core::{DocumentId, InventoryError, InventoryResult, ProductId};
use stockledger_documents::{Document, DocumentDetails, DocumentKind, DocumentStore, NewDocument, ReturnKind};
use stockledger_ledger::{Direction, Movement, MovementFilter, MovementLedger, Reason};

use crate::mutator::{MovementRequest, StagedWrite, StockMutator};

/// Default note on manual adjustments.
pub const ADJUSTMENT_NOTE: &str = "manual adjustment";

/// A document staged in the store, published with its movements.
struct StagedDocument<'a, D: DocumentStore> {
    documents: &'a D,
    id: DocumentId,
}

impl<D: DocumentStore> StagedWrite for StagedDocument<'_, D> {
    fn publish(self) {
        self.documents.publish(self.id);
    }

    fn discard(self) {
        self.documents.discard(self.id);
    }
}

pub struct DocumentProcessor<'a, R, L, D> {
    mutator: &'a StockMutator<R, L>,
    documents: &'a D,
}

impl<'a, R, L, D> DocumentProcessor<'a, R, L, D>
where
    R: ProductRegistry,
    L: MovementLedger,
    D: DocumentStore,
{
    pub fn new(mutator: &'a StockMutator<R, L>, documents: &'a D) -> Self {
        Self { mutator, documents }
    }

    /// Validate, move stock for every line, and persist the document.
    pub fn process(&self, new: NewDocument) -> InventoryResult<Document> {
        new.validate()?;
        self.check_reference(&new.details)?;

        let id = DocumentId::new();
        let kind = new.kind();
        let note = Document::movement_note(kind, id);
        let requests: Vec<MovementRequest> = new
            .lines
            .iter()
            .enumerate()
            .map(|(idx, line)| {
                MovementRequest::new(line.product_id, kind.direction(), kind.reason(), line.quantity)
                    .with_note(note.clone())
                    .for_line(id, idx as u32 + 1)
            })
            .collect();

        let tx = self.mutator.begin(requests)?;
        let document = new.into_document(id, &tx.movement_ids(), Utc::now())?;

        self.documents.stage(document.clone())?;
        tx.commit_with(StagedDocument {
            documents: self.documents,
            id,
        })?;

        info!(
            document_id = %document.id,
            kind = %document.kind,
            lines = document.lines.len(),
            total = %document.total,
            "document committed"
        );
        Ok(document)
    }

    /// A return may name the document it returns; that document must exist
    /// and be a sale (customer return) or a purchase (supplier return).
    fn check_reference(&self, details: &DocumentDetails) -> InventoryResult<()> {
        let DocumentDetails::Return {
            kind,
            reference_document_id: Some(reference),
            ..
        } = details
        else {
            return Ok(());
        };

        let referenced = self.documents.get(*reference)?;
        let expected = match kind {
            ReturnKind::Customer => DocumentKind::Sale,
            ReturnKind::Supplier => DocumentKind::Purchase,
        };
        if referenced.kind != expected {
            return Err(InventoryError::validation(format!(
                "return references {} {}, expected a {}",
                referenced.kind, referenced.id, expected
            )));
        }
        Ok(())
    }

    /// Single manual correction movement.
    pub fn adjust(
        &self,
        product_id: ProductId,
        direction: Direction,
        quantity: i64,
        note: Option<String>,
    ) -> InventoryResult<Movement> {
        let note = note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| ADJUSTMENT_NOTE.to_string());
        self.mutator
            .apply(product_id, direction, quantity, Reason::Adjustment, Some(note), None)
    }

    /// Undo a document's stock effect with compensating adjustments.
    ///
    /// The document itself is left untouched. A document can be reversed once.
    pub fn reverse(&self, id: DocumentId) -> InventoryResult<Vec<Movement>> {
        let document = self.documents.get(id)?;
        let direction = document.kind.direction().reversed();
        let note = document.reversal_note();
        let requests: Vec<MovementRequest> = document
            .lines
            .iter()
            .map(|line| {
                MovementRequest::new(line.product_id, direction, Reason::Adjustment, line.quantity)
                    .with_note(note.clone())
                    .for_line(document.id, line.line_no)
            })
            .collect();

        let tx = self.mutator.begin(requests)?;

        // Checked under the product locks so concurrent reversals serialize.
        let previous = MovementFilter {
            document_id: Some(id),
            reason: Some(Reason::Adjustment),
            ..Default::default()
        };
        if !self.mutator.ledger().scan(&previous, 0, 1)?.is_empty() {
            warn!(document_id = %id, "document already reversed");
            return Err(InventoryError::conflict(format!("document {id} was already reversed")));
        }

        let movements = tx.commit()?;
        info!(
            document_id = %id,
            kind = %document.kind,
            movements = movements.len(),
            "document reversed"
        );
        Ok(movements)
    }
}
