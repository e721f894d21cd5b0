use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{DocumentId, Entity, InventoryError, InventoryResult, MovementId, PartyId, ProductId};
use stockledger_ledger::{Direction, Reason};

/// Who sent the goods back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnKind {
    /// Customer brings goods back: stock comes in.
    Customer,
    /// Goods go back to the supplier: stock goes out.
    Supplier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Purchase,
    Sale,
    CustomerReturn,
    SupplierReturn,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Purchase => "purchase",
            DocumentKind::Sale => "sale",
            DocumentKind::CustomerReturn => "customer_return",
            DocumentKind::SupplierReturn => "supplier_return",
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            DocumentKind::Purchase | DocumentKind::CustomerReturn => Direction::In,
            DocumentKind::Sale | DocumentKind::SupplierReturn => Direction::Out,
        }
    }

    pub fn reason(&self) -> Reason {
        match self {
            DocumentKind::Purchase => Reason::Purchase,
            DocumentKind::Sale => Reason::Sale,
            DocumentKind::CustomerReturn | DocumentKind::SupplierReturn => Reason::Return,
        }
    }
}

impl core::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific header fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentDetails {
    Purchase {
        supplier_id: PartyId,
        /// Supplier's invoice/delivery number.
        document_number: Option<String>,
    },
    Sale {
        customer_id: Option<PartyId>,
        /// Point-of-sale terminal, e.g. `POS-01`.
        pos_label: Option<String>,
    },
    Return {
        kind: ReturnKind,
        reason: String,
        /// Sale (customer return) or purchase (supplier return) being returned.
        reference_document_id: Option<DocumentId>,
    },
}

impl DocumentDetails {
    pub fn kind(&self) -> DocumentKind {
        match self {
            DocumentDetails::Purchase { .. } => DocumentKind::Purchase,
            DocumentDetails::Sale { .. } => DocumentKind::Sale,
            DocumentDetails::Return {
                kind: ReturnKind::Customer,
                ..
            } => DocumentKind::CustomerReturn,
            DocumentDetails::Return {
                kind: ReturnKind::Supplier,
                ..
            } => DocumentKind::SupplierReturn,
        }
    }

    /// Supplier or customer on the other side, when known.
    pub fn counterparty(&self) -> Option<PartyId> {
        match self {
            DocumentDetails::Purchase { supplier_id, .. } => Some(*supplier_id),
            DocumentDetails::Sale { customer_id, .. } => *customer_id,
            DocumentDetails::Return { .. } => None,
        }
    }

    pub fn reference_document_id(&self) -> Option<DocumentId> {
        match self {
            DocumentDetails::Return {
                reference_document_id, ..
            } => *reference_document_id,
            _ => None,
        }
    }

    fn validate(&self) -> InventoryResult<()> {
        match self {
            DocumentDetails::Return { reason, .. } if reason.trim().is_empty() => {
                Err(InventoryError::validation("return reason cannot be empty"))
            }
            DocumentDetails::Purchase {
                document_number: Some(number),
                ..
            } if number.trim().is_empty() => Err(InventoryError::validation(
                "document_number cannot be blank when given",
            )),
            _ => Ok(()),
        }
    }
}

/// One requested line: product, quantity and the caller-supplied unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Decimal,
}

impl LineItem {
    pub fn new(product_id: ProductId, quantity: i64, unit_price: Decimal) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
        }
    }

    /// `quantity * unit_price`, or `None` if it exceeds `Decimal`'s range.
    pub fn subtotal(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }
}

/// A document as submitted, before any stock moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub details: DocumentDetails,
    pub lines: Vec<LineItem>,
}

impl NewDocument {
    pub fn purchase(supplier_id: PartyId, document_number: Option<String>, lines: Vec<LineItem>) -> Self {
        Self {
            details: DocumentDetails::Purchase {
                supplier_id,
                document_number,
            },
            lines,
        }
    }

    pub fn sale(customer_id: Option<PartyId>, pos_label: Option<String>, lines: Vec<LineItem>) -> Self {
        Self {
            details: DocumentDetails::Sale { customer_id, pos_label },
            lines,
        }
    }

    pub fn return_goods(
        kind: ReturnKind,
        reference_document_id: Option<DocumentId>,
        reason: impl Into<String>,
        lines: Vec<LineItem>,
    ) -> Self {
        Self {
            details: DocumentDetails::Return {
                kind,
                reason: reason.into(),
                reference_document_id,
            },
            lines,
        }
    }

    pub fn kind(&self) -> DocumentKind {
        self.details.kind()
    }

    /// Header and line checks. Nothing here looks at stock.
    pub fn validate(&self) -> InventoryResult<()> {
        self.details.validate()?;
        if self.lines.is_empty() {
            return Err(InventoryError::validation("document must have at least one line"));
        }
        for (idx, line) in self.lines.iter().enumerate() {
            let line_no = idx + 1;
            if line.quantity <= 0 {
                return Err(InventoryError::validation(format!(
                    "line {line_no}: quantity must be positive"
                )));
            }
            if line.unit_price < Decimal::ZERO {
                return Err(InventoryError::validation(format!(
                    "line {line_no}: unit_price cannot be negative"
                )));
            }
        }
        self.total().map(|_| ())
    }

    /// Sum of line subtotals. Fails with `Validation` when a subtotal or the
    /// running total leaves `Decimal`'s range.
    pub fn total(&self) -> InventoryResult<Decimal> {
        self.lines.iter().enumerate().try_fold(Decimal::ZERO, |total, (idx, line)| {
            let line_no = idx + 1;
            let subtotal = line
                .subtotal()
                .ok_or_else(|| InventoryError::validation(format!("line {line_no}: subtotal is out of range")))?;
            total
                .checked_add(subtotal)
                .ok_or_else(|| InventoryError::validation(format!("line {line_no}: document total is out of range")))
        })
    }

    /// Freeze the document once its movements are planned.
    ///
    /// `movement_ids[i]` is the movement created for `lines[i]`.
    pub fn into_document(
        self,
        id: DocumentId,
        movement_ids: &[MovementId],
        created_at: DateTime<Utc>,
    ) -> InventoryResult<Document> {
        if movement_ids.len() != self.lines.len() {
            return Err(InventoryError::validation(format!(
                "document has {} lines but {} movements",
                self.lines.len(),
                movement_ids.len()
            )));
        }
        let total = self.total()?;
        let lines = self
            .lines
            .into_iter()
            .zip(movement_ids)
            .enumerate()
            .map(|(idx, (line, movement_id))| {
                let line_no = idx as u32 + 1;
                let subtotal = line
                    .subtotal()
                    .ok_or_else(|| InventoryError::validation(format!("line {line_no}: subtotal is out of range")))?;
                Ok(DocumentLine {
                    line_no,
                    subtotal,
                    product_id: line.product_id,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    movement_id: *movement_id,
                })
            })
            .collect::<InventoryResult<Vec<_>>>()?;

        Ok(Document {
            id,
            kind: self.details.kind(),
            details: self.details,
            created_at,
            lines,
            total,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLine {
    /// 1-based position in the document.
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub movement_id: MovementId,
}

/// A committed, immutable business document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub kind: DocumentKind,
    pub details: DocumentDetails,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<DocumentLine>,
    /// Σ(quantity × unit_price), frozen at creation.
    pub total: Decimal,
}

impl Document {
    pub fn counterparty(&self) -> Option<PartyId> {
        self.details.counterparty()
    }

    /// Movement note for a line, e.g. `sale #<id>`.
    pub fn movement_note(kind: DocumentKind, id: DocumentId) -> String {
        match kind {
            DocumentKind::Purchase => format!("purchase #{id}"),
            DocumentKind::Sale => format!("sale #{id}"),
            DocumentKind::CustomerReturn => format!("customer return #{id}"),
            DocumentKind::SupplierReturn => format!("supplier return #{id}"),
        }
    }

    /// Note for the compensating movements written when the document is reversed.
    pub fn reversal_note(&self) -> String {
        match self.kind {
            DocumentKind::Purchase => format!("purchase #{} reversed", self.id),
            DocumentKind::Sale => format!("sale #{} cancelled", self.id),
            DocumentKind::CustomerReturn | DocumentKind::SupplierReturn => {
                format!("return #{} reversed", self.id)
            }
        }
    }
}

impl Entity for Document {
    type Id = DocumentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Listing filter for documents. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFilter {
    pub kind: Option<DocumentKind>,
    pub counterparty: Option<PartyId>,
    /// Inclusive lower bound on `created_at`.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub to: Option<DateTime<Utc>>,
}

impl DocumentFilter {
    pub fn matches(&self, doc: &Document) -> bool {
        self.kind.is_none_or(|k| doc.kind == k)
            && self.counterparty.is_none_or(|c| doc.counterparty() == Some(c))
            && self.from.is_none_or(|from| doc.created_at >= from)
            && self.to.is_none_or(|to| doc.created_at <= to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(quantity: i64, cents: i64) -> LineItem {
        LineItem::new(ProductId::new(), quantity, Decimal::new(cents, 2))
    }

    #[test]
    fn direction_and_reason_follow_kind() {
        assert_eq!(DocumentKind::Purchase.direction(), Direction::In);
        assert_eq!(DocumentKind::Sale.direction(), Direction::Out);
        assert_eq!(DocumentKind::CustomerReturn.direction(), Direction::In);
        assert_eq!(DocumentKind::SupplierReturn.direction(), Direction::Out);
        assert_eq!(DocumentKind::SupplierReturn.reason(), Reason::Return);
        assert_eq!(DocumentKind::Sale.reason(), Reason::Sale);
    }

    #[test]
    fn validate_rejects_empty_and_bad_lines() {
        let empty = NewDocument::sale(None, None, vec![]);
        assert!(matches!(empty.validate(), Err(InventoryError::Validation(_))));

        let zero_qty = NewDocument::sale(None, None, vec![line(1, 100), line(0, 100)]);
        assert!(matches!(zero_qty.validate(), Err(InventoryError::Validation(msg)) if msg.starts_with("line 2")));

        let negative_price = NewDocument::purchase(PartyId::new(), None, vec![line(1, -1)]);
        assert!(negative_price.validate().is_err());

        let no_reason = NewDocument::return_goods(ReturnKind::Customer, None, "  ", vec![line(1, 0)]);
        assert!(matches!(no_reason.validate(), Err(InventoryError::Validation(msg)) if msg.contains("reason")));
    }

    #[test]
    fn zero_price_is_accepted() {
        let doc = NewDocument::sale(None, Some("POS-01".to_string()), vec![line(3, 0)]);
        assert!(doc.validate().is_ok());
        assert_eq!(doc.total(), Ok(Decimal::ZERO));
    }

    #[test]
    fn out_of_range_amounts_fail_validation() {
        let huge = LineItem::new(ProductId::new(), 1_000_000_000_000_000_000, Decimal::from(100_000_000_000i64));
        let doc = NewDocument::purchase(PartyId::new(), None, vec![huge]);
        assert!(matches!(doc.validate(), Err(InventoryError::Validation(msg)) if msg.contains("line 1")));

        let near_max = LineItem::new(ProductId::new(), 1, Decimal::MAX);
        let doc = NewDocument::sale(None, None, vec![near_max.clone(), near_max]);
        assert!(matches!(doc.validate(), Err(InventoryError::Validation(msg)) if msg.contains("line 2")));
    }

    #[test]
    fn into_document_freezes_total_and_numbers_lines() {
        let supplier = PartyId::new();
        let new = NewDocument::purchase(supplier, Some("INV-7".to_string()), vec![line(2, 1050), line(1, 300)]);
        let movements = [MovementId::new(), MovementId::new()];

        let doc = new.into_document(DocumentId::new(), &movements, Utc::now()).unwrap();
        assert_eq!(doc.kind, DocumentKind::Purchase);
        assert_eq!(doc.total, Decimal::new(2400, 2));
        assert_eq!(doc.lines[0].subtotal, Decimal::new(2100, 2));
        assert_eq!(doc.lines[1].line_no, 2);
        assert_eq!(doc.lines[1].movement_id, movements[1]);
        assert_eq!(doc.counterparty(), Some(supplier));
    }

    #[test]
    fn into_document_requires_one_movement_per_line() {
        let new = NewDocument::sale(None, None, vec![line(1, 100), line(1, 100)]);
        assert!(new.into_document(DocumentId::new(), &[MovementId::new()], Utc::now()).is_err());
    }

    #[test]
    fn details_serialize_with_type_tag() {
        let details = DocumentDetails::Return {
            kind: ReturnKind::Supplier,
            reason: "damaged".to_string(),
            reference_document_id: None,
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["type"], "return");
        assert_eq!(json["kind"], "supplier");
        assert_eq!(details.kind(), DocumentKind::SupplierReturn);
    }
}
