//! Business documents (purchases, sales, returns) and their store.
//!
//! A document is created together with its movements and never mutated
//! afterwards. Corrections are new documents or compensating adjustments.

pub mod document;
pub mod store;

pub use document::{
    Document, DocumentDetails, DocumentFilter, DocumentKind, DocumentLine, LineItem, NewDocument, ReturnKind,
};
pub use store::{DocumentStore, InMemoryDocumentStore};
