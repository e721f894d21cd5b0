//! Product registry: identity, pricing and the current stock snapshot.
//!
//! Stock is only ever written through [`ProductRegistry::prepare_stock`] and
//! [`ProductRegistry::publish_stock`], which the stock mutator calls while
//! holding the product's lock.

pub mod product;
pub mod registry;

pub use product::{DEFAULT_MINIMUM_STOCK, NewProduct, Product, ProductFilter, ProductPatch};
pub use registry::{InMemoryProductRegistry, ProductRegistry, StockWrite};
