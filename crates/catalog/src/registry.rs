use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use chrono::Utc;

use stockledger_core::{ExpectedVersion, InventoryError, InventoryResult, ProductId};

use crate::product::{NewProduct, Product, ProductFilter, ProductPatch};

/// Compare-and-swap write of one product's stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockWrite {
    pub product_id: ProductId,
    pub expected_version: ExpectedVersion,
    pub stock: i64,
}

/// Product registry boundary.
///
/// Owns product rows. Master data changes go through `create`/`update`.
/// Stock changes are two-phase and made only by the stock mutator, while it
/// holds the affected products' locks: `prepare_stock` checks and parks a
/// batch without changing what readers see, then exactly one of
/// `publish_stock` (after the ledger commit) or `discard_stock` follows.
///
/// `delete` is a raw removal: refusing to delete products that still have
/// ledger history is enforced by the caller, which can see the ledger.
pub trait ProductRegistry: Send + Sync {
    fn get(&self, id: ProductId) -> InventoryResult<Product>;

    fn get_by_sku(&self, sku: &str) -> InventoryResult<Product>;

    /// Products matching `filter`, ordered by SKU.
    fn list(&self, filter: &ProductFilter) -> InventoryResult<Vec<Product>>;

    /// Register a product with zero stock. Fails with `DuplicateSku`.
    fn create(&self, new: NewProduct) -> InventoryResult<Product>;

    fn update(&self, id: ProductId, patch: ProductPatch) -> InventoryResult<Product>;

    fn delete(&self, id: ProductId) -> InventoryResult<()>;

    /// Check and park a stock batch. Readers keep seeing the old stock.
    ///
    /// Every write's version expectation is checked; a single mismatch
    /// rejects the whole batch with `Conflict` and nothing is parked.
    fn prepare_stock(&self, writes: &[StockWrite]) -> InventoryResult<()>;

    /// Make the parked writes for `ids` visible and return the updated rows.
    ///
    /// Runs after the ledger commit point and therefore cannot fail; a
    /// durable backend must do everything fallible in `prepare_stock`.
    fn publish_stock(&self, ids: &[ProductId]) -> Vec<Product>;

    /// Drop the parked writes for `ids`.
    fn discard_stock(&self, ids: &[ProductId]);
}

impl<R> ProductRegistry for Arc<R>
where
    R: ProductRegistry + ?Sized,
{
    fn get(&self, id: ProductId) -> InventoryResult<Product> {
        (**self).get(id)
    }

    fn get_by_sku(&self, sku: &str) -> InventoryResult<Product> {
        (**self).get_by_sku(sku)
    }

    fn list(&self, filter: &ProductFilter) -> InventoryResult<Vec<Product>> {
        (**self).list(filter)
    }

    fn create(&self, new: NewProduct) -> InventoryResult<Product> {
        (**self).create(new)
    }

    fn update(&self, id: ProductId, patch: ProductPatch) -> InventoryResult<Product> {
        (**self).update(id, patch)
    }

    fn delete(&self, id: ProductId) -> InventoryResult<()> {
        (**self).delete(id)
    }

    fn prepare_stock(&self, writes: &[StockWrite]) -> InventoryResult<()> {
        (**self).prepare_stock(writes)
    }

    fn publish_stock(&self, ids: &[ProductId]) -> Vec<Product> {
        (**self).publish_stock(ids)
    }

    fn discard_stock(&self, ids: &[ProductId]) {
        (**self).discard_stock(ids)
    }
}

#[derive(Debug, Default)]
struct Rows {
    products: HashMap<ProductId, Product>,
    by_sku: HashMap<String, ProductId>,
    /// Prepared, not yet published stock writes.
    pending: HashMap<ProductId, StockWrite>,
}

/// In-memory product registry.
///
/// Intended for tests/dev and as the reference behaviour for durable backends.
#[derive(Debug, Default)]
pub struct InMemoryProductRegistry {
    rows: RwLock<Rows>,
}

impl InMemoryProductRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Write access for the infallible second phase. Rows are only changed
    /// in single assignments, so a poisoned lock still guards valid data.
    fn rows_mut(&self) -> RwLockWriteGuard<'_, Rows> {
        self.rows.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn product_not_found(id: ProductId) -> InventoryError {
    InventoryError::not_found(format!("product {id}"))
}

impl ProductRegistry for InMemoryProductRegistry {
    fn get(&self, id: ProductId) -> InventoryResult<Product> {
        let rows = self.rows.read().map_err(|_| InventoryError::poisoned("product registry"))?;
        rows.products.get(&id).cloned().ok_or_else(|| product_not_found(id))
    }

    fn get_by_sku(&self, sku: &str) -> InventoryResult<Product> {
        let rows = self.rows.read().map_err(|_| InventoryError::poisoned("product registry"))?;
        rows.by_sku
            .get(sku.trim())
            .and_then(|id| rows.products.get(id))
            .cloned()
            .ok_or_else(|| InventoryError::not_found(format!("product with sku '{sku}'")))
    }

    fn list(&self, filter: &ProductFilter) -> InventoryResult<Vec<Product>> {
        let rows = self.rows.read().map_err(|_| InventoryError::poisoned("product registry"))?;
        let mut out: Vec<Product> = rows
            .products
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.sku().cmp(b.sku()));
        Ok(out)
    }

    fn create(&self, new: NewProduct) -> InventoryResult<Product> {
        new.validate()?;

        let mut rows = self.rows.write().map_err(|_| InventoryError::poisoned("product registry"))?;
        let sku = new.sku.trim().to_string();
        if rows.by_sku.contains_key(&sku) {
            return Err(InventoryError::DuplicateSku(sku));
        }

        let product = Product::from_new(ProductId::new(), new, Utc::now());
        rows.by_sku.insert(sku, product.id_typed());
        rows.products.insert(product.id_typed(), product.clone());
        Ok(product)
    }

    fn update(&self, id: ProductId, patch: ProductPatch) -> InventoryResult<Product> {
        patch.validate()?;

        let mut rows = self.rows.write().map_err(|_| InventoryError::poisoned("product registry"))?;
        let product = rows.products.get_mut(&id).ok_or_else(|| product_not_found(id))?;
        product.apply_patch(patch, Utc::now());
        Ok(product.clone())
    }

    fn delete(&self, id: ProductId) -> InventoryResult<()> {
        let mut rows = self.rows.write().map_err(|_| InventoryError::poisoned("product registry"))?;
        let product = rows.products.remove(&id).ok_or_else(|| product_not_found(id))?;
        rows.by_sku.remove(product.sku());
        Ok(())
    }

    fn prepare_stock(&self, writes: &[StockWrite]) -> InventoryResult<()> {
        let mut rows = self.rows.write().map_err(|_| InventoryError::poisoned("product registry"))?;

        // Validate the whole batch before parking any of it.
        for (idx, w) in writes.iter().enumerate() {
            if w.stock < 0 {
                return Err(InventoryError::validation(format!(
                    "stock write for {} would be negative ({})",
                    w.product_id, w.stock
                )));
            }
            if writes[..idx].iter().any(|prev| prev.product_id == w.product_id) {
                return Err(InventoryError::validation(format!(
                    "stock write batch contains product {} twice",
                    w.product_id
                )));
            }
            let current = rows
                .products
                .get(&w.product_id)
                .ok_or_else(|| product_not_found(w.product_id))?;
            w.expected_version.check(current.version())?;
            if rows.pending.contains_key(&w.product_id) {
                return Err(InventoryError::conflict(format!(
                    "product {} already has an unpublished stock write",
                    w.product_id
                )));
            }
        }

        for w in writes {
            rows.pending.insert(w.product_id, *w);
        }
        Ok(())
    }

    fn publish_stock(&self, ids: &[ProductId]) -> Vec<Product> {
        let mut guard = self.rows_mut();
        let rows = &mut *guard;
        let now = Utc::now();
        let mut updated = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(write) = rows.pending.remove(id) else {
                continue;
            };
            if let Some(product) = rows.products.get_mut(id) {
                product.set_stock(write.stock, now);
                updated.push(product.clone());
            }
        }
        updated
    }

    fn discard_stock(&self, ids: &[ProductId]) {
        let mut rows = self.rows_mut();
        for id in ids {
            rows.pending.remove(id);
        }
    }
}
