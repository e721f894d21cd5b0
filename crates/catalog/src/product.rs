use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{CategoryId, Entity, InventoryError, InventoryResult, ProductId};

/// Minimum stock threshold applied when a product is created without one.
pub const DEFAULT_MINIMUM_STOCK: i64 = 5;

/// Catalog product with its current stock snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    sku: String,
    name: String,
    category_id: Option<CategoryId>,
    purchase_price: Decimal,
    sale_price: Decimal,
    stock: i64,
    minimum_stock: i64,
    active: bool,
    /// Row version, bumped on every write (stock or master data).
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Product {
    /// Build a fresh row from a validated creation request. Stock starts at zero.
    pub(crate) fn from_new(id: ProductId, new: NewProduct, now: DateTime<Utc>) -> Self {
        Self {
            id,
            sku: new.sku.trim().to_string(),
            name: new.name.trim().to_string(),
            category_id: new.category_id,
            purchase_price: new.purchase_price,
            sale_price: new.sale_price,
            stock: 0,
            minimum_stock: new.minimum_stock.unwrap_or(DEFAULT_MINIMUM_STOCK),
            active: true,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category_id(&self) -> Option<CategoryId> {
        self.category_id
    }

    pub fn purchase_price(&self) -> Decimal {
        self.purchase_price
    }

    pub fn sale_price(&self) -> Decimal {
        self.sale_price
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    pub fn minimum_stock(&self) -> i64 {
        self.minimum_stock
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// At or below the minimum threshold (zero included).
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.minimum_stock
    }

    /// Human-readable label used in alert messages.
    pub fn label(&self) -> String {
        format!("{} (SKU: {})", self.name, self.sku)
    }

    pub(crate) fn apply_patch(&mut self, patch: ProductPatch, now: DateTime<Utc>) {
        if let Some(name) = patch.name {
            self.name = name.trim().to_string();
        }
        if patch.clear_category {
            self.category_id = None;
        } else if let Some(category_id) = patch.category_id {
            self.category_id = Some(category_id);
        }
        if let Some(price) = patch.purchase_price {
            self.purchase_price = price;
        }
        if let Some(price) = patch.sale_price {
            self.sale_price = price;
        }
        if let Some(minimum) = patch.minimum_stock {
            self.minimum_stock = minimum;
        }
        if let Some(active) = patch.active {
            self.active = active;
        }
        self.touch(now);
    }

    pub(crate) fn set_stock(&mut self, stock: i64, now: DateTime<Utc>) {
        self.stock = stock;
        self.touch(now);
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Request to register a new product.
///
/// Initial stock is not part of the row: it is recorded as the product's first
/// ledger movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub purchase_price: Decimal,
    pub sale_price: Decimal,
    /// Falls back to [`DEFAULT_MINIMUM_STOCK`] when absent.
    #[serde(default)]
    pub minimum_stock: Option<i64>,
}

impl NewProduct {
    pub fn new(sku: impl Into<String>, name: impl Into<String>, sale_price: Decimal) -> Self {
        Self {
            sku: sku.into(),
            name: name.into(),
            category_id: None,
            purchase_price: Decimal::ZERO,
            sale_price,
            minimum_stock: None,
        }
    }

    pub fn with_purchase_price(mut self, price: Decimal) -> Self {
        self.purchase_price = price;
        self
    }

    pub fn with_minimum_stock(mut self, minimum: i64) -> Self {
        self.minimum_stock = Some(minimum);
        self
    }

    pub fn with_category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn validate(&self) -> InventoryResult<()> {
        if self.sku.trim().is_empty() {
            return Err(InventoryError::validation("sku cannot be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(InventoryError::validation("name cannot be empty"));
        }
        validate_price("purchase_price", self.purchase_price)?;
        validate_price("sale_price", self.sale_price)?;
        if let Some(minimum) = self.minimum_stock {
            validate_minimum(minimum)?;
        }
        Ok(())
    }
}

/// Partial update of a product's master data.
///
/// There is deliberately no stock or SKU field: stock moves only through the
/// ledger and SKUs are immutable. Unknown fields are rejected on deserialize,
/// so a payload carrying `stock` fails instead of being silently dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub clear_category: bool,
    #[serde(default)]
    pub purchase_price: Option<Decimal>,
    #[serde(default)]
    pub sale_price: Option<Decimal>,
    #[serde(default)]
    pub minimum_stock: Option<i64>,
    #[serde(default)]
    pub active: Option<bool>,
}

impl ProductPatch {
    pub fn validate(&self) -> InventoryResult<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(InventoryError::validation("name cannot be empty"));
            }
        }
        if self.clear_category && self.category_id.is_some() {
            return Err(InventoryError::validation(
                "cannot set and clear category in the same patch",
            ));
        }
        if let Some(price) = self.purchase_price {
            validate_price("purchase_price", price)?;
        }
        if let Some(price) = self.sale_price {
            validate_price("sale_price", price)?;
        }
        if let Some(minimum) = self.minimum_stock {
            validate_minimum(minimum)?;
        }
        Ok(())
    }

    /// Whether applying this patch may change the product's alert state.
    pub fn touches_threshold(&self) -> bool {
        self.minimum_stock.is_some()
    }
}

/// Listing filter for [`crate::ProductRegistry::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFilter {
    pub category_id: Option<CategoryId>,
    /// Only products at or below their minimum threshold.
    #[serde(default)]
    pub low_stock_only: bool,
    /// Include soft-deleted products.
    #[serde(default)]
    pub include_inactive: bool,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        if !self.include_inactive && !product.is_active() {
            return false;
        }
        if let Some(category_id) = self.category_id {
            if product.category_id() != Some(category_id) {
                return false;
            }
        }
        if self.low_stock_only && !product.is_low_stock() {
            return false;
        }
        true
    }
}

fn validate_price(field: &str, price: Decimal) -> InventoryResult<()> {
    if price < Decimal::ZERO {
        return Err(InventoryError::validation(format!("{field} cannot be negative")));
    }
    Ok(())
}

fn validate_minimum(minimum: i64) -> InventoryResult<()> {
    if minimum < 0 {
        return Err(InventoryError::validation("minimum_stock cannot be negative"));
    }
    Ok(())
}
