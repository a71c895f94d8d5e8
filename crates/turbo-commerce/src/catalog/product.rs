//! Product and variant types.

use crate::catalog::Variant;
use crate::error::CommerceError;
use crate::ids::{CategoryId, ProductId};
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Product status in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    /// Product is in draft mode, not visible to customers.
    Draft,
    /// Product is active and visible.
    #[default]
    Active,
    /// Product is archived (soft-deleted), data preserved for old orders.
    Archived,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Draft => "draft",
            ProductStatus::Active => "active",
            ProductStatus::Archived => "archived",
        }
    }
}

/// A product in the catalog.
///
/// Stock lives on the variants. There is no stored product-level reserved
/// counter; [`Product::reserved`] sums the variants on read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    /// Unique product identifier.
    pub id: ProductId,
    /// Product name.
    pub name: String,
    /// Category used to match category offers.
    pub category_id: Option<CategoryId>,
    /// List price per unit.
    pub price: Money,
    /// Baseline category-offer price stored on the product by the catalog admin.
    #[serde(default)]
    pub category_offer_price: Option<Money>,
    /// Product visibility status.
    pub status: ProductStatus,
    /// Whether the product takes part in stock tracking and optimistic locking.
    #[serde(default = "default_true")]
    pub stock_tracked: bool,
    /// Sizes with their stock counters.
    pub variants: Vec<Variant>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Product {
    /// Create a new active product with no variants.
    pub fn new(id: ProductId, name: impl Into<String>, price: Money) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            category_id: None,
            price,
            category_offer_price: None,
            status: ProductStatus::Active,
            stock_tracked: true,
            variants: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a size with the given stock.
    pub fn with_variant(mut self, size: impl Into<String>, stock: i64) -> Self {
        self.variants.push(Variant::new(size, stock));
        self
    }

    /// Set the category.
    pub fn with_category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    /// Check if the product can be put in a cart.
    pub fn is_available(&self) -> bool {
        self.status == ProductStatus::Active
    }

    /// Look up a variant by size.
    pub fn variant(&self, size: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.size == size)
    }

    /// Look up a variant by size, failing with `VariantNotFound`.
    pub fn variant_mut(&mut self, size: &str) -> Result<&mut Variant, CommerceError> {
        let product_id = self.id.clone();
        self.variants
            .iter_mut()
            .find(|v| v.size == size)
            .ok_or_else(|| CommerceError::VariantNotFound {
                product_id,
                size: size.to_string(),
            })
    }

    /// Sizes offered by this product.
    pub fn sizes(&self) -> impl Iterator<Item = &str> {
        self.variants.iter().map(|v| v.size.as_str())
    }

    /// Total stock across sizes.
    pub fn stock(&self) -> i64 {
        self.variants.iter().map(|v| v.stock).sum()
    }

    /// Total reserved across sizes.
    pub fn reserved(&self) -> i64 {
        self.variants.iter().map(|v| v.reserved).sum()
    }

    /// Total available across sizes.
    pub fn available(&self) -> i64 {
        self.variants.iter().map(|v| v.available()).sum()
    }

    /// Mark the product as modified.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}
