//! Time-windowed product and category offers.

use crate::catalog::Product;
use crate::ids::{CategoryId, OfferId, ProductId};
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A discounted price for one product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductOffer {
    pub id: OfferId,
    pub product_id: ProductId,
    /// Unit price while the offer runs.
    pub offer_price: Money,
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ProductOffer {
    /// `starts_at <= now <= expires_at`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now <= self.expires_at
    }
}

/// A percentage off every product in a category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryOffer {
    pub id: OfferId,
    pub category_id: CategoryId,
    /// Percentage off list price (0.0 - 100.0).
    pub discount_percent: f64,
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CategoryOffer {
    /// `starts_at <= now <= expires_at`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now <= self.expires_at
    }

    /// Apply the percentage to a list price.
    pub fn apply(&self, price: &Money) -> Money {
        let percent = self.discount_percent.clamp(0.0, 100.0);
        price
            .checked_sub(&price.percentage(percent))
            .unwrap_or(*price)
    }
}

/// Where an item's effective price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    ProductOffer,
    CategoryOffer,
    StoredCategoryPrice,
    ListPrice,
}

/// The offers known at pricing time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OfferBook {
    pub product_offers: Vec<ProductOffer>,
    pub category_offers: Vec<CategoryOffer>,
}

impl OfferBook {
    pub fn new(product_offers: Vec<ProductOffer>, category_offers: Vec<CategoryOffer>) -> Self {
        Self {
            product_offers,
            category_offers,
        }
    }

    /// Effective unit price for `product` at `now`.
    ///
    /// Precedence: active product offer, active category offer, the stored
    /// category-offer price, list price.
    pub fn unit_price(&self, product: &Product, now: DateTime<Utc>) -> (Money, PriceSource) {
        if let Some(offer) = self
            .product_offers
            .iter()
            .find(|o| o.product_id == product.id && o.is_active(now))
        {
            return (offer.offer_price, PriceSource::ProductOffer);
        }

        if let Some(category_id) = &product.category_id {
            if let Some(offer) = self
                .category_offers
                .iter()
                .find(|o| &o.category_id == category_id && o.is_active(now))
            {
                return (offer.apply(&product.price), PriceSource::CategoryOffer);
            }
        }

        if let Some(price) = product.category_offer_price {
            return (price, PriceSource::StoredCategoryPrice);
        }

        (product.price, PriceSource::ListPrice)
    }
}
